use crate::ports::store::blocking;
use crate::ports::{StoreError, SubscriptionStore};
use crate::push::encryption::{EncryptionError, decode_key_material};
use crate::types::push::{PushSubscription, SubscriptionId, SubscriptionRegistration};

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("owner id must not be empty")]
    MissingOwner,
    #[error("invalid push endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("push endpoint '{0}' must be https on a public host")]
    InsecureEndpoint(String),
    #[error("invalid subscription keys: {0}")]
    InvalidKeys(#[from] EncryptionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Subscriptions split into the ones to deliver to and the surplus rows that
/// share an endpoint with an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deduped {
    pub unique: Vec<PushSubscription>,
    pub duplicates: Vec<PushSubscription>,
}

#[derive(Clone)]
pub struct SubscriptionRegistry {
    store: Arc<dyn SubscriptionStore>,
    allow_insecure_endpoints: bool,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("allow_insecure_endpoints", &self.allow_insecure_endpoints)
            .finish_non_exhaustive()
    }
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            store,
            allow_insecure_endpoints: false,
        }
    }

    /// Accept `http` endpoints and loopback or private-network hosts.
    pub fn allow_insecure_endpoints(mut self, allow: bool) -> Self {
        self.allow_insecure_endpoints = allow;
        self
    }

    pub async fn register(
        &self,
        registration: SubscriptionRegistration,
        at: OffsetDateTime,
    ) -> Result<PushSubscription, RegistryError> {
        let registration = SubscriptionRegistration {
            owner_id: registration.owner_id.trim().to_string(),
            endpoint: registration.endpoint.trim().to_string(),
            client_public_key: registration.client_public_key.trim().to_string(),
            auth_secret: registration.auth_secret.trim().to_string(),
        };
        if registration.owner_id.is_empty() {
            return Err(RegistryError::MissingOwner);
        }
        self.check_endpoint(&registration.endpoint)?;
        decode_key_material(&registration.client_public_key, &registration.auth_secret)?;

        let store = self.store.clone();
        Ok(blocking(move || store.insert(&registration, at)).await?)
    }

    fn check_endpoint(&self, endpoint: &str) -> Result<(), RegistryError> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|_| RegistryError::InvalidEndpoint(endpoint.to_string()))?;
        let Some(host) = url.host_str() else {
            return Err(RegistryError::InvalidEndpoint(endpoint.to_string()));
        };
        match url.scheme() {
            "https" => {}
            "http" if self.allow_insecure_endpoints => {}
            "http" => return Err(RegistryError::InsecureEndpoint(endpoint.to_string())),
            _ => return Err(RegistryError::InvalidEndpoint(endpoint.to_string())),
        }
        if !self.allow_insecure_endpoints && is_internal_host(host) {
            return Err(RegistryError::InsecureEndpoint(endpoint.to_string()));
        }
        Ok(())
    }

    pub async fn list(&self, owner_id: &str) -> Result<Vec<PushSubscription>, StoreError> {
        let store = self.store.clone();
        let owner_id = owner_id.to_string();
        blocking(move || store.list(&owner_id)).await
    }

    /// Keeps the first subscription seen for each endpoint.
    pub fn dedupe_by_endpoint(subscriptions: Vec<PushSubscription>) -> Deduped {
        let mut seen = HashSet::new();
        let mut deduped = Deduped::default();
        for subscription in subscriptions {
            if seen.insert(subscription.endpoint.clone()) {
                deduped.unique.push(subscription);
            } else {
                deduped.duplicates.push(subscription);
            }
        }
        deduped
    }

    /// Best-effort: a failed delete is logged and otherwise ignored.
    pub async fn remove(&self, ids: &[SubscriptionId]) {
        if ids.is_empty() {
            return;
        }
        let store = self.store.clone();
        let owned = ids.to_vec();
        match blocking(move || store.delete(&owned)).await {
            Ok(removed) => debug!(removed, "removed duplicate push subscriptions"),
            Err(err) => warn!(error = %err, ?ids, "failed to remove push subscriptions"),
        }
    }

    pub async fn remove_one(&self, id: SubscriptionId) -> Result<(), StoreError> {
        let store = self.store.clone();
        blocking(move || store.delete(&[id])).await.map(|_| ())
    }
}

/// Loopback, private, link-local and unspecified addresses, plus `localhost`.
fn is_internal_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost") || host.to_ascii_lowercase().ends_with(".localhost")
    {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            ip.is_loopback()
                || ip.is_private()
                || ip.is_link_local()
                || ip.is_unspecified()
                || ip.is_broadcast()
        }
        Ok(IpAddr::V6(ip)) => {
            if let Some(mapped) = ip.to_ipv4_mapped() {
                return is_internal_host(&mapped.to_string());
            }
            let first = ip.segments()[0];
            ip.is_loopback()
                || ip.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
        Err(_) => false,
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::push::encryption::tests::TestClient;
    use crate::store::SqliteStore;

    fn subscription(id: SubscriptionId, endpoint: &str) -> PushSubscription {
        PushSubscription {
            id,
            owner_id: "alice".to_string(),
            endpoint: endpoint.to_string(),
            client_public_key: Some("key".to_string()),
            auth_secret: Some("auth".to_string()),
        }
    }

    fn registration(client: &TestClient, endpoint: &str) -> SubscriptionRegistration {
        SubscriptionRegistration {
            owner_id: "alice".to_string(),
            endpoint: endpoint.to_string(),
            client_public_key: client.public_key_b64(),
            auth_secret: client.auth_secret_b64(),
        }
    }

    struct FailingStore;

    impl SubscriptionStore for FailingStore {
        fn insert(
            &self,
            _registration: &SubscriptionRegistration,
            _at: OffsetDateTime,
        ) -> Result<PushSubscription, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        fn list(&self, _owner_id: &str) -> Result<Vec<PushSubscription>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        fn delete(&self, _ids: &[SubscriptionId]) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    #[test]
    fn dedupe_by_endpoint__should_keep_first_occurrence_per_endpoint() {
        // Given
        let subscriptions = vec![
            subscription(1, "https://push.example/a"),
            subscription(2, "https://push.example/b"),
            subscription(3, "https://push.example/a"),
            subscription(4, "https://push.example/a"),
        ];

        // When
        let deduped = SubscriptionRegistry::dedupe_by_endpoint(subscriptions);

        // Then
        let unique: Vec<_> = deduped.unique.iter().map(|s| s.id).collect();
        let duplicates: Vec<_> = deduped.duplicates.iter().map(|s| s.id).collect();
        assert_eq!(unique, vec![1, 2]);
        assert_eq!(duplicates, vec![3, 4]);
    }

    #[tokio::test]
    async fn register__should_validate_and_store_subscription() {
        // Given
        let registry = SubscriptionRegistry::new(Arc::new(
            SqliteStore::open_in_memory().expect("open store"),
        ));
        let client = TestClient::generate();

        // When
        let stored = registry
            .register(
                registration(&client, " https://push.example/a "),
                OffsetDateTime::UNIX_EPOCH,
            )
            .await
            .expect("register");

        // Then
        assert_eq!(stored.endpoint, "https://push.example/a");
        assert_eq!(registry.list("alice").await.expect("list"), vec![stored]);
    }

    #[tokio::test]
    async fn register__should_reject_bad_input() {
        // Given
        let registry = SubscriptionRegistry::new(Arc::new(
            SqliteStore::open_in_memory().expect("open store"),
        ));
        let client = TestClient::generate();
        let mut no_owner = registration(&client, "https://push.example/a");
        no_owner.owner_id = "  ".to_string();
        let mut bad_keys = registration(&client, "https://push.example/a");
        bad_keys.auth_secret = "c2hvcnQ".to_string();

        // Then
        assert!(matches!(
            registry.register(no_owner, OffsetDateTime::UNIX_EPOCH).await,
            Err(RegistryError::MissingOwner)
        ));
        assert!(matches!(
            registry
                .register(
                    registration(&client, "ftp://push.example/a"),
                    OffsetDateTime::UNIX_EPOCH
                )
                .await,
            Err(RegistryError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            registry.register(bad_keys, OffsetDateTime::UNIX_EPOCH).await,
            Err(RegistryError::InvalidKeys(_))
        ));
        assert!(registry.list("alice").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn register__should_reject_plain_http_and_internal_hosts_by_default() {
        // Given
        let registry = SubscriptionRegistry::new(Arc::new(
            SqliteStore::open_in_memory().expect("open store"),
        ));
        let client = TestClient::generate();
        let rejected = [
            "http://push.example/a",
            "https://localhost/push",
            "https://127.0.0.1:8443/push",
            "https://10.0.0.5/push",
            "https://192.168.1.1/push",
            "https://169.254.169.254/latest",
            "https://[::1]/push",
            "https://[::ffff:127.0.0.1]/push",
            "https://[fd00::1]/push",
        ];

        // Then
        for endpoint in rejected {
            let result = registry
                .register(registration(&client, endpoint), OffsetDateTime::UNIX_EPOCH)
                .await;
            assert!(
                matches!(result, Err(RegistryError::InsecureEndpoint(_))),
                "{endpoint} should be rejected, got {result:?}"
            );
        }
        assert!(registry.list("alice").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn register__should_accept_loopback_http_when_insecure_endpoints_allowed() {
        // Given
        let registry = SubscriptionRegistry::new(Arc::new(
            SqliteStore::open_in_memory().expect("open store"),
        ))
        .allow_insecure_endpoints(true);
        let client = TestClient::generate();

        // When
        let stored = registry
            .register(
                registration(&client, "http://127.0.0.1:9000/push"),
                OffsetDateTime::UNIX_EPOCH,
            )
            .await
            .expect("register");

        // Then
        assert_eq!(stored.endpoint, "http://127.0.0.1:9000/push");
    }

    #[tokio::test]
    async fn remove__should_swallow_store_failures() {
        // Given
        let registry = SubscriptionRegistry::new(Arc::new(FailingStore));

        // When
        registry.remove(&[1, 2]).await;

        // Then
        assert!(registry.remove_one(1).await.is_err());
    }

    #[tokio::test]
    async fn remove_one__should_delete_single_subscription() {
        // Given
        let registry = SubscriptionRegistry::new(Arc::new(
            SqliteStore::open_in_memory().expect("open store"),
        ));
        let client = TestClient::generate();
        let kept = registry
            .register(registration(&client, "https://push.example/a"), OffsetDateTime::UNIX_EPOCH)
            .await
            .expect("register");
        let gone = registry
            .register(registration(&client, "https://push.example/b"), OffsetDateTime::UNIX_EPOCH)
            .await
            .expect("register");

        // When
        registry.remove_one(gone.id).await.expect("remove");

        // Then
        assert_eq!(registry.list("alice").await.expect("list"), vec![kept]);
    }
}
