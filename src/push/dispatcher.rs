use base64::{URL_SAFE_NO_PAD, encode_config};
use futures::future::join_all;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::ports::{self, RelayError, RelayRequest};
use crate::push::encryption::{CONTENT_ENCODING, EncryptionError, decode_key_material, encrypt};
use crate::push::registry::{Deduped, SubscriptionRegistry};
use crate::push::vapid::{
    VapidConfigStatus, VapidError, authorization_header, relay_origin, sign_token,
};
use crate::types::push::{DeliveryReport, NotificationPayload, PushSubscription, VapidConfig};

pub const DEFAULT_TTL_SECONDS: u32 = 86_400;

/// Why a single endpoint was counted as failed.
#[derive(Debug, Error)]
pub(crate) enum DeliveryFailure {
    #[error("subscription has no key material")]
    MissingKeys,
    #[error("encryption failed: {0}")]
    Encryption(#[from] EncryptionError),
    #[error("signing failed: {0}")]
    Signing(#[from] VapidError),
    #[error("relay reports subscription gone (HTTP {0})")]
    Gone(u16),
    #[error("relay rejected delivery (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error(transparent)]
    Transport(#[from] RelayError),
}

#[derive(Debug, Clone, Copy)]
pub struct DispatcherSettings {
    pub ttl_seconds: u32,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

/// Fans one notification out to every distinct endpoint an owner has registered.
#[derive(Debug)]
pub struct Dispatcher<C, R, T> {
    registry: SubscriptionRegistry,
    crypto: C,
    relay: R,
    time: T,
    vapid: VapidConfigStatus,
    settings: DispatcherSettings,
}

impl<C, R, T> Dispatcher<C, R, T>
where
    C: ports::CryptoProvider,
    R: ports::PushRelay,
    T: ports::TimeProvider,
{
    pub fn new(
        registry: SubscriptionRegistry,
        crypto: C,
        relay: R,
        time: T,
        vapid: VapidConfigStatus,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            registry,
            crypto,
            relay,
            time,
            vapid,
            settings,
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn vapid(&self) -> &VapidConfigStatus {
        &self.vapid
    }

    /// Attempts every endpoint to completion; individual failures only affect
    /// the tally.
    pub async fn dispatch(&self, owner_id: &str, payload: &NotificationPayload) -> DeliveryReport {
        let subscriptions = match self.registry.list(owner_id).await {
            Ok(subscriptions) => subscriptions,
            Err(err) => {
                error!(owner_id, error = %err, "failed to load push subscriptions");
                return DeliveryReport::default();
            }
        };

        let Deduped { unique, duplicates } = SubscriptionRegistry::dedupe_by_endpoint(subscriptions);
        if !duplicates.is_empty() {
            let ids: Vec<_> = duplicates.iter().map(|subscription| subscription.id).collect();
            self.registry.remove(&ids).await;
        }
        if unique.is_empty() {
            return DeliveryReport::default();
        }

        let Some(vapid) = self.vapid.ready() else {
            error!(
                owner_id,
                reason = %self.vapid.describe(),
                "push dispatch aborted: VAPID credentials unavailable"
            );
            return DeliveryReport {
                sent: 0,
                failed: unique.len(),
            };
        };

        let plaintext = match serde_json::to_vec(payload) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                error!(owner_id, error = %err, "failed to serialize push payload");
                return DeliveryReport {
                    sent: 0,
                    failed: unique.len(),
                };
            }
        };

        let attempts = unique
            .iter()
            .map(|subscription| self.deliver(subscription, &plaintext, vapid));
        let outcomes = join_all(attempts).await;

        let mut report = DeliveryReport::default();
        for (subscription, outcome) in unique.iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.sent += 1,
                Err(failure) => {
                    warn!(
                        owner_id,
                        subscription_id = subscription.id,
                        endpoint = %subscription.endpoint,
                        error = %failure,
                        "push delivery failed"
                    );
                    report.failed += 1;
                }
            }
        }
        info!(
            owner_id,
            sent = report.sent,
            failed = report.failed,
            "push dispatch finished"
        );
        report
    }

    async fn deliver(
        &self,
        subscription: &PushSubscription,
        plaintext: &[u8],
        vapid: &VapidConfig,
    ) -> Result<(), DeliveryFailure> {
        let (Some(client_public_key), Some(auth_secret)) = (
            subscription.client_public_key.as_deref(),
            subscription.auth_secret.as_deref(),
        ) else {
            return Err(DeliveryFailure::MissingKeys);
        };
        if client_public_key.trim().is_empty() || auth_secret.trim().is_empty() {
            return Err(DeliveryFailure::MissingKeys);
        }

        let (client_public_key, auth_secret) = decode_key_material(client_public_key, auth_secret)?;
        let message = encrypt(&self.crypto, plaintext, &client_public_key, &auth_secret)?;
        let audience = relay_origin(&subscription.endpoint)?;
        let token = sign_token(
            &self.crypto,
            &audience,
            &vapid.subject,
            &vapid.key_pair,
            self.time.now(),
        )?;

        let request = RelayRequest {
            endpoint: subscription.endpoint.clone(),
            headers: vec![
                ("Authorization", authorization_header(&token, &vapid.key_pair)),
                ("TTL", self.settings.ttl_seconds.to_string()),
                ("Content-Type", "application/octet-stream".to_string()),
                ("Content-Encoding", CONTENT_ENCODING.to_string()),
                (
                    "Crypto-Key",
                    format!(
                        "dh={}",
                        encode_config(message.server_public_key, URL_SAFE_NO_PAD)
                    ),
                ),
                (
                    "Encryption",
                    format!("salt={}", encode_config(message.salt, URL_SAFE_NO_PAD)),
                ),
            ],
            body: message.ciphertext,
        };

        let response = self.relay.post(request).await?;
        match response.status {
            200..=299 => Ok(()),
            404 | 410 => {
                match self.registry.remove_one(subscription.id).await {
                    Ok(()) => info!(
                        subscription_id = subscription.id,
                        status = response.status,
                        "removed expired push subscription"
                    ),
                    Err(err) => warn!(
                        subscription_id = subscription.id,
                        error = %err,
                        "failed to remove expired push subscription"
                    ),
                }
                Err(DeliveryFailure::Gone(response.status))
            }
            status => Err(DeliveryFailure::Rejected {
                status,
                body: response.body,
            }),
        }
    }
}
