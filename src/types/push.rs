use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Length of an uncompressed SEC1 P-256 point (`0x04 || x || y`).
pub const UNCOMPRESSED_POINT_LEN: usize = 65;
pub const AUTH_SECRET_LEN: usize = 16;
pub const SALT_LEN: usize = 16;
pub const PRIVATE_KEY_LEN: usize = 32;

pub type SubscriptionId = i64;

/// A relay-issued endpoint plus the browser key material needed to encrypt for it.
///
/// Key material is kept base64url-encoded exactly as the browser reported it.
/// Either key may be missing when upstream registration was incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub id: SubscriptionId,
    pub owner_id: String,
    pub endpoint: String,
    pub client_public_key: Option<String>,
    pub auth_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRegistration {
    pub owner_id: String,
    pub endpoint: String,
    pub client_public_key: String,
    pub auth_secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub ciphertext: Vec<u8>,
    pub server_public_key: [u8; UNCOMPRESSED_POINT_LEN],
    pub salt: [u8; SALT_LEN],
}

#[derive(Clone, PartialEq, Eq)]
pub struct VapidKeyPair {
    pub public_key: [u8; UNCOMPRESSED_POINT_LEN],
    pub private_key: [u8; PRIVATE_KEY_LEN],
}

impl std::fmt::Debug for VapidKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct VapidConfig {
    pub key_pair: VapidKeyPair,
    pub subject: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub sent: usize,
    pub failed: usize,
    pub skipped_duplicate: bool,
}

impl SendOutcome {
    pub fn duplicate() -> Self {
        Self {
            sent: 0,
            failed: 0,
            skipped_duplicate: true,
        }
    }
}

impl From<DeliveryReport> for SendOutcome {
    fn from(report: DeliveryReport) -> Self {
        Self {
            sent: report.sent,
            failed: report.failed,
            skipped_duplicate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReservation {
    pub owner_id: String,
    pub reservation_key: ReservationKey,
    pub reserved_at: OffsetDateTime,
    pub finalized_at: Option<OffsetDateTime>,
}

/// Identifies one logical notification for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationKey(String);

impl ReservationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Builds the key for an event about `entity` (`(type, id)`), falling back
    /// to a freeform discriminator when the event has no entity.
    pub fn derive(
        event_type: &str,
        owner_id: &str,
        entity: Option<(&str, &str)>,
        fallback: Option<&str>,
    ) -> Self {
        let event_type = escape_component(event_type.trim());
        let owner_id = escape_component(owner_id.trim());
        let entity = entity
            .map(|(kind, id)| (kind.trim(), id.trim()))
            .filter(|(kind, id)| !kind.is_empty() && !id.is_empty());
        let fallback = fallback.map(str::trim).filter(|value| !value.is_empty());

        match (entity, fallback) {
            (Some((kind, id)), _) => Self(format!(
                "{event_type}:{owner_id}:{}:{}",
                escape_component(kind),
                escape_component(id)
            )),
            (None, Some(fallback)) => Self(format!(
                "{event_type}:{owner_id}:fallback:{}",
                escape_component(fallback)
            )),
            (None, None) => Self(format!("{event_type}:{owner_id}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Percent-escapes the separator so distinct components never join into the
/// same key.
fn escape_component(value: &str) -> String {
    value.replace('%', "%25").replace(':', "%3A")
}

impl std::fmt::Display for ReservationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
