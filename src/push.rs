use crate::adapters::{ReqwestRelay, RustCryptoProvider, UtcTimeProvider};
use crate::config;
use crate::store::SqliteStore;

pub mod dispatcher;
pub mod encryption;
pub(crate) mod hkdf;
pub mod registry;
pub mod reservation;
pub mod vapid;

use std::sync::Arc;

use tracing::{info, warn};

use dispatcher::{Dispatcher, DispatcherSettings};
use registry::SubscriptionRegistry;
use reservation::Reservations;
pub use vapid::{VapidConfigStatus, load_vapid_config};

/// The production wiring: rustcrypto primitives, a reqwest relay and the wall clock.
pub type Engine = Reservations<RustCryptoProvider, ReqwestRelay, UtcTimeProvider>;

pub fn build_engine(
    config: &config::AppConfig,
    store: Arc<SqliteStore>,
) -> Result<Engine, reqwest::Error> {
    let vapid = load_vapid_config(config);
    match &vapid {
        VapidConfigStatus::Ready(vapid) => {
            info!(subject = %vapid.subject, "push notifications enabled");
        }
        VapidConfigStatus::Missing => {
            info!("push notifications disabled: {}", vapid.describe());
        }
        VapidConfigStatus::Incomplete | VapidConfigStatus::Invalid(_) => {
            warn!("push notifications disabled: {}", vapid.describe());
        }
    }

    if config.allow_insecure_endpoints {
        warn!("accepting plain http and private-network push endpoints");
    }
    let relay = ReqwestRelay::new(config.request_timeout)?;
    let dispatcher = Dispatcher::new(
        SubscriptionRegistry::new(store.clone())
            .allow_insecure_endpoints(config.allow_insecure_endpoints),
        RustCryptoProvider,
        relay,
        UtcTimeProvider,
        vapid,
        DispatcherSettings {
            ttl_seconds: config.ttl_seconds,
        },
    );
    Ok(Reservations::new(store, dispatcher, UtcTimeProvider))
}
