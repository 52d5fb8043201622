use time::OffsetDateTime;

use crate::ports;

mod crypto;
mod relay;

pub use crypto::RustCryptoProvider;
pub use relay::ReqwestRelay;

#[derive(Debug, Clone, Copy, Default)]
pub struct UtcTimeProvider;

impl ports::TimeProvider for UtcTimeProvider {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
