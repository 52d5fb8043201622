pub mod crypto;
pub mod relay;
pub mod store;
pub mod time;

pub use crypto::{CryptoError, CryptoProvider};
pub use relay::{PushRelay, RelayError, RelayRequest, RelayResponse};
pub use store::{ReservationStore, ReserveError, StoreError, SubscriptionStore};
pub use time::TimeProvider;
