use thiserror::Error;
use time::OffsetDateTime;

use crate::types::push::{
    DeliveryReservation, PushSubscription, ReservationKey, SubscriptionId,
    SubscriptionRegistration,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ReserveError {
    #[error("reservation already held")]
    Conflict,
    #[error(transparent)]
    Unavailable(#[from] StoreError),
}

pub trait SubscriptionStore: Send + Sync {
    fn insert(
        &self,
        registration: &SubscriptionRegistration,
        at: OffsetDateTime,
    ) -> Result<PushSubscription, StoreError>;

    fn list(&self, owner_id: &str) -> Result<Vec<PushSubscription>, StoreError>;

    /// Returns the number of rows actually removed.
    fn delete(&self, ids: &[SubscriptionId]) -> Result<usize, StoreError>;
}

pub trait ReservationStore: Send + Sync {
    /// Must be a single atomic conditional insert keyed on
    /// `(owner_id, key)`; an existing row yields [`ReserveError::Conflict`].
    fn try_reserve(
        &self,
        owner_id: &str,
        key: &ReservationKey,
        at: OffsetDateTime,
    ) -> Result<(), ReserveError>;

    fn finalize(
        &self,
        owner_id: &str,
        key: &ReservationKey,
        at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Deletes a reservation that was never finalized.
    fn release(&self, owner_id: &str, key: &ReservationKey) -> Result<(), StoreError>;

    fn get(
        &self,
        owner_id: &str,
        key: &ReservationKey,
    ) -> Result<Option<DeliveryReservation>, StoreError>;
}

/// Runs a synchronous store call on tokio's blocking pool so a busy database
/// never parks an async worker.
pub(crate) async fn blocking<T, E, F>(call: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|err| E::from(StoreError::Unavailable(format!("store task failed: {err}"))))?
}
