//! At-most-once delivery per `(owner, reservation key)`.
//!
//! Concurrent callers race on the store's uniqueness constraint; whoever wins
//! the insert dispatches, everyone else reports a skipped duplicate. A
//! reservation is finalized once at least one endpoint accepted the message,
//! and released otherwise so a later attempt may retry.

use std::sync::Arc;

use tracing::{info, warn};

use crate::ports::store::blocking;
use crate::ports::{self, ReservationStore, ReserveError, StoreError};
use crate::push::dispatcher::Dispatcher;
use crate::types::push::{NotificationPayload, ReservationKey, SendOutcome};

pub struct Reservations<C, R, T> {
    store: Arc<dyn ReservationStore>,
    dispatcher: Dispatcher<C, R, T>,
    time: T,
}

impl<C, R, T> std::fmt::Debug for Reservations<C, R, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservations").finish_non_exhaustive()
    }
}

impl<C, R, T> Reservations<C, R, T>
where
    C: ports::CryptoProvider,
    R: ports::PushRelay,
    T: ports::TimeProvider,
{
    pub fn new(store: Arc<dyn ReservationStore>, dispatcher: Dispatcher<C, R, T>, time: T) -> Self {
        Self {
            store,
            dispatcher,
            time,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<C, R, T> {
        &self.dispatcher
    }

    pub async fn send_once(
        &self,
        owner_id: &str,
        key: &ReservationKey,
        payload: &NotificationPayload,
    ) -> SendOutcome {
        let reserved = match self.reserve(owner_id, key).await {
            Ok(()) => true,
            Err(ReserveError::Conflict) => {
                info!(owner_id, key = %key, "skipping duplicate push notification");
                return SendOutcome::duplicate();
            }
            Err(ReserveError::Unavailable(err)) => {
                warn!(
                    owner_id,
                    key = %key,
                    error = %err,
                    "reservation store unavailable, sending without deduplication"
                );
                false
            }
        };

        let report = self.dispatcher.dispatch(owner_id, payload).await;
        if !reserved {
            return report.into();
        }

        if report.sent > 0 {
            if let Err(err) = self.settle(owner_id, key, true).await {
                warn!(owner_id, key = %key, error = %err, "failed to finalize push reservation");
            }
        } else if let Err(err) = self.settle(owner_id, key, false).await {
            warn!(owner_id, key = %key, error = %err, "failed to release push reservation");
        }
        report.into()
    }

    async fn reserve(&self, owner_id: &str, key: &ReservationKey) -> Result<(), ReserveError> {
        let store = self.store.clone();
        let (owner_id, key, at) = (owner_id.to_string(), key.clone(), self.time.now());
        blocking(move || store.try_reserve(&owner_id, &key, at)).await
    }

    /// Finalizes the reservation when `delivered`, otherwise releases it.
    async fn settle(
        &self,
        owner_id: &str,
        key: &ReservationKey,
        delivered: bool,
    ) -> Result<(), StoreError> {
        let store = self.store.clone();
        let (owner_id, key, at) = (owner_id.to_string(), key.clone(), self.time.now());
        blocking(move || {
            if delivered {
                store.finalize(&owner_id, &key, at)
            } else {
                store.release(&owner_id, &key)
            }
        })
        .await
    }
}
