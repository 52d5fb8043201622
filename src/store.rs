//! SQLite-backed subscription registry and delivery reservation log.
//!
//! The reservation table's primary key on `(owner_id, reservation_key)` is what
//! makes "send at most once" hold across concurrent callers and processes:
//! reserving is a single `INSERT` and a constraint violation means another
//! caller owns the key.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use time::OffsetDateTime;

use crate::ports::{ReservationStore, ReserveError, StoreError, SubscriptionStore};
use crate::types::push::{
    DeliveryReservation, PushSubscription, ReservationKey, SubscriptionId,
    SubscriptionRegistration,
};

const BUSY_TIMEOUT_MS: u64 = 5_000;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS push_subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    client_public_key TEXT,
    auth_secret TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS push_subscriptions_owner_idx
    ON push_subscriptions (owner_id);
CREATE TABLE IF NOT EXISTS delivery_reservations (
    owner_id TEXT NOT NULL,
    reservation_key TEXT NOT NULL,
    reserved_at INTEGER NOT NULL,
    finalized_at INTEGER,
    PRIMARY KEY (owner_id, reservation_key)
);
";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }
}

impl SubscriptionStore for SqliteStore {
    fn insert(
        &self,
        registration: &SubscriptionRegistration,
        at: OffsetDateTime,
    ) -> Result<PushSubscription, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO push_subscriptions \
             (owner_id, endpoint, client_public_key, auth_secret, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                registration.owner_id,
                registration.endpoint,
                registration.client_public_key,
                registration.auth_secret,
                at.unix_timestamp(),
            ],
        )?;
        Ok(PushSubscription {
            id: conn.last_insert_rowid(),
            owner_id: registration.owner_id.clone(),
            endpoint: registration.endpoint.clone(),
            client_public_key: Some(registration.client_public_key.clone()),
            auth_secret: Some(registration.auth_secret.clone()),
        })
    }

    fn list(&self, owner_id: &str) -> Result<Vec<PushSubscription>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, endpoint, client_public_key, auth_secret \
             FROM push_subscriptions WHERE owner_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok(PushSubscription {
                id: row.get(0)?,
                owner_id: row.get(1)?,
                endpoint: row.get(2)?,
                client_public_key: row.get(3)?,
                auth_secret: row.get(4)?,
            })
        })?;
        let mut subscriptions = Vec::new();
        for row in rows {
            subscriptions.push(row?);
        }
        Ok(subscriptions)
    }

    fn delete(&self, ids: &[SubscriptionId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        for id in ids {
            removed += tx.execute("DELETE FROM push_subscriptions WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(removed)
    }
}

impl ReservationStore for SqliteStore {
    fn try_reserve(
        &self,
        owner_id: &str,
        key: &ReservationKey,
        at: OffsetDateTime,
    ) -> Result<(), ReserveError> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO delivery_reservations \
             (owner_id, reservation_key, reserved_at, finalized_at) \
             VALUES (?1, ?2, ?3, NULL)",
            params![owner_id, key.as_str(), at.unix_timestamp()],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(ReserveError::Conflict)
            }
            Err(err) => Err(ReserveError::Unavailable(err.into())),
        }
    }

    fn finalize(
        &self,
        owner_id: &str,
        key: &ReservationKey,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE delivery_reservations SET finalized_at = ?3 \
             WHERE owner_id = ?1 AND reservation_key = ?2",
            params![owner_id, key.as_str(), at.unix_timestamp()],
        )?;
        Ok(())
    }

    fn release(&self, owner_id: &str, key: &ReservationKey) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM delivery_reservations \
             WHERE owner_id = ?1 AND reservation_key = ?2 AND finalized_at IS NULL",
            params![owner_id, key.as_str()],
        )?;
        Ok(())
    }

    fn get(
        &self,
        owner_id: &str,
        key: &ReservationKey,
    ) -> Result<Option<DeliveryReservation>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT reserved_at, finalized_at FROM delivery_reservations \
                 WHERE owner_id = ?1 AND reservation_key = ?2",
                params![owner_id, key.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?)),
            )
            .optional()?;
        let Some((reserved_at, finalized_at)) = row else {
            return Ok(None);
        };
        Ok(Some(DeliveryReservation {
            owner_id: owner_id.to_string(),
            reservation_key: key.clone(),
            reserved_at: from_unix(reserved_at)?,
            finalized_at: finalized_at.map(from_unix).transpose()?,
        }))
    }
}

fn from_unix(seconds: i64) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|err| StoreError::Unavailable(format!("invalid stored timestamp: {err}")))
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    fn registration(owner_id: &str, endpoint: &str) -> SubscriptionRegistration {
        SubscriptionRegistration {
            owner_id: owner_id.to_string(),
            endpoint: endpoint.to_string(),
            client_public_key: "client-key".to_string(),
            auth_secret: "auth".to_string(),
        }
    }

    fn at(seconds: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(seconds).expect("timestamp")
    }

    #[test]
    fn list__should_only_return_rows_for_owner() {
        // Given
        let store = SqliteStore::open_in_memory().expect("open store");
        store
            .insert(&registration("alice", "https://push.example/a"), at(1))
            .expect("insert");
        store
            .insert(&registration("bob", "https://push.example/b"), at(1))
            .expect("insert");

        // When
        let subscriptions = store.list("alice").expect("list");

        // Then
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].endpoint, "https://push.example/a");
        assert_eq!(subscriptions[0].client_public_key.as_deref(), Some("client-key"));
    }

    #[test]
    fn insert__should_allow_duplicate_endpoints() {
        // Given
        let store = SqliteStore::open_in_memory().expect("open store");

        // When
        let first = store
            .insert(&registration("alice", "https://push.example/a"), at(1))
            .expect("insert");
        let second = store
            .insert(&registration("alice", "https://push.example/a"), at(2))
            .expect("insert");

        // Then
        assert_ne!(first.id, second.id);
        assert_eq!(store.list("alice").expect("list").len(), 2);
    }

    #[test]
    fn delete__should_report_removed_rows() {
        // Given
        let store = SqliteStore::open_in_memory().expect("open store");
        let sub = store
            .insert(&registration("alice", "https://push.example/a"), at(1))
            .expect("insert");

        // When
        let removed = store.delete(&[sub.id, 9999]).expect("delete");

        // Then
        assert_eq!(removed, 1);
        assert!(store.list("alice").expect("list").is_empty());
    }

    #[test]
    fn try_reserve__should_conflict_on_same_owner_and_key() {
        // Given
        let store = SqliteStore::open_in_memory().expect("open store");
        let key = ReservationKey::new("booking:1");
        store.try_reserve("alice", &key, at(10)).expect("first reserve");

        // When
        let second = store.try_reserve("alice", &key, at(11));
        let other_owner = store.try_reserve("bob", &key, at(11));

        // Then
        assert!(matches!(second, Err(ReserveError::Conflict)));
        assert!(other_owner.is_ok());
    }

    #[test]
    fn finalize__should_record_timestamp_and_survive_release() {
        // Given
        let store = SqliteStore::open_in_memory().expect("open store");
        let key = ReservationKey::new("booking:1");
        store.try_reserve("alice", &key, at(10)).expect("reserve");

        // When
        store.finalize("alice", &key, at(20)).expect("finalize");
        store.release("alice", &key).expect("release");

        // Then
        let reservation = store.get("alice", &key).expect("get").expect("row");
        assert_eq!(reservation.reserved_at, at(10));
        assert_eq!(reservation.finalized_at, Some(at(20)));
    }

    #[test]
    fn release__should_delete_pending_reservation() {
        // Given
        let store = SqliteStore::open_in_memory().expect("open store");
        let key = ReservationKey::new("booking:1");
        store.try_reserve("alice", &key, at(10)).expect("reserve");

        // When
        store.release("alice", &key).expect("release");

        // Then
        assert!(store.get("alice", &key).expect("get").is_none());
        assert!(store.try_reserve("alice", &key, at(30)).is_ok());
    }

    #[test]
    fn open__should_persist_reservations_across_connections() {
        // Given
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("herald.db");
        let key = ReservationKey::new("booking:1");
        {
            let store = SqliteStore::open(&path).expect("open store");
            store.try_reserve("alice", &key, at(10)).expect("reserve");
        }

        // When
        let reopened = SqliteStore::open(&path).expect("reopen store");

        // Then
        assert!(matches!(
            reopened.try_reserve("alice", &key, at(11)),
            Err(ReserveError::Conflict)
        ));
    }
}
