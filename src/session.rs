//! Cart Session
//!
//! Owns one [`CartStore`] and the [`Persistor`] that keeps it on disk. A session is started
//! explicitly, restores whatever was stored, persists after every applied mutation and
//! flushes on shutdown.

use tracing::{debug, info};

use crate::{
    carts::CartState,
    clock::Clock,
    config::StoreConfig,
    persistence::{Persistor, RestoreOutcome, SnapshotStorage, StorageError},
    store::{CartError, CartStore, Change},
};

/// A cart store wired to durable storage.
#[derive(Debug)]
pub struct CartSession<S, C: Clock> {
    store: CartStore<C>,
    persistor: Persistor<S>,
    restore_outcome: RestoreOutcome,
}

impl<S: SnapshotStorage, C: Clock> CartSession<S, C> {
    /// Restore the stored state and start a session on it.
    #[tracing::instrument(name = "cart.session.start", skip_all, fields(key = %config.storage_key))]
    pub fn start(config: &StoreConfig, storage: S, clock: C) -> Self {
        let persistor = Persistor::new(storage, config.storage_key.clone())
            .with_fields(config.persisted_fields())
            .with_policy(config.write_policy);

        let restore = persistor.restore();

        let mut store = CartStore::with_clock(clock).with_guest(config.guest_user_id());
        store.hydrate(restore.state);

        info!(
            restored = restore.outcome.is_restored(),
            carts = store.state().carts().len(),
            "cart session started"
        );

        Self {
            store,
            persistor,
            restore_outcome: restore.outcome,
        }
    }

    /// The store, read-only.
    pub fn store(&self) -> &CartStore<C> {
        &self.store
    }

    /// The current state.
    pub fn state(&self) -> &CartState {
        self.store.state()
    }

    /// How the stored state was loaded.
    pub fn restore_outcome(&self) -> &RestoreOutcome {
        &self.restore_outcome
    }

    /// The persistor.
    pub fn persistor(&self) -> &Persistor<S> {
        &self.persistor
    }

    /// Run a mutation and persist the result when it changed anything.
    ///
    /// Persistence failures are logged by the persistor and never turn an applied change
    /// into an error.
    ///
    /// # Errors
    ///
    /// Returns the [`CartError`] from `mutation`; nothing is persisted in that case.
    pub fn apply<F>(&mut self, mutation: F) -> Result<Change, CartError>
    where
        F: FnOnce(&mut CartStore<C>) -> Result<Change, CartError>,
    {
        let change = mutation(&mut self.store)?;

        if change.is_applied() {
            let written = self.persistor.record_change(self.store.state());

            debug!(written, pending = self.persistor.pending(), "recorded cart change");
        }

        Ok(change)
    }

    /// Write any pending changes now. Returns whether a write succeeded.
    pub fn flush(&mut self) -> bool {
        self.persistor.flush(self.store.state())
    }

    /// Drop every cart and delete the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the snapshot cannot be deleted; the in-memory state is
    /// cleared regardless.
    pub fn reset(&mut self) -> Result<Change, StorageError> {
        let change = self.store.clear_all();

        self.persistor.purge()?;

        Ok(change)
    }

    /// Flush and hand back the final state.
    pub fn shutdown(mut self) -> CartState {
        let flushed = self.flush();

        debug!(flushed, "cart session stopped");

        self.store.into_state()
    }
}

#[cfg(test)]
mod tests {
    use jiff::{SignedDuration, Timestamp};
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use crate::{
        carts::UserId,
        clock::ManualClock,
        entries::{CartEntry, ItemId, MerchantId},
        persistence::{MemoryStorage, WritePolicy},
    };

    use super::*;

    fn tea(quantity: u32) -> CartEntry {
        CartEntry::new(ItemId(1), "Tea", Decimal::new(25, 1), quantity, MerchantId(9))
    }

    fn clock() -> ManualClock {
        ManualClock::new(Timestamp::UNIX_EPOCH)
    }

    #[test]
    fn applied_changes_are_persisted() -> TestResult {
        let config = StoreConfig::default();
        let user = UserId::new("u1");

        let mut session = CartSession::start(&config, MemoryStorage::new(), clock());

        assert!(matches!(session.restore_outcome(), RestoreOutcome::Empty));

        let change = session.apply(|store| store.add_item(&user, tea(2)))?;

        assert_eq!(change, Change::Applied);
        assert!(session.persistor().storage().get("cart").is_some());

        Ok(())
    }

    #[test]
    fn rejected_changes_are_not_persisted() {
        let config = StoreConfig::default();
        let user = UserId::new("u1");

        let mut session = CartSession::start(&config, MemoryStorage::new(), clock());

        let result = session.apply(|store| store.add_item(&user, tea(0)));

        assert!(result.is_err());
        assert_eq!(session.persistor().storage().get("cart"), None);
    }

    #[test]
    fn restart_restores_state() -> TestResult {
        let config = StoreConfig::default();
        let user = UserId::new("u1");

        let mut first = CartSession::start(&config, MemoryStorage::new(), clock());

        let added = first.apply(|store| store.add_item(&user, tea(2)))?;
        let switched = first.apply(|store| Ok(store.set_current_user(Some(user.clone()))))?;

        assert_eq!(added.or(switched), Change::Applied);

        let storage = first.persistor().storage().clone();
        let before = first.shutdown();

        let second = CartSession::start(&config, storage, clock());

        assert!(second.restore_outcome().is_restored());
        assert_eq!(second.state(), &before);
        assert_eq!(second.store().version("u1"), 1);

        Ok(())
    }

    #[test]
    fn batched_session_flushes_on_shutdown() -> TestResult {
        let config = StoreConfig {
            write_policy: WritePolicy::Batched { max_pending: 100 },
            ..StoreConfig::default()
        };
        let user = UserId::new("u1");

        let mut session = CartSession::start(&config, MemoryStorage::new(), clock());

        assert!(session.apply(|store| store.add_item(&user, tea(1)))?.is_applied());

        assert_eq!(session.persistor().pending(), 1);
        assert_eq!(session.persistor().storage().get("cart"), None);

        assert!(session.flush());
        assert!(session.persistor().storage().get("cart").is_some());

        Ok(())
    }

    #[test]
    fn reset_clears_state_and_storage() -> TestResult {
        let config = StoreConfig::default();
        let user = UserId::new("u1");

        let mut session = CartSession::start(&config, MemoryStorage::new(), clock());

        assert!(session.apply(|store| store.add_item(&user, tea(1)))?.is_applied());

        assert_eq!(session.reset()?, Change::Applied);
        assert!(session.state().is_empty());
        assert_eq!(session.persistor().storage().get("cart"), None);

        Ok(())
    }

    #[test]
    fn configured_guest_is_used() {
        let config = StoreConfig {
            guest_user: "anon".to_string(),
            ..StoreConfig::default()
        };

        let session = CartSession::start(&config, MemoryStorage::new(), clock());

        assert_eq!(session.store().active_user().as_str(), "anon");
    }

    #[test]
    fn timestamps_follow_the_clock() -> TestResult {
        let config = StoreConfig::default();
        let user = UserId::new("u1");
        let clock = clock();

        let mut session = CartSession::start(&config, MemoryStorage::new(), &clock);

        clock.advance(SignedDuration::from_secs(90));
        assert!(session.apply(|store| store.add_item(&user, tea(1)))?.is_applied());

        let stamped = session
            .store()
            .cart("u1")
            .map(|cart| cart.last_updated().as_second());

        assert_eq!(stamped, Some(90));

        Ok(())
    }
}
