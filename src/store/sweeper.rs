//! Expiration sweeper
//!
//! Periodically scans every registration and removes the ones whose
//! `last_update + lifetime` has passed. Removal goes through
//! [`RegistrationStore::remove_expired`], an atomic claim: if an explicit
//! deregistration (or a renewal) gets there first, the sweep loses and does
//! nothing, so the expiration listener fires at most once per registration.

use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::{ExpirationListener, RegistrationStore, StoreResult};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

type ListenerSlot = Arc<RwLock<Option<Arc<dyn ExpirationListener>>>>;

/// Background task reclaiming expired registrations
pub struct ExpirationSweeper {
    interval: Duration,
    listener: ListenerSlot,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ExpirationSweeper {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            listener: Arc::new(RwLock::new(None)),
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_listener(&self, listener: Arc<dyn ExpirationListener>) {
        *self.listener.write() = Some(listener);
    }

    /// Spawn the sweep loop; a no-op if already running
    ///
    /// The task holds only a weak reference to the store and ends once the
    /// store is dropped.
    pub fn start<S>(&self, store: Weak<S>)
    where
        S: RegistrationStore + 'static,
    {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let listener = Arc::clone(&self.listener);
        // tokio rejects a zero period
        let interval = self.interval.max(MIN_INTERVAL);

        tracing::info!(interval_ms = interval.as_millis() as u64, "Expiration sweeper started");

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                if let Err(e) = sweep_once(&*store, &listener, SystemTime::now()).await {
                    tracing::warn!(error = %e, "Expiration sweep failed");
                }
            }
        }));
    }

    /// Abort the sweep loop
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            tracing::info!("Expiration sweeper stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Run one sweep against `store` as of `now`
    ///
    /// Returns the number of registrations this sweep removed.
    pub async fn sweep(&self, store: &dyn RegistrationStore, now: SystemTime) -> StoreResult<usize> {
        sweep_once(store, &self.listener, now).await
    }
}

impl Drop for ExpirationSweeper {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn sweep_once(
    store: &dyn RegistrationStore,
    listener: &ListenerSlot,
    now: SystemTime,
) -> StoreResult<usize> {
    let registrations = store.all_registrations().await?;
    let mut removed = 0;

    for registration in registrations.iter().filter(|r| !r.is_alive_at(now)) {
        match store.remove_expired(&registration.id, now).await {
            Ok(Some(deregistration)) => {
                removed += 1;
                tracing::info!(
                    registration_id = %deregistration.registration.id,
                    endpoint = %deregistration.registration.endpoint,
                    observations = deregistration.observations.len(),
                    "Registration expired"
                );
                let current = listener.read().clone();
                if let Some(l) = current {
                    l.registration_expired(
                        &deregistration.registration,
                        &deregistration.observations,
                    );
                }
            }
            Ok(None) => {
                tracing::debug!(
                    registration_id = %registration.id,
                    "Registration already removed or renewed before expiry claim"
                );
            }
            Err(e) => {
                tracing::warn!(
                    registration_id = %registration.id,
                    error = %e,
                    "Failed to remove expired registration"
                );
            }
        }
    }

    Ok(removed)
}
