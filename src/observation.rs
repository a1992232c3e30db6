//! Observation registry
//!
//! Active Observe subscriptions keyed by (registration id, path). Resolver
//! calls for different clients run concurrently, so every read-modify-write
//! of the map happens under a single lock. Listeners are called after the lock
//! is released.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::node::Lwm2mNode;
use crate::path::Lwm2mPath;
use crate::transport::ExchangeId;

/// An accepted Observe subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Observation {
    /// Registration id of the observed client
    pub registration_id: String,
    pub path: Lwm2mPath,
    /// Transport exchange carrying the notifications
    pub exchange: ExchangeId,
}

impl Observation {
    pub fn new(registration_id: impl Into<String>, path: Lwm2mPath, exchange: ExchangeId) -> Self {
        Self {
            registration_id: registration_id.into(),
            path,
            exchange,
        }
    }

    fn key(&self) -> ObservationKey {
        (self.registration_id.clone(), self.path)
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} on {}", self.registration_id, self.path, self.exchange)
    }
}

/// Receives notification values and cancellations
pub trait ObservationListener: Send + Sync {
    fn new_value(&self, observation: &Observation, value: &Lwm2mNode);

    fn cancelled(&self, observation: &Observation);
}

type ObservationKey = (String, Lwm2mPath);

/// Shared registry of observations
#[derive(Default)]
pub struct ObservationRegistry {
    observations: Mutex<HashMap<ObservationKey, Observation>>,
    listeners: RwLock<Vec<Arc<dyn ObservationListener>>>,
}

impl ObservationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn ObservationListener>) {
        self.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ObservationListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Insert an observation, replacing the previous one for the same client and path
    ///
    /// Returns the replaced observation. Listeners are told it was cancelled
    /// unless it used the same exchange.
    pub fn add(&self, observation: Observation) -> Option<Observation> {
        let previous = self
            .observations
            .lock()
            .insert(observation.key(), observation.clone());

        match &previous {
            Some(old) => {
                debug!("Observation {} replaced by {}", old, observation);
                if old.exchange != observation.exchange {
                    self.notify_cancelled(old);
                }
            }
            None => debug!("Observation {} added", observation),
        }
        previous
    }

    /// Remove an observation if it is still the registered one
    ///
    /// A stale observation, superseded by a re-observe on another exchange,
    /// leaves the current entry in place. Returns whether an entry was removed.
    pub fn remove(&self, observation: &Observation) -> bool {
        let removed = {
            let mut observations = self.observations.lock();
            let key = observation.key();
            match observations.get(&key) {
                Some(current) if current.exchange == observation.exchange => observations.remove(&key),
                _ => None,
            }
        };

        match removed {
            Some(removed) => {
                debug!("Observation {} removed", removed);
                self.notify_cancelled(&removed);
                true
            }
            None => false,
        }
    }

    /// Remove the observation carried by `exchange`
    pub fn remove_by_exchange(&self, exchange: ExchangeId) -> Option<Observation> {
        let observation = self.get_by_exchange(exchange)?;
        self.remove(&observation).then_some(observation)
    }

    /// Cancel the observation of `path` on a client
    pub fn cancel(&self, registration_id: &str, path: &Lwm2mPath) -> Option<Observation> {
        let removed = self
            .observations
            .lock()
            .remove(&(registration_id.to_string(), *path));

        if let Some(removed) = &removed {
            debug!("Observation {} cancelled", removed);
            self.notify_cancelled(removed);
        }
        removed
    }

    /// Cancel every observation of a client, e.g. when it deregisters
    pub fn cancel_all(&self, registration_id: &str) -> Vec<Observation> {
        let mut removed = Vec::new();
        self.observations.lock().retain(|(id, _), observation| {
            if id == registration_id {
                removed.push(observation.clone());
                false
            } else {
                true
            }
        });
        removed.sort_by_key(|o| o.path);

        debug!(
            "Cancelled {} observations of {}",
            removed.len(),
            registration_id
        );
        for observation in &removed {
            self.notify_cancelled(observation);
        }
        removed
    }

    pub fn get(&self, registration_id: &str, path: &Lwm2mPath) -> Option<Observation> {
        self.observations
            .lock()
            .get(&(registration_id.to_string(), *path))
            .cloned()
    }

    pub fn get_by_exchange(&self, exchange: ExchangeId) -> Option<Observation> {
        self.observations
            .lock()
            .values()
            .find(|o| o.exchange == exchange)
            .cloned()
    }

    /// Observations of one client, ordered by path
    pub fn list_by_client(&self, registration_id: &str) -> Vec<Observation> {
        let mut observations: Vec<Observation> = self
            .observations
            .lock()
            .values()
            .filter(|o| o.registration_id == registration_id)
            .cloned()
            .collect();
        observations.sort_by_key(|o| o.path);
        observations
    }

    pub fn len(&self) -> usize {
        self.observations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn notify_new_value(&self, observation: &Observation, value: &Lwm2mNode) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.new_value(observation, value);
        }
    }

    fn notify_cancelled(&self, observation: &Observation) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.cancelled(observation);
        }
    }
}

impl fmt::Debug for ObservationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationRegistry")
            .field("observations", &self.len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
