//! Observation event listener

use super::notification::ObserveResponse;
use super::record::Observation;

/// Receives observation events
///
/// `cancelled` fires exactly once for every observation that leaves the
/// store, whatever removed it.
pub trait ObservationListener: Send + Sync {
    fn new_observation(&self, _observation: &Observation) {}

    fn cancelled(&self, _observation: &Observation) {}

    fn new_value(&self, _observation: &Observation, _response: &ObserveResponse) {}
}
