//! Transport endpoint seam
//!
//! The protocol engine owns the sockets and the per-token observe state.
//! The observation registry only needs to tell it to forget a token.

use crate::observation::Token;

/// A transport endpoint (secure or non-secure) that tracks observe relations
pub trait ObservationEndpoint: Send + Sync {
    /// Drop the observe relation identified by `token`, if any
    fn cancel_observation(&self, token: &Token);
}
