//! Caller-visible errors.
//!
//! Only programming misuse surfaces as an error. Transfer failures,
//! cancellations and filesystem problems are folded into `Status` and the
//! log instead.

use crate::broker::SubscriptionSlot;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The region key does not resolve in the region directory.
    #[error("unknown region")]
    UnknownRegion,
    /// The subscription slot is not registered (e.g. double unsubscribe).
    #[error("subscription slot is not registered")]
    UnknownSubscription(SubscriptionSlot),
}
