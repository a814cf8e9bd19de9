//! Errors raised at the host boundary.
//!
//! None of these escape the public [`PaginationTrigger`](crate::PaginationTrigger)
//! API: the controller logs them and degrades to a consistent "not observing"
//! state instead.

use crate::dom::ElementId;

/// Failure reported by a [`Host`](crate::Host) implementation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The requested platform facility does not exist on this host.
    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),
    /// The element was removed from its tree before the call reached it.
    #[error("element #{0} is not attached")]
    Detached(ElementId),
    /// Any other platform-level failure, carried as text.
    #[error("platform error: {0}")]
    Platform(String),
}
