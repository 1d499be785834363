//! Stream module for sharing the radio between audio and button
//!
//! Opens a detection window on each long press start by pausing the
//! audio subscription, with at most one window open at a time.

mod arbiter;

pub use arbiter::{
    ArbiterError, PauseOutcome, StreamArbiter, SubscriptionState, DEFAULT_DETECTION_WINDOW,
};
