//! Stream utilities for subscriptions

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
