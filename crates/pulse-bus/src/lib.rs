//! Event-bus abstraction for marketpulse.
//!
//! The aggregator consumes and publishes events through the narrow
//! [`EventBus`] trait; the transport behind it (subjects, serialization,
//! delivery) is the host's concern. [`InMemoryBus`] is the in-process
//! implementation used in production wiring and tests.

pub mod bus;
pub mod error;
pub mod topic;

pub use bus::{EventBus, EventHandler, InMemoryBus, SubscriptionToken};
pub use error::{BusError, BusResult};
pub use topic::Topic;
