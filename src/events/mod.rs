//! Event transport and consumption.
//!
//! - [`envelope`] - Wire form of a domain event
//! - [`dispatcher`] - Synchronous in-process dispatch after commit
//! - [`bus`] - Publish/subscribe abstraction over opaque messages
//! - [`in_memory_bus`] - Process-local broadcast bus
//! - [`router`] - Bus consumer fanning envelopes out by event name
//! - [`handlers`] - Built-in link event consumers

pub mod bus;
pub mod dispatcher;
pub mod envelope;
pub mod handlers;
pub mod in_memory_bus;
pub mod router;

pub use bus::{DEFAULT_TOPIC, Delivery, DeliveryStats, EventBus, Message, Subscription};
pub use dispatcher::{Dispatcher, EventHandler};
pub use envelope::{Envelope, META_AGGREGATE_ID, META_EVENT_NAME};
pub use handlers::{ClickAnalyticsHandler, ClickCounter, ClickReport, LinkEventLogger};
pub use in_memory_bus::InMemoryBus;
pub use router::{Router, RouterHandler};
