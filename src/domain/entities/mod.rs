//! Domain entities of the link context.
//!
//! - [`Link`] - A shortened URL mapping and the aggregate root that raises
//!   [`LinkEvent`](crate::domain::link_events::LinkEvent)s.

pub mod link;

pub use link::Link;
