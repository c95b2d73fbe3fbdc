//! Application layer: transaction boundaries and services.
//!
//! Services load and mutate aggregates inside a [`UnitOfWork`], which persists
//! the change together with the aggregates' events and dispatches those events
//! once the commit has succeeded.
//!
//! # Available Services
//!
//! - [`services::link_service::LinkService`] - Link creation, click recording and deletion

pub mod services;
pub mod unit_of_work;

pub use services::LinkService;
pub use unit_of_work::UnitOfWork;
