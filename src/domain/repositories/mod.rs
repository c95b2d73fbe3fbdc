//! Repository trait definitions for the domain layer.
//!
//! Repositories write through the caller's transaction so that state changes
//! and outbox rows share one commit. Implementations live in
//! `crate::infrastructure::persistence`.
//!
//! # Available Repositories
//!
//! - [`LinkRepository`] - Link persistence and click recording

pub mod link_repository;

pub use link_repository::LinkRepository;
