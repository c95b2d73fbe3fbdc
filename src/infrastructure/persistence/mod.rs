//! PostgreSQL repository implementations.
//!
//! # Repositories
//!
//! - [`PgLinkRepository`] - Link storage and click recording

pub mod pg_link_repository;

pub use pg_link_repository::PgLinkRepository;
