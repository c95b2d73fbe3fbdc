//! Repository trait for link data access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::Link;
use crate::domain::link_events::LinkClicked;
use crate::error::EventError;
use crate::outbox::Transaction;

/// Transactional persistence for [`Link`] aggregates.
///
/// Every method runs on the transaction handed in by the
/// [`UnitOfWork`](crate::application::UnitOfWork); none of them commits.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgLinkRepository`] - PostgreSQL implementation
#[async_trait]
pub trait LinkRepository<Tx: Transaction>: Send + Sync {
    /// Inserts a new link.
    ///
    /// # Errors
    ///
    /// Returns a database error if the code already exists.
    async fn insert(&self, tx: &mut Tx, link: &Link) -> Result<(), EventError>;

    /// Loads a link by code, locking it for the rest of the transaction.
    ///
    /// Soft-deleted links are returned too; callers check
    /// [`Link::is_deleted`].
    async fn find_by_code(&self, tx: &mut Tx, code: &str) -> Result<Option<Link>, EventError>;

    /// Persists the link's `deleted_at`.
    async fn mark_deleted(&self, tx: &mut Tx, link: &Link) -> Result<(), EventError>;

    /// Appends one click row for `click.code`.
    async fn insert_click(
        &self,
        tx: &mut Tx,
        click: &LinkClicked,
        clicked_at: DateTime<Utc>,
    ) -> Result<(), EventError>;
}
