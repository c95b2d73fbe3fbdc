//! PostgreSQL implementation of link repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::Link;
use crate::domain::link_events::LinkClicked;
use crate::domain::repositories::LinkRepository;
use crate::error::EventError;
use crate::outbox::PgTx;

/// PostgreSQL repository for links and their clicks.
///
/// Stateless: every statement runs on the caller's [`PgTx`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PgLinkRepository;

impl PgLinkRepository {
    pub fn new() -> Self {
        Self
    }
}

#[derive(sqlx::FromRow)]
struct LinkRow {
    code: String,
    long_url: String,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl LinkRepository<PgTx> for PgLinkRepository {
    async fn insert(&self, tx: &mut PgTx, link: &Link) -> Result<(), EventError> {
        sqlx::query(
            r#"
            INSERT INTO links (code, long_url, created_at, deleted_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&link.code)
        .bind(&link.long_url)
        .bind(link.created_at)
        .bind(link.deleted_at)
        .execute(tx.conn())
        .await?;

        Ok(())
    }

    async fn find_by_code(&self, tx: &mut PgTx, code: &str) -> Result<Option<Link>, EventError> {
        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT code, long_url, created_at, deleted_at
            FROM links
            WHERE code = $1
            FOR UPDATE
            "#,
        )
        .bind(code)
        .fetch_optional(tx.conn())
        .await?;

        Ok(row.map(|r| Link::restore(r.code, r.long_url, r.created_at, r.deleted_at)))
    }

    async fn mark_deleted(&self, tx: &mut PgTx, link: &Link) -> Result<(), EventError> {
        sqlx::query("UPDATE links SET deleted_at = $2 WHERE code = $1")
            .bind(&link.code)
            .bind(link.deleted_at)
            .execute(tx.conn())
            .await?;

        Ok(())
    }

    async fn insert_click(
        &self,
        tx: &mut PgTx,
        click: &LinkClicked,
        clicked_at: DateTime<Utc>,
    ) -> Result<(), EventError> {
        sqlx::query(
            r#"
            INSERT INTO link_clicks (link_code, clicked_at, user_agent, referer, ip)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&click.code)
        .bind(clicked_at)
        .bind(click.user_agent.as_deref())
        .bind(click.referer.as_deref())
        .bind(click.ip.as_deref())
        .execute(tx.conn())
        .await?;

        Ok(())
    }
}
