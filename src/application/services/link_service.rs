//! Link lifecycle service.

use std::sync::Arc;

use crate::application::UnitOfWork;
use crate::domain::entities::Link;
use crate::domain::link_events::LinkEvent;
use crate::domain::repositories::LinkRepository;
use crate::error::EventError;
use crate::outbox::TransactionManager;

/// Request metadata captured for one redirect.
#[derive(Debug, Clone, Default)]
pub struct ClickInfo {
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub ip: Option<String>,
}

/// Creates links, records clicks and deletes links.
///
/// Each operation is one [`UnitOfWork`]: the row changes and the resulting
/// [`LinkEvent`]s commit together.
pub struct LinkService<M, R>
where
    M: TransactionManager,
    R: LinkRepository<M::Tx> + 'static,
{
    uow: UnitOfWork<M, LinkEvent>,
    links: Arc<R>,
}

impl<M, R> LinkService<M, R>
where
    M: TransactionManager,
    R: LinkRepository<M::Tx> + 'static,
{
    /// Creates a new link service.
    pub fn new(uow: UnitOfWork<M, LinkEvent>, links: Arc<R>) -> Self {
        Self { uow, links }
    }

    /// Creates a link and emits `link.created`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Domain`] if the code or URL is empty or the code
    /// is already taken. Returns a database error if the insert fails.
    pub async fn create_link(
        &self,
        code: impl Into<String>,
        long_url: impl Into<String>,
    ) -> Result<Link, EventError> {
        let mut links = vec![Link::create(code, long_url)?];
        let repo = self.links.clone();

        self.uow
            .execute(&mut links, move |tx, links| {
                Box::pin(async move {
                    for link in links.iter() {
                        if repo.find_by_code(tx, &link.code).await?.is_some() {
                            return Err(EventError::domain(format!(
                                "Short code `{}` already exists",
                                link.code
                            )));
                        }
                        repo.insert(tx, link).await?;
                    }
                    Ok(())
                })
            })
            .await?;

        let link = links
            .pop()
            .ok_or_else(|| EventError::domain("Created link missing after commit"))?;

        tracing::info!(code = %link.code, "Link created");
        Ok(link)
    }

    /// Stores a click and emits `link.clicked`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Domain`] if the link does not exist or is deleted.
    pub async fn record_click(&self, code: &str, click: ClickInfo) -> Result<(), EventError> {
        let mut links = Vec::new();
        let repo = self.links.clone();
        let code = code.to_string();

        self.uow
            .execute(&mut links, move |tx, links| {
                Box::pin(async move {
                    let mut link = repo
                        .find_by_code(tx, &code)
                        .await?
                        .ok_or_else(|| not_found(&code))?;

                    let event = link.record_click(
                        click.user_agent.as_deref(),
                        click.referer.as_deref(),
                        click.ip,
                    )?;
                    if let LinkEvent::Clicked(meta, clicked) = event {
                        repo.insert_click(tx, clicked, meta.occurred_at).await?;
                    }

                    links.push(link);
                    Ok::<(), EventError>(())
                })
            })
            .await
    }

    /// Soft-deletes a link and emits `link.deleted`.
    ///
    /// Deleting an already deleted link succeeds without emitting anything.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Domain`] if the link does not exist.
    pub async fn delete_link(&self, code: &str) -> Result<(), EventError> {
        let mut links = Vec::new();
        let repo = self.links.clone();
        let code = code.to_string();

        self.uow
            .execute(&mut links, move |tx, links| {
                Box::pin(async move {
                    let mut link = repo
                        .find_by_code(tx, &code)
                        .await?
                        .ok_or_else(|| not_found(&code))?;

                    if !link.is_deleted() {
                        link.delete();
                        repo.mark_deleted(tx, &link).await?;
                    }

                    links.push(link);
                    Ok::<(), EventError>(())
                })
            })
            .await
    }
}

fn not_found(code: &str) -> EventError {
    EventError::domain(format!("Short link `{code}` not found"))
}
