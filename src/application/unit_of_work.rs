//! Transaction boundary that ties state changes to their events.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::domain::aggregate::AggregateRoot;
use crate::domain::event::DomainEvent;
use crate::error::EventError;
use crate::events::Dispatcher;
use crate::outbox::{Transaction, TransactionManager, publish_in_transaction};

/// Runs a business operation in one transaction and makes its events
/// durable in the same commit.
///
/// After a successful commit the events are dispatched in-process and
/// cleared from their aggregates. Nothing is dispatched or cleared when the
/// transaction is rolled back.
pub struct UnitOfWork<M: TransactionManager, E: DomainEvent> {
    transactions: Arc<M>,
    dispatcher: Arc<Dispatcher<E>>,
}

impl<M: TransactionManager, E: DomainEvent> Clone for UnitOfWork<M, E> {
    fn clone(&self) -> Self {
        Self {
            transactions: self.transactions.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<M: TransactionManager, E: DomainEvent> UnitOfWork<M, E> {
    pub fn new(transactions: Arc<M>, dispatcher: Arc<Dispatcher<E>>) -> Self {
        Self {
            transactions,
            dispatcher,
        }
    }

    /// Executes `operation` inside a fresh transaction.
    ///
    /// `operation` receives the open transaction and the aggregates it works
    /// on. Aggregates loaded inside the operation can be pushed onto the
    /// vector so that their events are collected too.
    ///
    /// On success the pending events of every aggregate are written to the
    /// outbox and the transaction commits. Post-commit dispatch failures are
    /// logged and do not affect the result.
    ///
    /// # Errors
    ///
    /// - The operation's error, unchanged, after rollback
    /// - A staging or commit failure, after rollback; aggregates keep their
    ///   events
    ///
    /// # Panics
    ///
    /// A panic inside `operation` rolls the transaction back and is then
    /// resumed.
    pub async fn execute<A, T, Err, F>(
        &self,
        aggregates: &mut Vec<A>,
        operation: F,
    ) -> Result<T, Err>
    where
        A: AggregateRoot<Event = E>,
        Err: From<EventError>,
        F: for<'a> FnOnce(&'a mut M::Tx, &'a mut Vec<A>) -> BoxFuture<'a, Result<T, Err>>,
    {
        let mut tx = self.transactions.begin().await?;

        let outcome = AssertUnwindSafe(operation(&mut tx, aggregates))
            .catch_unwind()
            .await;

        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                rollback(tx).await;
                return Err(e);
            }
            Err(panic) => {
                rollback(tx).await;
                std::panic::resume_unwind(panic);
            }
        };

        for aggregate in aggregates.iter() {
            if let Err(e) = publish_in_transaction(&mut tx, aggregate.events()).await {
                rollback(tx).await;
                return Err(e.into());
            }
        }

        tx.commit().await?;

        for aggregate in aggregates.iter_mut() {
            for event in aggregate.events() {
                if let Err(e) = self.dispatcher.dispatch(event).await {
                    tracing::error!(
                        event_id = %event.event_id(),
                        event_name = event.event_name(),
                        aggregate_id = event.aggregate_id(),
                        error = %e,
                        "In-process dispatch failed after commit"
                    );
                }
            }
            aggregate.clear_events();
        }

        Ok(value)
    }
}

async fn rollback<T: Transaction>(tx: T) {
    if let Err(e) = tx.rollback().await {
        tracing::error!(error = %e, "Transaction rollback failed");
    }
}
