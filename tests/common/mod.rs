#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use link_events::domain::entities::Link;
use link_events::domain::link_events::LinkClicked;
use link_events::domain::repositories::LinkRepository;
use link_events::error::{BusError, EventError};
use link_events::events::{
    Dispatcher, Envelope, EventBus, InMemoryBus, Message, Router, RouterHandler, Subscription,
};
use link_events::outbox::{
    InMemoryOutbox, InMemoryTx, OutboxMessage, OutboxStats, OutboxStore,
};
use link_events::prelude::{LinkEvent, LinkService, UnitOfWork};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const TOPIC: &str = "link-events";

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 2s");
}

/// Receives the next delivery, acks it and decodes its envelope.
pub async fn next_envelope(subscription: &mut Subscription) -> Envelope {
    let delivery = tokio::time::timeout(Duration::from_secs(2), subscription.next())
        .await
        .expect("no delivery within 2s")
        .expect("subscription closed");
    let envelope = Envelope::from_bytes(&delivery.message().payload).unwrap();
    delivery.ack();
    envelope
}

/// Link table kept in memory; writes are immediate.
#[derive(Default)]
pub struct MemoryLinkRepository {
    links: Mutex<HashMap<String, Link>>,
}

impl MemoryLinkRepository {
    pub fn get(&self, code: &str) -> Option<Link> {
        self.links.lock().unwrap().get(code).map(copy)
    }
}

fn copy(link: &Link) -> Link {
    Link::restore(
        link.code.clone(),
        link.long_url.clone(),
        link.created_at,
        link.deleted_at,
    )
}

#[async_trait]
impl LinkRepository<InMemoryTx> for MemoryLinkRepository {
    async fn insert(&self, _tx: &mut InMemoryTx, link: &Link) -> Result<(), EventError> {
        self.links
            .lock()
            .unwrap()
            .insert(link.code.clone(), copy(link));
        Ok(())
    }

    async fn find_by_code(
        &self,
        _tx: &mut InMemoryTx,
        code: &str,
    ) -> Result<Option<Link>, EventError> {
        Ok(self.get(code))
    }

    async fn mark_deleted(&self, _tx: &mut InMemoryTx, link: &Link) -> Result<(), EventError> {
        self.links
            .lock()
            .unwrap()
            .insert(link.code.clone(), copy(link));
        Ok(())
    }

    async fn insert_click(
        &self,
        _tx: &mut InMemoryTx,
        _click: &LinkClicked,
        _clicked_at: DateTime<Utc>,
    ) -> Result<(), EventError> {
        Ok(())
    }
}

/// A link service over the in-memory outbox with an empty dispatcher.
pub fn link_service(
    outbox: &InMemoryOutbox,
) -> LinkService<InMemoryOutbox, MemoryLinkRepository> {
    let uow = UnitOfWork::new(
        Arc::new(outbox.clone()),
        Arc::new(Dispatcher::<LinkEvent>::new()),
    );
    LinkService::new(uow, Arc::new(MemoryLinkRepository::default()))
}

/// Bus wrapper that rejects the first `failures` publishes of selected
/// message ids.
pub struct FlakyBus {
    inner: InMemoryBus,
    failures: Mutex<HashMap<String, usize>>,
}

impl FlakyBus {
    pub fn new(inner: InMemoryBus) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail(&self, uuid: Uuid, times: usize) {
        self.failures.lock().unwrap().insert(uuid.to_string(), times);
    }
}

#[async_trait]
impl EventBus for FlakyBus {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BusError> {
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&message.uuid)
                && *left > 0
            {
                *left -= 1;
                return Err(BusError::Publish {
                    uuid: message.uuid,
                    reason: "broker unavailable".to_string(),
                });
            }
        }
        self.inner.publish(topic, message).await
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        self.inner.subscribe(topic).await
    }

    async fn close(&self) -> Result<(), BusError> {
        self.inner.close().await
    }
}

/// Outbox store whose deletes fail a fixed number of times.
pub struct FlakyDeleteStore {
    inner: InMemoryOutbox,
    delete_failures: AtomicUsize,
}

impl FlakyDeleteStore {
    pub fn new(inner: InMemoryOutbox, delete_failures: usize) -> Self {
        Self {
            inner,
            delete_failures: AtomicUsize::new(delete_failures),
        }
    }
}

#[async_trait]
impl OutboxStore for FlakyDeleteStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxMessage>, EventError> {
        self.inner.fetch_pending(limit).await
    }

    async fn delete(&self, uuid: Uuid) -> Result<(), EventError> {
        let left = self.delete_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.delete_failures.store(left - 1, Ordering::SeqCst);
            return Err(EventError::domain("connection reset during delete"));
        }
        self.inner.delete(uuid).await
    }

    async fn stats(&self) -> Result<OutboxStats, EventError> {
        self.inner.stats().await
    }
}

/// What a [`RecordingHandler`] does with each envelope.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
}

/// Router handler that records the event ids it saw.
pub struct RecordingHandler {
    name: String,
    event_name: String,
    behavior: Behavior,
    seen: Mutex<Vec<Uuid>>,
}

impl RecordingHandler {
    pub fn new(name: &str, event_name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            event_name: event_name.to_string(),
            behavior,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<Uuid> {
        self.seen.lock().unwrap().clone()
    }

    pub fn distinct(&self) -> HashSet<Uuid> {
        self.seen().into_iter().collect()
    }
}

#[async_trait]
impl RouterHandler for RecordingHandler {
    fn handler_name(&self) -> &str {
        &self.name
    }

    fn event_name(&self) -> &str {
        &self.event_name
    }

    async fn handle(&self, envelope: &Envelope) -> Result<(), EventError> {
        self.seen.lock().unwrap().push(envelope.event_id);
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(EventError::handler(&self.name, "rejected")),
            Behavior::Panic => panic!("{} exploded", self.name),
        }
    }
}

/// A router running in the background; dropping the shutdown sender does
/// not stop it, call [`RunningRouter::shutdown`].
pub struct RunningRouter {
    pub router: Arc<Router>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<Result<(), EventError>>,
}

impl RunningRouter {
    pub async fn start(router: Router) -> Self {
        let router = Arc::new(router);
        let (shutdown_tx, shutdown_rx) = link_events::shutdown::channel();
        let task = {
            let router = router.clone();
            tokio::spawn(async move { router.run(shutdown_rx).await })
        };
        router.started().await;

        Self {
            router,
            shutdown_tx,
            task,
        }
    }

    pub async fn shutdown(self) {
        self.shutdown_tx.send_replace(true);
        self.task.await.unwrap().unwrap();
    }
}
