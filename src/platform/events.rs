//! Upstream chain event source
//!
//! Subscription is an explicit contract: `subscribe` hands back a
//! [`Subscription`] guard and the handler stays registered exactly as long
//! as that guard lives. Dropping (or calling `unsubscribe` on) the guard
//! detaches synchronously, so no handler can run after its owner is gone.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::sim::{Identity, Quality};

/// A raw event as delivered by the upstream watcher.
///
/// Delivery is at-least-once, unordered across kinds, possibly duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainEvent {
    SessionStarted {
        identity: Identity,
        start_reference: u64,
    },
    NoteResult {
        identity: Identity,
        note_index: usize,
        quality: Quality,
    },
    /// Note result reported as awarded points instead of a label
    NoteScored {
        identity: Identity,
        note_index: usize,
        points: u64,
    },
    SessionFinished {
        identity: Identity,
    },
}

impl ChainEvent {
    pub fn identity(&self) -> &Identity {
        match self {
            ChainEvent::SessionStarted { identity, .. }
            | ChainEvent::NoteResult { identity, .. }
            | ChainEvent::NoteScored { identity, .. }
            | ChainEvent::SessionFinished { identity } => identity,
        }
    }

    /// Note index for either note-result shape
    pub fn note_index(&self) -> Option<usize> {
        match *self {
            ChainEvent::NoteResult { note_index, .. } | ChainEvent::NoteScored { note_index, .. } => {
                Some(note_index)
            }
            _ => None,
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, ChainEvent::SessionFinished { .. })
    }

    /// Decode a JSON array of events (one upstream delivery batch)
    pub fn decode_batch(json: &str) -> Result<Vec<ChainEvent>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Receives one delivery batch at a time
pub type EventHandler = Box<dyn FnMut(&[ChainEvent])>;

pub trait EventSource {
    fn subscribe(&self, handler: EventHandler) -> Subscription;
}

/// Guard for a registered handler; detaches on drop
#[must_use = "dropping a Subscription detaches the handler immediately"]
pub struct Subscription {
    teardown: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Detach now
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.teardown.is_some())
            .finish()
    }
}

type SharedHandler = Rc<RefCell<EventHandler>>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, SharedHandler)>,
}

impl Registry {
    fn contains(&self, id: u64) -> bool {
        self.handlers.iter().any(|(h, _)| *h == id)
    }
}

/// In-process event source. The host pushes decoded batches in with
/// [`LocalEventSource::deliver`]; subscribers receive them synchronously.
#[derive(Clone, Default)]
pub struct LocalEventSource {
    registry: Rc<RefCell<Registry>>,
}

impl LocalEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.borrow().handlers.len()
    }

    /// Fan a batch out to every live subscriber
    pub fn deliver(&self, batch: &[ChainEvent]) {
        if batch.is_empty() {
            return;
        }
        // Snapshot so handlers may subscribe/unsubscribe while we iterate
        let handlers: Vec<(u64, SharedHandler)> = self.registry.borrow().handlers.clone();
        for (id, handler) in handlers {
            if !self.registry.borrow().contains(id) {
                continue;
            }
            match handler.try_borrow_mut() {
                Ok(mut handler) => (*handler)(batch),
                Err(_) => log::warn!("Re-entrant delivery to subscriber {} skipped", id),
            }
        }
    }
}

impl EventSource for LocalEventSource {
    fn subscribe(&self, handler: EventHandler) -> Subscription {
        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.push((id, Rc::new(RefCell::new(handler))));
            id
        };
        log::debug!("Event subscriber {} attached", id);

        let registry: Weak<RefCell<Registry>> = Rc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.borrow_mut().handlers.retain(|(h, _)| *h != id);
                log::debug!("Event subscriber {} detached", id);
            }
        })
    }
}
