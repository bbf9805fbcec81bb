//! Observer lists with explicit subscription handles.
//!
//! Registrants keep a [`Subscription`] and drop their callback through it.
//! Unsubscribing only queues the id; the owning [`Registry`] applies queued
//! removals before its next dispatch, so it is safe to unsubscribe from
//! inside a callback that is currently being dispatched.

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Handle returned by every registration.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    removals: Weak<RefCell<Vec<SubscriptionId>>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Queues removal of the callback. Calling it twice, or after the owning
    /// registry has been dropped, does nothing.
    pub fn unsubscribe(&self) {
        if let Some(removals) = self.removals.upgrade() {
            let mut removals = removals.borrow_mut();
            if !removals.contains(&self.id) {
                removals.push(self.id);
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Insertion-ordered collection of callbacks of type `C`.
pub struct Registry<C> {
    entries: Vec<(SubscriptionId, C)>,
    removals: Rc<RefCell<Vec<SubscriptionId>>>,
    next_id: u64,
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            removals: Rc::new(RefCell::new(Vec::new())),
            next_id: 0,
        }
    }

    pub fn insert(&mut self, callback: C) -> Subscription {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, callback));
        Subscription {
            id,
            removals: Rc::downgrade(&self.removals),
        }
    }

    /// Applies every removal queued through [`Subscription::unsubscribe`].
    pub fn purge(&mut self) {
        let queued: Vec<SubscriptionId> = self.removals.borrow_mut().drain(..).collect();
        if !queued.is_empty() {
            self.entries.retain(|(id, _)| !queued.contains(id));
        }
    }

    /// Removes a callback immediately. Must not be used while iterating.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        before != self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.removals.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SubscriptionId, &mut C)> {
        self.entries.iter_mut().map(|(id, callback)| (*id, callback))
    }
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries.len())
            .field("pending_removals", &self.removals.borrow().len())
            .finish()
    }
}

type Listener<E> = Box<dyn FnMut(&E)>;

/// Synchronous event fan-out in registration order.
pub struct Listeners<E> {
    registry: Registry<Listener<E>>,
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&E) + 'static) -> Subscription {
        self.registry.insert(Box::new(callback))
    }

    pub fn emit(&mut self, event: &E) {
        self.registry.purge();
        for (_, listener) in self.registry.iter_mut() {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn clear(&mut self) {
        self.registry.clear();
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("registry", &self.registry)
            .finish()
    }
}
