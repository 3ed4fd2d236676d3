//! Synchronous change-notification surface.
//!
//! Subscriptions target a single node field or a collection's insert/remove
//! signals. Delivery happens within the mutating call, after the mutation's
//! bookkeeping has settled: a listener observes post-mutation state and may
//! mutate the graph re-entrantly, in which case the re-entrant propagation
//! runs to completion before control returns to the outer mutation's caller.

use crate::store::{Entry, ListId, NodeId, Store};

/// Opaque subscription handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// What a listener subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Field { node: NodeId, field: String },
    ListInsert(ListId),
    ListRemove(ListId),
}

/// A direct mutation, as seen by listeners.
#[derive(Debug, Clone)]
pub enum Event {
    /// A field now holds `value` (`None` means it was removed).
    Field {
        node: NodeId,
        field: String,
        value: Option<Entry>,
    },
    /// An element was written at `index`.
    Insert { list: ListId, index: usize },
    /// The element at `index` was removed.
    Remove { list: ListId, index: usize },
}

impl Selector {
    fn matches(&self, event: &Event) -> bool {
        match (self, event) {
            (
                Selector::Field { node, field },
                Event::Field {
                    node: event_node,
                    field: event_field,
                    ..
                },
            ) => node == event_node && field == event_field,
            (Selector::ListInsert(list), Event::Insert { list: event_list, .. }) => {
                list == event_list
            }
            (Selector::ListRemove(list), Event::Remove { list: event_list, .. }) => {
                list == event_list
            }
            _ => false,
        }
    }
}

pub(crate) struct ListenerEntry {
    pub(crate) selector: Selector,
    pub(crate) callback: Box<dyn FnMut(&mut Store, &Event) + Send>,
}

impl Store {
    pub fn subscribe<F>(&mut self, selector: Selector, callback: F) -> ListenerId
    where
        F: FnMut(&mut Store, &Event) + Send + 'static,
    {
        let id = self.next_listener;
        self.next_listener = self.next_listener.saturating_add(1);
        self.listeners.insert(
            id,
            ListenerEntry {
                selector,
                callback: Box::new(callback),
            },
        );
        ListenerId(id)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        if self.listeners.remove(&id.0).is_some() {
            true
        } else {
            // The listener may currently be running (taken out of the map
            // for dispatch); leave a tombstone so it is not reinserted.
            self.dead_listeners.insert(id.0);
            false
        }
    }

    pub(crate) fn emit(&mut self, event: Event) {
        let matched: Vec<u64> = self
            .listeners
            .iter()
            .filter(|(_, entry)| entry.selector.matches(&event))
            .map(|(id, _)| *id)
            .collect();
        for id in matched {
            let Some(mut entry) = self.listeners.remove(&id) else {
                continue;
            };
            (entry.callback)(self, &event);
            if !self.dead_listeners.remove(&id) {
                self.listeners.insert(id, entry);
            }
        }
    }
}
