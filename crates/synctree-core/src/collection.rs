//! Reactive collection operations: index-addressed elements, dirty tracking,
//! and the identity -> position reverse index.
//!
//! The reverse index resolves dirty-child notifications to a position in
//! O(1). Any index-shifting mutation must re-point the affected entries in
//! the same step as the shift; a stale entry is internal corruption and
//! surfaces as [`TreeError::Invariant`].

use indexmap::IndexSet;

use crate::error::TreeError;
use crate::events::Event;
use crate::schema::FieldDescriptor;
use crate::store::{Entry, ListId, Parent, Ref, SetValue, Store};

impl Store {
    pub fn list_len(&self, list: ListId) -> usize {
        self.list_state(list).items.len()
    }

    /// Element at `index`; `None` for a gap or an out-of-range index.
    pub fn list_get(&self, list: ListId, index: usize) -> Option<Entry> {
        self.list_state(list).items.get(index).and_then(Clone::clone)
    }

    /// The descriptor shared by every element of this collection.
    pub fn list_element(&self, list: ListId) -> &FieldDescriptor {
        &self.list_state(list).element
    }

    /// Writes the element at `index`, growing the collection with gaps when
    /// `index` is past the end. Acceptance mirrors [`Store::set`] against the
    /// single element descriptor. Writing `Absent` is a removal.
    pub fn list_set(
        &mut self,
        list: ListId,
        index: usize,
        value: impl Into<SetValue>,
    ) -> Result<(), TreeError> {
        let desc = self.list_state(list).element.clone();
        let entry = match self.accept(&desc, value.into(), &index.to_string())? {
            Some(entry) => entry,
            None => return self.list_remove_at(list, index),
        };

        if let Some(child) = entry.child_ref() {
            self.check_element_attach(child, list, index)?;
        }

        let old = self
            .list_state(list)
            .items
            .get(index)
            .and_then(|slot| slot.as_ref())
            .and_then(Entry::child_ref);
        if let Some(old) = old {
            self.release_element(list, old);
        }
        if let Some(child) = entry.child_ref() {
            self.attach(child, Parent::Element { list });
            let raw = child.raw();
            self.list_state_mut(list).reverse.insert(raw, index);
        }

        let state = self.list_state_mut(list);
        if state.items.len() <= index {
            state.items.resize(index + 1, None);
        }
        state.items[index] = Some(entry);
        if state.muted {
            return Ok(());
        }
        state.dirty.insert(index);
        self.propagate(Ref::List(list));
        self.emit(Event::Insert { list, index });
        Ok(())
    }

    /// Removes the element at `index`, leaving a gap. The transition to
    /// absent is observably a remove: patch generation emits `remove`, never
    /// `add(absent)`. Trailing gaps are trimmed so the length shrinks when
    /// the tail is removed.
    pub fn list_remove_at(&mut self, list: ListId, index: usize) -> Result<(), TreeError> {
        if index >= self.list_state(list).items.len() {
            return Ok(());
        }
        let old = self.list_state(list).items[index]
            .as_ref()
            .and_then(Entry::child_ref);
        if let Some(old) = old {
            self.release_element(list, old);
        }
        let state = self.list_state_mut(list);
        state.items[index] = None;
        while matches!(state.items.last(), Some(None)) {
            state.items.pop();
        }
        if state.muted {
            return Ok(());
        }
        state.dirty.insert(index);
        self.propagate(Ref::List(list));
        self.emit(Event::Remove { list, index });
        Ok(())
    }

    /// Appends a value at the end, through the same per-index acceptance
    /// path as [`Store::list_set`]. Returns the new index.
    pub fn list_push(
        &mut self,
        list: ListId,
        value: impl Into<SetValue>,
    ) -> Result<usize, TreeError> {
        let index = self.list_state(list).items.len();
        let desc = self.list_state(list).element.clone();
        let Some(entry) = self.accept(&desc, value.into(), &index.to_string())? else {
            // A live collection never grows a trailing gap: appending "no
            // value" is a no-op. Snapshot reconstruction (muted) still
            // stores the gap so interior nulls keep their positions.
            let state = self.list_state_mut(list);
            if state.muted {
                state.items.push(None);
            }
            return Ok(index);
        };

        if let Some(child) = entry.child_ref() {
            self.check_element_attach(child, list, index)?;
            self.attach(child, Parent::Element { list });
            let raw = child.raw();
            self.list_state_mut(list).reverse.insert(raw, index);
        }

        let state = self.list_state_mut(list);
        state.items.push(Some(entry));
        if state.muted {
            return Ok(index);
        }
        state.dirty.insert(index);
        self.propagate(Ref::List(list));
        self.emit(Event::Insert { list, index });
        Ok(index)
    }

    /// Appends every value in order; dirty marks follow insertion order and
    /// each element propagates individually.
    pub fn list_extend<I, V>(&mut self, list: ListId, values: I) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = V>,
        V: Into<SetValue>,
    {
        for value in values {
            self.list_push(list, value)?;
        }
        Ok(())
    }

    /// Removes index 0 and shifts every remaining element down one position.
    /// The reverse index entry of every shifted identity-bearing element is
    /// re-pointed in the same step as the shift. Every shifted position is
    /// marked dirty, plus the vacated tail index.
    pub fn list_remove_first(&mut self, list: ListId) -> Result<Option<Entry>, TreeError> {
        if self.list_state(list).items.is_empty() {
            return Ok(None);
        }
        let removed = self.list_state(list).items[0].clone();
        if let Some(old) = removed.as_ref().and_then(Entry::child_ref) {
            self.release_element(list, old);
        }

        let state = self.list_state_mut(list);
        state.items.remove(0);
        for (position, slot) in state.items.iter().enumerate() {
            if let Some(child) = slot.as_ref().and_then(Entry::child_ref) {
                state.reverse.insert(child.raw(), position);
            }
        }
        while matches!(state.items.last(), Some(None)) {
            state.items.pop();
        }
        if state.muted {
            return Ok(removed);
        }
        let len = state.items.len();
        for position in 0..len {
            state.dirty.insert(position);
            // The full re-add at this position supersedes any pending
            // dirty-child mark for the element now held here.
            if let Some(child) = state.items[position].as_ref().and_then(Entry::child_ref) {
                let raw = child.raw();
                state.dirty_children.shift_remove(&raw);
            }
        }
        state.dirty.insert(len);
        self.propagate(Ref::List(list));
        self.emit(Event::Remove { list, index: 0 });
        Ok(removed)
    }

    /// Indices directly overwritten or removed since the last drain, in
    /// insertion order.
    pub fn list_dirty_indices(&mut self, list: ListId, clear: bool) -> IndexSet<usize> {
        let state = self.list_state_mut(list);
        if clear {
            std::mem::take(&mut state.dirty)
        } else {
            state.dirty.clone()
        }
    }

    /// Current positions of elements whose subtree changed since the last
    /// drain, resolved through the reverse index. A resolution miss signals
    /// reverse-index corruption.
    pub fn list_dirty_child_indices(
        &mut self,
        list: ListId,
        clear: bool,
    ) -> Result<Vec<usize>, TreeError> {
        let state = self.list_state_mut(list);
        let raws: Vec<u32> = if clear {
            std::mem::take(&mut state.dirty_children).into_iter().collect()
        } else {
            state.dirty_children.iter().copied().collect()
        };
        let state = self.list_state(list);
        let mut out = Vec::with_capacity(raws.len());
        for raw in raws {
            match state.reverse.get(&raw) {
                Some(&position) => out.push(position),
                None => {
                    return Err(TreeError::Invariant(
                        "dirty child missing from the reverse index".to_owned(),
                    ))
                }
            }
        }
        Ok(out)
    }

    /// Drops the bookkeeping tying a child element to this collection:
    /// parent link, reverse index entry, pending dirty-child mark.
    pub(crate) fn release_element(&mut self, list: ListId, child: Ref) {
        self.clear_parent(child);
        let raw = child.raw();
        let state = self.list_state_mut(list);
        state.reverse.remove(&raw);
        state.dirty_children.shift_remove(&raw);
    }
}
