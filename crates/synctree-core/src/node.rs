//! Reactive node operations: typed field access, dirty tracking, lifecycle.

use indexmap::IndexSet;

use crate::error::TreeError;
use crate::events::Event;
use crate::schema::FieldDescriptor;
use crate::store::{Entry, NodeId, Parent, Ref, SetValue, Store};

impl Store {
    /// Current value of a declared field. `None` means the field is absent.
    pub fn get(&self, node: NodeId, field: &str) -> Result<Option<Entry>, TreeError> {
        let state = self.node_state(node);
        if state.schema.descriptor(field).is_none() {
            return Err(unknown_field(field, &state.type_name));
        }
        Ok(state.values.get(field).cloned())
    }

    /// Descriptor of a declared field.
    pub fn node_descriptor(&self, node: NodeId, field: &str) -> Result<&FieldDescriptor, TreeError> {
        let state = self.node_state(node);
        state
            .schema
            .descriptor(field)
            .ok_or_else(|| unknown_field(field, &state.type_name))
    }

    /// Writes a field. Scalars run the field's validator; object/collection
    /// values must match the field's descriptor. The previous child (if any)
    /// is detached unconditionally, even when the same instance is being
    /// re-assigned. On acceptance the field is marked dirty, any pending
    /// dirty-child mark is cleared, and the change propagates to the root.
    ///
    /// A failed write leaves the prior state untouched.
    pub fn set(
        &mut self,
        node: NodeId,
        field: &str,
        value: impl Into<SetValue>,
    ) -> Result<(), TreeError> {
        let value = value.into();
        let desc = self.node_descriptor(node, field)?.clone();
        let entry = self.accept(&desc, value, field)?;

        if let Some(child) = entry.as_ref().and_then(Entry::child_ref) {
            self.check_field_attach(child, node, field)?;
        }

        let old = self
            .node_state(node)
            .values
            .get(field)
            .and_then(Entry::child_ref);
        if let Some(old) = old {
            self.clear_parent(old);
        }
        if let Some(child) = entry.as_ref().and_then(Entry::child_ref) {
            self.attach(
                child,
                Parent::Field {
                    node,
                    field: field.to_owned(),
                },
            );
        }

        let state = self.node_state_mut(node);
        match &entry {
            Some(e) => {
                state.values.insert(field.to_owned(), e.clone());
            }
            None => {
                state.values.shift_remove(field);
            }
        }
        if state.muted {
            return Ok(());
        }
        state.dirty.insert(field.to_owned());
        // A direct write supersedes any pending dirty-child mark.
        state.dirty_children.shift_remove(field);
        self.propagate(Ref::Node(node));
        self.emit(Event::Field {
            node,
            field: field.to_owned(),
            value: entry,
        });
        Ok(())
    }

    /// Sets a field to absent, detaching any held child.
    pub fn clear(&mut self, node: NodeId, field: &str) -> Result<(), TreeError> {
        self.set(node, field, SetValue::Absent)
    }

    /// Fields directly overwritten or removed since the last drain. With
    /// `clear`, an empty set is swapped in atomically.
    pub fn dirty_fields(&mut self, node: NodeId, clear: bool) -> IndexSet<String> {
        let state = self.node_state_mut(node);
        if clear {
            std::mem::take(&mut state.dirty)
        } else {
            state.dirty.clone()
        }
    }

    /// Fields whose currently-held child was modified internally since the
    /// last drain.
    pub fn dirty_child_fields(&mut self, node: NodeId, clear: bool) -> IndexSet<String> {
        let state = self.node_state_mut(node);
        if clear {
            std::mem::take(&mut state.dirty_children)
        } else {
            state.dirty_children.clone()
        }
    }
}

fn unknown_field(field: &str, type_name: &str) -> TreeError {
    TreeError::SchemaMissing(format!("field '{field}' on type '{type_name}'"))
}
