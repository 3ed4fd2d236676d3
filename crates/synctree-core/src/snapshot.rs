//! Recursive conversion between the live graph and plain JSON-shaped trees.
//!
//! Snapshots are the wire format for both full documents and patch `add`
//! payloads: records for nodes, sequences for collections, scalars as
//! themselves. Deserialization is descriptor-driven and populates objects
//! under construction suppression, so building a graph from a snapshot is
//! never observable as a change.

use serde_json::Value;

use crate::error::TreeError;
use crate::schema::FieldDescriptor;
use crate::store::{Entry, ListId, NodeId, Ref, SetValue, Store};

impl Store {
    pub fn snapshot(&self, target: impl Into<Ref>) -> Value {
        match target.into() {
            Ref::Node(node) => self.node_snapshot(node),
            Ref::List(list) => self.list_snapshot(list),
        }
    }

    /// Plain record of every present declared field, in declaration order.
    /// Absent fields are omitted.
    pub fn node_snapshot(&self, node: NodeId) -> Value {
        let state = self.node_state(node);
        let mut out = serde_json::Map::new();
        for (name, _) in state.schema.fields() {
            if let Some(entry) = state.values.get(name) {
                out.insert(name.to_owned(), self.entry_snapshot(entry));
            }
        }
        Value::Object(out)
    }

    /// Element-wise sequence; gaps serialize as null.
    pub fn list_snapshot(&self, list: ListId) -> Value {
        let state = self.list_state(list);
        Value::Array(
            state
                .items
                .iter()
                .map(|slot| match slot {
                    Some(entry) => self.entry_snapshot(entry),
                    None => Value::Null,
                })
                .collect(),
        )
    }

    pub(crate) fn entry_snapshot(&self, entry: &Entry) -> Value {
        match entry {
            Entry::Scalar(v) => v.clone(),
            Entry::Node(id) => self.node_snapshot(*id),
            Entry::List(id) => self.list_snapshot(*id),
        }
    }

    /// Builds a node of `type_name` from a plain record. Population happens
    /// under suppression; the node is live once fully populated. Fields
    /// absent from the record stay unset.
    pub fn node_from_snapshot(&mut self, type_name: &str, record: &Value) -> Result<NodeId, TreeError> {
        let Value::Object(map) = record else {
            return Err(TreeError::TypeMismatch {
                path: type_name.to_owned(),
                expected: "record".to_owned(),
                found: json_kind(record).to_owned(),
            });
        };
        let schema = self.registry.schema(type_name)?;
        let node = self.create_node(type_name)?;
        for (name, desc) in schema.fields() {
            let Some(raw) = map.get(name) else { continue };
            let value = self.value_from_snapshot(raw, desc)?;
            if matches!(value, SetValue::Absent) {
                continue;
            }
            self.set(node, name, value)?;
        }
        self.activate(node);
        Ok(node)
    }

    /// Builds a collection of `element` from a plain sequence. Null entries
    /// under a structured element descriptor become gaps.
    pub fn list_from_snapshot(
        &mut self,
        element: &FieldDescriptor,
        values: &Value,
    ) -> Result<ListId, TreeError> {
        let Value::Array(items) = values else {
            return Err(TreeError::TypeMismatch {
                path: element.describe(),
                expected: "sequence".to_owned(),
                found: json_kind(values).to_owned(),
            });
        };
        let list = self.create_list(element.clone());
        for raw in items {
            let value = self.value_from_snapshot(raw, element)?;
            self.list_push(list, value)?;
        }
        self.activate(list);
        Ok(list)
    }

    /// Converts one snapshot value into a writable value per its descriptor,
    /// recursively materializing structured children.
    pub(crate) fn value_from_snapshot(
        &mut self,
        raw: &Value,
        desc: &FieldDescriptor,
    ) -> Result<SetValue, TreeError> {
        match desc {
            FieldDescriptor::Scalar { .. } => Ok(SetValue::Scalar(raw.clone())),
            FieldDescriptor::Object { node_type } => {
                if raw.is_null() {
                    return Ok(SetValue::Absent);
                }
                Ok(SetValue::Node(self.node_from_snapshot(node_type, raw)?))
            }
            FieldDescriptor::Collection { element } => {
                if raw.is_null() {
                    return Ok(SetValue::Absent);
                }
                Ok(SetValue::List(self.list_from_snapshot(element, raw)?))
            }
            FieldDescriptor::Map { .. } => Err(TreeError::Unsupported("map-typed fields")),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "record",
    }
}
