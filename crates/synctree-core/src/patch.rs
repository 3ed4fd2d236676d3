//! Patch generation and application.
//!
//! A patch is an ordered list of `add` / `remove` / `modify` operations
//! capturing every change since the last drain, sufficient to replay on a
//! structurally identical replica. Generation drains the dirty sets (so a
//! second immediate generation is empty); application replays each
//! operation through the normal mutation paths, re-validating values.
//!
//! Application is not transactional: a failure at operation *k* leaves
//! operations `1..k-1` applied. Reconciling a partially-applied patch is a
//! caller responsibility.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TreeError;
use crate::store::{Entry, ListId, NodeId, Ref, SetValue, Store};

/// Operation target within its parent: a field name for node targets, an
/// integer index for collection targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathKey {
    Index(usize),
    Field(String),
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Index(i) => write!(f, "{i}"),
            PathKey::Field(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for PathKey {
    fn from(name: &str) -> Self {
        PathKey::Field(name.to_owned())
    }
}

impl From<String> for PathKey {
    fn from(name: String) -> Self {
        PathKey::Field(name)
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum PatchOp {
    /// The field/index now holds `value` (a plain serialized value).
    Add { path: PathKey, value: Value },
    /// The field/index is now absent.
    Remove { path: PathKey },
    /// The child at `path` was not replaced but internally mutated.
    Modify { path: PathKey, patches: Vec<PatchOp> },
}

impl PatchOp {
    pub fn add(path: impl Into<PathKey>, value: Value) -> Self {
        PatchOp::Add {
            path: path.into(),
            value,
        }
    }

    pub fn remove(path: impl Into<PathKey>) -> Self {
        PatchOp::Remove { path: path.into() }
    }

    pub fn modify(path: impl Into<PathKey>, patches: Vec<PatchOp>) -> Self {
        PatchOp::Modify {
            path: path.into(),
            patches,
        }
    }

    pub fn path(&self) -> &PathKey {
        match self {
            PatchOp::Add { path, .. } | PatchOp::Remove { path } | PatchOp::Modify { path, .. } => {
                path
            }
        }
    }
}

/// Serializes a patch to its wire shape: one record per operation with
/// `operation`, `path`, and either `value` or `patches`.
pub fn encode_patch(patches: &[PatchOp]) -> Result<Value, serde_json::Error> {
    serde_json::to_value(patches)
}

pub fn decode_patch(value: Value) -> Result<Vec<PatchOp>, serde_json::Error> {
    serde_json::from_value(value)
}

/// Drains the target's dirty state into an ordered operation list.
/// Direct-write operations precede child-modification operations; within
/// each group, iteration follows dirty-set insertion order.
pub fn generate_patch(store: &mut Store, target: impl Into<Ref>) -> Result<Vec<PatchOp>, TreeError> {
    match target.into() {
        Ref::Node(node) => generate_node_patch(store, node),
        Ref::List(list) => generate_list_patch(store, list),
    }
}

fn generate_node_patch(store: &mut Store, node: NodeId) -> Result<Vec<PatchOp>, TreeError> {
    let mut ops = Vec::new();
    for field in store.dirty_fields(node, true) {
        match store.get(node, &field)? {
            None => ops.push(PatchOp::Remove {
                path: PathKey::Field(field),
            }),
            Some(entry) => {
                let value = store.entry_snapshot(&entry);
                ops.push(PatchOp::Add {
                    path: PathKey::Field(field),
                    value,
                });
            }
        }
    }
    for field in store.dirty_child_fields(node, true) {
        let patches = match store.get(node, &field)? {
            Some(Entry::Node(child)) => generate_node_patch(store, child)?,
            Some(Entry::List(child)) => generate_list_patch(store, child)?,
            _ => {
                return Err(TreeError::Invariant(format!(
                    "dirty-child mark at '{field}' does not hold a structured child"
                )))
            }
        };
        ops.push(PatchOp::Modify {
            path: PathKey::Field(field),
            patches,
        });
    }
    Ok(ops)
}

fn generate_list_patch(store: &mut Store, list: ListId) -> Result<Vec<PatchOp>, TreeError> {
    let mut ops = Vec::new();
    for index in store.list_dirty_indices(list, true) {
        match store.list_get(list, index) {
            None => ops.push(PatchOp::Remove {
                path: PathKey::Index(index),
            }),
            Some(entry) => {
                let value = store.entry_snapshot(&entry);
                ops.push(PatchOp::Add {
                    path: PathKey::Index(index),
                    value,
                });
            }
        }
    }
    for index in store.list_dirty_child_indices(list, true)? {
        let patches = match store.list_get(list, index) {
            Some(Entry::Node(child)) => generate_node_patch(store, child)?,
            Some(Entry::List(child)) => generate_list_patch(store, child)?,
            _ => {
                return Err(TreeError::Invariant(format!(
                    "dirty-child mark at index {index} does not hold a structured child"
                )))
            }
        };
        ops.push(PatchOp::Modify {
            path: PathKey::Index(index),
            patches,
        });
    }
    Ok(ops)
}

/// Replays an operation list against a structurally identical target graph.
/// Values are re-validated through the normal write paths; `modify` against
/// an absent child is a protocol violation ([`TreeError::PathNotFound`]).
pub fn apply_patch(
    store: &mut Store,
    target: impl Into<Ref>,
    patches: &[PatchOp],
) -> Result<(), TreeError> {
    match target.into() {
        Ref::Node(node) => apply_node_patch(store, node, patches),
        Ref::List(list) => apply_list_patch(store, list, patches),
    }
}

fn apply_node_patch(store: &mut Store, node: NodeId, patches: &[PatchOp]) -> Result<(), TreeError> {
    for op in patches {
        let field = match op.path() {
            PathKey::Field(name) => name.clone(),
            PathKey::Index(index) => {
                return Err(TreeError::PathNotFound(format!(
                    "index {index} against a node target"
                )))
            }
        };
        match op {
            PatchOp::Add { value, .. } => {
                let desc = store.node_descriptor(node, &field)?.clone();
                let set_value = store.value_from_snapshot(value, &desc)?;
                store.set(node, &field, set_value)?;
            }
            PatchOp::Remove { .. } => {
                store.set(node, &field, SetValue::Absent)?;
            }
            PatchOp::Modify { patches, .. } => match store.get(node, &field)? {
                Some(Entry::Node(child)) => apply_node_patch(store, child, patches)?,
                Some(Entry::List(child)) => apply_list_patch(store, child, patches)?,
                _ => {
                    return Err(TreeError::PathNotFound(format!(
                        "no child present at '{field}'"
                    )))
                }
            },
        }
    }
    Ok(())
}

fn apply_list_patch(store: &mut Store, list: ListId, patches: &[PatchOp]) -> Result<(), TreeError> {
    for op in patches {
        let index = match op.path() {
            PathKey::Index(index) => *index,
            PathKey::Field(name) => {
                return Err(TreeError::PathNotFound(format!(
                    "field '{name}' against a collection target"
                )))
            }
        };
        match op {
            PatchOp::Add { value, .. } => {
                let element = store.list_element(list).clone();
                let set_value = store.value_from_snapshot(value, &element)?;
                store.list_set(list, index, set_value)?;
            }
            PatchOp::Remove { .. } => {
                store.list_remove_at(list, index)?;
            }
            PatchOp::Modify { patches, .. } => match store.list_get(list, index) {
                Some(Entry::Node(child)) => apply_node_patch(store, child, patches)?,
                Some(Entry::List(child)) => apply_list_patch(store, child, patches)?,
                _ => {
                    return Err(TreeError::PathNotFound(format!(
                        "no child present at index {index}"
                    )))
                }
            },
        }
    }
    Ok(())
}
