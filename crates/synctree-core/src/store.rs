//! Arena store for reactive nodes and collections.
//!
//! Every node and collection lives in one arena; handles ([`NodeId`],
//! [`ListId`]) refer into it. Parent back-references are handles too, never
//! owning pointers, so the owning direction (parent -> child) and the
//! reporting direction (child -> parent) cannot form a reference cycle.
//!
//! Change propagation is a behavioral contract, not a standalone object: a
//! direct mutation marks the mutator's own dirty set and walks the parent
//! chain, marking each ancestor dirty-child, terminating at the root. The
//! walk is synchronous and re-entrancy is permitted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use crate::error::TreeError;
use crate::events::ListenerEntry;
use crate::patch::PathKey;
use crate::schema::{FieldDescriptor, NodeSchema, SchemaRegistry};

/// Handle to a reactive node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// Handle to a reactive collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListId(pub(crate) u32);

/// A node-or-collection reference, the unit the patch engine operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ref {
    Node(NodeId),
    List(ListId),
}

impl Ref {
    pub(crate) fn raw(self) -> u32 {
        match self {
            Ref::Node(NodeId(i)) | Ref::List(ListId(i)) => i,
        }
    }
}

impl From<NodeId> for Ref {
    fn from(id: NodeId) -> Self {
        Ref::Node(id)
    }
}

impl From<ListId> for Ref {
    fn from(id: ListId) -> Self {
        Ref::List(id)
    }
}

/// A value currently held by a field or element slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Scalar(Value),
    Node(NodeId),
    List(ListId),
}

impl Entry {
    pub fn child_ref(&self) -> Option<Ref> {
        match self {
            Entry::Scalar(_) => None,
            Entry::Node(id) => Some(Ref::Node(*id)),
            Entry::List(id) => Some(Ref::List(*id)),
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Entry::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Entry::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<ListId> {
        match self {
            Entry::List(id) => Some(*id),
            _ => None,
        }
    }
}

/// A value being written into a field or element slot.
#[derive(Debug, Clone)]
pub enum SetValue {
    Absent,
    Scalar(Value),
    Node(NodeId),
    List(ListId),
}

impl SetValue {
    fn kind_name(&self) -> &'static str {
        match self {
            SetValue::Absent => "absent",
            SetValue::Scalar(_) => "scalar",
            SetValue::Node(_) => "object",
            SetValue::List(_) => "collection",
        }
    }
}

impl From<Value> for SetValue {
    fn from(v: Value) -> Self {
        SetValue::Scalar(v)
    }
}

impl From<NodeId> for SetValue {
    fn from(id: NodeId) -> Self {
        SetValue::Node(id)
    }
}

impl From<ListId> for SetValue {
    fn from(id: ListId) -> Self {
        SetValue::List(id)
    }
}

impl From<Entry> for SetValue {
    fn from(entry: Entry) -> Self {
        match entry {
            Entry::Scalar(v) => SetValue::Scalar(v),
            Entry::Node(id) => SetValue::Node(id),
            Entry::List(id) => SetValue::List(id),
        }
    }
}

/// Non-owning back-reference from a child to the location holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Parent {
    Field { node: NodeId, field: String },
    Element { list: ListId },
}

impl Parent {
    pub(crate) fn holder(&self) -> Ref {
        match self {
            Parent::Field { node, .. } => Ref::Node(*node),
            Parent::Element { list } => Ref::List(*list),
        }
    }
}

pub(crate) struct NodeState {
    pub(crate) type_name: String,
    pub(crate) schema: Arc<NodeSchema>,
    pub(crate) values: IndexMap<String, Entry>,
    pub(crate) dirty: IndexSet<String>,
    pub(crate) dirty_children: IndexSet<String>,
    pub(crate) parent: Option<Parent>,
    pub(crate) muted: bool,
}

pub(crate) struct ListState {
    pub(crate) element: FieldDescriptor,
    /// `None` slots are gaps ("no value"), distinct from a scalar null.
    pub(crate) items: Vec<Option<Entry>>,
    pub(crate) dirty: IndexSet<usize>,
    /// Identities (raw slot ids) of elements whose subtree changed.
    pub(crate) dirty_children: IndexSet<u32>,
    /// Element identity -> current position. Must stay exact across shifts.
    pub(crate) reverse: HashMap<u32, usize>,
    pub(crate) parent: Option<Parent>,
    pub(crate) muted: bool,
}

pub(crate) enum Slot {
    Node(NodeState),
    List(ListState),
}

/// Owner of the whole graph: all nodes, all collections, all listeners.
pub struct Store {
    pub(crate) registry: Arc<SchemaRegistry>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) listeners: BTreeMap<u64, ListenerEntry>,
    pub(crate) next_listener: u64,
    pub(crate) dead_listeners: HashSet<u64>,
}

impl Store {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self::with_registry(Arc::new(registry))
    }

    pub fn with_registry(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            slots: Vec::new(),
            listeners: BTreeMap::new(),
            next_listener: 1,
            dead_listeners: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Creates an empty node of the given type. The node starts suppressed
    /// (mutations are not observable as changes) until it is attached to a
    /// parent or [`Store::activate`] is called.
    pub fn create_node(&mut self, type_name: &str) -> Result<NodeId, TreeError> {
        let schema = self.registry.schema(type_name)?;
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Slot::Node(NodeState {
            type_name: type_name.to_owned(),
            schema,
            values: IndexMap::new(),
            dirty: IndexSet::new(),
            dirty_children: IndexSet::new(),
            parent: None,
            muted: true,
        }));
        Ok(id)
    }

    /// Creates an empty collection whose elements all follow `element`.
    /// Starts suppressed, like [`Store::create_node`].
    pub fn create_list(&mut self, element: FieldDescriptor) -> ListId {
        let id = ListId(self.slots.len() as u32);
        self.slots.push(Slot::List(ListState {
            element,
            items: Vec::new(),
            dirty: IndexSet::new(),
            dirty_children: IndexSet::new(),
            reverse: HashMap::new(),
            parent: None,
            muted: true,
        }));
        id
    }

    /// Lifts construction suppression on a root built by hand. Attaching to a
    /// parent lifts it implicitly; deserialization lifts it on completion.
    pub fn activate(&mut self, target: impl Into<Ref>) {
        self.unmute(target.into());
    }

    pub fn node_type(&self, node: NodeId) -> &str {
        &self.node_state(node).type_name
    }

    /// The location currently holding `target`, if any.
    pub fn parent(&self, target: impl Into<Ref>) -> Option<Ref> {
        self.parent_of(target.into()).map(Parent::holder)
    }

    /// Keys addressing `target` from its root: field names for node-held
    /// steps, current positions for collection-held steps. A root resolves
    /// to an empty path. Collection positions come from the reverse index,
    /// so the path reflects any shifts that happened since attachment.
    pub fn path(&self, target: impl Into<Ref>) -> Result<Vec<PathKey>, TreeError> {
        let mut keys = Vec::new();
        let mut cur = target.into();
        while let Some(parent) = self.parent_of(cur) {
            match parent {
                Parent::Field { node, field } => {
                    keys.push(PathKey::Field(field.clone()));
                    cur = Ref::Node(*node);
                }
                Parent::Element { list } => {
                    let position = self
                        .list_state(*list)
                        .reverse
                        .get(&cur.raw())
                        .copied()
                        .ok_or_else(|| {
                            TreeError::Invariant(
                                "held element missing from the reverse index".to_owned(),
                            )
                        })?;
                    keys.push(PathKey::Index(position));
                    cur = Ref::List(*list);
                }
            }
        }
        keys.reverse();
        Ok(keys)
    }

    pub(crate) fn node_state(&self, id: NodeId) -> &NodeState {
        match &self.slots[id.0 as usize] {
            Slot::Node(state) => state,
            Slot::List(_) => unreachable!("node handle resolves to a collection slot"),
        }
    }

    pub(crate) fn node_state_mut(&mut self, id: NodeId) -> &mut NodeState {
        match &mut self.slots[id.0 as usize] {
            Slot::Node(state) => state,
            Slot::List(_) => unreachable!("node handle resolves to a collection slot"),
        }
    }

    pub(crate) fn list_state(&self, id: ListId) -> &ListState {
        match &self.slots[id.0 as usize] {
            Slot::List(state) => state,
            Slot::Node(_) => unreachable!("collection handle resolves to a node slot"),
        }
    }

    pub(crate) fn list_state_mut(&mut self, id: ListId) -> &mut ListState {
        match &mut self.slots[id.0 as usize] {
            Slot::List(state) => state,
            Slot::Node(_) => unreachable!("collection handle resolves to a node slot"),
        }
    }

    pub(crate) fn parent_of(&self, r: Ref) -> Option<&Parent> {
        match r {
            Ref::Node(id) => self.node_state(id).parent.as_ref(),
            Ref::List(id) => self.list_state(id).parent.as_ref(),
        }
    }

    pub(crate) fn set_parent(&mut self, r: Ref, parent: Parent) {
        match r {
            Ref::Node(id) => self.node_state_mut(id).parent = Some(parent),
            Ref::List(id) => self.list_state_mut(id).parent = Some(parent),
        }
    }

    /// Permanently decouples `r` from dirty propagation toward its former
    /// parent. The subtree keeps tracking its own mutations.
    pub(crate) fn clear_parent(&mut self, r: Ref) {
        match r {
            Ref::Node(id) => self.node_state_mut(id).parent = None,
            Ref::List(id) => self.list_state_mut(id).parent = None,
        }
    }

    pub(crate) fn unmute(&mut self, r: Ref) {
        match r {
            Ref::Node(id) => self.node_state_mut(id).muted = false,
            Ref::List(id) => self.list_state_mut(id).muted = false,
        }
    }

    pub(crate) fn attach(&mut self, child: Ref, parent: Parent) {
        self.set_parent(child, parent);
        // From the moment an object has a parent its changes are tracked.
        self.unmute(child);
    }

    /// Single-ownership check for attaching `child` under a node field.
    /// Re-assigning the instance currently held at the very same field is
    /// allowed (it is detached first, then re-attached).
    pub(crate) fn check_field_attach(
        &self,
        child: Ref,
        node: NodeId,
        field: &str,
    ) -> Result<(), TreeError> {
        if let Some(parent) = self.parent_of(child) {
            let same_slot = matches!(
                parent,
                Parent::Field { node: held, field: held_field }
                    if *held == node && held_field == field
            );
            if !same_slot {
                return Err(TreeError::OwnershipViolation(
                    "object already has a parent".to_owned(),
                ));
            }
        }
        self.check_cycle(child, Ref::Node(node))
    }

    /// Single-ownership check for attaching `child` at a collection index.
    pub(crate) fn check_element_attach(
        &self,
        child: Ref,
        list: ListId,
        index: usize,
    ) -> Result<(), TreeError> {
        if let Some(parent) = self.parent_of(child) {
            let same_slot = matches!(parent, Parent::Element { list: held } if *held == list)
                && self.list_state(list).reverse.get(&child.raw()) == Some(&index);
            if !same_slot {
                return Err(TreeError::OwnershipViolation(
                    "object already has a parent".to_owned(),
                ));
            }
        }
        self.check_cycle(child, Ref::List(list))
    }

    fn check_cycle(&self, child: Ref, parent: Ref) -> Result<(), TreeError> {
        if child == parent || self.is_above(child, parent) {
            return Err(TreeError::OwnershipViolation(
                "attaching an object beneath its own descendant".to_owned(),
            ));
        }
        Ok(())
    }

    fn is_above(&self, candidate: Ref, below: Ref) -> bool {
        let mut cur = below;
        while let Some(parent) = self.parent_of(cur) {
            let holder = parent.holder();
            if holder == candidate {
                return true;
            }
            cur = holder;
        }
        false
    }

    /// Validates `value` against `desc` without touching graph structure.
    /// Returns the accepted entry, or `None` for an absent write.
    pub(crate) fn accept(
        &self,
        desc: &FieldDescriptor,
        value: SetValue,
        path: &str,
    ) -> Result<Option<Entry>, TreeError> {
        match (desc, value) {
            (FieldDescriptor::Map { .. }, _) => Err(TreeError::Unsupported("map-typed fields")),
            (_, SetValue::Absent) => Ok(None),
            (FieldDescriptor::Scalar { validator }, SetValue::Scalar(v)) => {
                let v = match validator {
                    Some(check) => check(&v).map_err(|message| TreeError::Validation {
                        path: path.to_owned(),
                        message,
                    })?,
                    None => v,
                };
                Ok(Some(Entry::Scalar(v)))
            }
            (FieldDescriptor::Object { node_type }, SetValue::Node(id)) => {
                let found = &self.node_state(id).type_name;
                if found != node_type {
                    return Err(TreeError::TypeMismatch {
                        path: path.to_owned(),
                        expected: format!("object '{node_type}'"),
                        found: format!("object '{found}'"),
                    });
                }
                Ok(Some(Entry::Node(id)))
            }
            (FieldDescriptor::Collection { element }, SetValue::List(id)) => {
                let held = &self.list_state(id).element;
                if !held.same_shape(element) {
                    return Err(TreeError::TypeMismatch {
                        path: path.to_owned(),
                        expected: desc.describe(),
                        found: format!("collection of {}", held.describe()),
                    });
                }
                Ok(Some(Entry::List(id)))
            }
            (_, value) => Err(TreeError::TypeMismatch {
                path: path.to_owned(),
                expected: desc.describe(),
                found: value.kind_name().to_owned(),
            }),
        }
    }

    /// Walks the parent chain of `from`, marking each ancestor dirty-child.
    /// A field that was since overwritten directly is never re-marked
    /// dirty-child: the direct write supersedes the child's history.
    pub(crate) fn propagate(&mut self, from: Ref) {
        let mut cur = from;
        loop {
            let parent = match self.parent_of(cur) {
                Some(p) => p.clone(),
                None => break,
            };
            match parent {
                Parent::Field { node, field } => {
                    let state = self.node_state_mut(node);
                    if !state.dirty.contains(&field) {
                        state.dirty_children.insert(field);
                    }
                    cur = Ref::Node(node);
                }
                Parent::Element { list } => {
                    let raw = cur.raw();
                    let state = self.list_state_mut(list);
                    state.dirty_children.insert(raw);
                    cur = Ref::List(list);
                }
            }
        }
    }
}
