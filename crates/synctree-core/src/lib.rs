//! Core primitives for synctree.
//!
//! A typed, hierarchical object graph (scalars, nested nodes, ordered
//! collections) that tracks every mutation and can produce a minimal patch
//! describing what changed since the last drain. A second, structurally
//! identical replica applies the patch and converges to the same state.

pub mod collection;
pub mod error;
pub mod events;
pub mod node;
pub mod patch;
pub mod schema;
pub mod snapshot;
pub mod store;

pub use error::TreeError;
pub use events::{Event, ListenerId, Selector};
pub use patch::{apply_patch, decode_patch, encode_patch, generate_patch, PatchOp, PathKey};
pub use schema::{FieldDescriptor, NodeSchema, SchemaRegistry};
pub use store::{Entry, ListId, NodeId, Ref, SetValue, Store};

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
