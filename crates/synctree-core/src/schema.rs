//! Field descriptors and the per-type schema registry.
//!
//! Descriptors are static metadata: per node type, each field's kind (scalar,
//! nested object, collection of a uniform element) and, for scalars, an
//! optional validator. They are the single source of truth consulted by
//! `set`, serialization, and patch application alike.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::TreeError;

/// Scalar validator capability: receives the candidate value and returns the
/// accepted (possibly normalized) value, or a rejection message.
pub type Validator = dyn Fn(&Value) -> Result<Value, String> + Send + Sync;

#[derive(Clone)]
pub enum FieldDescriptor {
    Scalar {
        validator: Option<Arc<Validator>>,
    },
    Object {
        node_type: String,
    },
    Collection {
        element: Box<FieldDescriptor>,
    },
    /// Declared for wire completeness; every operation touching a map-typed
    /// field fails with [`TreeError::Unsupported`].
    Map {
        element: Box<FieldDescriptor>,
    },
}

impl FieldDescriptor {
    pub fn scalar() -> Self {
        FieldDescriptor::Scalar { validator: None }
    }

    pub fn scalar_with<F>(validator: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        FieldDescriptor::Scalar {
            validator: Some(Arc::new(validator)),
        }
    }

    pub fn object(node_type: impl Into<String>) -> Self {
        FieldDescriptor::Object {
            node_type: node_type.into(),
        }
    }

    pub fn collection(element: FieldDescriptor) -> Self {
        FieldDescriptor::Collection {
            element: Box::new(element),
        }
    }

    pub fn map(element: FieldDescriptor) -> Self {
        FieldDescriptor::Map {
            element: Box::new(element),
        }
    }

    /// Structural compatibility, ignoring validators (closures have no
    /// useful equality).
    pub fn same_shape(&self, other: &FieldDescriptor) -> bool {
        match (self, other) {
            (FieldDescriptor::Scalar { .. }, FieldDescriptor::Scalar { .. }) => true,
            (
                FieldDescriptor::Object { node_type: a },
                FieldDescriptor::Object { node_type: b },
            ) => a == b,
            (
                FieldDescriptor::Collection { element: a },
                FieldDescriptor::Collection { element: b },
            )
            | (FieldDescriptor::Map { element: a }, FieldDescriptor::Map { element: b }) => {
                a.same_shape(b)
            }
            _ => false,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FieldDescriptor::Scalar { .. } => "scalar".to_owned(),
            FieldDescriptor::Object { node_type } => format!("object '{node_type}'"),
            FieldDescriptor::Collection { element } => {
                format!("collection of {}", element.describe())
            }
            FieldDescriptor::Map { element } => format!("map of {}", element.describe()),
        }
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDescriptor::Scalar { validator } => f
                .debug_struct("Scalar")
                .field("validator", &validator.is_some())
                .finish(),
            FieldDescriptor::Object { node_type } => {
                f.debug_struct("Object").field("node_type", node_type).finish()
            }
            FieldDescriptor::Collection { element } => {
                f.debug_struct("Collection").field("element", element).finish()
            }
            FieldDescriptor::Map { element } => {
                f.debug_struct("Map").field("element", element).finish()
            }
        }
    }
}

/// Ordered field table for one node type. Declaration order drives snapshot
/// and patch iteration.
#[derive(Debug, Clone, Default)]
pub struct NodeSchema {
    fields: IndexMap<String, FieldDescriptor>,
}

impl NodeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(name.into(), descriptor);
        self
    }

    pub fn descriptor(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Registry of node-type schemas, populated once via explicit registration
/// calls before first use and treated as read-only afterwards.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    types: IndexMap<String, Arc<NodeSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: impl Into<String>, schema: NodeSchema) -> &mut Self {
        self.types.insert(type_name.into(), Arc::new(schema));
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn schema(&self, type_name: &str) -> Result<Arc<NodeSchema>, TreeError> {
        self.types
            .get(type_name)
            .cloned()
            .ok_or_else(|| TreeError::SchemaMissing(format!("type '{type_name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_shape_ignores_validators() {
        let plain = FieldDescriptor::scalar();
        let checked = FieldDescriptor::scalar_with(|v| {
            v.as_str()
                .map(|_| v.clone())
                .ok_or_else(|| "expected a string".to_owned())
        });
        assert!(plain.same_shape(&checked));
        assert!(!plain.same_shape(&FieldDescriptor::object("Inner")));

        let strings = FieldDescriptor::collection(FieldDescriptor::scalar());
        let inners = FieldDescriptor::collection(FieldDescriptor::object("Inner"));
        assert!(!strings.same_shape(&inners));
        assert!(inners.same_shape(&FieldDescriptor::collection(FieldDescriptor::object("Inner"))));
    }

    #[test]
    fn validator_normalizes_value() {
        let upper = FieldDescriptor::scalar_with(|v| match v.as_str() {
            Some(s) => Ok(json!(s.to_uppercase())),
            None => Err("expected a string".to_owned()),
        });
        let FieldDescriptor::Scalar { validator: Some(f) } = &upper else {
            panic!("expected a scalar descriptor with validator");
        };
        assert_eq!(f(&json!("abc")).expect("valid input"), json!("ABC"));
        assert!(f(&json!(3)).is_err());
    }

    #[test]
    fn unregistered_type_is_schema_missing() {
        let registry = SchemaRegistry::new();
        let err = registry.schema("Missing").expect_err("lookup must fail");
        assert!(matches!(err, TreeError::SchemaMissing(_)));
    }
}
