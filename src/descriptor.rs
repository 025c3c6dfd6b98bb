//! Structural metadata describing the shape of IDL values.
//!
//! Descriptors are produced by the surrounding IDL-reflection layer (and by
//! test fixtures) and consumed read-only by the mask compiler; this crate
//! never builds them on its own behalf. They are cheap to clone, since
//! nested shapes are shared behind [`Arc`]s.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// The structural category of a value position, plus the nested shape(s)
/// needed to keep resolving a path below it.
#[derive(Clone, Debug)]
pub enum TypeDescriptor {
    /// A leaf value with no addressable members.
    Scalar,

    /// A struct whose fields are addressed by numeric ID or by name.
    Struct(Arc<StructDescriptor>),

    /// A list of one element shape, addressed by index.
    List(Arc<TypeDescriptor>),

    /// A set of one element shape, addressed by index.
    Set(Arc<TypeDescriptor>),

    /// A map with integer keys and one value shape.
    IntMap(Arc<TypeDescriptor>),

    /// A map with string keys and one value shape.
    StrMap(Arc<TypeDescriptor>),
}

impl TypeDescriptor {
    /// A struct shape.
    pub fn struct_(descriptor: StructDescriptor) -> Self {
        TypeDescriptor::Struct(Arc::new(descriptor))
    }

    /// A list of `elem`.
    pub fn list(elem: TypeDescriptor) -> Self {
        TypeDescriptor::List(Arc::new(elem))
    }

    /// A set of `elem`.
    pub fn set(elem: TypeDescriptor) -> Self {
        TypeDescriptor::Set(Arc::new(elem))
    }

    /// An integer-keyed map of `value`.
    pub fn int_map(value: TypeDescriptor) -> Self {
        TypeDescriptor::IntMap(Arc::new(value))
    }

    /// A string-keyed map of `value`.
    pub fn str_map(value: TypeDescriptor) -> Self {
        TypeDescriptor::StrMap(Arc::new(value))
    }

    /// The struct descriptor, if this is a struct shape.
    pub fn as_struct(&self) -> Option<&StructDescriptor> {
        match self {
            TypeDescriptor::Struct(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    /// The element shape of a list or set.
    pub fn elem_type(&self) -> Option<&TypeDescriptor> {
        match self {
            TypeDescriptor::List(elem) | TypeDescriptor::Set(elem) => Some(elem),
            _ => None,
        }
    }

    /// The value shape of an int- or string-keyed map.
    pub fn value_type(&self) -> Option<&TypeDescriptor> {
        match self {
            TypeDescriptor::IntMap(value) | TypeDescriptor::StrMap(value) => Some(value),
            _ => None,
        }
    }
}

impl Display for TypeDescriptor {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TypeDescriptor::Scalar => f.write_str("scalar"),
            TypeDescriptor::Struct(descriptor) => write!(f, "struct `{}`", descriptor.name()),
            TypeDescriptor::List(_) => f.write_str("list"),
            TypeDescriptor::Set(_) => f.write_str("set"),
            TypeDescriptor::IntMap(_) => f.write_str("int-keyed map"),
            TypeDescriptor::StrMap(_) => f.write_str("string-keyed map"),
        }
    }
}

/// A struct shape: a qualified name plus fields indexed by ID and by name.
#[derive(Debug)]
pub struct StructDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<i32, usize>,
}

impl StructDescriptor {
    /// Build a struct descriptor from its fields.
    ///
    /// The qualified `name` doubles as the struct's identity in the
    /// [`Registry`](crate::Registry); the IDL layer owns its uniqueness
    /// within a process.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        let mut by_name = HashMap::with_capacity(fields.len());
        let mut by_id = HashMap::with_capacity(fields.len());
        for (at, field) in fields.iter().enumerate() {
            by_name.insert(field.name.clone(), at);
            by_id.insert(field.id, at);
        }
        StructDescriptor {
            name: name.into(),
            fields,
            by_name,
            by_id,
        }
    }

    /// The struct's fully qualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All fields, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Resolve a field by its declared name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|&at| &self.fields[at])
    }

    /// Resolve a field by its numeric ID.
    pub fn field_by_id(&self, id: i32) -> Option<&FieldDescriptor> {
        self.by_id.get(&id).map(|&at| &self.fields[at])
    }
}

/// One struct field: numeric ID, name and declared shape.
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    id: i32,
    name: String,
    ty: TypeDescriptor,
}

impl FieldDescriptor {
    pub fn new(id: i32, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        FieldDescriptor {
            id,
            name: name.into(),
            ty,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }
}
