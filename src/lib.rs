//! Field masks for IDL-described structured values.
//!
//! A mask selects a subset of the fields, elements and keys of a deeply
//! nested value. Codecs consult it member-by-member while reading or
//! writing and skip everything it excludes; masks are compiled once from
//! compact path strings against read-only structural descriptors supplied
//! by the surrounding IDL toolchain, and the per-member membership checks
//! then run without parsing, hashing whole paths, or allocating.
//!
//! Paths come in two forms. The extended form anchors at the root and can
//! address struct fields, list/set indices, map keys, wildcards and
//! sibling lists:
//!
//! ```text
//! $.TrafficEnv.Open
//! $.Extra[0]
//! $.Extra[*].StrMap{"key1","key2"}
//! ```
//!
//! The legacy form dots straight through struct fields
//! (`TrafficEnv.Open`) and compiles to exactly the same tree.
//!
//! # Example
//!
//! ```
//! use fieldmask::{FieldDescriptor, Mask, MaskRef, StructDescriptor, TypeDescriptor};
//!
//! # fn demo() -> Result<(), fieldmask::CompileError> {
//! let base = TypeDescriptor::struct_(StructDescriptor::new(
//!     "base.Base",
//!     vec![
//!         FieldDescriptor::new(1, "LogID", TypeDescriptor::Scalar),
//!         FieldDescriptor::new(3, "Caller", TypeDescriptor::Scalar),
//!     ],
//! ));
//!
//! let mask = Mask::compile(&base, &["$.LogID"])?;
//! assert!(mask.field_in_mask(1));
//! assert!(!mask.field_in_mask(3));
//!
//! // Codecs hold masks through `MaskRef`: absent means unrestricted.
//! let unrestricted = MaskRef::unrestricted();
//! assert!(unrestricted.field_in_mask(3));
//! # Ok(())
//! # }
//! # demo().unwrap();
//! ```

pub mod descriptor;
pub mod mask;
pub mod path;
pub mod pool;
pub mod registry;

#[doc(inline)]
pub use crate::descriptor::{FieldDescriptor, StructDescriptor, TypeDescriptor};
#[doc(inline)]
pub use crate::mask::{
    ChildKey, CompileError, CompileOptions, Mask, MaskKind, MaskRef, SerializationError,
    MAX_NESTING_DEPTH,
};
#[doc(inline)]
pub use crate::path::{PathError, PathIter};
#[doc(inline)]
pub use crate::pool::Pool;
#[doc(inline)]
pub use crate::registry::Registry;
