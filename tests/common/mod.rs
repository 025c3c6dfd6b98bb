//! Descriptor fixtures shared by the integration tests, mirroring the
//! smoke-test IDL of the surrounding toolchain:
//!
//! ```text
//! struct Base {
//!     1: LogID        (scalar)
//!     2: TrafficEnv   (struct)
//!     3: Caller       (scalar)
//!     4: Addr         (scalar)
//!     5: Extra        (list<ExtraInfo>)
//! }
//! struct TrafficEnv { 1: Open, 2: Env, 3: Name, 4: Code }
//! struct ExtraInfo {
//!     1: IntMap (map<i64, InnerBase>)
//!     2: StrMap (map<string, InnerBase>)
//!     3: List   (list<InnerBase>)
//!     4: Set    (set<InnerBase>)
//!     5: Name   (scalar)
//! }
//! struct InnerBase { 1: A, 2: B }
//! ```

use fieldmask::{FieldDescriptor, StructDescriptor, TypeDescriptor};

pub fn inner_base() -> TypeDescriptor {
    TypeDescriptor::struct_(StructDescriptor::new(
        "base.InnerBase",
        vec![
            FieldDescriptor::new(1, "A", TypeDescriptor::Scalar),
            FieldDescriptor::new(2, "B", TypeDescriptor::Scalar),
        ],
    ))
}

pub fn extra_info() -> TypeDescriptor {
    let inner = inner_base();
    TypeDescriptor::struct_(StructDescriptor::new(
        "base.ExtraInfo",
        vec![
            FieldDescriptor::new(1, "IntMap", TypeDescriptor::int_map(inner.clone())),
            FieldDescriptor::new(2, "StrMap", TypeDescriptor::str_map(inner.clone())),
            FieldDescriptor::new(3, "List", TypeDescriptor::list(inner.clone())),
            FieldDescriptor::new(4, "Set", TypeDescriptor::set(inner)),
            FieldDescriptor::new(5, "Name", TypeDescriptor::Scalar),
        ],
    ))
}

pub fn traffic_env() -> TypeDescriptor {
    TypeDescriptor::struct_(StructDescriptor::new(
        "base.TrafficEnv",
        vec![
            FieldDescriptor::new(1, "Open", TypeDescriptor::Scalar),
            FieldDescriptor::new(2, "Env", TypeDescriptor::Scalar),
            FieldDescriptor::new(3, "Name", TypeDescriptor::Scalar),
            FieldDescriptor::new(4, "Code", TypeDescriptor::Scalar),
        ],
    ))
}

pub fn base() -> TypeDescriptor {
    TypeDescriptor::struct_(StructDescriptor::new(
        "base.Base",
        vec![
            FieldDescriptor::new(1, "LogID", TypeDescriptor::Scalar),
            FieldDescriptor::new(2, "TrafficEnv", traffic_env()),
            FieldDescriptor::new(3, "Caller", TypeDescriptor::Scalar),
            FieldDescriptor::new(4, "Addr", TypeDescriptor::Scalar),
            FieldDescriptor::new(5, "Extra", TypeDescriptor::list(extra_info())),
        ],
    ))
}
