//! Represent, query and persist field masks.
//!
//! A [`Mask`] is a sparse tree mirroring the shape of an IDL-described
//! value. Each node records which members of one value position are
//! included; codecs consult it member-by-member while reading or writing
//! and skip everything it excludes.
//!
//! Three conventions keep the common cases cheap:
//!
//! * an *absent* mask (see [`MaskRef`]) restricts nothing; every
//!   membership query answers `true`;
//! * a present node with a valid kind and **no children** includes its
//!   whole subtree;
//! * a present node that was never marked by compilation (kind
//!   [`MaskKind::Invalid`]) includes nothing.

pub(crate) mod store;

mod compile;
mod ser;

pub use self::compile::{CompileError, CompileOptions};
pub use self::ser::SerializationError;

use std::convert::TryFrom;
use std::fmt::{self, Display, Formatter};

use crate::descriptor::TypeDescriptor;
use crate::path::{Literal, PathIter, Token};

use self::store::{FieldStore, IntStore, StrStore};

/// Maximum selector nesting accepted by the compiler and the deserializer.
pub const MAX_NESTING_DEPTH: usize = 64;

/// The structural category a mask node applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MaskKind {
    /// Unset. A node of this kind includes nothing.
    Invalid,
    Scalar,
    Struct,
    List,
    Set,
    IntMap,
    StrMap,
}

impl MaskKind {
    /// Tag used by the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            MaskKind::Invalid => "Invalid",
            MaskKind::Scalar => "Scalar",
            MaskKind::Struct => "Struct",
            MaskKind::List => "List",
            MaskKind::Set => "Set",
            MaskKind::IntMap => "IntMap",
            MaskKind::StrMap => "StrMap",
        }
    }

    pub(crate) fn of(descriptor: &TypeDescriptor) -> MaskKind {
        match descriptor {
            TypeDescriptor::Scalar => MaskKind::Scalar,
            TypeDescriptor::Struct(_) => MaskKind::Struct,
            TypeDescriptor::List(_) => MaskKind::List,
            TypeDescriptor::Set(_) => MaskKind::Set,
            TypeDescriptor::IntMap(_) => MaskKind::IntMap,
            TypeDescriptor::StrMap(_) => MaskKind::StrMap,
        }
    }
}

impl Default for MaskKind {
    fn default() -> Self {
        MaskKind::Invalid
    }
}

impl Display for MaskKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key under which a child sits, as reported by [`Mask::for_each_child`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChildKey<'m> {
    /// Struct field ID, list/set index, or integer map key.
    Int(i64),
    /// String map key.
    Str(&'m str),
}

/// The key flavor a bracket group addresses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum KeyDomain {
    /// `[...]` over a list or set.
    Index,
    /// `{...}` over an int-keyed map.
    IntKey,
    /// `{...}` over a string-keyed map.
    StrKey,
}

/// One node of a field-mask tree.
///
/// Build one with [`Mask::compile`] (or decode one with
/// [`Mask::unmarshal`]), then answer membership queries with
/// [`field_in_mask`](Mask::field_in_mask) and friends, or walk into
/// children with [`field`](Mask::field), [`elem`](Mask::elem),
/// [`int_entry`](Mask::int_entry) and [`str_entry`](Mask::str_entry).
///
/// Membership queries never allocate and never touch the descriptor;
/// everything they need was fixed at compile time. The one exception is
/// [`get_path`](Mask::get_path), which re-tokenizes a path and so wants
/// the descriptor again.
#[derive(Clone, Debug, Default)]
pub struct Mask {
    kind: MaskKind,
    /// Shared element/value child; presence doubles as the node's
    /// "every key included" flag.
    elem: Option<Box<Mask>>,
    fields: Option<FieldStore>,
    entries: Option<IntStore>,
    keys: Option<StrStore>,
}

impl Mask {
    /// An empty mask: present, kind [`MaskKind::Invalid`], includes
    /// nothing.
    pub fn new() -> Mask {
        Mask::default()
    }

    /// The structural category this node was compiled against.
    pub fn kind(&self) -> MaskKind {
        self.kind
    }

    /// `true` when the node was never marked by compilation; such a node
    /// includes nothing.
    pub fn is_empty(&self) -> bool {
        self.kind == MaskKind::Invalid
    }

    pub(crate) fn exists(&self) -> bool {
        self.kind != MaskKind::Invalid
    }

    /// A wildcard marking covering every key of this node.
    fn all(&self) -> bool {
        self.elem.as_deref().map_or(false, Mask::exists)
    }

    /// No non-empty children of any flavor. A node that exists and has no
    /// children stands for its whole subtree.
    pub(crate) fn no_children(&self) -> bool {
        self.elem.as_deref().map_or(true, Mask::is_empty)
            && self.fields.as_ref().map_or(true, FieldStore::is_empty)
            && self.entries.as_ref().map_or(true, IntStore::is_empty)
            && self.keys.as_ref().map_or(true, StrStore::is_empty)
    }

    /// Whether struct field `id` is included.
    pub fn field_in_mask(&self, id: i32) -> bool {
        if !self.exists() {
            return false;
        }
        if self.all() || self.no_children() {
            return true;
        }
        self.fields
            .as_ref()
            .and_then(|fields| fields.get(id))
            .map_or(false, Mask::exists)
    }

    /// Whether the list/set index or integer map key `key` is included.
    pub fn int_in_mask(&self, key: i64) -> bool {
        if !self.exists() {
            return false;
        }
        if self.all() || self.no_children() {
            return true;
        }
        self.entries
            .as_ref()
            .and_then(|entries| entries.get(key))
            .map_or(false, Mask::exists)
    }

    /// Whether the string map key `key` is included.
    pub fn str_in_mask(&self, key: &str) -> bool {
        if !self.exists() {
            return false;
        }
        if self.all() || self.no_children() {
            return true;
        }
        self.keys
            .as_ref()
            .and_then(|keys| keys.get(key))
            .map_or(false, Mask::exists)
    }

    /// The child mask for struct field `id`.
    ///
    /// `None` means no dedicated child exists: either the field is
    /// excluded, or this node is terminal and the whole subtree is
    /// included. Check [`field_in_mask`](Mask::field_in_mask) first when
    /// the distinction matters; [`MaskRef::field`] folds the two into the
    /// nil-safe convention.
    pub fn field(&self, id: i32) -> Option<&Mask> {
        self.fields
            .as_ref()
            .and_then(|fields| fields.get(id))
            .filter(|child| child.exists())
    }

    /// The shared element/value child installed by a wildcard selector.
    pub fn elem(&self) -> Option<&Mask> {
        self.elem.as_deref().filter(|child| child.exists())
    }

    /// The child mask for a list/set index or integer map key: the
    /// explicit entry when one exists, the shared element child otherwise.
    pub fn int_entry(&self, key: i64) -> Option<&Mask> {
        self.entries
            .as_ref()
            .and_then(|entries| entries.get(key))
            .filter(|child| child.exists())
            .or_else(|| self.elem())
    }

    /// The child mask for a string map key, with the same fallback as
    /// [`int_entry`](Mask::int_entry).
    pub fn str_entry(&self, key: &str) -> Option<&Mask> {
        self.keys
            .as_ref()
            .and_then(|keys| keys.get(key))
            .filter(|child| child.exists())
            .or_else(|| self.elem())
    }

    /// Visit every explicitly keyed child: struct fields, then explicit
    /// indices/int keys, then string keys. The shared element child is not
    /// enumerated; it has no key.
    ///
    /// The visitor returns `false` to stop early; `for_each_child`
    /// reports whether the walk ran to completion.
    pub fn for_each_child<F>(&self, mut visit: F) -> bool
    where
        F: FnMut(ChildKey<'_>, &Mask) -> bool,
    {
        if let Some(fields) = &self.fields {
            for (id, child) in fields.iter() {
                if child.exists() && !visit(ChildKey::Int(i64::from(id)), child) {
                    return false;
                }
            }
        }
        if let Some(entries) = &self.entries {
            for (key, child) in entries.iter() {
                if child.exists() && !visit(ChildKey::Int(key), child) {
                    return false;
                }
            }
        }
        if let Some(keys) = &self.keys {
            for (key, child) in keys.iter() {
                if child.exists() && !visit(ChildKey::Str(key), child) {
                    return false;
                }
            }
        }
        true
    }

    /// Resolve the node addressed by `path`, re-tokenizing it against
    /// `descriptor`.
    ///
    /// `None` means the path is malformed, does not fit the descriptor, or
    /// addresses an excluded member. A path that descends *through* a
    /// terminal node resolves to that terminal node; the remainder is
    /// still validated against the descriptor. Intended for introspection
    /// and tests; per-member codec queries should use the predicates.
    pub fn get_path<'m>(&'m self, descriptor: &TypeDescriptor, path: &str) -> Option<&'m Mask> {
        let mut iter = PathIter::new(path);
        let head = match iter.next_token().ok()? {
            Token::Root => iter.next_token().ok()?,
            token @ Token::Lit(_) => token,
            _ => return None,
        };
        self.resolve(descriptor, head, &mut iter, 0)
    }

    /// `get_path(..).is_some()`.
    pub fn path_in_mask(&self, descriptor: &TypeDescriptor, path: &str) -> bool {
        self.get_path(descriptor, path).is_some()
    }

    /// Apply one already-read token at `self` and keep descending.
    fn resolve<'m>(
        &'m self,
        descriptor: &TypeDescriptor,
        token: Token<'_>,
        iter: &mut PathIter<'_>,
        depth: usize,
    ) -> Option<&'m Mask> {
        if depth > MAX_NESTING_DEPTH || !self.exists() {
            return None;
        }
        if token == Token::End {
            return Some(self);
        }
        if self.no_children() {
            // Terminal: everything below is included, but the remainder
            // must still name something the descriptor has.
            return if compile::validate(descriptor, token, iter, depth, depth == 0) {
                Some(self)
            } else {
                None
            };
        }
        match token {
            Token::Field => match iter.next_token().ok()? {
                Token::Lit(lit) => self.field_hop(descriptor, &lit, iter, depth),
                _ => None,
            },
            // Legacy paths start with a bare field literal.
            Token::Lit(lit) if depth == 0 => self.field_hop(descriptor, &lit, iter, depth),
            Token::IndexOpen => self.group_hop(descriptor, iter, depth, KeyDomain::Index),
            Token::MapOpen => {
                let domain = match descriptor {
                    TypeDescriptor::IntMap(_) => KeyDomain::IntKey,
                    TypeDescriptor::StrMap(_) => KeyDomain::StrKey,
                    _ => return None,
                };
                self.group_hop(descriptor, iter, depth, domain)
            }
            _ => None,
        }
    }

    fn field_hop<'m>(
        &'m self,
        descriptor: &TypeDescriptor,
        lit: &Literal<'_>,
        iter: &mut PathIter<'_>,
        depth: usize,
    ) -> Option<&'m Mask> {
        let strukt = descriptor.as_struct()?;
        let field = match lit {
            Literal::Int(id) => i32::try_from(*id).ok().and_then(|id| strukt.field_by_id(id))?,
            Literal::Str(name) => strukt.field_by_name(name)?,
        };
        let child = self.field(field.id())?;
        let token = iter.next_token().ok()?;
        child.resolve(field.ty(), token, iter, depth + 1)
    }

    fn group_hop<'m>(
        &'m self,
        descriptor: &TypeDescriptor,
        iter: &mut PathIter<'_>,
        depth: usize,
        domain: KeyDomain,
    ) -> Option<&'m Mask> {
        let (value_ty, closer) = match domain {
            KeyDomain::Index => (descriptor.elem_type()?, Token::IndexClose),
            KeyDomain::IntKey | KeyDomain::StrKey => {
                (descriptor.value_type()?, Token::MapClose)
            }
        };
        let mut siblings = Vec::new();
        match iter.next_token().ok()? {
            Token::Any => {
                if iter.next_token().ok()? != closer {
                    return None;
                }
                let child = self.elem()?;
                let token = iter.next_token().ok()?;
                return child.resolve(value_ty, token, iter, depth + 1);
            }
            Token::Lit(lit) => siblings.push(lit),
            _ => return None,
        }
        loop {
            let token = iter.next_token().ok()?;
            if token == closer {
                break;
            }
            match token {
                Token::Elem => match iter.next_token().ok()? {
                    Token::Lit(lit) => siblings.push(lit),
                    _ => return None,
                },
                _ => return None,
            }
        }
        // Every sibling branch must resolve; report the first one's node.
        let after = iter.clone();
        let mut found: Option<&Mask> = None;
        for lit in &siblings {
            let child = match (domain, lit) {
                (KeyDomain::Index, Literal::Int(key))
                | (KeyDomain::IntKey, Literal::Int(key)) => self.int_entry(*key)?,
                (KeyDomain::StrKey, Literal::Str(key)) => self.str_entry(key)?,
                _ => return None,
            };
            let mut branch = after.clone();
            let token = branch.next_token().ok()?;
            let node = child.resolve(value_ty, token, &mut branch, depth + 1)?;
            found.get_or_insert(node);
        }
        found
    }

    pub(crate) fn fields_mut(&mut self) -> &mut FieldStore {
        self.fields.get_or_insert_with(FieldStore::default)
    }

    pub(crate) fn entries_mut(&mut self) -> &mut IntStore {
        self.entries.get_or_insert_with(IntStore::default)
    }

    pub(crate) fn keys_mut(&mut self) -> &mut StrStore {
        self.keys.get_or_insert_with(StrStore::default)
    }

    pub(crate) fn elem_mut(&mut self) -> &mut Mask {
        self.elem.get_or_insert_with(|| Box::new(Mask::new()))
    }

    /// Make this node terminal: keep the kind, drop all children.
    pub(crate) fn make_terminal(&mut self) {
        self.elem = None;
        if let Some(fields) = &mut self.fields {
            fields.clear();
        }
        if let Some(entries) = &mut self.entries {
            entries.clear();
        }
        if let Some(keys) = &mut self.keys {
            keys.clear();
        }
    }

    /// Shallow reset to the zeroed state; stores keep their capacity.
    pub(crate) fn reset(&mut self) {
        self.kind = MaskKind::Invalid;
        self.elem = None;
        if let Some(fields) = &mut self.fields {
            fields.clear();
        }
        if let Some(entries) = &mut self.entries {
            entries.clear();
        }
        if let Some(keys) = &mut self.keys {
            keys.clear();
        }
    }

    /// Detach every child, feeding each into `sink`.
    pub(crate) fn detach_children<F: FnMut(Box<Mask>)>(&mut self, sink: &mut F) {
        if let Some(elem) = self.elem.take() {
            sink(elem);
        }
        if let Some(fields) = &mut self.fields {
            fields.drain(sink);
        }
        if let Some(entries) = &mut self.entries {
            entries.drain(sink);
        }
        if let Some(keys) = &mut self.keys {
            keys.drain(sink);
        }
    }
}

/// A possibly-absent borrow of a mask.
///
/// Codecs hold masks this way: an absent mask restricts nothing, so every
/// membership query on an absent `MaskRef` answers `true`, and child
/// accessors propagate the absence. Generated read/write loops can
/// therefore query unconditionally instead of branching on an `Option` at
/// every member.
///
/// # Example
///
/// ```
/// use fieldmask::MaskRef;
///
/// let unrestricted = MaskRef::unrestricted();
/// assert!(unrestricted.field_in_mask(42));
/// assert!(unrestricted.field(42).str_in_mask("anything"));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct MaskRef<'m>(Option<&'m Mask>);

impl<'m> MaskRef<'m> {
    /// The absent mask: every membership query answers `true`.
    pub const fn unrestricted() -> Self {
        MaskRef(None)
    }

    /// The underlying node, when one is attached.
    pub fn get(self) -> Option<&'m Mask> {
        self.0
    }

    pub fn field_in_mask(self, id: i32) -> bool {
        self.0.map_or(true, |mask| mask.field_in_mask(id))
    }

    pub fn int_in_mask(self, key: i64) -> bool {
        self.0.map_or(true, |mask| mask.int_in_mask(key))
    }

    pub fn str_in_mask(self, key: &str) -> bool {
        self.0.map_or(true, |mask| mask.str_in_mask(key))
    }

    /// The mask to carry into struct field `id`. Absent stays absent;
    /// included-without-detail (a terminal parent) also comes back absent,
    /// which is exactly "no further restriction below this point".
    pub fn field(self, id: i32) -> MaskRef<'m> {
        MaskRef(self.0.and_then(|mask| mask.field(id)))
    }

    /// The mask to carry into list/set elements selected by a wildcard.
    pub fn elem(self) -> MaskRef<'m> {
        MaskRef(self.0.and_then(Mask::elem))
    }

    /// The mask to carry into a list/set index or integer map key.
    pub fn int_entry(self, key: i64) -> MaskRef<'m> {
        MaskRef(self.0.and_then(|mask| mask.int_entry(key)))
    }

    /// The mask to carry into a string map key.
    pub fn str_entry(self, key: &str) -> MaskRef<'m> {
        MaskRef(self.0.and_then(|mask| mask.str_entry(key)))
    }
}

impl<'m> From<&'m Mask> for MaskRef<'m> {
    fn from(mask: &'m Mask) -> Self {
        MaskRef(Some(mask))
    }
}

impl<'m> From<Option<&'m Mask>> for MaskRef<'m> {
    fn from(mask: Option<&'m Mask>) -> Self {
        MaskRef(mask)
    }
}
