//! Compile path strings into a mask tree.
//!
//! Compilation is the only place paths are parsed and the only place
//! descriptors are consulted; the tree it produces answers queries with no
//! further reference to either. Compiling several paths (in one call or
//! across [`Mask::extend`] calls) unions them: a broader selection
//! absorbs a narrower one, whichever arrives first.

use std::borrow::Cow;
use std::convert::TryFrom;

use log::debug;
use thiserror::Error;

use crate::descriptor::{FieldDescriptor, StructDescriptor, TypeDescriptor};
use crate::path::{Literal, PathError, PathIter, Token};

use super::{KeyDomain, Mask, MaskKind, MAX_NESTING_DEPTH};

/// Tunables for compilation.
#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Selector nesting accepted before [`CompileError::DepthExceeded`].
    pub max_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            max_depth: MAX_NESTING_DEPTH,
        }
    }
}

/// Errors raised while compiling paths against a descriptor.
///
/// Compilation fails fast: the first bad path aborts the batch, and the
/// tree under construction is in an unspecified partial state and must be
/// discarded.
#[derive(Error, Debug)]
pub enum CompileError {
    /// The tokenizer rejected the path.
    #[error(transparent)]
    Path(#[from] PathError),

    /// The token stream violates the selector grammar.
    #[error("syntax error in `{path}`: {detail}")]
    Syntax { path: String, detail: String },

    /// A field selector names a field the struct does not declare.
    #[error("unknown field `{field}` on `{owner}` in `{path}`")]
    UnknownField {
        path: String,
        owner: String,
        field: String,
    },

    /// A selector does not fit the descriptor's structural category.
    #[error("type mismatch in `{path}`: {detail}")]
    TypeMismatch { path: String, detail: String },

    /// A map key literal of the wrong lexical kind for the map.
    #[error("map key mismatch in `{path}`: {detail}")]
    MapKeyType { path: String, detail: String },

    /// Selector nesting exceeded the configured bound.
    #[error("path `{path}` exceeds the nesting limit of {limit}")]
    DepthExceeded { path: String, limit: usize },
}

fn syntax(path: &str, detail: impl Into<String>) -> CompileError {
    CompileError::Syntax {
        path: path.to_owned(),
        detail: detail.into(),
    }
}

fn type_mismatch(path: &str, detail: impl Into<String>) -> CompileError {
    CompileError::TypeMismatch {
        path: path.to_owned(),
        detail: detail.into(),
    }
}

impl Mask {
    /// Compile `paths` against `descriptor` into a fresh mask.
    ///
    /// An empty `paths` produces an explicitly empty mask: present, but
    /// including nothing. That is the opposite of *absent*: attach no mask
    /// at all (see [`MaskRef`](crate::MaskRef)) to include everything.
    ///
    /// # Example
    ///
    /// ```
    /// use fieldmask::{FieldDescriptor, Mask, StructDescriptor, TypeDescriptor};
    ///
    /// # fn demo() -> Result<(), fieldmask::CompileError> {
    /// let base = TypeDescriptor::struct_(StructDescriptor::new(
    ///     "demo.Base",
    ///     vec![
    ///         FieldDescriptor::new(1, "LogID", TypeDescriptor::Scalar),
    ///         FieldDescriptor::new(3, "Caller", TypeDescriptor::Scalar),
    ///     ],
    /// ));
    /// let mask = Mask::compile(&base, &["$.LogID"])?;
    /// assert!(mask.field_in_mask(1));
    /// assert!(!mask.field_in_mask(3));
    /// # Ok(())
    /// # }
    /// # demo().unwrap();
    /// ```
    pub fn compile<S: AsRef<str>>(
        descriptor: &TypeDescriptor,
        paths: &[S],
    ) -> Result<Mask, CompileError> {
        Mask::compile_with(descriptor, paths, &CompileOptions::default())
    }

    /// [`Mask::compile`] with explicit options.
    pub fn compile_with<S: AsRef<str>>(
        descriptor: &TypeDescriptor,
        paths: &[S],
        options: &CompileOptions,
    ) -> Result<Mask, CompileError> {
        let mut mask = Mask::new();
        mask.extend_with(descriptor, paths, options)?;
        Ok(mask)
    }

    /// Union additional paths into an existing tree.
    ///
    /// Existing branches are preserved: a new path only deepens or widens
    /// the selection, and a branch that is already terminal absorbs any
    /// narrower path (which is still fully validated). `descriptor` must be
    /// the same root shape the tree was first compiled against.
    pub fn extend<S: AsRef<str>>(
        &mut self,
        descriptor: &TypeDescriptor,
        paths: &[S],
    ) -> Result<(), CompileError> {
        self.extend_with(descriptor, paths, &CompileOptions::default())
    }

    /// [`Mask::extend`] with explicit options.
    pub fn extend_with<S: AsRef<str>>(
        &mut self,
        descriptor: &TypeDescriptor,
        paths: &[S],
        options: &CompileOptions,
    ) -> Result<(), CompileError> {
        for path in paths {
            compile_one(self, descriptor, path.as_ref(), options)?;
        }
        debug!("compiled {} path(s) against {}", paths.len(), descriptor);
        Ok(())
    }
}

fn compile_one(
    root: &mut Mask,
    descriptor: &TypeDescriptor,
    path: &str,
    options: &CompileOptions,
) -> Result<(), CompileError> {
    let mut iter = PathIter::new(path);
    match iter.next_token()? {
        // The tokenizer guarantees a selector follows the anchor.
        Token::Root => descend(Some(root), descriptor, &mut iter, 0, options),
        // Legacy form: the leading literal is itself a field selector.
        Token::Lit(lit) => {
            let frozen = root.exists() && root.no_children();
            arrive(root, descriptor, path)?;
            let node = if frozen { None } else { Some(root) };
            field_step(node, descriptor, lit, &mut iter, 0, options)
        }
        Token::End => Err(syntax(path, "empty path")),
        other => Err(syntax(path, format!("a path cannot start with {}", other))),
    }
}

/// Mark the node the walk arrived at with the descriptor's category.
fn arrive(node: &mut Mask, descriptor: &TypeDescriptor, path: &str) -> Result<(), CompileError> {
    let kind = MaskKind::of(descriptor);
    if node.exists() && node.kind != kind {
        return Err(type_mismatch(
            path,
            format!("mask node is {} but the descriptor says {}", node.kind, descriptor),
        ));
    }
    node.kind = kind;
    Ok(())
}

/// Continue compilation at `node`, whose selector has not been read yet.
///
/// `node == None` validates the remaining path without recording anything;
/// that is how narrower paths are checked under an already-terminal branch.
fn descend(
    mut node: Option<&mut Mask>,
    descriptor: &TypeDescriptor,
    iter: &mut PathIter<'_>,
    depth: usize,
    options: &CompileOptions,
) -> Result<(), CompileError> {
    if depth > options.max_depth {
        return Err(CompileError::DepthExceeded {
            path: iter.path().to_owned(),
            limit: options.max_depth,
        });
    }
    let frozen = match node.as_deref_mut() {
        Some(node) => {
            let frozen = node.exists() && node.no_children();
            arrive(node, descriptor, iter.path())?;
            frozen
        }
        None => false,
    };
    match iter.next_token()? {
        Token::End => {
            // Path ends here: the whole subtree is included. Narrower
            // sibling branches recorded earlier are superseded.
            if let Some(node) = node {
                node.make_terminal();
            }
            Ok(())
        }
        token => apply(if frozen { None } else { node }, descriptor, token, iter, depth, options),
    }
}

/// Apply one already-read selector token at `node`.
fn apply(
    node: Option<&mut Mask>,
    descriptor: &TypeDescriptor,
    token: Token<'_>,
    iter: &mut PathIter<'_>,
    depth: usize,
    options: &CompileOptions,
) -> Result<(), CompileError> {
    match token {
        Token::Field => match iter.next_token()? {
            Token::Lit(lit) => field_step(node, descriptor, lit, iter, depth, options),
            Token::Any => {
                // `.*` selects every field whole; nothing can follow it.
                if descriptor.as_struct().is_none() {
                    return Err(type_mismatch(
                        iter.path(),
                        format!("field selector against {}", descriptor),
                    ));
                }
                match iter.next_token()? {
                    Token::End => {
                        if let Some(node) = node {
                            node.make_terminal();
                        }
                        Ok(())
                    }
                    _ => Err(syntax(
                        iter.path(),
                        "a field wildcard must end the path",
                    )),
                }
            }
            other => Err(syntax(
                iter.path(),
                format!("expected a field name after `.`, found {}", other),
            )),
        },
        Token::IndexOpen => group(node, descriptor, iter, depth, options, false),
        Token::MapOpen => group(node, descriptor, iter, depth, options, true),
        Token::Elem => Err(syntax(iter.path(), "`,` outside a bracket group")),
        Token::IndexClose => Err(syntax(iter.path(), "unmatched `]`")),
        Token::MapClose => Err(syntax(iter.path(), "unmatched `}`")),
        Token::Any => Err(syntax(iter.path(), "a wildcard must follow `.`, `[` or `{`")),
        Token::Lit(_) => Err(syntax(iter.path(), "a literal must follow `.`, `[`, `{` or `,`")),
        Token::Root => Err(syntax(iter.path(), "`$` in the middle of a path")),
        Token::End => Err(syntax(iter.path(), "unexpected end of path")),
    }
}

/// One struct field hop: resolve the literal, then keep descending.
fn field_step(
    node: Option<&mut Mask>,
    descriptor: &TypeDescriptor,
    lit: Literal<'_>,
    iter: &mut PathIter<'_>,
    depth: usize,
    options: &CompileOptions,
) -> Result<(), CompileError> {
    let strukt = match descriptor.as_struct() {
        Some(strukt) => strukt,
        None => {
            return Err(type_mismatch(
                iter.path(),
                format!("field selector against {}", descriptor),
            ))
        }
    };
    let field = resolve_field(strukt, &lit, iter.path())?;
    let child = node.map(|node| node.fields_mut().get_or_insert(field.id()));
    descend(child, field.ty(), iter, depth + 1, options)
}

fn resolve_field<'d>(
    strukt: &'d StructDescriptor,
    lit: &Literal<'_>,
    path: &str,
) -> Result<&'d FieldDescriptor, CompileError> {
    let found = match lit {
        Literal::Int(id) => i32::try_from(*id).ok().and_then(|id| strukt.field_by_id(id)),
        Literal::Str(name) => strukt.field_by_name(name),
    };
    found.ok_or_else(|| CompileError::UnknownField {
        path: path.to_owned(),
        owner: strukt.name().to_owned(),
        field: match lit {
            Literal::Int(id) => id.to_string(),
            Literal::Str(name) => name.to_string(),
        },
    })
}

/// Validated sibling key inside one bracket group.
enum Sibling<'p> {
    Int(i64),
    Str(Cow<'p, str>),
}

/// One bracket group: `[k]`, `[k1,k2]`, `[*]`, `{k}`, `{k1,k2}`, `{*}`.
fn group(
    mut node: Option<&mut Mask>,
    descriptor: &TypeDescriptor,
    iter: &mut PathIter<'_>,
    depth: usize,
    options: &CompileOptions,
    map_group: bool,
) -> Result<(), CompileError> {
    let (domain, value_ty, closer, closer_char) = if map_group {
        match descriptor {
            TypeDescriptor::IntMap(value) => (KeyDomain::IntKey, &**value, Token::MapClose, '}'),
            TypeDescriptor::StrMap(value) => (KeyDomain::StrKey, &**value, Token::MapClose, '}'),
            other => {
                return Err(type_mismatch(
                    iter.path(),
                    format!("map key selector against {}", other),
                ))
            }
        }
    } else {
        match descriptor {
            TypeDescriptor::List(elem) | TypeDescriptor::Set(elem) => {
                (KeyDomain::Index, &**elem, Token::IndexClose, ']')
            }
            other => {
                return Err(type_mismatch(
                    iter.path(),
                    format!("index selector against {}", other),
                ))
            }
        }
    };

    let mut siblings = Vec::new();
    match iter.next_token()? {
        Token::Any => {
            let token = iter.next_token()?;
            if token != closer {
                return Err(syntax(
                    iter.path(),
                    format!("expected `{}` after `*`, found {}", closer_char, token),
                ));
            }
            let mut probe = iter.clone();
            return match probe.next_token()? {
                // A terminal wildcard includes the whole node; recording an
                // elem child would say the same thing less directly.
                Token::End => {
                    if let Some(node) = node {
                        node.make_terminal();
                    }
                    Ok(())
                }
                _ => {
                    let child = node.map(Mask::elem_mut);
                    descend(child, value_ty, iter, depth + 1, options)
                }
            };
        }
        Token::Lit(lit) => siblings.push(check_domain(domain, lit, iter.path())?),
        other => {
            return Err(syntax(
                iter.path(),
                format!("expected a key or `*` after the group opener, found {}", other),
            ))
        }
    }
    loop {
        let token = iter.next_token()?;
        if token == closer {
            break;
        }
        match token {
            Token::Elem => match iter.next_token()? {
                Token::Lit(lit) => siblings.push(check_domain(domain, lit, iter.path())?),
                Token::Any => {
                    return Err(syntax(iter.path(), "`*` cannot appear in a sibling list"))
                }
                other => {
                    return Err(syntax(
                        iter.path(),
                        format!("expected a key after `,`, found {}", other),
                    ))
                }
            },
            Token::End => {
                return Err(syntax(
                    iter.path(),
                    format!("unterminated group, expected `{}`", closer_char),
                ))
            }
            other => {
                return Err(syntax(
                    iter.path(),
                    format!("expected `,` or `{}`, found {}", closer_char, other),
                ))
            }
        }
    }

    // Fan the remaining path out over every sibling branch.
    let after = iter.clone();
    for sibling in &siblings {
        let branch = match node.as_deref_mut() {
            Some(parent) => Some(match sibling {
                Sibling::Int(key) => parent.entries_mut().get_or_insert(*key),
                Sibling::Str(key) => parent.keys_mut().get_or_insert(key),
            }),
            None => None,
        };
        let mut branch_iter = after.clone();
        descend(branch, value_ty, &mut branch_iter, depth + 1, options)?;
    }
    Ok(())
}

fn check_domain<'p>(
    domain: KeyDomain,
    lit: Literal<'p>,
    path: &str,
) -> Result<Sibling<'p>, CompileError> {
    match (domain, lit) {
        (KeyDomain::Index, Literal::Int(key)) | (KeyDomain::IntKey, Literal::Int(key)) => {
            Ok(Sibling::Int(key))
        }
        // A literal `"*"` key would be indistinguishable from the wildcard
        // once persisted; `{*}` already covers it.
        (KeyDomain::StrKey, Literal::Str(key)) if key == "*" => Err(syntax(
            path,
            "the map key \"*\" is reserved for the wildcard",
        )),
        (KeyDomain::StrKey, Literal::Str(key)) => Ok(Sibling::Str(key)),
        (KeyDomain::Index, Literal::Str(key)) => Err(type_mismatch(
            path,
            format!("index `{}` is not an integer", key),
        )),
        (KeyDomain::IntKey, Literal::Str(key)) => Err(CompileError::MapKeyType {
            path: path.to_owned(),
            detail: format!("string key `{}` against an int-keyed map", key),
        }),
        (KeyDomain::StrKey, Literal::Int(key)) => Err(CompileError::MapKeyType {
            path: path.to_owned(),
            detail: format!("integer key `{}` against a string-keyed map", key),
        }),
    }
}

/// Check that the remaining selectors fit `descriptor`, consuming `iter`.
/// Used when a probe descends through a terminal node.
pub(super) fn validate(
    descriptor: &TypeDescriptor,
    token: Token<'_>,
    iter: &mut PathIter<'_>,
    depth: usize,
    head: bool,
) -> bool {
    let options = CompileOptions::default();
    match token {
        Token::Lit(lit) if head => {
            field_step(None, descriptor, lit, iter, depth, &options).is_ok()
        }
        token => apply(None, descriptor, token, iter, depth, &options).is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldDescriptor, StructDescriptor, TypeDescriptor};

    fn device() -> TypeDescriptor {
        let peer = TypeDescriptor::struct_(StructDescriptor::new(
            "demo.Peer",
            vec![
                FieldDescriptor::new(1, "host", TypeDescriptor::Scalar),
                FieldDescriptor::new(2, "port", TypeDescriptor::Scalar),
            ],
        ));
        TypeDescriptor::struct_(StructDescriptor::new(
            "demo.Device",
            vec![
                FieldDescriptor::new(1, "id", TypeDescriptor::Scalar),
                FieldDescriptor::new(2, "tags", TypeDescriptor::list(TypeDescriptor::Scalar)),
                FieldDescriptor::new(3, "meta", TypeDescriptor::str_map(TypeDescriptor::Scalar)),
                FieldDescriptor::new(4, "slots", TypeDescriptor::int_map(TypeDescriptor::Scalar)),
                FieldDescriptor::new(5, "peers", TypeDescriptor::list(peer)),
            ],
        ))
    }

    fn err(paths: &[&str]) -> CompileError {
        Mask::compile(&device(), paths).unwrap_err()
    }

    #[test]
    fn unknown_fields_name_their_owner() {
        match err(&["$.nope"]) {
            CompileError::UnknownField { owner, field, .. } => {
                assert_eq!(owner, "demo.Device");
                assert_eq!(field, "nope");
            }
            other => panic!("unexpected: {:?}", other),
        }
        // Unknown numeric IDs report the same way, including IDs too wide
        // to be a field ID at all.
        assert!(matches!(err(&["$.17"]), CompileError::UnknownField { .. }));
        assert!(matches!(
            err(&["$.4294967296"]),
            CompileError::UnknownField { .. }
        ));
    }

    #[test]
    fn selector_flavor_must_match_the_descriptor() {
        assert!(matches!(err(&["$.id[0]"]), CompileError::TypeMismatch { .. }));
        assert!(matches!(err(&["$.tags{1}"]), CompileError::TypeMismatch { .. }));
        assert!(matches!(err(&["$.tags[0].host"]), CompileError::TypeMismatch { .. }));
        assert!(matches!(err(&["$.tags[\"x\"]"]), CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn map_keys_must_match_the_key_domain() {
        assert!(matches!(err(&["$.slots{\"x\"}"]), CompileError::MapKeyType { .. }));
        assert!(matches!(err(&["$.meta{7}"]), CompileError::MapKeyType { .. }));
    }

    #[test]
    fn wildcard_placement_is_restricted() {
        assert!(matches!(err(&["$.*.id"]), CompileError::Syntax { .. }));
        assert!(matches!(err(&["$.tags[1,*]"]), CompileError::Syntax { .. }));
        assert!(matches!(err(&["$.tags[*,1]"]), CompileError::Syntax { .. }));
        // A quoted `"*"` map key is reserved; `{*}` selects every key.
        assert!(matches!(err(&["$.meta{\"*\"}"]), CompileError::Syntax { .. }));
    }

    #[test]
    fn stray_separators_are_syntax_errors() {
        assert!(matches!(err(&["$.id,id"]), CompileError::Syntax { .. }));
        assert!(matches!(err(&["$.tags[1]]"]), CompileError::Syntax { .. }));
        assert!(matches!(err(&["$.tags[1"]), CompileError::Syntax { .. }));
        assert!(matches!(err(&["$.meta{\"a\"]"]), CompileError::Syntax { .. }));
    }

    #[test]
    fn lexical_errors_surface_as_path_errors() {
        assert!(matches!(err(&["$."]), CompileError::Path(_)));
        assert!(matches!(err(&["$.meta{\"open"]), CompileError::Path(_)));
    }

    #[test]
    fn nesting_deeper_than_the_limit_is_rejected() {
        let options = CompileOptions { max_depth: 2 };
        let error =
            Mask::compile_with(&device(), &["$.peers[1].host"], &options).unwrap_err();
        match error {
            CompileError::DepthExceeded { limit, .. } => assert_eq!(limit, 2),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(Mask::compile_with(&device(), &["$.peers[1]"], &options).is_ok());
    }

    #[test]
    fn first_bad_path_aborts_the_batch() {
        assert!(matches!(
            err(&["$.id", "$.nope", "$.tags"]),
            CompileError::UnknownField { .. }
        ));
    }

    #[test]
    fn extending_under_a_different_root_shape_is_rejected() {
        let mut mask = Mask::compile(&device(), &["$.id"]).unwrap();
        let other = TypeDescriptor::list(TypeDescriptor::Scalar);
        assert!(matches!(
            mask.extend(&other, &["$[0]"]),
            Err(CompileError::TypeMismatch { .. })
        ));
    }
}
