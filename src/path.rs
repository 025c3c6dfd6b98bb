//! Lexical analysis of mask path strings.
//!
//! A path addresses one member (or a small family of members) of a nested
//! value: `$.TrafficEnv.Open`, `$.Extra[0]`, `$.Extra[*].StrMap{"key"}`.
//! The legacy bare form omits the `$` anchor and dots straight through
//! struct fields: `TrafficEnv.Open`.
//!
//! [`PathIter`] lexes lazily and borrows from the path string; cloning one
//! is cheap, which lets a consumer fork iteration wherever a sibling list
//! (`[1,2]`, `{"a","b"}`) fans a single remainder out over several
//! branches.

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};

use thiserror::Error;

/// Characters with structural meaning; they terminate an unquoted literal.
const fn is_structural(byte: u8) -> bool {
    matches!(
        byte,
        b'$' | b'.' | b'[' | b']' | b'{' | b'}' | b',' | b'*' | b'"'
    )
}

/// One lexical token of the path grammar.
#[derive(Clone, Debug, PartialEq)]
pub enum Token<'p> {
    /// `$`, the root anchor.
    Root,
    /// `.`, introducing a struct field selector.
    Field,
    /// `[`, opening an index group.
    IndexOpen,
    /// `]`.
    IndexClose,
    /// `{`, opening a map key group.
    MapOpen,
    /// `}`.
    MapClose,
    /// `,`, separating siblings inside one bracket group.
    Elem,
    /// `*`, the wildcard selector.
    Any,
    /// A field name, index, or map key.
    Lit(Literal<'p>),
    /// End of input. Subsequent calls keep returning `End`.
    End,
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Token::Root => f.write_str("`$`"),
            Token::Field => f.write_str("`.`"),
            Token::IndexOpen => f.write_str("`[`"),
            Token::IndexClose => f.write_str("`]`"),
            Token::MapOpen => f.write_str("`{`"),
            Token::MapClose => f.write_str("`}`"),
            Token::Elem => f.write_str("`,`"),
            Token::Any => f.write_str("`*`"),
            Token::Lit(Literal::Int(value)) => write!(f, "integer literal `{}`", value),
            Token::Lit(Literal::Str(value)) => write!(f, "string literal `{}`", value),
            Token::End => f.write_str("end of path"),
        }
    }
}

/// A literal: an integer when every character of an unquoted span is an
/// ASCII digit, a string otherwise. Quoted spans are always strings.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal<'p> {
    Int(i64),
    Str(Cow<'p, str>),
}

/// Errors raised while tokenizing a path.
#[derive(Error, Debug)]
pub enum PathError {
    /// A separator that demands a literal was followed by none.
    #[error("missing literal after `{after}` at byte {at} of `{path}`")]
    MissingLiteral { after: char, at: usize, path: String },

    /// An all-digit literal outside the integer key domain.
    #[error("integer literal out of range at byte {at} of `{path}`")]
    IntOutOfRange { at: usize, path: String },

    /// A quoted literal with no closing `"`.
    #[error("unterminated quoted literal starting at byte {at} of `{path}`")]
    Unterminated { at: usize, path: String },

    /// `$` anywhere but the first byte.
    #[error("`$` is only legal at the start of a path: `{path}`")]
    RootNotFirst { at: usize, path: String },

    /// `$` not followed by `.`, `[` or `{`.
    #[error("`$` must be followed by `.`, `[` or `{{` in `{path}`")]
    RootSuccessor { path: String },
}

/// A lazy tokenizer over one path string.
#[derive(Clone, Debug)]
pub struct PathIter<'p> {
    path: &'p str,
    pos: usize,
    /// Separator just consumed that requires a literal (or wildcard) next.
    expect: Option<char>,
}

impl<'p> PathIter<'p> {
    pub fn new(path: &'p str) -> Self {
        PathIter {
            path,
            pos: 0,
            expect: None,
        }
    }

    /// The full path under iteration.
    pub fn path(&self) -> &'p str {
        self.path
    }

    /// Rewind to the first token.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.expect = None;
    }

    /// Lex the next token.
    pub fn next_token(&mut self) -> Result<Token<'p>, PathError> {
        let bytes = self.path.as_bytes();
        if let Some(after) = self.expect.take() {
            // `.`, `[`, `{` and `,` must all be followed by a literal or a
            // wildcard; anything else is malformed regardless of context.
            return match bytes.get(self.pos) {
                Some(b'*') => {
                    self.pos += 1;
                    Ok(Token::Any)
                }
                Some(b'"') => self.quoted(),
                Some(&byte) if !is_structural(byte) => self.literal(),
                _ => Err(PathError::MissingLiteral {
                    after,
                    at: self.pos,
                    path: self.path.to_owned(),
                }),
            };
        }
        let byte = match bytes.get(self.pos) {
            None => return Ok(Token::End),
            Some(&byte) => byte,
        };
        self.pos += 1;
        match byte {
            b'$' => {
                if self.pos != 1 {
                    return Err(PathError::RootNotFirst {
                        at: self.pos - 1,
                        path: self.path.to_owned(),
                    });
                }
                match bytes.get(self.pos) {
                    Some(b'.') | Some(b'[') | Some(b'{') => Ok(Token::Root),
                    _ => Err(PathError::RootSuccessor {
                        path: self.path.to_owned(),
                    }),
                }
            }
            b'.' => {
                self.expect = Some('.');
                Ok(Token::Field)
            }
            b'[' => {
                self.expect = Some('[');
                Ok(Token::IndexOpen)
            }
            b']' => Ok(Token::IndexClose),
            b'{' => {
                self.expect = Some('{');
                Ok(Token::MapOpen)
            }
            b'}' => Ok(Token::MapClose),
            b',' => {
                self.expect = Some(',');
                Ok(Token::Elem)
            }
            b'*' => Ok(Token::Any),
            b'"' => {
                self.pos -= 1;
                self.quoted()
            }
            _ => {
                self.pos -= 1;
                self.literal()
            }
        }
    }

    /// Lex an unquoted literal starting at the cursor; the caller has
    /// checked the first byte, so the span is never empty.
    fn literal(&mut self) -> Result<Token<'p>, PathError> {
        let bytes = self.path.as_bytes();
        let start = self.pos;
        while let Some(&byte) = bytes.get(self.pos) {
            if is_structural(byte) {
                break;
            }
            self.pos += 1;
        }
        let span = &self.path[start..self.pos];
        if span.bytes().all(|byte| byte.is_ascii_digit()) {
            match span.parse::<i64>() {
                Ok(value) => Ok(Token::Lit(Literal::Int(value))),
                Err(_) => Err(PathError::IntOutOfRange {
                    at: start,
                    path: self.path.to_owned(),
                }),
            }
        } else {
            Ok(Token::Lit(Literal::Str(Cow::Borrowed(span))))
        }
    }

    /// Lex a double-quoted literal; `\"` and `\\` are the only escapes.
    fn quoted(&mut self) -> Result<Token<'p>, PathError> {
        let open = self.pos;
        self.pos += 1;
        let bytes = self.path.as_bytes();
        let start = self.pos;
        let mut escaped = false;
        while let Some(&byte) = bytes.get(self.pos) {
            match byte {
                b'\\' => {
                    escaped = true;
                    self.pos += 2;
                }
                b'"' => {
                    let span = &self.path[start..self.pos];
                    self.pos += 1;
                    let value = if escaped {
                        Cow::Owned(unescape(span))
                    } else {
                        Cow::Borrowed(span)
                    };
                    return Ok(Token::Lit(Literal::Str(value)));
                }
                _ => self.pos += 1,
            }
        }
        Err(PathError::Unterminated {
            at: open,
            path: self.path.to_owned(),
        })
    }
}

fn unescape(span: &str) -> String {
    let mut out = String::with_capacity(span.len());
    let mut chars = span.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
