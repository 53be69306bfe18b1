//! Route pattern compilation.
//!
//! | Pattern                | Segments                                      |
//! |------------------------|-----------------------------------------------|
//! | `/` or `""`            | *(empty, matches the root)*                  |
//! | `/users`               | `Static("users")`                             |
//! | `/users/:id`           | `Static("users")`, `Param("id")`              |
//! | `/files/*`             | `Static("files")`, `Wildcard`                 |
//!
//! Empty components are dropped, so `/users/`, `//users` and `users` compile to
//! the same pattern. Static segments match case-sensitively.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::context::Parameters;

/// Errors raised while compiling a route pattern.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("wildcard `*` must be the last segment of `{pattern}`")]
    MisplacedWildcard { pattern: String },

    #[error("parameter `:{name}` appears more than once in `{pattern}`")]
    DuplicateParamName { pattern: String, name: String },

    #[error("parameter in `{pattern}` has no name")]
    EmptyParamName { pattern: String },
}

/// One `/`-delimited component of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Literal text, matched exactly.
    Static(String),
    /// `:name`: matches any single segment and binds it to `name`.
    Param(String),
    /// `*`: matches the remaining segments, including none.
    Wildcard,
}

/// A compiled route pattern: an ordered list of [`PathSegment`]s.
///
/// # Examples
///
/// ```
/// use switchyard::router::{PathSegment, Pattern};
///
/// let pattern = Pattern::compile("/users/:id/posts/*").unwrap();
/// assert_eq!(pattern.segments().len(), 4);
/// assert_eq!(pattern.segments()[1], PathSegment::Param("id".into()));
/// assert_eq!(pattern.to_string(), "/users/:id/posts/*");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Pattern {
    segments: Vec<PathSegment>,
}

impl Pattern {
    /// The empty pattern, matching `/`.
    pub fn root() -> Self {
        Self::default()
    }

    /// Compile a route pattern.
    ///
    /// # Errors
    ///
    /// - [`PatternError::MisplacedWildcard`]: `*` appears before the last segment.
    /// - [`PatternError::DuplicateParamName`]: two `:name` segments share a name.
    /// - [`PatternError::EmptyParamName`]: a segment is a bare `:`.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let segments = split_path(pattern)
            .into_iter()
            .map(|raw| match raw {
                "*" => Ok(PathSegment::Wildcard),
                ":" => Err(PatternError::EmptyParamName {
                    pattern: pattern.to_owned(),
                }),
                _ => Ok(match raw.strip_prefix(':') {
                    Some(name) => PathSegment::Param(name.to_owned()),
                    None => PathSegment::Static(raw.to_owned()),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let compiled = Self { segments };
        compiled.validate()?;
        Ok(compiled)
    }

    /// Compile a mount or middleware prefix.
    ///
    /// Identical to [`compile`](Self::compile) except that a trailing `*` is
    /// dropped: `/api/*` and `/api` cover the same requests when used as a
    /// prefix.
    pub fn compile_prefix(prefix: &str) -> Result<Self, PatternError> {
        let mut compiled = Self::compile(prefix)?;
        if compiled.has_wildcard() {
            compiled.segments.pop();
        }
        Ok(compiled)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// `true` if the last segment is `*`.
    pub fn has_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(PathSegment::Wildcard))
    }

    /// Parameter names in pattern order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|seg| match seg {
            PathSegment::Param(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Prepend `self` to `child`, e.g. `/api` joined with `/users/:id` gives
    /// `/api/users/:id`.
    ///
    /// # Errors
    ///
    /// Fails if the combined pattern breaks an invariant, for instance when
    /// both halves bind the same parameter name.
    pub fn join(&self, child: &Pattern) -> Result<Pattern, PatternError> {
        let mut segments = Vec::with_capacity(self.segments.len() + child.segments.len());
        segments.extend(self.segments.iter().cloned());
        segments.extend(child.segments.iter().cloned());
        let joined = Pattern { segments };
        joined.validate()?;
        Ok(joined)
    }

    /// Segment-wise prefix test against a split request path.
    ///
    /// Params match any one segment; `/api` never covers `/apikey`.
    pub fn is_prefix_of(&self, path: &[&str]) -> bool {
        let mut path = path.iter();
        for seg in &self.segments {
            match (seg, path.next()) {
                (PathSegment::Wildcard, _) => return true,
                (PathSegment::Static(lit), Some(actual)) if lit == actual => {}
                (PathSegment::Param(_), Some(_)) => {}
                _ => return false,
            }
        }
        true
    }

    // Zip the positional values captured by the tree with this pattern's names.
    pub(crate) fn bind(&self, captured: &[&str]) -> Parameters {
        self.param_names()
            .zip(captured.iter().copied())
            .collect()
    }

    fn validate(&self) -> Result<(), PatternError> {
        let last = self.segments.len().saturating_sub(1);
        let mut seen: Vec<&str> = Vec::new();

        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                PathSegment::Wildcard if i != last => {
                    return Err(PatternError::MisplacedWildcard {
                        pattern: self.to_string(),
                    });
                }
                PathSegment::Param(name) => {
                    if seen.contains(&name.as_str()) {
                        return Err(PatternError::DuplicateParamName {
                            pattern: self.to_string(),
                            name: name.clone(),
                        });
                    }
                    seen.push(name);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for seg in &self.segments {
            match seg {
                PathSegment::Static(lit) => write!(f, "/{lit}")?,
                PathSegment::Param(name) => write!(f, "/:{name}")?,
                PathSegment::Wildcard => f.write_str("/*")?,
            }
        }
        Ok(())
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

/// Split a request path (or raw pattern) into its non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
