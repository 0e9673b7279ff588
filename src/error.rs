//! Crate-wide error taxonomy.
//!
//! Registry-level structural errors are fatal and returned to the caller;
//! parser-level expression failures degrade to literal text with a log line
//! and never surface here. Filter-rejected collection mutations are not
//! errors at all - they are signaled by the operation's failure sentinel.

use thiserror::Error;

/// Structured failure from the expression-language collaborator.
///
/// `expected`/`found` describe the first token mismatch; `location` is a
/// character offset into the text handed to `parse`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("syntax error at {location}: expected {expected}, found {found}")]
pub struct SyntaxError {
    pub expected: String,
    pub found: String,
    pub location: usize,
}

impl SyntaxError {
    /// True when the text simply never opened an expression - a lone brace
    /// that should be treated as literal text, not a failure.
    pub fn is_incomplete(&self) -> bool {
        self.expected == "{"
    }
}

/// Everything that can go wrong across the registry, the component engine
/// and the markup parser.
#[derive(Debug, Error)]
pub enum Error {
    /// An intermediate segment of a dotted path does not exist.
    #[error("path segment '{segment}' not found in '{path}'")]
    PathNotFound { path: String, segment: String },

    /// Composition into a sealed trait definition.
    #[error("'{0}' is sealed and cannot compose further behaviors")]
    SealedTarget(String),

    /// The behavior lists form a true dependency cycle.
    #[error("cannot linearize behaviors of '{target}': dependency cycle through '{through}'")]
    UnresolvableDependency { target: String, through: String },

    /// Per-behavior constructor arguments were not list-shaped.
    #[error("arguments for '{0}' must be a list")]
    ArgumentShape(String),

    /// `create`/`finish` on a name with no definition.
    #[error("class '{0}' is not defined")]
    ClassNotFound(String),

    /// Close tag with no matching open tag on the parser stack.
    #[error("unbalanced tag '{tag}' at offset {offset}")]
    UnbalancedTag { tag: String, offset: usize },

    /// Expression grammar failure surfaced by a collaborator.
    #[error(transparent)]
    StructuredSyntax(#[from] SyntaxError),

    /// Indexed collection access outside `0..len`.
    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// One or more destructors failed during teardown. The whole chain
    /// still ran; every failure is collected here.
    #[error("teardown of '{name}' reported {} failure(s)", errors.len())]
    Teardown { name: String, errors: Vec<Error> },

    /// The projector found an entry whose real node lives under a different
    /// document parent than the entry being placed.
    #[error("sibling '{entry}' is parented to a different document node")]
    ProjectionMismatch { entry: String },

    /// Template retrieval through a `PacketSource` failed.
    #[error("failed to fetch '{key}': {reason}")]
    Fetch { key: String, reason: String },

    /// Component operation before a parent container was attached.
    #[error("component has no parent container; attach it before pushing elements")]
    MissingParent,

    /// An alias is already bound on this component.
    #[error("name '{0}' is already bound")]
    DuplicateName(String),

    /// Expression or script evaluation failure.
    #[error("evaluation failed: {0}")]
    Eval(String),
}

pub type Result<T> = std::result::Result<T, Error>;
