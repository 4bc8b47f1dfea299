//! Shared diagnostic types for the leaven pipeline
//!
//! Compilation errors are plain data while they travel through the
//! pipeline; [`to_report`] pairs one with the source text it points at
//! and produces a miette report with labeled spans for the fancy
//! handler to render.

use std::path::PathBuf;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource};
use thiserror::Error;

/// A source coordinate: the name of the source unit and a byte offset
/// into its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loc {
    pub source: Arc<str>,
    pub offset: usize,
}

impl Loc {
    pub fn new(source: impl Into<Arc<str>>, offset: usize) -> Self {
        Self { source: source.into(), offset }
    }
}

/// Errors produced by the lexer and parser.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyntaxError {
    #[error("`{lexeme}` is not a valid number")]
    BadNum { lexeme: String, loc: Loc },

    #[error("unclosed string")]
    UnclosedString { loc: Loc },

    #[error("unexpected {found}")]
    UnexpectedToken { found: String, loc: Loc },

    #[error("expected {expected} but found {found}")]
    MissingExpectedToken { expected: String, found: String, loc: Loc },

    #[error("expected {expected} after {after}")]
    MissingExpectedTokenAfter { expected: String, after: String, loc: Loc },

    #[error("unexpected end of input")]
    UnexpectedEof { loc: Loc },

    #[error("malformed operator definition")]
    BadOperatorDefinition { loc: Loc },

    #[error("a begin block must contain at least one expression")]
    EmptyBeginNotAllowed { loc: Loc },
}

impl SyntaxError {
    pub fn loc(&self) -> &Loc {
        match self {
            Self::BadNum { loc, .. }
            | Self::UnclosedString { loc }
            | Self::UnexpectedToken { loc, .. }
            | Self::MissingExpectedToken { loc, .. }
            | Self::MissingExpectedTokenAfter { loc, .. }
            | Self::UnexpectedEof { loc }
            | Self::BadOperatorDefinition { loc }
            | Self::EmptyBeginNotAllowed { loc } => loc,
        }
    }

    fn label(&self) -> String {
        match self {
            Self::BadNum { .. } => "not a number".to_string(),
            Self::UnclosedString { .. } => "string starts here".to_string(),
            Self::UnexpectedToken { found, .. } => format!("unexpected {found}"),
            Self::MissingExpectedToken { expected, .. } => format!("expected {expected}"),
            Self::MissingExpectedTokenAfter { expected, .. } => format!("expected {expected}"),
            Self::UnexpectedEof { .. } => "input ends here".to_string(),
            Self::BadOperatorDefinition { .. } => {
                "expected operator('prefix|'infix|'postfix, precedence, 'name)".to_string()
            }
            Self::EmptyBeginNotAllowed { .. } => "empty begin".to_string(),
        }
    }
}

/// Errors produced by the opcode generator and the embedded assembler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeneratorError {
    #[error("`{lexeme}` cannot be pushed as an I32")]
    BadPush { lexeme: String, loc: Loc },

    #[error("this expression cannot be called")]
    BadCall { loc: Loc },

    #[error("`{name}` is not declared")]
    UndeclaredIdentifier { name: String, loc: Loc },

    #[error("a definition cannot be used as a value")]
    CannotStoreDef { loc: Loc },

    #[error("malformed opcode: {detail}")]
    OpcodeSyntax { detail: String, loc: Loc },

    #[error("unknown opcode `{name}`")]
    UnknownUserOpcode { name: String, loc: Loc },

    #[error("`{name}` cannot be resolved here")]
    Lookup { name: String, loc: Loc },

    #[error("`{lexeme}` is not a valid I32 immediate")]
    InvalidI32 { lexeme: String, loc: Loc },
}

impl GeneratorError {
    pub fn loc(&self) -> &Loc {
        match self {
            Self::BadPush { loc, .. }
            | Self::BadCall { loc }
            | Self::UndeclaredIdentifier { loc, .. }
            | Self::CannotStoreDef { loc }
            | Self::OpcodeSyntax { loc, .. }
            | Self::UnknownUserOpcode { loc, .. }
            | Self::Lookup { loc, .. }
            | Self::InvalidI32 { loc, .. } => loc,
        }
    }

    fn label(&self) -> String {
        match self {
            Self::BadPush { .. } => "not an I32".to_string(),
            Self::BadCall { .. } => "called here".to_string(),
            Self::UndeclaredIdentifier { name, .. } => format!("`{name}` is unknown"),
            Self::CannotStoreDef { .. } => "definition in value position".to_string(),
            Self::OpcodeSyntax { .. } => "in this opcode block".to_string(),
            Self::UnknownUserOpcode { name, .. } => format!("`{name}` is not an opcode"),
            Self::Lookup { name, .. } => format!("`{name}` has no binding"),
            Self::InvalidI32 { .. } => "not an I32".to_string(),
        }
    }
}

/// Any error the source-to-code pipeline can produce.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),
}

impl CompileError {
    pub fn loc(&self) -> &Loc {
        match self {
            Self::Syntax(err) => err.loc(),
            Self::Generator(err) => err.loc(),
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Syntax(err) => err.label(),
            Self::Generator(err) => err.label(),
        }
    }
}

/// A compile error paired with the source text it points at, ready for
/// the miette handler.
#[derive(Error, Diagnostic, Debug)]
#[error("{message}")]
#[diagnostic(code(leaven::compile_error))]
pub struct RenderedError {
    pub message: String,

    #[source_code]
    pub src: NamedSource<String>,

    #[label(collection)]
    pub labels: Vec<LabeledSpan>,
}

/// Pair a compile error with its source text.
///
/// `sources` maps source-unit names to their full text; the error's own
/// [`Loc`] picks the unit. A unit missing from the map still renders,
/// just without an excerpt.
pub fn to_report(error: &CompileError, sources: &[(&str, &str)]) -> RenderedError {
    let loc = error.loc();
    let text = sources
        .iter()
        .find(|(name, _)| *name == loc.source.as_ref())
        .map(|(_, text)| (*text).to_string())
        .unwrap_or_default();

    let len = text[loc.offset.min(text.len())..].chars().next().map_or(0, char::len_utf8);
    RenderedError {
        message: error.to_string(),
        src: NamedSource::new(loc.source.as_ref(), text),
        labels: vec![LabeledSpan::new(Some(error.label()), loc.offset, len)],
    }
}

/// Top-level driver errors.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(code(leaven::io_error))]
    IoError(#[from] std::io::Error),

    #[error("Path not found: {0}")]
    #[diagnostic(code(leaven::path_not_found))]
    PathNotFound(PathBuf),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] RenderedError),
}
