//! Error and diagnostic types shared across the compilation pipeline.
//!
//! Each phase defines the error shape that actually fits it rather than
//! routing everything through one generic error type: the lexer and parser
//! fail on the first problem they see (spec's fail-fast contract), while the
//! semantic analyzer and pointer-cleanup validator accumulate diagnostics and
//! report them together.

use std::fmt;

/// A position in the source file, 1-indexed to match what editors show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Severity of a non-fatal diagnostic (spec §7: warnings never abort).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single accumulated diagnostic from the semantic analyzer or the
/// pointer-cleanup validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub at: Option<Position>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, at: Option<Position>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            at,
        }
    }

    pub fn warning(message: impl Into<String>, at: Option<Position>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            at,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.at {
            Some(pos) => write!(f, "{}: {} ({})", tag, self.message, pos),
            None => write!(f, "{}: {}", tag, self.message),
        }
    }
}

/// Lexical error: unrecognized character or unterminated string (spec §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub at: Position,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.at)
    }
}

impl std::error::Error for LexError {}

/// Syntax error: unexpected token, always carrying the token's position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub at: Position,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.at)
    }
}

impl std::error::Error for ParseError {}

/// Bundled semantic-analysis failure: one or more diagnostics recorded across
/// the four analysis passes (spec §4.4: "errors accumulate per pass").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticError {
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

impl std::error::Error for SemanticError {}

/// Bundled pointer-cleanup failure: every uncleaned-pointer error found
/// across all function/method bodies (warnings travel separately).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupError {
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

impl std::error::Error for CleanupError {}

/// Code generation error: a logical error (missing symbol, unreachable
/// internal inconsistency) or a formatting failure while writing IR text.
#[derive(Debug)]
pub enum CodeGenError {
    Logic(String),
    Format(fmt::Error),
}

impl fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "{}", s),
            CodeGenError::Format(e) => write!(f, "IR generation error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Logic(s)
    }
}

impl From<fmt::Error> for CodeGenError {
    fn from(e: fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}

/// Top-level error returned by the library's `compile_*` entry points,
/// wrapping whichever phase failed first.
#[derive(Debug)]
pub enum SinterError {
    Lex(LexError),
    Parse(ParseError),
    Semantic(SemanticError),
    Cleanup(CleanupError),
    CodeGen(CodeGenError),
}

impl fmt::Display for SinterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinterError::Lex(e) => write!(f, "{}", e),
            SinterError::Parse(e) => write!(f, "{}", e),
            SinterError::Semantic(e) => write!(f, "{}", e),
            SinterError::Cleanup(e) => write!(f, "{}", e),
            SinterError::CodeGen(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SinterError {}

impl From<LexError> for SinterError {
    fn from(e: LexError) -> Self {
        SinterError::Lex(e)
    }
}

impl From<ParseError> for SinterError {
    fn from(e: ParseError) -> Self {
        SinterError::Parse(e)
    }
}

impl From<SemanticError> for SinterError {
    fn from(e: SemanticError) -> Self {
        SinterError::Semantic(e)
    }
}

impl From<CleanupError> for SinterError {
    fn from(e: CleanupError) -> Self {
        SinterError::Cleanup(e)
    }
}

impl From<CodeGenError> for SinterError {
    fn from(e: CodeGenError) -> Self {
        SinterError::CodeGen(e)
    }
}
