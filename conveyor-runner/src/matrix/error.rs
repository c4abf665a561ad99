// Parse error types for matrix documents
// Carries location and surrounding context for readable diagnostics

use std::fmt;

/// Detailed parse error with location and context
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// Surrounding context (a few lines around the error)
    pub context: String,
    /// The kind of error
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// YAML syntax error
    YamlSyntax,
    /// Invalid schema (wrong types, missing fields)
    InvalidSchema,
    /// IO error (file not found, etc.)
    IoError,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            context: String::new(),
            kind: ParseErrorKind::InvalidSchema,
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: 0,
            column: 0,
            context: String::new(),
            kind: ParseErrorKind::IoError,
        }
    }

    pub fn with_kind(mut self, kind: ParseErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Create context from source content
    pub fn with_source_context(mut self, source: &str, context_lines: usize) -> Self {
        let lines: Vec<&str> = source.lines().collect();
        let start = self.line.saturating_sub(context_lines + 1);
        let end = (self.line + context_lines).min(lines.len());

        let mut context = String::new();
        for (i, line) in lines.iter().enumerate().take(end).skip(start) {
            let line_num = i + 1;
            let prefix = if line_num == self.line { ">" } else { " " };
            context.push_str(&format!("{} {:4} | {}\n", prefix, line_num, line));
        }

        self.context = context;
        self
    }

    /// Create from serde_yaml error
    pub fn from_yaml_error(err: &serde_yaml::Error, source: &str) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((1, 1));

        let message = err.to_string();
        let kind = classify_yaml_message(&message);

        ParseError::new(message, line, column)
            .with_kind(kind)
            .with_source_context(source, 2)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {}", self.message)?;
        if self.line > 0 {
            write!(f, "\n  --> line {}:{}", self.line, self.column)?;
        }
        if !self.context.is_empty() {
            write!(f, "\n\n{}", self.context)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Schema violations surface through serde_yaml with the same error type as
/// syntax failures; tell them apart by message shape.
fn classify_yaml_message(message: &str) -> ParseErrorKind {
    if message.contains("missing field")
        || message.contains("unknown field")
        || message.contains("invalid type")
    {
        ParseErrorKind::InvalidSchema
    } else {
        ParseErrorKind::YamlSyntax
    }
}

/// Result type for matrix parsing
pub type ParseResult<T> = Result<T, ParseError>;
