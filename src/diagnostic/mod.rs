pub mod ansi;
pub mod json;
pub mod source_map;

pub use source_map::{SourceMap, Span};

use crate::compiler::{CompileError, ErrorLocation};
use crate::vm::RuntimeError;

/// A pointer into the source. Runtime faults only know the line, so `span`
/// may be `Span::UNKNOWN`.
#[derive(Debug, Clone)]
pub struct Label {
    pub line: usize,
    pub span: Span,
    pub message: String,
}

impl Label {
    pub fn has_span(&self) -> bool {
        self.span != Span::UNKNOWN
    }
}

/// An error report. Every diagnostic is an error; there are no warnings.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Short category shown before the message, e.g. `compile` or `runtime`.
    pub kind: &'static str,
    pub message: String,
    pub label: Option<Label>,
    pub notes: Vec<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(kind: &'static str, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            message: message.into(),
            label: None,
            notes: Vec::new(),
            source: None,
        }
    }

    pub fn with_span(mut self, line: usize, span: Span, label: impl Into<String>) -> Self {
        self.label = Some(Label { line, span, message: label.into() });
        self
    }

    pub fn with_line(self, line: usize, label: impl Into<String>) -> Self {
        self.with_span(line, Span::UNKNOWN, label)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 1-based line of the label, if any.
    pub fn line(&self) -> Option<usize> {
        self.label.as_ref().map(|l| l.line)
    }
}

impl From<&CompileError> for Diagnostic {
    fn from(e: &CompileError) -> Self {
        let label = match &e.location {
            ErrorLocation::At(lexeme) => format!("at '{lexeme}'"),
            ErrorLocation::End => "at end of input".to_string(),
            ErrorLocation::Lexical => String::new(),
        };
        Diagnostic::error("compile", &e.message).with_span(e.line, e.span, label)
    }
}

impl From<&RuntimeError> for Diagnostic {
    fn from(e: &RuntimeError) -> Self {
        let mut d = Diagnostic::error("runtime", e.kind.to_string()).with_line(e.line, "");
        for frame in &e.trace {
            d = d.with_note(frame.clone());
        }
        d
    }
}
