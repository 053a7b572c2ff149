//! Weave report
//!
//! Every diagnostic raised during a pass is emitted through `tracing` and
//! recorded here, so hosts without a subscriber can still surface them.

use logweave_il::MethodRef;
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLevel::Info => write!(f, "info"),
            DiagnosticLevel::Warning => write!(f, "warning"),
            DiagnosticLevel::Error => write!(f, "error"),
        }
    }
}

/// A build-time diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

/// A method that received logging calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentedMethod {
    pub type_name: String,
    pub method: String,
    pub entry: bool,
    pub exit_sites: usize,
}

/// A method left untouched because its instrumentation failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedMethod {
    pub type_name: String,
    pub method: String,
    pub reason: String,
}

/// Outcome of one weaving pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeaveReport {
    /// The resolved logging callable, if any
    pub callable: Option<MethodRef>,
    pub instrumented: Vec<InstrumentedMethod>,
    pub skipped: Vec<SkippedMethod>,
    pub diagnostics: Vec<Diagnostic>,
}

impl WeaveReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "logweave", "{}", message);
        self.push(DiagnosticLevel::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "logweave", "{}", message);
        self.push(DiagnosticLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!(target: "logweave", "{}", message);
        self.push(DiagnosticLevel::Error, message);
    }

    fn push(&mut self, level: DiagnosticLevel, message: String) {
        self.diagnostics.push(Diagnostic { level, message });
    }

    /// Record a skipped method, with a warning naming the reason
    pub fn skip(&mut self, type_name: &str, method: &str, reason: impl fmt::Display) {
        let reason = reason.to_string();
        warn!(target: "logweave", type_name, method, %reason, "method left unmodified");
        self.skipped.push(SkippedMethod {
            type_name: type_name.to_string(),
            method: method.to_string(),
            reason,
        });
    }

    /// Number of methods that received logging calls
    pub fn instrumented_count(&self) -> usize {
        self.instrumented.len()
    }

    /// Whether any error diagnostic was raised
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Error)
    }

    /// Messages at the given level, in the order they were raised
    pub fn messages(&self, level: DiagnosticLevel) -> impl Iterator<Item = &str> {
        self.diagnostics
            .iter()
            .filter(move |d| d.level == level)
            .map(|d| d.message.as_str())
    }
}
