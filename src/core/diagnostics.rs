use std::fmt;
use std::path::PathBuf;

/// Severity level of a diagnostic emitted by driver operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational message with no required action.
    Info,
    /// Something unexpected was found and repaired or ignored; the operation continued.
    Warning,
}

/// Non-fatal finding surfaced alongside an operation outcome.
///
/// Hard failures are returned as [`crate::Error`]; diagnostics cover what the
/// driver noticed and tolerated (stale pidfiles, unreadable leftovers, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Instance the finding concerns, when there is one.
    pub instance: Option<String>,
    /// File the finding concerns (pidfile, script, socket).
    pub path: Option<PathBuf>,
    /// Remediation hint for operators.
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new<S: Into<String>>(severity: Severity, message: S) -> Self {
        Self {
            severity,
            message: message.into(),
            instance: None,
            path: None,
            help: None,
        }
    }

    pub fn warning<S: Into<String>>(message: S) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn with_instance(mut self, instance: &str) -> Self {
        self.instance = Some(instance.to_string());
        self
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{instance}: {}", self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if let Some(help) = &self.help {
            write!(f, " ({help})")?;
        }
        Ok(())
    }
}
