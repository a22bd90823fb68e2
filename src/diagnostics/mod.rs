//! Score validation
//!
//! [`validate_score`] walks a score and collects [`Issue`]s. Each issue kind
//! has a fixed severity: importers turn errors into fatal failures and pass
//! warnings through, the session exposes the whole report to JavaScript.

pub mod structure;

use serde::{Deserialize, Serialize};

use crate::models::Position;

pub use structure::validate_score;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// What went wrong
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    ZeroTempo,
    ZeroBeats,
    BadBeatUnit,
    UnevenMeasures,
    PitchOutOfRange,
    TooManyDots,
    OverfullMeasure,
    VelocityOutOfRange,
}

impl IssueKind {
    pub fn severity(self) -> Severity {
        match self {
            IssueKind::OverfullMeasure | IssueKind::VelocityOutOfRange => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    /// Set when the issue is local to a measure, beat or note
    pub position: Option<Position>,
    pub message: String,
}

/// Report produced by [`validate_score`]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Diagnostics {
    pub issues: Vec<Issue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, kind: IssueKind, message: impl Into<String>) {
        self.push(kind, None, message.into());
    }

    pub fn report_at(&mut self, kind: IssueKind, at: Position, message: impl Into<String>) {
        self.push(kind, Some(at), message.into());
    }

    fn push(&mut self, kind: IssueKind, position: Option<Position>, message: String) {
        self.issues.push(Issue {
            kind,
            severity: kind.severity(),
            position,
            message,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.first_error().is_some()
    }

    pub fn first_error(&self) -> Option<&Issue> {
        self.issues.iter().find(|i| i.severity == Severity::Error)
    }

    pub fn kinds(&self) -> Vec<IssueKind> {
        self.issues.iter().map(|i| i.kind).collect()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .map(|i| i.message.clone())
            .collect()
    }
}
