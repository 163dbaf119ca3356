use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    ParseError,
    NoIdentity,
    DanglingReference,
    AmbiguousLocalRef,
    StaleUnit,
    WriteFailure,
    CorruptChangeStore,
    CorruptGraphStore,
    PackageNotFound,
    EntityNotFound,
    CycleDetected,
    LockContention,
    ExtractTimeout,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::ParseError => "E2001",
            Self::NoIdentity => "E2002",
            Self::DanglingReference => "E2003",
            Self::AmbiguousLocalRef => "E2004",
            Self::StaleUnit => "E2005",
            Self::WriteFailure => "E3001",
            Self::CorruptChangeStore => "E3002",
            Self::CorruptGraphStore => "E3003",
            Self::PackageNotFound => "E4001",
            Self::EntityNotFound => "E4002",
            Self::CycleDetected => "E4003",
            Self::LockContention => "E5001",
            Self::ExtractTimeout => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Index directory not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::ParseError => "Malformed extraction record",
            Self::NoIdentity => "Unit declares no identity and no parents",
            Self::DanglingReference => "Reference target not present in graph",
            Self::AmbiguousLocalRef => "Unqualified reference matches multiple packages",
            Self::StaleUnit => "Tracked unit vanished from the source",
            Self::WriteFailure => "Graph store write failed",
            Self::CorruptChangeStore => "Change-detection store unreadable",
            Self::CorruptGraphStore => "Graph store unreadable",
            Self::PackageNotFound => "Package not found",
            Self::EntityNotFound => "Entity definition not found",
            Self::CycleDetected => "Cycle detected in graph",
            Self::LockContention => "Index lock contention",
            Self::ExtractTimeout => "Unit extraction exceeded time budget",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `mg init` in the project root first."),
            Self::ConfigParseError => Some("Fix syntax in modgraph.toml and retry."),
            Self::ParseError => Some("Re-run the extractor for the reported unit."),
            Self::NoIdentity => {
                Some("Declare an identity or at least one parent reference in the unit.")
            }
            Self::DanglingReference => {
                Some("Index the package providing the target; the placeholder reconciles itself.")
            }
            Self::AmbiguousLocalRef => Some("Qualify the reference as <package>.<local-id>."),
            Self::StaleUnit => {
                Some("The unit's graph records are kept; `mg reset --yes` and reindex to drop them.")
            }
            Self::WriteFailure => Some("Check disk space; failed units retry on the next run."),
            Self::CorruptChangeStore => {
                Some("The next run reindexes everything; no action needed.")
            }
            Self::CorruptGraphStore => Some("Run `mg index --full` to rebuild the graph."),
            Self::PackageNotFound | Self::EntityNotFound => None,
            Self::CycleDetected => Some("Break the reported reference loop in the source tree."),
            Self::LockContention => Some("Retry after the other `mg` process releases its lock."),
            Self::ExtractTimeout => Some("Raise [index].parse_timeout_ms or split the unit."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Per-unit failures surfaced during an indexing run.
///
/// None of these abort the run; they mark the unit `Failed` (or emit a
/// diagnostic) and the pipeline moves on.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The raw extraction record could not be decoded.
    #[error("malformed extraction record for {unit}: {reason}")]
    Parse { unit: String, reason: String },

    /// Normalization could not assign an identity to the unit.
    #[error("no identity for unit {unit}: no declared identity and no parent refs")]
    NoIdentity { unit: String },

    /// A graph batch failed to commit after one retry.
    #[error("graph write failed for batch {group}: {source}")]
    Write {
        group: usize,
        #[source]
        source: rusqlite::Error,
    },

    /// Unit extraction ran past its time budget.
    #[error("extraction of {unit} timed out after {budget_ms}ms")]
    Timeout { unit: String, budget_ms: u64 },
}

impl IndexError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Parse { .. } => ErrorCode::ParseError,
            Self::NoIdentity { .. } => ErrorCode::NoIdentity,
            Self::Write { .. } => ErrorCode::WriteFailure,
            Self::Timeout { .. } => ErrorCode::ExtractTimeout,
        }
    }
}

/// A non-fatal finding attached to a unit, collected across the run and
/// surfaced in the final report.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostic {
    /// Machine-readable code (`E####`).
    pub code: String,
    /// Source unit the finding applies to.
    pub unit: String,
    /// Human-readable detail.
    pub detail: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(code: ErrorCode, unit: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code: code.code().to_string(),
            unit: unit.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.code, self.unit, self.detail)
    }
}
