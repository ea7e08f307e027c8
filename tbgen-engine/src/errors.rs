//! The five error kinds spec.md §7 names, each its own plain enum with a
//! hand-written `Display`/`Error` impl — the way `cheers`'s own
//! `UciParseError` is written, not `thiserror`/`anyhow` (neither is
//! grounded in the teacher's stack). `GenerationError` unifies them with
//! `From` impls so orchestration can use `?` across module boundaries.

use std::fmt::Display;
use std::path::PathBuf;

use crate::config::ConfigError;

#[derive(Debug, PartialEq, Eq)]
pub enum FuturebaseError {
    /// The futurebase's declared type doesn't match the actual
    /// difference between its mobile list and the current one.
    TypeMismatch { declared: &'static str, expected_mobile_delta: &'static str },
    HeaderMismatch(String),
    BadHeader(String),
}

impl Display for FuturebaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMismatch { declared, expected_mobile_delta } => write!(
                f,
                "futurebase declared as '{declared}' but its mobile-list difference is {expected_mobile_delta}"
            ),
            Self::HeaderMismatch(s) => write!(f, "{s}"),
            Self::BadHeader(s) => write!(f, "malformed futurebase header: {s}"),
        }
    }
}
impl std::error::Error for FuturebaseError {}

#[derive(Debug)]
pub enum ConsistencyError {
    OutOfOrderProptable { index: u64, expected_at_least: u64 },
    DoubleHandledFuturemove { index: u64, futuremove_id: u32 },
    MovecntUnderflow { index: u64 },
    MateInRegression { index: u64, from: u8, to: u8 },
    /// A spilled proptable run failed to read back (truncated or
    /// corrupted run file, or the spill directory vanished mid-merge).
    SpillRead(ArtifactError),
}

impl Display for ConsistencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfOrderProptable { index, expected_at_least } => write!(
                f,
                "proptable delivered index {index} out of order (expected >= {expected_at_least})"
            ),
            Self::DoubleHandledFuturemove { index, futuremove_id } => write!(
                f,
                "futuremove {futuremove_id} at index {index} was handled twice"
            ),
            Self::MovecntUnderflow { index } => {
                write!(f, "movecnt decremented below zero at index {index}")
            }
            Self::MateInRegression { index, from, to } => write!(
                f,
                "mate_in regressed at index {index} on a DONE position ({from} -> {to})"
            ),
            Self::SpillRead(e) => write!(f, "proptable spill read failed: {e}"),
        }
    }
}
impl std::error::Error for ConsistencyError {}

impl From<ArtifactError> for ConsistencyError {
    fn from(e: ArtifactError) -> Self {
        Self::SpillRead(e)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CompletenessError {
    pub unresolved_indices: Vec<u64>,
}

impl Display for CompletenessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} position(s) have unresolved futuremoves under move-restriction NONE (first: {})",
            self.unresolved_indices.len(),
            self.unresolved_indices.first().copied().unwrap_or_default()
        )
    }
}
impl std::error::Error for CompletenessError {}

#[derive(Debug)]
pub enum ArtifactError {
    Io(PathBuf, std::io::Error),
    Header(String),
    /// The proptable's in-memory buffer hit `budget_entries` and needed
    /// to spill a sorted run to disk, but no spill directory was
    /// configured for this pass.
    SpillDirectoryRequired { budget_entries: usize },
}

impl Display for ArtifactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "{}: {e}", path.display()),
            Self::Header(s) => write!(f, "{s}"),
            Self::SpillDirectoryRequired { budget_entries } => write!(
                f,
                "proptable exceeded its {budget_entries}-entry memory budget with no spill directory configured"
            ),
        }
    }
}
impl std::error::Error for ArtifactError {}

#[derive(Debug)]
pub enum GenerationError {
    Config(ConfigError),
    Futurebase(FuturebaseError),
    Consistency(ConsistencyError),
    Completeness(CompletenessError),
    Artifact(ArtifactError),
}

impl Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Futurebase(e) => write!(f, "futurebase error: {e}"),
            Self::Consistency(e) => write!(f, "internal consistency error: {e}"),
            Self::Completeness(e) => write!(f, "incomplete generation: {e}"),
            Self::Artifact(e) => write!(f, "artifact I/O error: {e}"),
        }
    }
}
impl std::error::Error for GenerationError {}

impl From<ConfigError> for GenerationError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
impl From<FuturebaseError> for GenerationError {
    fn from(e: FuturebaseError) -> Self {
        Self::Futurebase(e)
    }
}
impl From<ConsistencyError> for GenerationError {
    fn from(e: ConsistencyError) -> Self {
        Self::Consistency(e)
    }
}
impl From<CompletenessError> for GenerationError {
    fn from(e: CompletenessError) -> Self {
        Self::Completeness(e)
    }
}
impl From<ArtifactError> for GenerationError {
    fn from(e: ArtifactError) -> Self {
        Self::Artifact(e)
    }
}
