//! Error and warning types for udmesh operations.
//!
//! Every fallible library call returns [`Result<T>`], carrying a [`UdmError`]
//! on failure. Errors are classified by [`ErrorKind`]; a kind is either
//! recoverable (the model is untouched) or fatal (the affected zone is marked
//! *suspect* and refuses further operations until re-ingested or disposed).
//!
//! Conditions that do not prevent a call from completing are modeled as
//! [`Warning`] values returned through the call's success path (for example
//! a repartition that produces no migration), never as `Err`.
//!
//! # Example
//!
//! ```
//! use udmesh::error::{ErrorKind, UdmError};
//!
//! let err = UdmError::new(ErrorKind::UnknownSolution, "no solution named `Mach`");
//! assert_eq!(err.kind(), ErrorKind::UnknownSolution);
//! assert!(!err.kind().is_fatal());
//! ```

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, UdmError>;

/// Classification of udmesh errors.
///
/// The fatal kinds ([`Self::PartitionFailed`], [`Self::TransportFailed`],
/// [`Self::TransferPlanMismatch`]) leave the zone in a suspect state; all
/// other kinds are rejected up front and leave the model unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An entity id is out of range, removed, or of the wrong reality.
    InvalidEntity,
    /// A solution name has no registry entry (and auto-registration is off).
    UnknownSolution,
    /// A value's component count does not match the registered vector arity.
    ArityMismatch,
    /// The pairwise boundary-node index is not symmetric across ranks.
    RankConnectivityMismatch,
    /// The graph partitioner reported an error; the model is unchanged.
    PartitionFailed,
    /// A collective size or payload exchange failed; zone state may be
    /// inconsistent and the zone is marked suspect.
    TransportFailed,
    /// Ghost-layer exchange plans disagree between two ranks, meaning a
    /// rebuild was not run everywhere after a topology change.
    TransferPlanMismatch,
    /// Reading or writing a mesh container or staging file failed.
    ContainerIo,
    /// A DFI configuration document could not be parsed.
    ConfigParse,
    /// The operation is not permitted in the model's current lifecycle state.
    InvalidState,
}

impl ErrorKind {
    /// True for kinds that mark the affected zone suspect.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::PartitionFailed
                | ErrorKind::TransportFailed
                | ErrorKind::TransferPlanMismatch
        )
    }

    /// Short stable name, usable in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidEntity => "invalid-entity",
            ErrorKind::UnknownSolution => "unknown-solution",
            ErrorKind::ArityMismatch => "arity-mismatch",
            ErrorKind::RankConnectivityMismatch => "rank-connectivity-mismatch",
            ErrorKind::PartitionFailed => "partition-failed",
            ErrorKind::TransportFailed => "transport-failed",
            ErrorKind::TransferPlanMismatch => "transfer-plan-mismatch",
            ErrorKind::ContainerIo => "container-io",
            ErrorKind::ConfigParse => "config-parse",
            ErrorKind::InvalidState => "invalid-state",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal conditions surfaced through a call's success path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Warning {
    /// Repartitioning produced empty import and export lists everywhere.
    NoChange,
    /// An element kind outside the supported set was skipped.
    NotSupportedElementKind,
    /// A zone holds no cells; the operation degenerated to a no-op.
    EmptyZone,
}

impl Warning {
    /// Short stable name, usable in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Warning::NoChange => "no-change",
            Warning::NotSupportedElementKind => "not-supported-element-kind",
            Warning::EmptyZone => "empty-zone",
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised by a udmesh operation.
///
/// Carries the [`ErrorKind`], a human-readable message, and (in debug builds)
/// the `file:line` of the raise site when constructed through [`udm_error!`].
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct UdmError {
    kind: ErrorKind,
    message: String,
    context: Option<String>,
}

impl UdmError {
    /// Create an error of `kind` with a message.
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Attach source-location or call-site context.
    #[must_use]
    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    /// The error's classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Optional raise-site context (`file:line`), present in debug builds.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

impl From<std::io::Error> for UdmError {
    fn from(e: std::io::Error) -> Self {
        UdmError::new(ErrorKind::ContainerIo, e.to_string())
    }
}

/// Map the numeric debug-level knob to a tracing filter directive.
///
/// `0` is silent, `1` shows errors, `2` adds warnings, `3` adds progress
/// information, `4` and above adds debug detail. Hosts feed the result to
/// their tracing subscriber; the library itself only emits events.
pub fn stderr_filter(debug_level: u32) -> &'static str {
    match debug_level {
        0 => "off",
        1 => "error",
        2 => "warn",
        3 => "info",
        _ => "debug",
    }
}

/// Construct a [`UdmError`], capturing `file:line` context in debug builds.
///
/// ```
/// use udmesh::error::ErrorKind;
/// use udmesh::udm_error;
///
/// let e = udm_error!(ErrorKind::InvalidEntity, "node {} out of range", 42);
/// assert_eq!(e.kind(), ErrorKind::InvalidEntity);
/// ```
#[macro_export]
macro_rules! udm_error {
    ($kind:expr, $($arg:tt)*) => {{
        let e = $crate::error::UdmError::new($kind, format!($($arg)*));
        if cfg!(debug_assertions) {
            e.with_context(format!("{}:{}", file!(), line!()))
        } else {
            e
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(ErrorKind::TransportFailed.is_fatal());
        assert!(ErrorKind::PartitionFailed.is_fatal());
        assert!(ErrorKind::TransferPlanMismatch.is_fatal());
        assert!(!ErrorKind::InvalidEntity.is_fatal());
        assert!(!ErrorKind::ConfigParse.is_fatal());
    }

    #[test]
    fn debug_levels_map_to_filters() {
        assert_eq!(stderr_filter(0), "off");
        assert_eq!(stderr_filter(2), "warn");
        assert_eq!(stderr_filter(4), "debug");
        assert_eq!(stderr_filter(9), "debug");
    }

    #[test]
    fn macro_captures_context_in_debug() {
        let e = udm_error!(ErrorKind::ArityMismatch, "expected {} values", 3);
        assert_eq!(e.kind(), ErrorKind::ArityMismatch);
        assert_eq!(e.message(), "expected 3 values");
        if cfg!(debug_assertions) {
            assert!(e.context().unwrap().contains("error.rs"));
        }
    }
}
