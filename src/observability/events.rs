//! Point events
//!
//! Operations wrapped in an `ObservationScope` log their own
//! BEGIN/COMPLETE/FAILED events; these are the single-shot events in between.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // CLI lifecycle
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Directory snapshot read
    SnapshotLoaded,
    /// Directory snapshot written back
    SnapshotSaved,

    // Partition commit
    /// Server refused to create the cross-reference; creating it explicitly
    CrossRefManualFallback,
    /// Existing cross-reference found at the role owner and reused
    CrossRefReused,
    /// Disabled cross-reference created at the role owner
    CrossRefProvisioned,
    /// Cross-reference removed after a failed head commit
    CrossRefRolledBack,
    /// Rollback of the cross-reference failed; an orphan remains
    CrossRefRollbackFailed,
    /// Buffered replica/security changes written to the cross-reference
    CrossRefFlushed,

    // Server discovery
    /// Registered server did not answer and was passed over
    ServerSkipped,

    // Topology
    /// Bridgehead transport attribute written on a server
    BridgeheadUpdated,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SnapshotLoaded => "SNAPSHOT_LOADED",
            Event::SnapshotSaved => "SNAPSHOT_SAVED",
            Event::CrossRefManualFallback => "CROSS_REF_MANUAL_FALLBACK",
            Event::CrossRefReused => "CROSS_REF_REUSED",
            Event::CrossRefProvisioned => "CROSS_REF_PROVISIONED",
            Event::CrossRefRolledBack => "CROSS_REF_ROLLED_BACK",
            Event::CrossRefRollbackFailed => "CROSS_REF_ROLLBACK_FAILED",
            Event::CrossRefFlushed => "CROSS_REF_FLUSHED",
            Event::ServerSkipped => "SERVER_SKIPPED",
            Event::BridgeheadUpdated => "BRIDGEHEAD_UPDATED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::CrossRefManualFallback | Event::CrossRefRollbackFailed | Event::ServerSkipped => {
                Severity::Warn
            }
            Event::BridgeheadUpdated | Event::CrossRefFlushed => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
