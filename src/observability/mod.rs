//! Observability subsystem
//!
//! - Structured logging (JSON) to stderr
//! - Scope-based BEGIN/COMPLETE/FAILED tracing around remote operations
//! - Typed point events
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. No async or background threads
//! 4. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use dirpart::observability::{log_event_with_fields, Event, ObservationScope};
//!
//! let scope = ObservationScope::with_fields("LINK_SAVE", &[("link", "LinkA")]);
//! log_event_with_fields(Event::BridgeheadUpdated, &[("server", "dc1")]);
//! scope.complete();
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::ObservationScope;

/// Log a point event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event_with_fields(Event::ConfigLoaded, &[]);
        log_event_with_fields(Event::SnapshotLoaded, &[("path", "/tmp/dir.json")]);
    }
}
