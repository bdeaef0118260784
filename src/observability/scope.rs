//! ObservationScope for begin/complete logging around one operation
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` with the elapsed time on `complete()`
//! - Logs `{name}_FAILED` at ERROR on `fail()`
//! - Logs `{name}_INCOMPLETE` at WARN if dropped without either

use std::cell::Cell;
use std::time::Instant;

use super::logger::Logger;

/// A scope that logs the outcome of the operation it wraps
///
/// ```ignore
/// let scope = ObservationScope::with_fields("PARTITION_COMMIT", &[("partition", dn)]);
/// match do_commit() {
///     Ok(()) => scope.complete(),
///     Err(e) => scope.fail(&e.to_string()),
/// }
/// ```
pub struct ObservationScope {
    name: &'static str,
    completed: Cell<bool>,
    fields: Vec<(&'static str, String)>,
    started: Instant,
}

impl ObservationScope {
    /// Logs `{name}_BEGIN` immediately.
    pub fn new(name: &'static str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Logs `{name}_BEGIN` with `fields`; they are repeated on every
    /// later event of this scope.
    pub fn with_fields(name: &'static str, fields: &[(&'static str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);

        Self {
            name,
            completed: Cell::new(false),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            started: Instant::now(),
        }
    }

    fn field_refs(&self) -> Vec<(&str, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }

    /// Logs `{name}_COMPLETE` at INFO.
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Logs `{name}_COMPLETE` at INFO with extra fields.
    pub fn complete_with_fields(self, extra_fields: &[(&str, &str)]) {
        self.completed.set(true);
        let elapsed = self.started.elapsed().as_millis().to_string();
        let mut fields = self.field_refs();
        fields.extend(extra_fields.iter().copied());
        fields.push(("duration_ms", &elapsed));
        Logger::info(&format!("{}_COMPLETE", self.name), &fields);
    }

    /// Logs `{name}_FAILED` at ERROR.
    pub fn fail(self, reason: &str) {
        self.completed.set(true);
        let mut fields = self.field_refs();
        fields.push(("reason", reason));
        Logger::error(&format!("{}_FAILED", self.name), &fields);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.completed.get() {
            let mut fields = self.field_refs();
            fields.push(("reason", "scope dropped without completion"));
            Logger::warn(&format!("{}_INCOMPLETE", self.name), &fields);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_starts_incomplete() {
        let scope = ObservationScope::new("TEST");
        assert!(!scope.is_completed());
        scope.complete();
    }

    #[test]
    fn test_scope_with_fields_and_fail() {
        let scope = ObservationScope::with_fields("TEST", &[("partition", "DC=app,DC=corp")]);
        scope.fail("server down");
    }

    #[test]
    fn test_scope_drop_without_complete() {
        let scope = ObservationScope::new("TEST");
        drop(scope);
    }
}
