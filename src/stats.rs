//! A named-counter store populated by every component during a cycle and read
//! once per cycle by an external metrics sink.

use std::collections::HashMap;

/// Errors raised by the counter store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `increment_counter` was called for a name that was never declared, and
    /// `create` was not set.
    #[error("counter '{0}' was not pre-declared")]
    UndeclaredCounter(String),
}

/// A named-counter store. Counters must be pre-declared (via [`Stats::declare`])
/// before being incremented, unless the caller opts into implicit creation.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    counters: HashMap<String, i64>,
}

impl Stats {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a counter at zero, if it does not already exist.
    pub fn declare(&mut self, name: impl Into<String>) {
        self.counters.entry(name.into()).or_insert(0);
    }

    /// Reset every counter to zero, preserving the set of declared names.
    pub fn drop_counters(&mut self) {
        for value in self.counters.values_mut() {
            *value = 0;
        }
    }

    /// Increment a counter by one. Requires the name be pre-declared unless `create` is set,
    /// in which case an undeclared name is created at zero first.
    pub fn increment_counter(&mut self, name: &str, create: bool) -> Result<(), Error> {
        if !self.counters.contains_key(name) {
            if create {
                self.counters.insert(name.to_string(), 0);
            } else {
                return Err(Error::UndeclaredCounter(name.to_string()));
            }
        }
        *self.counters.get_mut(name).expect("just ensured present") += 1;
        Ok(())
    }

    /// Overwrite a counter's value outright, declaring it if necessary.
    pub fn set_counter(&mut self, name: &str, value: i64) {
        self.counters.insert(name.to_string(), value);
    }

    /// The current value of a counter, or `None` if it was never declared.
    pub fn get(&self, name: &str) -> Option<i64> {
        self.counters.get(name).copied()
    }

    /// A read-only snapshot of every counter, for an external sink to consume
    /// once per cycle.
    pub fn snapshot(&self) -> HashMap<String, i64> {
        self.counters.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_requires_predeclared_name() {
        let mut stats = Stats::new();
        assert!(stats.increment_counter("empty_pr", false).is_err());
        stats.declare("empty_pr");
        assert!(stats.increment_counter("empty_pr", false).is_ok());
        assert_eq!(stats.get("empty_pr"), Some(1));
    }

    #[test]
    fn increment_with_create_declares_implicitly() {
        let mut stats = Stats::new();
        stats.increment_counter("unhandled_GitCommandError", true).expect("create");
        assert_eq!(stats.get("unhandled_GitCommandError"), Some(1));
    }

    #[test]
    fn set_counter_overwrites() {
        let mut stats = Stats::new();
        stats.set_counter("prs_total", 5);
        assert_eq!(stats.get("prs_total"), Some(5));
    }

    #[test]
    fn drop_counters_resets_but_keeps_names() {
        let mut stats = Stats::new();
        stats.set_counter("runs_successful", 3);
        stats.drop_counters();
        assert_eq!(stats.get("runs_successful"), Some(0));
    }
}
