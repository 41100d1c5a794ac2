use std::collections::HashSet;
use std::sync::Mutex;

/// Thread-safe "first time I see this?" set, used to dedupe inventory
/// resolution and break group cycles.
///
/// Backed by a plain `std::sync::Mutex`: the critical section is a single
/// hash-set lookup/insert and never spans an `.await`, so a blocking
/// mutex is the right tool here rather than an async one.
#[derive(Debug, Default)]
pub struct SeenSet {
    seen: Mutex<HashSet<String>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically record `name` as seen; returns `true` if it had NOT
    /// been seen before.
    pub fn add(&self, name: &str) -> bool {
        let mut seen = self.seen.lock().expect("seen-set mutex poisoned");
        seen.insert(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_add_returns_true() {
        let seen = SeenSet::new();
        assert!(seen.add("a"));
    }

    #[test]
    fn repeat_add_returns_false() {
        let seen = SeenSet::new();
        assert!(seen.add("a"));
        assert!(!seen.add("a"));
    }

    #[test]
    fn distinct_names_both_register() {
        let seen = SeenSet::new();
        assert!(seen.add("a"));
        assert!(seen.add("b"));
    }
}
