//! A small rate-limited logging sink, shared by [`crate::validator`] and
//! [`crate::checkpoint`] so that a pathology or a checkpoint-skip reason
//! that repeats every cycle doesn't flood the log at `info`/`warn` level.
//!
//! This replaces what would otherwise be a global mutable logger: every
//! component that wants throttled diagnostics owns a `Diagnostics` instance
//! rather than reaching for a `static`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

pub struct Diagnostics {
    last_emitted: Mutex<HashMap<String, Instant>>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            last_emitted: Mutex::new(HashMap::new()),
        }
    }

    /// Emits `message` at `level` under `key`, unless the same `key` was
    /// already emitted within `min_interval`. Returns whether it emitted.
    pub fn emit_throttled(
        &self,
        key: &str,
        level: log::Level,
        message: &str,
        min_interval: Duration,
    ) -> bool {
        let mut guard = self.last_emitted.lock().expect("diagnostics mutex poisoned");
        let now = Instant::now();
        let should_emit = match guard.get(key) {
            Some(last) => now.duration_since(*last) >= min_interval,
            None => true,
        };
        if should_emit {
            guard.insert(key.to_string(), now);
            drop(guard);
            log::log!(level, "{}", message);
        }
        should_emit
    }

    pub fn info(&self, message: &str) {
        log::info!("{}", message);
    }

    pub fn warn(&self, message: &str) {
        log::warn!("{}", message);
    }

    pub fn error(&self, message: &str) {
        log::error!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_emit_within_window_is_suppressed() {
        let diagnostics = Diagnostics::new();
        assert!(diagnostics.emit_throttled("k", log::Level::Warn, "first", Duration::from_secs(60)));
        assert!(!diagnostics.emit_throttled("k", log::Level::Warn, "second", Duration::from_secs(60)));
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let diagnostics = Diagnostics::new();
        assert!(diagnostics.emit_throttled("a", log::Level::Warn, "a", Duration::from_secs(60)));
        assert!(diagnostics.emit_throttled("b", log::Level::Warn, "b", Duration::from_secs(60)));
    }

    #[test]
    fn emit_after_window_elapses_succeeds() {
        let diagnostics = Diagnostics::new();
        assert!(diagnostics.emit_throttled("k", log::Level::Warn, "first", Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(diagnostics.emit_throttled("k", log::Level::Warn, "second", Duration::from_millis(1)));
    }
}
