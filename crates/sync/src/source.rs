//! Which update channel is authoritative.
//!
//! Exactly one channel writes to the task map at any time. The selector is
//! owned by the engine worker, so deciding and applying never race.
//!
//! ```text
//! Connecting --confirmed--> Push
//! Connecting --timeout/lost--> Polling --confirmed--> Push
//! Push --lost--> Polling
//! ```

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    /// Subscribed, waiting for the push channel to confirm.
    Connecting,
    /// Push is unconfirmed or lost; periodic polls are the source of truth.
    Polling,
    /// Push is confirmed and the only source of truth.
    Push,
}

impl SyncSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncSource::Connecting => "connecting",
            SyncSource::Polling => "polling",
            SyncSource::Push => "push",
        }
    }
}

impl std::fmt::Display for SyncSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SourceSelector {
    current: SyncSource,
}

impl Default for SourceSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceSelector {
    pub fn new() -> Self {
        Self {
            current: SyncSource::Connecting,
        }
    }

    pub fn current(&self) -> SyncSource {
        self.current
    }

    /// The push channel acknowledged the subscription. Returns whether the
    /// source changed.
    pub fn on_push_confirmed(&mut self) -> bool {
        self.switch(SyncSource::Push)
    }

    /// The confirmation window elapsed. Only leaves `Connecting`.
    pub fn on_fallback_timeout(&mut self) -> bool {
        match self.current {
            SyncSource::Connecting => self.switch(SyncSource::Polling),
            SyncSource::Polling | SyncSource::Push => false,
        }
    }

    /// Subscribing failed, or the stream broke or ended.
    pub fn on_push_lost(&mut self) -> bool {
        self.switch(SyncSource::Polling)
    }

    /// Push events are applied until polling takes over.
    pub fn accepts_push_data(&self) -> bool {
        matches!(self.current, SyncSource::Connecting | SyncSource::Push)
    }

    pub fn accepts_poll_data(&self) -> bool {
        self.current == SyncSource::Polling
    }

    fn switch(&mut self, to: SyncSource) -> bool {
        let changed = self.current != to;
        self.current = to;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_connecting_and_accepts_push_only() {
        let selector = SourceSelector::new();
        assert_eq!(selector.current(), SyncSource::Connecting);
        assert!(selector.accepts_push_data());
        assert!(!selector.accepts_poll_data());
    }

    #[test]
    fn timeout_switches_to_polling_once() {
        let mut selector = SourceSelector::new();
        assert!(selector.on_fallback_timeout());
        assert_eq!(selector.current(), SyncSource::Polling);
        assert!(!selector.accepts_push_data());
        assert!(selector.accepts_poll_data());
        assert!(!selector.on_fallback_timeout());
    }

    #[test]
    fn confirmation_makes_push_exclusive() {
        let mut selector = SourceSelector::new();
        selector.on_fallback_timeout();
        assert!(selector.on_push_confirmed());
        assert!(selector.accepts_push_data());
        assert!(!selector.accepts_poll_data());

        // a late timeout never undoes a confirmation
        assert!(!selector.on_fallback_timeout());
        assert_eq!(selector.current(), SyncSource::Push);
    }

    #[test]
    fn losing_push_falls_back_to_polling() {
        let mut selector = SourceSelector::new();
        selector.on_push_confirmed();
        assert!(selector.on_push_lost());
        assert_eq!(selector.current(), SyncSource::Polling);
        assert!(!selector.on_push_lost());
    }

    #[test]
    fn display_is_snake_case() {
        assert_eq!(SyncSource::Push.to_string(), "push");
        assert_eq!(
            serde_json::to_value(SyncSource::Polling).unwrap(),
            serde_json::json!("polling")
        );
    }
}
