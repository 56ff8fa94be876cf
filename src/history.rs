//! Undo/redo stack of settings snapshots.

use tracing::debug;

use crate::models::ColorGradingSettings;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Bounded list of snapshots with a cursor at the current one.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<ColorGradingSettings>,
    cursor: usize,
    limit: usize,
}

impl History {
    pub fn new(initial: ColorGradingSettings, limit: usize) -> Self {
        Self {
            entries: vec![initial],
            cursor: 0,
            limit: limit.max(1),
        }
    }

    /// Drop any redo branch, append `settings` and evict the oldest
    /// snapshots past the limit.
    pub fn push(&mut self, settings: ColorGradingSettings) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(settings);
        let overflow = self.entries.len().saturating_sub(self.limit);
        if overflow > 0 {
            self.entries.drain(..overflow);
            debug!(evicted = overflow, "history limit reached");
        }
        self.cursor = self.entries.len() - 1;
    }

    pub fn undo(&mut self) -> Option<&ColorGradingSettings> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    pub fn redo(&mut self) -> Option<&ColorGradingSettings> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn current(&self) -> Option<&ColorGradingSettings> {
        self.entries.get(self.cursor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(ColorGradingSettings::default(), DEFAULT_HISTORY_LIMIT)
    }
}
