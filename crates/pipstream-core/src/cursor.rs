//! Cursor Tracker
//!
//! Per-subscription map from channel key to the id of the last entry the
//! subscription consumed on that channel. Owned by exactly one subscription.

use crate::error::{Error, Result};
use crate::log::{ChannelKey, EntryId};
use std::collections::BTreeMap;

/// Read positions of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorTracker {
    cursors: BTreeMap<ChannelKey, EntryId>,
}

impl CursorTracker {
    /// Seed every channel at [`EntryId::BEGINNING`].
    #[must_use]
    pub fn new(channels: &[ChannelKey]) -> Self {
        Self {
            cursors: channels
                .iter()
                .map(|channel| (channel.clone(), EntryId::BEGINNING))
                .collect(),
        }
    }

    /// Seed from client-supplied resume positions; channels without one
    /// start at the beginning. Positions for foreign channels are ignored.
    #[must_use]
    pub fn resume(channels: &[ChannelKey], positions: &BTreeMap<ChannelKey, EntryId>) -> Self {
        let mut tracker = Self::new(channels);
        for (channel, cursor) in tracker.cursors.iter_mut() {
            if let Some(position) = positions.get(channel) {
                *cursor = *position;
            }
        }
        tracker
    }

    /// Current position on `channel`, if tracked.
    #[must_use]
    pub fn position(&self, channel: &ChannelKey) -> Option<EntryId> {
        self.cursors.get(channel).copied()
    }

    /// `(channel, after)` pairs in channel order, ready for a log read.
    #[must_use]
    pub fn read_positions(&self) -> Vec<(ChannelKey, EntryId)> {
        self.cursors
            .iter()
            .map(|(channel, id)| (channel.clone(), *id))
            .collect()
    }

    /// Move `channel` forward to `id`.
    ///
    /// # Errors
    ///
    /// `InvariantViolation` if `id` is not strictly greater than the current
    /// position or the channel is not tracked. Either means the merge loop
    /// is broken; the cursor is left untouched.
    pub fn advance(&mut self, channel: &ChannelKey, id: EntryId) -> Result<()> {
        let Some(current) = self.cursors.get_mut(channel) else {
            return Err(Error::InvariantViolation(format!(
                "entry {} arrived on untracked channel {}",
                id, channel
            )));
        };
        if id <= *current {
            return Err(Error::InvariantViolation(format!(
                "cursor on {} would move from {} to {}",
                channel, current, id
            )));
        }
        *current = id;
        Ok(())
    }

    /// Copy of every position, for diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<ChannelKey, EntryId> {
        self.cursors.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> Vec<ChannelKey> {
        vec![ChannelKey::workflow("wf"), ChannelKey::file("abc")]
    }

    #[test]
    fn test_new_starts_at_beginning() {
        let tracker = CursorTracker::new(&channels());
        assert_eq!(
            tracker.position(&ChannelKey::file("abc")),
            Some(EntryId::BEGINNING)
        );
        assert_eq!(tracker.read_positions().len(), 2);
    }

    #[test]
    fn test_advance_moves_forward() {
        let mut tracker = CursorTracker::new(&channels());
        let channel = ChannelKey::file("abc");

        tracker.advance(&channel, EntryId::new(10, 0)).unwrap();
        tracker.advance(&channel, EntryId::new(10, 1)).unwrap();
        assert_eq!(tracker.position(&channel), Some(EntryId::new(10, 1)));
    }

    #[test]
    fn test_advance_rejects_repeat_and_regression() {
        let mut tracker = CursorTracker::new(&channels());
        let channel = ChannelKey::file("abc");
        tracker.advance(&channel, EntryId::new(10, 1)).unwrap();

        let repeat = tracker.advance(&channel, EntryId::new(10, 1));
        assert!(matches!(repeat, Err(Error::InvariantViolation(_))));

        let back = tracker.advance(&channel, EntryId::new(9, 99));
        assert!(matches!(back, Err(Error::InvariantViolation(_))));

        assert_eq!(tracker.position(&channel), Some(EntryId::new(10, 1)));
    }

    #[test]
    fn test_advance_rejects_untracked_channel() {
        let mut tracker = CursorTracker::new(&channels());
        let result = tracker.advance(&ChannelKey::file("other"), EntryId::new(1, 0));
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_resume_applies_known_positions_only() {
        let mut positions = BTreeMap::new();
        positions.insert(ChannelKey::workflow("wf"), EntryId::new(42, 0));
        positions.insert(ChannelKey::file("foreign"), EntryId::new(7, 0));

        let tracker = CursorTracker::resume(&channels(), &positions);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&ChannelKey::workflow("wf")], EntryId::new(42, 0));
        assert_eq!(snapshot[&ChannelKey::file("abc")], EntryId::BEGINNING);
    }
}
