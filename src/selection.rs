//! Track selection: which tracks of the loaded score are rendered.
//!
//! The selection stores track indices, so uniqueness is by track identity
//! and the render order falls out of the set ordering. A single
//! subscriber is told about every effective change, synchronously and
//! without debouncing.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewerError};
use crate::model::Track;

/// What the selection needs to know about a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub index: usize,
    pub name: String,
    pub short_name: String,
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        Self {
            index: track.index,
            name: track.name.clone(),
            short_name: track.short_name.clone(),
        }
    }
}

/// Whether the last selected track may be deselected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// At least one track stays selected
    #[default]
    KeepOne,
    /// An empty selection is allowed and renders nothing
    AllowEmpty,
}

/// Result of a toggle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
    /// Already in the requested state
    Unchanged,
    /// Refused by [`SelectionPolicy::KeepOne`]
    Rejected,
}

impl ToggleOutcome {
    pub fn changed(self) -> bool {
        matches!(self, Self::Added | Self::Removed)
    }
}

type Subscriber = Box<dyn FnMut(&[&TrackSummary])>;

pub struct TrackSelection {
    tracks: Vec<TrackSummary>,
    selected: BTreeSet<usize>,
    policy: SelectionPolicy,
    subscriber: Option<Subscriber>,
}

impl std::fmt::Debug for TrackSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackSelection")
            .field("tracks", &self.tracks)
            .field("selected", &self.selected)
            .field("policy", &self.policy)
            .field("subscribed", &self.subscriber.is_some())
            .finish()
    }
}

impl Default for TrackSelection {
    fn default() -> Self {
        Self::new(SelectionPolicy::default())
    }
}

impl TrackSelection {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            tracks: Vec::new(),
            selected: BTreeSet::new(),
            policy,
            subscriber: None,
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Replace the candidate tracks and select only the first one.
    pub fn initialize(&mut self, tracks: &[Track]) -> Result<()> {
        let first = tracks.first().ok_or(ViewerError::NoTracks)?;
        self.tracks = tracks.iter().map(TrackSummary::from).collect();
        self.selected.clear();
        self.selected.insert(first.index);
        Ok(())
    }

    /// Forget all tracks (used when the file is closed).
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.selected.clear();
    }

    /// Register the subscriber, replacing any previous one.
    pub fn subscribe(&mut self, callback: impl FnMut(&[&TrackSummary]) + 'static) {
        self.subscriber = Some(Box::new(callback));
    }

    pub fn unsubscribe(&mut self) {
        self.subscriber = None;
    }

    /// Add the track if absent, remove it if present.
    pub fn toggle(&mut self, index: usize) -> Result<ToggleOutcome> {
        let selected = !self.is_selected(index);
        self.set_selected(index, selected)
    }

    /// Put the track into the requested state.
    pub fn set_selected(&mut self, index: usize, selected: bool) -> Result<ToggleOutcome> {
        if !self.tracks.iter().any(|t| t.index == index) {
            return Err(ViewerError::UnknownTrack(index));
        }

        let outcome = if selected {
            if self.selected.insert(index) {
                ToggleOutcome::Added
            } else {
                ToggleOutcome::Unchanged
            }
        } else if !self.selected.contains(&index) {
            ToggleOutcome::Unchanged
        } else if self.policy == SelectionPolicy::KeepOne && self.selected.len() == 1 {
            log::warn!("keeping track {index}: at least one track must stay selected");
            ToggleOutcome::Rejected
        } else {
            self.selected.remove(&index);
            ToggleOutcome::Removed
        };

        if outcome.changed() {
            self.notify();
        }
        Ok(outcome)
    }

    fn notify(&mut self) {
        if let Some(mut callback) = self.subscriber.take() {
            callback(&self.ordered_selection());
            self.subscriber = Some(callback);
        }
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    /// Selected tracks, ascending by index.
    pub fn ordered_selection(&self) -> Vec<&TrackSummary> {
        let mut ordered: Vec<&TrackSummary> = self
            .tracks
            .iter()
            .filter(|t| self.selected.contains(&t.index))
            .collect();
        ordered.sort_by_key(|t| t.index);
        ordered
    }

    /// Indices of the selected tracks, ascending.
    pub fn ordered_indices(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }

    /// All candidate tracks in score order.
    pub fn tracks(&self) -> &[TrackSummary] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}
