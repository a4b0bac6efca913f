//! Feed controller: owns the ordered entries and decides which one is active.
//!
//! Cells never touch [`FeedState`] directly. They get a read-only view plus an
//! `is_active` flag, and send remix taps back up through
//! [`FeedController::on_remix_requested`].

use crate::api::RemixRequest;
use crate::data::FeedService;
use crate::error::FeedError;
use crate::model::VideoEntry;
use crate::remix::{PromptOutcome, RemixHandler};

/// A change of the active row, as seen by the cells that must react to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveChange {
    pub previous: Option<usize>,
    pub current: Option<usize>,
}

/// `active_index` is `None` exactly when `entries` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedState {
    entries: Vec<VideoEntry>,
    active_index: Option<usize>,
}

impl FeedState {
    pub fn entries(&self) -> &[VideoEntry] {
        &self.entries
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_index
    }

    pub fn active_entry(&self) -> Option<&VideoEntry> {
        self.active_index.and_then(|idx| self.entries.get(idx))
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active_index == Some(index)
    }

    pub fn get(&self, index: usize) -> Option<&VideoEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, entry_id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == entry_id)
    }
}

pub struct FeedController<H> {
    state: FeedState,
    remix: H,
}

impl<H: RemixHandler> FeedController<H> {
    pub fn new(remix: H) -> Self {
        Self {
            state: FeedState::default(),
            remix,
        }
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn remix_handler(&self) -> &H {
        &self.remix
    }

    /// Fetches and applies a feed on the calling thread.
    pub fn load_feed(&mut self, service: &dyn FeedService) -> Result<ActiveChange, FeedError> {
        self.complete_load(service.load_feed())
    }

    /// Applies the result of a fetch that ran elsewhere.
    ///
    /// On success the entries are replaced and the first row becomes active.
    /// On failure the previous entries and active row are kept.
    pub fn complete_load(
        &mut self,
        result: anyhow::Result<Vec<VideoEntry>>,
    ) -> Result<ActiveChange, FeedError> {
        let entries = match result {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "feed load failed");
                return Err(FeedError::Fetch(err));
            }
        };

        let previous = self.state.active_index;
        let current = if entries.is_empty() { None } else { Some(0) };
        tracing::info!(count = entries.len(), "feed loaded");
        self.state = FeedState {
            entries,
            active_index: current,
        };
        Ok(ActiveChange { previous, current })
    }

    /// Moves the active row to the topmost visible index.
    ///
    /// Returns `None` when nothing changed: empty input, an index outside the
    /// feed, or the row that is already active.
    pub fn on_visibility_changed(&mut self, visible: &[usize]) -> Option<ActiveChange> {
        let &first = visible.first()?;
        if first >= self.state.entries.len() {
            tracing::debug!(index = first, len = self.state.entries.len(), "ignoring stale visible index");
            return None;
        }
        if self.state.active_index == Some(first) {
            return None;
        }
        let change = ActiveChange {
            previous: self.state.active_index,
            current: Some(first),
        };
        self.state.active_index = Some(first);
        tracing::debug!(previous = ?change.previous, current = first, "active row changed");
        Some(change)
    }

    /// Forwards a remix prompt for `entry_id`. Returns whether a request was
    /// handed to the remix handler.
    pub fn on_remix_requested(&self, entry_id: &str, outcome: PromptOutcome) -> bool {
        let prompt = match outcome {
            PromptOutcome::Cancel => return false,
            PromptOutcome::Submit(prompt) => prompt,
        };
        if prompt.trim().is_empty() {
            tracing::debug!(entry_id, "ignoring empty remix prompt");
            return false;
        }
        if self.state.position(entry_id).is_none() {
            tracing::warn!(entry_id, "remix requested for entry outside the current feed");
            return false;
        }
        self.remix.submit(RemixRequest {
            video_id: entry_id.to_string(),
            prompt,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingHandler {
        requests: RefCell<Vec<RemixRequest>>,
    }

    impl RemixHandler for RecordingHandler {
        fn submit(&self, request: RemixRequest) {
            self.requests.borrow_mut().push(request);
        }
    }

    fn entry(id: &str) -> VideoEntry {
        VideoEntry {
            id: id.into(),
            video_url: format!("https://v.test/{id}.mp4"),
            username: None,
            description: None,
            like_count: None,
            comment_count: None,
        }
    }

    fn loaded(ids: &[&str]) -> FeedController<RecordingHandler> {
        let mut controller = FeedController::new(RecordingHandler::default());
        controller
            .complete_load(Ok(ids.iter().map(|id| entry(id)).collect()))
            .unwrap();
        controller
    }

    #[test]
    fn load_activates_first_entry() {
        let controller = loaded(&["1", "2"]);
        assert_eq!(controller.state().active_index(), Some(0));
        assert_eq!(controller.state().active_entry().unwrap().id, "1");
    }

    #[test]
    fn empty_load_has_no_active_entry() {
        let mut controller = loaded(&["1"]);
        let change = controller.complete_load(Ok(Vec::new())).unwrap();
        assert_eq!(change.previous, Some(0));
        assert_eq!(change.current, None);
        assert!(controller.state().is_empty());
        assert_eq!(controller.state().active_index(), None);
    }

    #[test]
    fn failed_first_load_keeps_feed_empty() {
        let mut controller = FeedController::new(RecordingHandler::default());
        let err = controller
            .complete_load(Err(anyhow!("connection refused")))
            .unwrap_err();
        assert!(matches!(err, FeedError::Fetch(_)));
        assert!(controller.state().is_empty());
        assert_eq!(controller.state().active_index(), None);
    }

    #[test]
    fn failed_reload_keeps_previous_entries() {
        let mut controller = loaded(&["1", "2"]);
        controller.on_visibility_changed(&[1]);
        assert!(controller.complete_load(Err(anyhow!("bad gateway"))).is_err());
        assert_eq!(controller.state().len(), 2);
        assert_eq!(controller.state().active_index(), Some(1));
    }

    #[test]
    fn load_through_service() {
        let mut controller = FeedController::new(RecordingHandler::default());
        controller.load_feed(&crate::data::MockFeedService).unwrap();
        assert_eq!(controller.state().len(), 2);
        assert!(controller.state().is_active(0));
    }

    #[test]
    fn empty_visibility_leaves_active_unchanged() {
        let mut controller = loaded(&["1", "2", "3"]);
        controller.on_visibility_changed(&[2]);
        assert_eq!(controller.on_visibility_changed(&[]), None);
        assert_eq!(controller.state().active_index(), Some(2));
    }

    #[test]
    fn visibility_sets_active_once() {
        let mut controller = loaded(&["1", "2"]);
        let change = controller.on_visibility_changed(&[1]);
        assert_eq!(
            change,
            Some(ActiveChange {
                previous: Some(0),
                current: Some(1),
            })
        );
        assert_eq!(controller.on_visibility_changed(&[1]), None);
        assert_eq!(controller.state().active_index(), Some(1));
    }

    #[test]
    fn topmost_visible_row_wins() {
        let mut controller = loaded(&["1", "2", "3"]);
        controller.on_visibility_changed(&[1, 2]);
        assert_eq!(controller.state().active_index(), Some(1));
    }

    #[test]
    fn active_index_stays_in_bounds() {
        let mut controller = loaded(&["1", "2"]);
        assert_eq!(controller.on_visibility_changed(&[5]), None);
        for visible in [[1usize], [0], [7], [1]] {
            controller.on_visibility_changed(&visible);
            let active = controller.state().active_index().unwrap();
            assert!(active < controller.state().len());
        }
    }

    #[test]
    fn remix_forwards_exactly_once_without_state_change() {
        let controller = loaded(&["1", "2"]);
        let before = controller.state().clone();
        assert!(controller.on_remix_requested("1", PromptOutcome::Submit("make it blue".into())));
        assert_eq!(
            *controller.remix_handler().requests.borrow(),
            vec![RemixRequest {
                video_id: "1".into(),
                prompt: "make it blue".into(),
            }]
        );
        assert_eq!(controller.state(), &before);
    }

    #[test]
    fn cancelled_or_blank_remix_is_not_sent() {
        let controller = loaded(&["1"]);
        assert!(!controller.on_remix_requested("1", PromptOutcome::Cancel));
        assert!(!controller.on_remix_requested("1", PromptOutcome::Submit("   ".into())));
        assert!(!controller.on_remix_requested("missing", PromptOutcome::Submit("x".into())));
        assert!(controller.remix_handler().requests.borrow().is_empty());
    }
}
