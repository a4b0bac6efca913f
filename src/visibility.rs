use std::time::{Duration, Instant};

/// Indices of rows that have at least `threshold` of their height inside the
/// viewport, lowest index first.
pub fn visible_rows(
    offset: usize,
    viewport_height: usize,
    row_height: usize,
    count: usize,
    threshold: f32,
) -> Vec<usize> {
    if row_height == 0 || viewport_height == 0 || count == 0 {
        return Vec::new();
    }
    let view_end = offset + viewport_height;
    let first = offset / row_height;
    let last = ((view_end - 1) / row_height).min(count - 1);

    (first..=last)
        .filter(|&idx| {
            let start = idx * row_height;
            let end = start + row_height;
            let overlap = end.min(view_end).saturating_sub(start.max(offset));
            overlap as f32 / row_height as f32 >= threshold
        })
        .collect()
}

/// Scroll position of a vertically paged list, measured in terminal lines.
///
/// Visibility is only reported once scrolling has been idle for
/// `settle_delay`.
#[derive(Debug, Clone)]
pub struct ScrollTracker {
    offset: usize,
    viewport_height: usize,
    row_height: usize,
    threshold: f32,
    settle_delay: Duration,
    last_scroll: Option<Instant>,
}

impl ScrollTracker {
    pub fn new(threshold: f32, settle_delay: Duration) -> Self {
        Self {
            offset: 0,
            viewport_height: 0,
            row_height: 0,
            threshold: threshold.clamp(0.01, 1.0),
            settle_delay,
            last_scroll: None,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Updates the geometry after a resize, keeping the same row on top.
    pub fn set_geometry(&mut self, viewport_height: usize, row_height: usize) {
        if self.viewport_height == viewport_height && self.row_height == row_height {
            return;
        }
        let top_row = if self.row_height == 0 {
            0
        } else {
            self.offset / self.row_height
        };
        self.viewport_height = viewport_height;
        self.row_height = row_height;
        self.offset = top_row * row_height;
    }

    /// Moves by `delta` lines, clamped to the list, and restarts the settle
    /// timer.
    pub fn scroll_by(&mut self, delta: isize, count: usize, now: Instant) {
        let max = self.max_offset(count);
        let next = if delta < 0 {
            self.offset.saturating_sub(delta.unsigned_abs())
        } else {
            self.offset.saturating_add(delta as usize)
        };
        self.offset = next.min(max);
        self.last_scroll = Some(now);
    }

    /// Returns the visible rows once the list has been still for the settle
    /// delay. Each scroll burst is reported at most once.
    pub fn poll_settled(&mut self, count: usize, now: Instant) -> Option<Vec<usize>> {
        let last = self.last_scroll?;
        if now.saturating_duration_since(last) < self.settle_delay {
            return None;
        }
        self.last_scroll = None;
        Some(self.visible(count))
    }

    pub fn visible(&self, count: usize) -> Vec<usize> {
        visible_rows(
            self.offset,
            self.viewport_height,
            self.row_height,
            count,
            self.threshold,
        )
    }

    /// Aligns the viewport with the top of `index`.
    pub fn snap_to_row(&mut self, index: usize, count: usize) {
        self.offset = (index * self.row_height).min(self.max_offset(count));
        self.last_scroll = None;
    }

    fn max_offset(&self, count: usize) -> usize {
        (count * self.row_height).saturating_sub(self.viewport_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_viewport_shows_one_row() {
        assert_eq!(visible_rows(0, 40, 40, 3, 0.5), vec![0]);
        assert_eq!(visible_rows(40, 40, 40, 3, 0.5), vec![1]);
    }

    #[test]
    fn half_scrolled_rows_meet_the_threshold_together() {
        // 20 lines of row 0 and 20 lines of row 1 are on screen.
        assert_eq!(visible_rows(20, 40, 40, 3, 0.5), vec![0, 1]);
        assert_eq!(visible_rows(21, 40, 40, 3, 0.5), vec![1]);
        assert_eq!(visible_rows(19, 40, 40, 3, 0.5), vec![0]);
    }

    #[test]
    fn strict_threshold_can_leave_nothing_visible() {
        assert!(visible_rows(10, 40, 40, 3, 0.9).is_empty());
    }

    #[test]
    fn degenerate_geometry_is_empty() {
        assert!(visible_rows(0, 0, 40, 3, 0.5).is_empty());
        assert!(visible_rows(0, 40, 0, 3, 0.5).is_empty());
        assert!(visible_rows(0, 40, 40, 0, 0.5).is_empty());
    }

    #[test]
    fn rows_past_the_end_are_not_reported() {
        assert_eq!(visible_rows(40, 80, 40, 2, 0.5), vec![1]);
    }

    #[test]
    fn reports_once_after_settling() {
        let start = Instant::now();
        let mut tracker = ScrollTracker::new(0.5, Duration::from_millis(150));
        tracker.set_geometry(40, 40);

        tracker.scroll_by(30, 3, start);
        assert!(tracker.poll_settled(3, start + Duration::from_millis(100)).is_none());
        tracker.scroll_by(5, 3, start + Duration::from_millis(100));
        assert!(tracker.poll_settled(3, start + Duration::from_millis(200)).is_none());

        let visible = tracker.poll_settled(3, start + Duration::from_millis(260));
        assert_eq!(visible, Some(vec![1]));
        assert!(tracker.poll_settled(3, start + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn scrolling_is_clamped_to_the_list() {
        let now = Instant::now();
        let mut tracker = ScrollTracker::new(0.5, Duration::ZERO);
        tracker.set_geometry(40, 40);
        tracker.scroll_by(-10, 2, now);
        assert_eq!(tracker.offset(), 0);
        tracker.scroll_by(500, 2, now);
        assert_eq!(tracker.offset(), 40);
    }

    #[test]
    fn resize_keeps_top_row_and_snap_aligns() {
        let now = Instant::now();
        let mut tracker = ScrollTracker::new(0.5, Duration::ZERO);
        tracker.set_geometry(40, 40);
        tracker.snap_to_row(2, 3);
        assert_eq!(tracker.offset(), 80);
        tracker.set_geometry(30, 30);
        assert_eq!(tracker.offset(), 60);
        tracker.scroll_by(10, 3, now);
        tracker.snap_to_row(2, 3);
        assert_eq!(tracker.offset(), 60);
        assert!(tracker
            .poll_settled(3, now + Duration::from_secs(1))
            .is_none());
    }
}
