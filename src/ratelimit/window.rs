//! Sliding window counter implementation.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// An exact-count quota over a trailing time horizon.
///
/// Admission instants are only ever appended at the tail, so the deque stays
/// ordered oldest first and eviction is a prefix trim.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    /// Maximum admissions within the window
    capacity: u32,
    /// Length of the trailing window
    window: Duration,
    /// Admission instants, oldest first
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            timestamps: VecDeque::new(),
        }
    }

    /// Evict expired entries, then admit the request if there is room.
    pub fn add_request(&mut self) -> bool {
        let now = Instant::now();
        self.evict(now);

        if self.timestamps.len() < self.capacity as usize {
            self.timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// How long until the oldest in-window entry ages out.
    ///
    /// An entry is evicted once its age reaches the window, so waiting exactly
    /// this long frees a slot.
    pub fn time_until_available(&self) -> Duration {
        if self.timestamps.len() < self.capacity as usize {
            return Duration::ZERO;
        }
        match self.timestamps.front() {
            Some(oldest) => self
                .window
                .saturating_sub(Instant::now().saturating_duration_since(*oldest)),
            None => Duration::ZERO,
        }
    }

    /// Admissions still available, ignoring entries that have already expired.
    pub fn remaining(&self) -> u32 {
        let now = Instant::now();
        let live = self
            .timestamps
            .iter()
            .filter(|ts| now.saturating_duration_since(**ts) < self.window)
            .count();
        self.capacity.saturating_sub(live as u32)
    }

    /// Maximum admissions within the window.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Length of the trailing window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of recorded admissions, including any not yet evicted.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether no admissions are recorded.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    #[tokio::test(start_paused = true)]
    async fn test_capacity_enforced() {
        let mut window = SlidingWindow::new(2, Duration::from_secs(60));

        assert!(window.add_request());
        assert!(window.add_request());
        assert!(!window.add_request());
        assert_eq!(window.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_evicted() {
        let mut window = SlidingWindow::new(2, Duration::from_secs(1));
        assert!(window.add_request());
        assert!(window.add_request());

        // Age the oldest admission past the window.
        time::advance(Duration::from_secs(3)).await;
        let now = Instant::now();
        window.timestamps[1] = now;
        window.timestamps[0] = now - Duration::from_secs(2);

        assert!(window.add_request());
        assert_eq!(window.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let mut window = SlidingWindow::new(1, Duration::from_secs(10));
        assert!(window.add_request());

        time::advance(Duration::from_secs(5)).await;
        assert!(!window.add_request());
        assert_eq!(window.time_until_available(), Duration::from_secs(5));

        time::advance(Duration::from_secs(6)).await;
        assert!(window.add_request());
        assert_eq!(window.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_the_advised_time_frees_a_slot() {
        let mut window = SlidingWindow::new(1, Duration::from_secs(10));
        assert!(window.add_request());
        assert!(!window.add_request());

        let wait = window.time_until_available();
        assert_eq!(wait, Duration::from_secs(10));
        time::advance(wait).await;

        assert_eq!(window.remaining(), 1);
        assert!(window.add_request());
        assert_eq!(window.time_until_available(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_window_does_not_overflow() {
        let mut window = SlidingWindow::new(1, Duration::from_secs(u64::MAX));
        assert!(window.add_request());
        assert!(!window.add_request());

        assert!(window.time_until_available() > Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_until_available_under_capacity() {
        let mut window = SlidingWindow::new(3, Duration::from_secs(60));
        window.add_request();

        assert_eq!(window.time_until_available(), Duration::ZERO);
        assert_eq!(window.remaining(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_ignores_expired() {
        let mut window = SlidingWindow::new(2, Duration::from_secs(1));
        window.add_request();
        window.add_request();
        assert_eq!(window.remaining(), 0);

        time::advance(Duration::from_secs(2)).await;
        assert_eq!(window.remaining(), 2);
        assert_eq!(window.len(), 2);
    }
}
