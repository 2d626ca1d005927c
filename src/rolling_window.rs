use std::time::Duration;

use tokio::time::Instant;

/// An outcome recorded into the rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The call succeeded.
    Success,
    /// The call failed or timed out.
    Failure,
}

/// Outcome counts currently held by a rolling window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    /// Successful outcomes.
    pub successes: u64,
    /// Failed outcomes.
    pub failures: u64,
}

impl WindowCounts {
    /// Returns the number of outcomes.
    #[inline]
    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// Returns the failure percentage in range [0;100], or zero for an empty window.
    pub fn failure_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.failures as f64 * 100.0 / total as f64
    }
}

/// Time windowed log of call outcomes.
///
/// The window is a ring of buckets of equal width. The current bucket covers
/// `[head, head + width)`; buckets the clock moved past are zeroed lazily, on every insertion and
/// on every read. An outcome therefore leaves the window at most `window` after it was recorded.
#[derive(Debug)]
pub struct RollingWindow {
    width: Duration,
    buckets: Vec<WindowCounts>,
    index: usize,
    head: Instant,
}

impl RollingWindow {
    /// Creates a new window.
    ///
    /// * `window` - The range of time to be kept in the window.
    /// * `buckets` - The number of buckets that are maintained; a higher number of buckets
    ///   means finer granularity but also more memory consumption. Must be more than 1 and
    ///   no more than 10.
    ///
    /// # Panics
    ///
    /// * When `buckets` isn't in range [2;10].
    pub fn new(window: Duration, buckets: u8) -> Self {
        assert!(buckets <= 10);
        assert!(buckets > 1);

        let width = (window / u32::from(buckets)).max(Duration::from_millis(1));

        Self {
            width,
            buckets: vec![WindowCounts::default(); buckets as usize],
            index: 0,
            head: Instant::now(),
        }
    }

    /// Moves the ring forward by the number of whole bucket widths elapsed since `head`.
    fn advance(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.head);
        let steps = elapsed.as_nanos() / self.width.as_nanos();
        if steps == 0 {
            return;
        }

        let len = self.buckets.len();
        if steps >= len as u128 {
            self.clear();
        } else {
            for _ in 0..steps {
                self.index = (self.index + 1) % len;
                self.buckets[self.index] = WindowCounts::default();
            }
        }

        // Keep `head` on a bucket boundary; the partial width carries over to the next call.
        let partial = elapsed.as_nanos() % self.width.as_nanos();
        self.head = now - Duration::from_nanos(partial as u64);
    }

    fn clear(&mut self) {
        for bucket in self.buckets.iter_mut() {
            *bucket = WindowCounts::default();
        }
    }

    /// Drops every recorded outcome.
    pub fn reset(&mut self) {
        self.clear();
        self.index = 0;
        self.head = Instant::now();
    }

    /// Records an outcome into the current bucket.
    pub fn record(&mut self, outcome: Outcome) {
        self.advance();
        let bucket = &mut self.buckets[self.index];
        match outcome {
            Outcome::Success => bucket.successes += 1,
            Outcome::Failure => bucket.failures += 1,
        }
    }

    /// Returns the outcome counts over the whole window.
    pub fn counts(&mut self) -> WindowCounts {
        self.advance();
        self.buckets
            .iter()
            .fold(WindowCounts::default(), |acc, it| WindowCounts {
                successes: acc.successes + it.successes,
                failures: acc.failures + it.failures,
            })
    }
}

#[cfg(test)]
mod tests {
    use tokio::time;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn counts_when_time_stands_still() {
        let mut window = new_rolling_window();

        window.record(Outcome::Success);
        window.record(Outcome::Failure);
        window.record(Outcome::Failure);

        let counts = window.counts();
        assert_eq!(1, counts.successes);
        assert_eq!(2, counts.failures);
        assert_eq!(3, counts.total());
    }

    #[tokio::test(start_paused = true)]
    async fn sliding_over_small_window() {
        let mut window = new_rolling_window();

        window.record(Outcome::Failure);
        assert_eq!(1, window.counts().total());

        time::advance(1.seconds()).await;
        assert_eq!(1, window.counts().total());

        window.record(Outcome::Success);
        window.record(Outcome::Success);
        assert_eq!(3, window.counts().total());

        time::advance(1.seconds()).await;
        assert_eq!(3, window.counts().total());

        time::advance(1.seconds()).await;
        let counts = window.counts();
        assert_eq!(2, counts.successes);
        assert_eq!(0, counts.failures);

        time::advance(1.seconds()).await;
        assert_eq!(0, window.counts().total());
    }

    #[tokio::test(start_paused = true)]
    async fn sliding_over_large_window() {
        let mut window = RollingWindow::new(20.seconds(), 10);

        for i in 0..21 {
            window.counts();
            for _ in 0..(i % 3) {
                window.record(Outcome::Failure);
            }
            time::advance(1.seconds()).await;
        }

        assert_eq!(20, window.counts().failures);

        time::advance(1.seconds()).await;
        assert_eq!(18, window.counts().failures);

        time::advance(1.seconds()).await;
        assert_eq!(18, window.counts().failures);

        time::advance(5.seconds()).await;
        assert_eq!(12, window.counts().failures);
        window.record(Outcome::Failure);

        time::advance(10.seconds()).await;
        assert_eq!(3, window.counts().failures);
    }

    #[tokio::test(start_paused = true)]
    async fn sliding_window_when_buckets_are_skipped() {
        let mut window = new_rolling_window();

        window.record(Outcome::Failure);
        time::advance(1.seconds()).await;
        window.record(Outcome::Failure);
        window.record(Outcome::Failure);
        time::advance(1.seconds()).await;
        window.record(Outcome::Success);
        assert_eq!(4, window.counts().total());

        time::advance(2.seconds()).await;
        assert_eq!(1, window.counts().total());

        time::advance(100.seconds()).await;
        assert_eq!(0, window.counts().total());
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_expire_when_calls_straddle_buckets() {
        let mut window = RollingWindow::new(10.seconds(), 10);
        window.record(Outcome::Failure);

        // Calls 1.9s apart, just under two bucket widths.
        for _ in 0..5 {
            time::advance(Duration::from_millis(1900)).await;
            window.record(Outcome::Success);
        }
        // 9.5s in, the failure is still inside the window.
        assert_eq!(1, window.counts().failures);

        time::advance(Duration::from_millis(1900)).await;
        window.record(Outcome::Success);
        let counts = window.counts();
        assert_eq!(0, counts.failures);
        // The success recorded at 1.9s is gone as well.
        assert_eq!(5, counts.successes);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_drops_everything() {
        let mut window = new_rolling_window();
        window.record(Outcome::Failure);
        window.record(Outcome::Success);

        window.reset();
        assert_eq!(WindowCounts::default(), window.counts());
    }

    #[test]
    fn failure_rate() {
        let counts = WindowCounts {
            successes: 4,
            failures: 6,
        };
        assert!((counts.failure_rate() - 60.0).abs() < f64::EPSILON);
        assert_eq!(0.0, WindowCounts::default().failure_rate());
    }

    fn new_rolling_window() -> RollingWindow {
        RollingWindow::new(3.seconds(), 3)
    }

    trait IntoDuration {
        fn seconds(self) -> Duration;
    }

    impl IntoDuration for u64 {
        fn seconds(self) -> Duration {
            Duration::from_secs(self)
        }
    }
}
