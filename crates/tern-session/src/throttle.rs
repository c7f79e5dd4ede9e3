//! Trailing-edge throttle for high-frequency progress updates.

use std::time::Duration;
use tokio::time::Instant;

/// Default cadence for progress updates
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(50);

/// Rate-limits a stream of values to at most one delivery per interval.
///
/// The first value after a quiet period is delivered immediately. Values
/// arriving inside the window overwrite each other and the latest one is
/// delivered once the window closes, so nothing emitted before a quiet period
/// is lost. The throttler holds no timer of its own: the owner waits on
/// [`Throttler::deadline`] and calls [`Throttler::poll_flush`].
#[derive(Debug)]
pub struct Throttler<T> {
    interval: Duration,
    last_flush: Option<Instant>,
    pending: Option<T>,
}

impl<T> Throttler<T> {
    /// Create a throttler with the given cadence
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_flush: None,
            pending: None,
        }
    }

    /// Offer a value. Returns it if it may be delivered right away; otherwise
    /// it replaces any held value and waits for the deadline.
    pub fn emit(&mut self, value: T, now: Instant) -> Option<T> {
        match self.last_flush {
            Some(last) if now < last + self.interval => {
                self.pending = Some(value);
                None
            }
            _ => {
                self.last_flush = Some(now);
                self.pending = None;
                Some(value)
            }
        }
    }

    /// When the held value becomes deliverable, if one is held.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref()?;
        Some(match self.last_flush {
            Some(last) => last + self.interval,
            None => Instant::now(),
        })
    }

    /// Take the held value if its deadline has passed.
    pub fn poll_flush(&mut self, now: Instant) -> Option<T> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }
        self.last_flush = Some(now);
        self.pending.take()
    }

    /// Drop any held value and forget the current window.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.last_flush = None;
    }
}

impl<T> Default for Throttler<T> {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_first_emit_delivered_immediately() {
        let mut t = Throttler::new(50 * MS);
        let now = Instant::now();
        assert_eq!(t.emit(1, now), Some(1));
        assert!(t.deadline().is_none());
        assert!(t.deadline().is_none());
    }

    #[test]
    fn test_emits_inside_window_coalesce_to_latest() {
        let mut t = Throttler::new(50 * MS);
        let t0 = Instant::now();
        assert_eq!(t.emit(1, t0), Some(1));
        assert_eq!(t.emit(2, t0 + 10 * MS), None);
        assert_eq!(t.emit(3, t0 + 20 * MS), None);
        assert_eq!(t.deadline(), Some(t0 + 50 * MS));

        assert_eq!(t.poll_flush(t0 + 49 * MS), None);
        assert_eq!(t.poll_flush(t0 + 50 * MS), Some(3));
        assert!(t.deadline().is_none());
    }

    #[test]
    fn test_emit_after_quiet_period_is_leading_edge() {
        let mut t = Throttler::new(50 * MS);
        let t0 = Instant::now();
        t.emit(1, t0);
        assert_eq!(t.emit(2, t0 + 60 * MS), Some(2));
    }

    #[test]
    fn test_cancel_drops_pending_and_resets_window() {
        let mut t = Throttler::new(50 * MS);
        let t0 = Instant::now();
        t.emit(1, t0);
        t.emit(2, t0 + 5 * MS);
        t.cancel();
        assert!(t.deadline().is_none());
        assert_eq!(t.poll_flush(t0 + 100 * MS), None);
        // New window starts fresh
        assert_eq!(t.emit(3, t0 + 6 * MS), Some(3));
    }

    #[test]
    fn test_burst_invocation_bound_and_last_value_delivered() {
        let interval = 50 * MS;
        let duration_ms: u32 = 230;
        let mut t = Throttler::new(interval);
        let t0 = Instant::now();
        let mut delivered = Vec::new();

        for i in 0..duration_ms {
            let now = t0 + i * MS;
            if let Some(v) = t.poll_flush(now) {
                delivered.push(v);
            }
            if let Some(v) = t.emit(i, now) {
                delivered.push(v);
            }
        }
        // Quiet period: drain whatever is still held
        if let Some(deadline) = t.deadline() {
            if let Some(v) = t.poll_flush(deadline) {
                delivered.push(v);
            }
        }

        let bound = duration_ms.div_ceil(50) as usize + 1;
        assert!(
            delivered.len() <= bound,
            "{} deliveries exceeds bound {}",
            delivered.len(),
            bound
        );
        assert_eq!(delivered.last(), Some(&(duration_ms - 1)));
        assert!(t.deadline().is_none());
    }

    #[test]
    fn test_deliveries_spaced_by_interval() {
        let mut t = Throttler::new(50 * MS);
        let t0 = Instant::now();
        let mut times = Vec::new();
        for i in 0..120u32 {
            let now = t0 + i * MS;
            if t.poll_flush(now).is_some() || t.emit(i, now).is_some() {
                times.push(now);
            }
        }
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= 50 * MS);
        }
    }
}
