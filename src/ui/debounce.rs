use std::time::{Duration, Instant};

/// Delay between the last resize event and the re-render it triggers.
pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(100);

/// Coalesces a burst of values into one, released once the burst has been
/// quiet for `delay`.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Record a new value, restarting the quiet period.
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now));
    }

    /// The latest value once it has been quiet long enough. Fires once.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, at)) if now.saturating_duration_since(*at) >= self.delay => {
                self.pending.take().map(|(value, _)| value)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_collapses_into_last_value() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(RESIZE_DEBOUNCE);

        debouncer.push(800, start);
        debouncer.push(820, start + Duration::from_millis(40));
        debouncer.push(850, start + Duration::from_millis(80));

        assert_eq!(debouncer.poll(start + Duration::from_millis(150)), None);
        assert_eq!(debouncer.poll(start + Duration::from_millis(180)), Some(850));
        assert_eq!(debouncer.poll(start + Duration::from_millis(400)), None);
    }
}
