//! Randomised delay between HTTP-tier requests.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Sleeps a uniformly sampled delay before every request but the first.
///
/// Each request reserves a send slot one delay after the previous slot, so
/// concurrent loads sharing the pacer queue up instead of sleeping in
/// parallel.
#[derive(Debug, Clone)]
pub struct Pacer {
    min: Duration,
    max: Duration,
    last_slot: Arc<Mutex<Option<Instant>>>,
}

impl Pacer {
    pub fn new((min, max): (Duration, Duration)) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
            last_slot: Arc::new(Mutex::new(None)),
        }
    }

    /// No delay at all.
    pub fn disabled() -> Self {
        Self::new((Duration::ZERO, Duration::ZERO))
    }

    fn sample(&self) -> Duration {
        if self.max.is_zero() {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(ms as u64)
    }

    /// Wait for this request's turn.
    pub async fn acquire(&self) {
        let slot = {
            let mut last = self.last_slot.lock().await;
            let now = Instant::now();
            let slot = match *last {
                None => now,
                Some(prev) => prev.max(now) + self.sample(),
            };
            *last = Some(slot);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if wait > Duration::ZERO {
            debug!("Pacing: waiting {:?}", wait);
            tokio::time::sleep_until(slot).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_within_range() {
        let pacer = Pacer::new((Duration::from_millis(2000), Duration::from_millis(4000)));
        for _ in 0..50 {
            let d = pacer.sample();
            assert!(d >= Duration::from_millis(2000) && d <= Duration::from_millis(4000));
        }
    }

    #[test]
    fn test_reversed_range_is_ordered() {
        let pacer = Pacer::new((Duration::from_millis(30), Duration::from_millis(10)));
        let d = pacer.sample();
        assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_request_not_delayed() {
        let pacer = Pacer::new((Duration::from_secs(2), Duration::from_secs(4)));
        let start = Instant::now();
        pacer.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        pacer.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_are_spaced() {
        let pacer = Pacer::new((Duration::from_secs(1), Duration::from_secs(1)));
        let start = Instant::now();
        pacer.acquire().await;

        let a = pacer.clone();
        let b = pacer.clone();
        let (first, second) = tokio::join!(
            async move {
                a.acquire().await;
                start.elapsed()
            },
            async move {
                b.acquire().await;
                start.elapsed()
            }
        );

        let mut done = [first, second];
        done.sort();
        assert_eq!(done, [Duration::from_secs(1), Duration::from_secs(2)]);
    }
}
