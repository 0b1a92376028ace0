use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Ceiling for rate-limit waits.
pub const MAX_RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

const JITTER: f64 = 0.1;

/// Per-request backoff state.
///
/// Rate-limit (429) delays double with +/-10% jitter and are capped at
/// [`MAX_RATE_LIMIT_DELAY`]. Server and network failures double without
/// jitter or cap. Both kinds advance the same delay.
// TODO: decide whether 5xx and network retries should get the 429 cap and jitter too.
#[derive(Debug, Clone)]
pub struct Backoff {
    delay: Duration,
}

impl Backoff {
    pub fn new(initial: Duration) -> Self {
        Self { delay: initial }
    }

    #[cfg(test)]
    pub fn current(&self) -> Duration {
        self.delay
    }

    /// How long to wait before retrying a 429, preferring the server's
    /// `Retry-After` hint. Advances the delay for the next attempt.
    pub fn rate_limited(&mut self, retry_after: Option<Duration>) -> Duration {
        let wait = retry_after.unwrap_or(self.delay);
        self.delay = jittered_double(self.delay, &mut rand::thread_rng());
        wait
    }

    /// How long to wait before retrying a 5xx or connection failure.
    pub fn failed(&mut self) -> Duration {
        let wait = self.delay;
        self.delay = self.delay.saturating_mul(2);
        wait
    }
}

/// Double `delay`, apply +/-10% jitter and cap.
pub fn jittered_double<R: Rng>(delay: Duration, rng: &mut R) -> Duration {
    let factor = 2.0 * (1.0 + rng.gen_range(-JITTER..=JITTER));
    delay.mul_f64(factor).min(MAX_RATE_LIMIT_DELAY)
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_rate_limit_delays_grow_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut delay = Duration::from_millis(1000);

        for _ in 0..12 {
            let next = jittered_double(delay, &mut rng);
            assert!(next >= delay, "{:?} shrank to {:?}", delay, next);
            assert!(next <= delay.mul_f64(2.0 * 1.1) + Duration::from_nanos(1));
            assert!(next <= MAX_RATE_LIMIT_DELAY);
            delay = next;
        }

        assert_eq!(delay, MAX_RATE_LIMIT_DELAY);
    }

    #[test]
    fn test_server_failures_double_without_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(40));
        assert_eq!(backoff.failed(), Duration::from_secs(40));
        assert_eq!(backoff.failed(), Duration::from_secs(80));
        assert_eq!(backoff.current(), Duration::from_secs(160));
    }

    #[test]
    fn test_retry_after_header_wins() {
        let mut backoff = Backoff::new(Duration::from_millis(500));
        assert_eq!(
            backoff.rate_limited(Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert!(backoff.current() >= Duration::from_millis(500));

        // Without a hint the advanced delay is used
        let wait = backoff.rate_limited(None);
        assert!(wait >= Duration::from_millis(900));
        assert!(wait <= Duration::from_millis(1100));
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }
}
