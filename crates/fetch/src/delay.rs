//! Randomized politeness pauses between requests.

use std::time::Duration;

/// Longest pause any hint can produce.
pub const MAX_POLITE_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// How long to pause after a request made with the given politeness hint.
///
/// The requested `secs` is always slept in full, plus a random jitter whose
/// size depends on how polite the caller asked to be:
///
/// | hint          | jitter            |
/// |---------------|-------------------|
/// | `< 0.05`      | 0.01 to 0.11 s    |
/// | `< 0.25`      | 0.25 to 1.0 s     |
/// | anything else | 1.0 to 4.5 s      |
///
/// Negative and NaN hints count as zero; the result never exceeds
/// [`MAX_POLITE_DELAY`].
pub fn polite_delay(secs: f64) -> Duration {
    jittered(secs, rand::random::<f64>())
}

/// Sleep for a [`polite_delay`].
pub async fn polite_sleep(secs: f64) {
    let delay = polite_delay(secs);
    tracing::trace!(?delay, "Sleeping");
    tokio::time::sleep(delay).await;
}

fn jittered(secs: f64, random: f64) -> Duration {
    // Also maps NaN to zero.
    let secs = secs.max(0.0);
    let jitter = if secs < 0.05 {
        0.10 * random + 0.01
    } else if secs < 0.25 {
        0.75 * random + 0.25
    } else {
        3.5 * random + 1.0
    };
    Duration::try_from_secs_f64(secs + jitter).map_or(MAX_POLITE_DELAY, |delay| delay.min(MAX_POLITE_DELAY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0.0, 0.01)]
    #[case(0.0, 1.0, 0.11)]
    #[case(0.02, 0.5, 0.08)]
    #[case(0.1, 0.0, 0.35)]
    #[case(0.1, 1.0, 1.1)]
    #[case(3.0, 0.0, 4.0)]
    #[case(3.0, 1.0, 7.5)]
    #[case(-5.0, 0.0, 0.01)]
    #[case(f64::NAN, 0.0, 0.01)]
    #[case(86_399.0, 0.0, 86_400.0)]
    #[case(86_400.0, 1.0, 86_400.0)]
    #[case(1e20, 0.5, 86_400.0)]
    #[case(f64::INFINITY, 0.5, 86_400.0)]
    fn test_jittered(#[case] secs: f64, #[case] random: f64, #[case] expected: f64) {
        let delay = jittered(secs, random).as_secs_f64();
        assert!((delay - expected).abs() < 1e-9, "{delay} != {expected}");
    }

    #[test]
    fn test_polite_delay_never_panics() {
        for secs in [f64::INFINITY, f64::NEG_INFINITY, f64::MAX, 1e20, f64::NAN] {
            assert!(polite_delay(secs) <= MAX_POLITE_DELAY);
        }
    }

    #[test]
    fn test_polite_delay_bounds() {
        for _ in 0..100 {
            let delay = polite_delay(0.02);
            assert!(delay >= Duration::from_secs_f64(0.03) && delay <= Duration::from_secs_f64(0.13));
        }
    }
}
