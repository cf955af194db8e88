use std::time::Duration;

/// Exponential backoff policy with an attempt budget.
///
/// - initial_delay: wait after the first failed attempt
/// - multiplier: factor by which the wait grows after each further failure (> 1.0)
/// - max_delay: cap for the computed wait
/// - max_attempts: total attempts, the first one included
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub const fn new(
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            multiplier,
            max_delay,
            max_attempts,
        }
    }

    /// Wait before retry number `attempt + 1`, where attempt 0 is the first failure.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(100),
            2.0,
            Duration::from_secs(30),
            10,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_progression_and_cap() {
        let p = BackoffPolicy::default();
        assert_eq!(p.max_attempts, 10);

        // attempt -> expected millis (cap at 30s)
        let cases = vec![
            (0, 100),
            (1, 200),
            (2, 400),
            (3, 800),
            (7, 12_800),
            (8, 25_600),
            (9, 30_000), // 51.2s capped to 30s
            (20, 30_000),
            (u32::MAX, 30_000),
        ];

        for (attempt, expected_millis) in cases {
            let d = p.next_delay(attempt);
            assert_eq!(d.as_millis(), expected_millis, "attempt {attempt}");
        }
    }

    #[test]
    fn test_waits_fit_attempt_budget() {
        // three attempts leave room for two waits
        let p = BackoffPolicy::new(Duration::from_millis(250), 4.0, Duration::from_secs(2), 3);
        let waits: Vec<u128> = (0..p.max_attempts - 1)
            .map(|attempt| p.next_delay(attempt).as_millis())
            .collect();
        assert_eq!(waits, vec![250, 1000]);

        let worst_case: Duration = (0..p.max_attempts - 1).map(|a| p.next_delay(a)).sum();
        assert_eq!(worst_case, Duration::from_millis(1250));
    }
}
