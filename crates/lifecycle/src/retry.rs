use std::time::Duration;

/// Backoff curve for rescheduling failed queue tasks.
///
/// The worker feeds the leased task's attempt count into
/// [`delay_for`](Self::delay_for) and pushes the task's `scheduled_for`
/// that far into the future. All curves clamp to a maximum so a
/// long-failing task never drifts out of reach.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// `base * multiplier^attempt`, optionally with deterministic jitter so
    /// tasks failed in the same batch do not all come due together.
    Exponential {
        base: Duration,
        max: Duration,
        multiplier: f64,
        jitter: bool,
    },
    /// `delay * (attempt + 1)`, clamped to `max`.
    Linear { delay: Duration, max: Duration },
    /// The same delay on every attempt.
    Constant { delay: Duration },
}

impl RetryStrategy {
    /// Delay before the retry following zero-based `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Exponential {
                base,
                max,
                multiplier,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let mut scaled = base.mul_f64(multiplier.powi(exponent).min(f64::from(u32::MAX)));
                if jitter {
                    // +0% to +40% keyed off the attempt number; spreads
                    // retries without a random source.
                    scaled = scaled.mul_f64(1.0 + 0.1 * f64::from(attempt % 5));
                }
                scaled.min(max)
            }
            Self::Linear { delay, max } => delay.saturating_mul(attempt.saturating_add(1)).min(max),
            Self::Constant { delay } => delay,
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: true,
        }
    }
}
