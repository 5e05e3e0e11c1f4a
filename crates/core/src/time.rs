use chrono::{DateTime, Duration, Utc};

/// Wall-clock source used to reason about authority-issued deadlines.
///
/// Timers run on the async runtime's clock; this one is only consulted when a
/// server timestamp (like an attempt's `expires_at`) has to be compared with
/// "now".
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// Whole seconds left until `deadline`, zero once it has passed.
    #[must_use]
    pub fn seconds_until(&self, deadline: DateTime<Utc>) -> u32 {
        let left = (deadline - self.now()).num_seconds().max(0);
        u32::try_from(left).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn has_passed(&self, deadline: DateTime<Utc>) -> bool {
        self.now() >= deadline
    }
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_until_counts_down_and_floors_at_zero() {
        let mut clock = fixed_clock();
        let deadline = fixed_now() + Duration::seconds(90);
        assert_eq!(clock.seconds_until(deadline), 90);

        clock.advance(Duration::seconds(60));
        assert_eq!(clock.seconds_until(deadline), 30);
        assert!(!clock.has_passed(deadline));

        clock.advance(Duration::seconds(45));
        assert_eq!(clock.seconds_until(deadline), 0);
        assert!(clock.has_passed(deadline));
    }

    #[test]
    fn system_clock_ignores_advance() {
        let mut clock = Clock::system();
        clock.advance(Duration::days(365));
        assert!(clock.now() < fixed_now() + Duration::days(365 * 100));
    }
}
