use std::{sync::Arc, time::Duration};

/// A trait for sleep operations.
pub trait Sleep: std::fmt::Debug + Send + Sync {
    /// Sleep for the specified duration.
    fn sleep(&self, duration: Duration);
}

impl Sleep for Box<dyn Sleep> {
    fn sleep(&self, duration: Duration) {
        self.as_ref().sleep(duration);
    }
}

impl Sleep for Arc<dyn Sleep> {
    fn sleep(&self, duration: Duration) {
        self.as_ref().sleep(duration);
    }
}

/// A sleeper that uses [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StdSleeper;

impl Sleep for StdSleeper {
    fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_sleeper() {
        let sleeper = StdSleeper;
        {
            let start = std::time::Instant::now();
            sleeper.sleep(Duration::from_millis(10));
            assert!(Duration::from_millis(10) <= start.elapsed());
        }
        {
            let start = std::time::Instant::now();
            sleeper.sleep(Duration::ZERO);
            assert!(Duration::ZERO <= start.elapsed());
        }
    }

    #[test]
    fn arc_sleeper() {
        let sleeper: Arc<dyn Sleep> = Arc::new(StdSleeper);
        let start = std::time::Instant::now();
        sleeper.sleep(Duration::from_millis(10));
        assert!(Duration::from_millis(10) <= start.elapsed());
    }
}
