use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Process-wide logical clock for `Offset` values.
///
/// Offsets are epoch seconds with millisecond precision. The clock never hands
/// out the same millisecond twice, even when wall time stalls or steps back.
#[derive(Debug, Default)]
pub struct OffsetClock {
    last_ms: AtomicI64,
}

impl OffsetClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> f64 {
        let now_ms = Utc::now().timestamp_millis();
        let mut prev = self.last_ms.load(Ordering::SeqCst);
        loop {
            let candidate = now_ms.max(prev + 1);
            match self
                .last_ms
                .compare_exchange(prev, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return candidate as f64 / 1000.0,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Next offset strictly greater than `floor` (a stored item's offset).
    pub fn next_after(&self, floor: f64) -> f64 {
        if floor.is_finite() {
            self.last_ms
                .fetch_max((floor * 1000.0).floor() as i64, Ordering::SeqCst);
        }
        self.next()
    }
}
