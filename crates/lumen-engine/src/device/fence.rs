use std::fmt;

/// A point on the GPU timeline.
///
/// Values are issued by [`DeviceContext::signal_fence`](super::DeviceContext::signal_fence)
/// and compared against the GPU's completed value. `FenceValue::ZERO` is the
/// initial value of the timeline and is always complete.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FenceValue(u64);

impl FenceValue {
    pub const ZERO: FenceValue = FenceValue(0);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Process-wide monotonic counter backing the GPU fence.
///
/// Owned by the device context; nothing else can issue values.
#[derive(Debug, Default)]
pub(crate) struct FenceCounter {
    last_issued: u64,
}

impl FenceCounter {
    /// Issues the next value. Values are never reused.
    pub(crate) fn issue(&mut self) -> FenceValue {
        // u64 overflow would take centuries at any frame rate.
        self.last_issued += 1;
        FenceValue(self.last_issued)
    }

    /// Highest value ever issued, or `ZERO` before the first signal.
    pub(crate) fn highest(&self) -> FenceValue {
        FenceValue(self.last_issued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_values_strictly_increase() {
        let mut counter = FenceCounter::default();
        let mut prev = counter.highest();
        for _ in 0..100 {
            let v = counter.issue();
            assert!(v > prev);
            prev = v;
        }
        assert_eq!(counter.highest(), FenceValue::new(100));
    }

    #[test]
    fn zero_is_the_initial_value() {
        assert_eq!(FenceCounter::default().highest(), FenceValue::ZERO);
    }
}
