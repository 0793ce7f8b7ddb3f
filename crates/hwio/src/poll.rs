//! Bounded busy-waiting.
//!
//! There is no scheduler beneath these drivers, so waiting on hardware
//! means re-reading a status register until it says "ready". A
//! [`PollBudget`] caps how many samples a wait may take; running out is
//! reported as [`DriverError::Timeout`] instead of hanging the CPU.

use core::ops::ControlFlow;

use crate::error::DriverError;

/// Maximum number of status samples one busy-wait may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    samples: u32,
}

impl PollBudget {
    /// Enough for a spinning disk to seek and spin up on real hardware.
    pub const DEFAULT: Self = Self::new(100_000);

    /// A budget of `samples` status reads.
    ///
    /// Zero is clamped to one: every wait looks at the status register at
    /// least once.
    pub const fn new(samples: u32) -> Self {
        Self {
            samples: if samples == 0 { 1 } else { samples },
        }
    }

    /// Number of samples this budget allows.
    #[inline]
    pub const fn samples(self) -> u32 {
        self.samples
    }

    /// Call `sample` until it breaks or the budget is spent.
    ///
    /// `sample` performs one status read and returns
    /// `ControlFlow::Break(value)` once the awaited condition holds.
    pub fn spin<T>(self, mut sample: impl FnMut() -> ControlFlow<T>) -> Result<T, DriverError> {
        for taken in 1..=self.samples {
            if let ControlFlow::Break(value) = sample() {
                return Ok(value);
            }
            if taken < self.samples {
                core::hint::spin_loop();
            }
        }
        Err(DriverError::Timeout {
            samples: self.samples,
        })
    }
}

impl Default for PollBudget {
    fn default() -> Self {
        Self::DEFAULT
    }
}
