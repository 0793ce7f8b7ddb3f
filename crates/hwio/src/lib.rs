//! Polled port I/O drivers.
//!
//! The lowest layer of the kernel: synchronous drivers with no interrupts,
//! DMA, or scheduler underneath. Every operation runs to completion on the
//! calling CPU, waiting on hardware by re-reading status registers under a
//! bounded [`PollBudget`].
//!
//! Each driver is generic over [`PortIo`] so the register protocol can be
//! exercised against a simulated register set. On x86_64 each module also
//! exposes a global, lock-protected handle on the real hardware.
#![no_std]

#[cfg(test)]
extern crate std;

pub mod ata;
pub mod error;
pub mod keyboard;
pub mod poll;
pub mod port;
pub mod serial;

#[cfg(test)]
mod sim;

pub use error::{DriverError, RequestError};
pub use poll::PollBudget;
pub use port::PortIo;
#[cfg(target_arch = "x86_64")]
pub use port::X86Ports;
