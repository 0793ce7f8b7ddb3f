//! x86 port I/O primitives.
//!
//! Every driver in this crate talks to its device through a [`PortIo`]
//! handle instead of calling `in`/`out` directly. The hardware handle,
//! [`X86Ports`], wraps the `x86_64` crate's `Port` type; tests substitute
//! a simulated register set.

/// Byte- and word-wide access to the I/O port address space.
///
/// Each call is a single side-effecting bus access. Nothing is validated
/// and nothing can fail: a missing device reads back whatever the bus
/// floats to, and keeping to the device protocol is the caller's job.
pub trait PortIo {
    /// Read a byte from `port`.
    fn read_u8(&mut self, port: u16) -> u8;

    /// Write a byte to `port`.
    fn write_u8(&mut self, port: u16, value: u8);

    /// Read a 16-bit word from `port`.
    fn read_u16(&mut self, port: u16) -> u16;

    /// Write a 16-bit word to `port`.
    fn write_u16(&mut self, port: u16, value: u16);
}

impl<P: PortIo + ?Sized> PortIo for &mut P {
    #[inline]
    fn read_u8(&mut self, port: u16) -> u8 {
        (**self).read_u8(port)
    }

    #[inline]
    fn write_u8(&mut self, port: u16, value: u8) {
        (**self).write_u8(port, value)
    }

    #[inline]
    fn read_u16(&mut self, port: u16) -> u16 {
        (**self).read_u16(port)
    }

    #[inline]
    fn write_u16(&mut self, port: u16, value: u16) {
        (**self).write_u16(port, value)
    }
}

/// The real I/O port space of the executing CPU.
#[cfg(target_arch = "x86_64")]
#[derive(Debug)]
pub struct X86Ports {
    _private: (),
}

#[cfg(target_arch = "x86_64")]
impl X86Ports {
    /// Create a handle to the hardware port space.
    ///
    /// # Safety
    ///
    /// The caller must run at CPL0 (or hold I/O permission for every port
    /// the handle will touch) and must ensure the drivers built on this
    /// handle are the only code driving their devices.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "x86_64")]
impl PortIo for X86Ports {
    #[inline]
    fn read_u8(&mut self, port: u16) -> u8 {
        use x86_64::instructions::port::Port;
        // SAFETY: port access was granted when the handle was constructed.
        unsafe { Port::<u8>::new(port).read() }
    }

    #[inline]
    fn write_u8(&mut self, port: u16, value: u8) {
        use x86_64::instructions::port::Port;
        // SAFETY: see `read_u8`.
        unsafe { Port::<u8>::new(port).write(value) }
    }

    #[inline]
    fn read_u16(&mut self, port: u16) -> u16 {
        use x86_64::instructions::port::Port;
        // SAFETY: see `read_u8`.
        unsafe { Port::<u16>::new(port).read() }
    }

    #[inline]
    fn write_u16(&mut self, port: u16, value: u16) {
        use x86_64::instructions::port::Port;
        // SAFETY: see `read_u8`.
        unsafe { Port::<u16>::new(port).write(value) }
    }
}
