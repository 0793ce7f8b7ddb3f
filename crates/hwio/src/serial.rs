//! Serial port (COM1 UART 16550) driver.
//!
//! Output only; this is the sink `klog` writes to. Transmission polls the
//! line status register, with the same bounded wait as every other driver
//! here.

use core::fmt;
use core::ops::ControlFlow;

use bitflags::bitflags;

use crate::error::DriverError;
use crate::poll::PollBudget;
use crate::port::PortIo;

/// COM1 base port address
pub const COM1: u16 = 0x3F8;

const DATA: u16 = 0;
const INT_ENABLE: u16 = 1;
const FIFO_CTRL: u16 = 2;
const LINE_CTRL: u16 = 3;
const MODEM_CTRL: u16 = 4;
const LINE_STATUS: u16 = 5;

/// Byte sent through loopback during init.
const LOOPBACK_BYTE: u8 = 0xAE;

bitflags! {
    /// 16550 line status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineStatus: u8 {
        const DATA_READY = 1 << 0;
        const OVERRUN    = 1 << 1;
        /// Transmit holding register empty.
        const THR_EMPTY  = 1 << 5;
    }
}

/// Serial port driver
pub struct Serial<P> {
    ports: P,
    base: u16,
    budget: PollBudget,
    initialized: bool,
}

impl<P: PortIo> Serial<P> {
    /// Create an uninitialized Serial port instance
    pub const fn new(ports: P, base: u16) -> Self {
        Self {
            ports,
            base,
            budget: PollBudget::new(10_000),
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Initialize the serial port (115200 baud, 8N1)
    ///
    /// Fails with [`DriverError::NoDevice`] if the loopback self-test does
    /// not echo; the port then stays uninitialized and output is dropped.
    pub fn init(&mut self) -> Result<(), DriverError> {
        let base = self.base;
        let io = &mut self.ports;

        // Disable all interrupts
        io.write_u8(base + INT_ENABLE, 0x00);

        // Enable DLAB (set baud rate divisor)
        io.write_u8(base + LINE_CTRL, 0x80);

        // Set divisor to 1 (115200 baud)
        io.write_u8(base + DATA, 0x01); // Divisor low byte
        io.write_u8(base + INT_ENABLE, 0x00); // Divisor high byte

        // 8 bits, no parity, one stop bit (clear DLAB)
        io.write_u8(base + LINE_CTRL, 0x03);

        // Enable FIFO, clear them, with 14-byte threshold
        io.write_u8(base + FIFO_CTRL, 0xC7);

        // Put chip in loopback mode to test
        io.write_u8(base + MODEM_CTRL, 0x1E);
        io.write_u8(base + DATA, LOOPBACK_BYTE);
        if io.read_u8(base + DATA) != LOOPBACK_BYTE {
            return Err(DriverError::NoDevice);
        }

        // Normal operation (OUT1, OUT2, RTS, DTR); interrupts stay off, we poll.
        io.write_u8(base + MODEM_CTRL, 0x0F);

        self.initialized = true;
        Ok(())
    }

    /// Write a byte to the serial port
    ///
    /// Dropped silently while the port is uninitialized.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), DriverError> {
        if !self.initialized {
            return Ok(());
        }

        let status_port = self.base + LINE_STATUS;
        let ports = &mut self.ports;
        self.budget.spin(|| {
            let status = LineStatus::from_bits_retain(ports.read_u8(status_port));
            if status.contains(LineStatus::THR_EMPTY) {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;

        self.ports.write_u8(self.base + DATA, byte);
        Ok(())
    }
}

impl<P: PortIo> fmt::Write for Serial<P> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}

#[cfg(target_arch = "x86_64")]
mod com1 {
    use core::fmt::{self, Write};

    use spin::Mutex;

    use super::*;
    use crate::port::X86Ports;

    // SAFETY: the kernel runs at CPL0 and this is the only user of COM1.
    static SERIAL: Mutex<Serial<X86Ports>> =
        Mutex::new(Serial::new(unsafe { X86Ports::new() }, COM1));

    /// Initialize the global serial port
    pub fn init() -> Result<(), DriverError> {
        SERIAL.lock().init()
    }

    /// Write formatted arguments to the serial port.
    ///
    /// The lock is held for the whole message, so lines never interleave.
    pub fn write_fmt(args: fmt::Arguments) -> fmt::Result {
        SERIAL.lock().write_fmt(args)
    }
}

#[cfg(target_arch = "x86_64")]
pub use com1::{init, write_fmt};

#[cfg(test)]
mod tests {
    use core::fmt::Write;

    use super::*;
    use crate::sim::SimPorts;

    const THRE: u16 = LineStatus::THR_EMPTY.bits() as u16;

    #[test]
    fn test_init_programs_115200_8n1_and_leaves_loopback() {
        let mut sim = SimPorts::new();
        sim.script(COM1, [LOOPBACK_BYTE as u16]);

        let mut serial = Serial::new(&mut sim, COM1);
        serial.init().unwrap();
        assert!(serial.is_initialized());
        drop(serial);

        assert_eq!(
            sim.byte_writes(),
            std::vec![
                (COM1 + 1, 0x00),
                (COM1 + 3, 0x80),
                (COM1, 0x01),
                (COM1 + 1, 0x00),
                (COM1 + 3, 0x03),
                (COM1 + 2, 0xC7),
                (COM1 + 4, 0x1E),
                (COM1, 0xAE),
                (COM1 + 4, 0x0F),
            ]
        );
    }

    #[test]
    fn test_failed_loopback_drops_output() {
        let mut sim = SimPorts::new();
        sim.default_value(COM1, 0xFF).default_value(COM1 + 5, THRE);

        let mut serial = Serial::new(&mut sim, COM1);
        assert_eq!(serial.init(), Err(DriverError::NoDevice));
        serial.write_str("lost").unwrap();
        drop(serial);

        assert!(!sim.byte_writes_to(COM1).contains(&b'l'));
        assert_eq!(sim.reads_of(COM1 + 5), 0);
    }

    #[test]
    fn test_each_byte_waits_for_transmit_holding_register() {
        let mut sim = SimPorts::new();
        sim.script(COM1, [LOOPBACK_BYTE as u16])
            .script(COM1 + 5, [0, 0, THRE, THRE]);

        let mut serial = Serial::new(&mut sim, COM1);
        serial.init().unwrap();
        write!(serial, "ok").unwrap();
        drop(serial);

        assert_eq!(sim.reads_of(COM1 + 5), 4);
        assert!(sim.byte_writes_to(COM1).ends_with(b"ok"));
    }
}
