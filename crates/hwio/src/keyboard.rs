//! PS/2 keyboard sampler.
//!
//! Polls the i8042 controller for raw scan codes. [`Ps2Keyboard::init`]
//! waits for the controller's input buffer to drain and enables scanning;
//! [`Ps2Keyboard::read_scan_code`] samples at most one byte and never
//! waits, so it is meant to be called from the caller's own polling loop.
//!
//! Sampled bytes can be fed through a `pc-keyboard` state machine
//! (scancode decoder → modifier tracker → layout mapper) to get structured
//! [`KeyEvent`]s with press/release state.

use core::ops::ControlFlow;

use bitflags::bitflags;
use pc_keyboard::{layouts, DecodedKey, HandleControl, KeyCode, Keyboard, ScancodeSet1};

use crate::error::DriverError;
use crate::poll::PollBudget;
use crate::port::PortIo;

// ── PS/2 controller ports ─────────────────────────────────────────

/// Data port: scancodes in, device commands out.
const PS2_DATA: u16 = 0x60;
/// Status port (read).
const PS2_STATUS: u16 = 0x64;

/// Keyboard command: enable scanning.
const ENABLE_SCANNING: u8 = 0xF4;

/// Returned by [`Ps2Keyboard::read_scan_code`] when nothing is pending.
pub const NO_SCAN_CODE: u8 = 0;

bitflags! {
    /// i8042 status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ps2Status: u8 {
        /// A byte is waiting on the data port.
        const OUTPUT_FULL = 1 << 0;
        /// The controller has not consumed the last byte written to it.
        const INPUT_FULL  = 1 << 1;
        const SYSTEM      = 1 << 2;
        const COMMAND     = 1 << 3;
        const TIMEOUT     = 1 << 6;
        const PARITY      = 1 << 7;
    }
}

// ── Structured key event ──────────────────────────────────────────

/// Direction of a key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Pressed,
    Released,
}

/// What the layout mapper made of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Character after modifier state is applied.
    Char(char),
    /// Key with no character mapping, modifiers included.
    Raw(KeyCode),
}

/// One decoded transition, tagged with the scan code byte that
/// completed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub state: KeyState,
    pub key: KeyKind,
    pub scancode: u8,
}

/// PS/2 keyboard on the i8042 controller.
pub struct Ps2Keyboard<P> {
    ports: P,
    budget: PollBudget,
    decoder: Keyboard<layouts::Us104Key, ScancodeSet1>,
}

impl<P: PortIo> Ps2Keyboard<P> {
    pub const fn new(ports: P) -> Self {
        Self {
            ports,
            budget: PollBudget::DEFAULT,
            decoder: Keyboard::new(
                ScancodeSet1::new(),
                layouts::Us104Key,
                HandleControl::MapLettersToUnicode,
            ),
        }
    }

    /// Replace the poll budget used by [`init`](Self::init).
    pub fn with_budget(mut self, budget: PollBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Wait for the controller to accept a byte, then enable scanning.
    ///
    /// No acknowledgement is read back.
    pub fn init(&mut self) -> Result<(), DriverError> {
        let ports = &mut self.ports;
        self.budget
            .spin(|| {
                let status = Ps2Status::from_bits_retain(ports.read_u8(PS2_STATUS));
                if status.contains(Ps2Status::INPUT_FULL) {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(())
                }
            })
            .inspect_err(|err| log::warn!("ps2: input buffer never drained: {}", err))?;

        self.ports.write_u8(PS2_DATA, ENABLE_SCANNING);
        log::trace!("ps2: scanning enabled");
        Ok(())
    }

    /// Sample one scan code, or [`NO_SCAN_CODE`] if none is pending.
    ///
    /// Reads the status register exactly once and the data port only when
    /// the output buffer is full.
    pub fn read_scan_code(&mut self) -> u8 {
        let status = Ps2Status::from_bits_retain(self.ports.read_u8(PS2_STATUS));
        if status.contains(Ps2Status::OUTPUT_FULL) {
            self.ports.read_u8(PS2_DATA)
        } else {
            NO_SCAN_CODE
        }
    }

    /// Sample once and decode whatever arrived.
    pub fn poll_event(&mut self) -> Option<KeyEvent> {
        match self.read_scan_code() {
            NO_SCAN_CODE => None,
            scancode => self.decode(scancode),
        }
    }

    /// Feed a raw scancode and return a structured [`KeyEvent`].
    ///
    /// Returns `Some` for every press and release the state machine can
    /// decode; `None` while a multi-byte sequence is incomplete.
    pub fn decode(&mut self, scancode: u8) -> Option<KeyEvent> {
        let event = self.decoder.add_byte(scancode).ok()??;

        let state = match event.state {
            pc_keyboard::KeyState::Down => KeyState::Pressed,
            pc_keyboard::KeyState::Up => KeyState::Released,
            _ => return None,
        };

        let keycode = event.code;

        let key = match self.decoder.process_keyevent(event) {
            Some(DecodedKey::Unicode(ch)) => KeyKind::Char(ch),
            Some(DecodedKey::RawKey(code)) => KeyKind::Raw(code),
            // Modifiers update decoder state and map to nothing.
            None => KeyKind::Raw(keycode),
        };
        Some(KeyEvent { state, key, scancode })
    }
}

// ── Global keyboard ───────────────────────────────────────────────

#[cfg(target_arch = "x86_64")]
mod global {
    use spin::Mutex;

    use super::*;
    use crate::port::X86Ports;

    // SAFETY: the kernel runs at CPL0 and this handle is the only code that
    // touches the i8042 controller.
    static KEYBOARD: Mutex<Ps2Keyboard<X86Ports>> =
        Mutex::new(Ps2Keyboard::new(unsafe { X86Ports::new() }));

    /// Wait for the controller to accept a byte, then enable scanning.
    pub fn keyboard_init() -> Result<(), DriverError> {
        KEYBOARD.lock().init()
    }

    /// Sample one scan code; [`NO_SCAN_CODE`] if none is pending.
    ///
    /// Reads the controller whether or not [`keyboard_init`] ran or
    /// succeeded.
    pub fn keyboard_read_scan_code() -> u8 {
        KEYBOARD.lock().read_scan_code()
    }

    /// Sample and decode one key event.
    pub fn keyboard_poll_event() -> Option<KeyEvent> {
        KEYBOARD.lock().poll_event()
    }
}

#[cfg(target_arch = "x86_64")]
pub use global::{keyboard_init, keyboard_poll_event, keyboard_read_scan_code};
