//! ATA PIO disk driver.
//!
//! Polling driver for IDE/ATA drives in LBA28 mode. One command is in
//! flight per [`AtaDrive`]; every operation runs the full register
//! handshake and data transfer before returning:
//!
//! ```text
//! drive/head  ← 0xE0 | lba[27:24]     (master, LBA mode)
//! sect count  ← count
//! lba lo/mid/hi ← lba[7:0], lba[15:8], lba[23:16]
//! command     ← READ (0x20) | WRITE (0x30)
//! for each of count * 256 words:
//!     spin on status until DRQ
//!     data ↔ word
//! ```
//!
//! Requests are validated before the first port write, and every wait on
//! the status register is bounded by a [`PollBudget`].

use core::ops::ControlFlow;

use bitflags::bitflags;

use crate::error::{DriverError, RequestError};
use crate::poll::PollBudget;
use crate::port::PortIo;

/// Bytes per sector.
pub const SECTOR_SIZE: usize = 512;
/// 16-bit data-port transfers per sector.
pub const WORDS_PER_SECTOR: usize = SECTOR_SIZE / 2;
/// Highest address reachable with 28-bit LBA.
pub const LBA28_MAX: u32 = 0x0FFF_FFFF;

const LBA28_SECTORS: u32 = LBA28_MAX + 1;

/// Register offsets from the bus base port.
mod reg {
    pub const DATA: u16 = 0;
    pub const ERROR: u16 = 1; // read
    pub const FEATURES: u16 = 1; // write
    pub const SECTOR_COUNT: u16 = 2;
    pub const LBA_LOW: u16 = 3;
    pub const LBA_MID: u16 = 4;
    pub const LBA_HIGH: u16 = 5;
    pub const DRIVE_HEAD: u16 = 6;
    pub const STATUS: u16 = 7; // read
    pub const COMMAND: u16 = 7; // write
}

mod cmd {
    pub const READ_SECTORS: u8 = 0x20;
    pub const WRITE_SECTORS: u8 = 0x30;
    pub const CACHE_FLUSH: u8 = 0xE7;
    pub const IDENTIFY: u8 = 0xEC;
}

bitflags! {
    /// ATA status register.
    ///
    /// Only BSY is meaningful while BSY is set; the other bits are
    /// sampled once the drive has let go of the register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AtaStatus: u8 {
        /// The previous command ended in an error (see the error register).
        const ERR  = 1 << 0;
        const IDX  = 1 << 1;
        const CORR = 1 << 2;
        /// The drive is ready to move one word through the data port.
        const DRQ  = 1 << 3;
        const SRV  = 1 << 4;
        /// Drive fault, independent of ERR.
        const DF   = 1 << 5;
        const DRDY = 1 << 6;
        /// The drive owns the register block.
        const BSY  = 1 << 7;
    }
}

/// ATA channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bus {
    Primary,
    Secondary,
}

impl Bus {
    /// Legacy base port of the channel's command block.
    pub const fn base(self) -> u16 {
        match self {
            Bus::Primary => 0x1F0,
            Bus::Secondary => 0x170,
        }
    }

    pub const fn registers(self) -> Registers {
        Registers::at(self.base())
    }
}

/// Drive on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    Master,
    Slave,
}

impl Drive {
    /// Drive/head byte for LBA addressing, before the high LBA nibble is
    /// merged in.
    pub const fn select(self) -> u8 {
        match self {
            Drive::Master => 0xE0,
            Drive::Slave => 0xF0,
        }
    }
}

/// Port addresses of one channel's command block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub data: u16,
    pub error: u16,
    pub features: u16,
    pub sector_count: u16,
    pub lba_low: u16,
    pub lba_mid: u16,
    pub lba_high: u16,
    pub drive_head: u16,
    pub status: u16,
    pub command: u16,
}

impl Registers {
    pub const fn at(base: u16) -> Self {
        Self {
            data: base + reg::DATA,
            error: base + reg::ERROR,
            features: base + reg::FEATURES,
            sector_count: base + reg::SECTOR_COUNT,
            lba_low: base + reg::LBA_LOW,
            lba_mid: base + reg::LBA_MID,
            lba_high: base + reg::LBA_HIGH,
            drive_head: base + reg::DRIVE_HEAD,
            status: base + reg::STATUS,
            command: base + reg::COMMAND,
        }
    }
}

/// What IDENTIFY DEVICE reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveInfo {
    /// Sectors addressable with LBA28 (identify words 60-61).
    pub sectors: u32,
    model: [u8; 40],
}

impl DriveInfo {
    fn parse(words: &[u16; WORDS_PER_SECTOR]) -> Self {
        let sectors = u32::from(words[60]) | (u32::from(words[61]) << 16);

        // ATA strings store two characters per word, high byte first.
        let mut model = [0u8; 40];
        for (pair, word) in model.chunks_exact_mut(2).zip(&words[27..47]) {
            pair.copy_from_slice(&word.to_be_bytes());
        }

        Self { sectors, model }
    }

    /// Model string with the space padding removed.
    pub fn model(&self) -> &str {
        core::str::from_utf8(&self.model)
            .map(|s| s.trim_end_matches([' ', '\0']))
            .unwrap_or("")
    }
}

/// One drive on an ATA channel, driven by programmed I/O.
pub struct AtaDrive<P> {
    ports: P,
    regs: Registers,
    drive: Drive,
    budget: PollBudget,
    /// Set by a successful IDENTIFY; limits the accepted LBA range.
    capacity: Option<u32>,
}

impl<P: PortIo> AtaDrive<P> {
    pub const fn new(ports: P, bus: Bus, drive: Drive) -> Self {
        Self {
            ports,
            regs: bus.registers(),
            drive,
            budget: PollBudget::DEFAULT,
            capacity: None,
        }
    }

    /// Replace the poll budget used for every status wait.
    pub fn with_budget(mut self, budget: PollBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Sector count learned from IDENTIFY, if it has run.
    pub fn capacity(&self) -> Option<u32> {
        self.capacity
    }

    /// Read `count` sectors starting at `lba` into `buffer`.
    ///
    /// Words land in the buffer in the order the drive delivers them,
    /// each stored little-endian. Bytes past `count * 512` are untouched.
    pub fn read_sectors(
        &mut self,
        lba: u32,
        count: u8,
        buffer: &mut [u8],
    ) -> Result<(), DriverError> {
        let len = self.validate(lba, count, buffer.len())?;

        log::trace!("ata: read {} sector(s) at LBA {}", count, lba);
        self.issue(lba, count, cmd::READ_SECTORS);

        for word in buffer[..len].chunks_exact_mut(2) {
            self.wait_data_request()?;
            let value = self.ports.read_u16(self.regs.data);
            word.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    /// Write `count` sectors from `buffer` starting at `lba`.
    ///
    /// Mirrors [`read_sectors`](Self::read_sectors) with the data port
    /// direction reversed, then waits for the drive to finish and flushes
    /// its write cache.
    pub fn write_sectors(
        &mut self,
        lba: u32,
        count: u8,
        buffer: &[u8],
    ) -> Result<(), DriverError> {
        let len = self.validate(lba, count, buffer.len())?;

        log::trace!("ata: write {} sector(s) at LBA {}", count, lba);
        self.issue(lba, count, cmd::WRITE_SECTORS);

        for word in buffer[..len].chunks_exact(2) {
            self.wait_data_request()?;
            self.ports
                .write_u16(self.regs.data, u16::from_le_bytes([word[0], word[1]]));
        }

        self.wait_idle()?;
        self.flush_cache()
    }

    pub fn read_sector(
        &mut self,
        lba: u32,
        buffer: &mut [u8; SECTOR_SIZE],
    ) -> Result<(), DriverError> {
        self.read_sectors(lba, 1, buffer)
    }

    pub fn write_sector(
        &mut self,
        lba: u32,
        buffer: &[u8; SECTOR_SIZE],
    ) -> Result<(), DriverError> {
        self.write_sectors(lba, 1, buffer)
    }

    /// Commit the drive's write cache to the medium.
    pub fn flush_cache(&mut self) -> Result<(), DriverError> {
        log::trace!("ata: cache flush");
        self.ports.write_u8(self.regs.command, cmd::CACHE_FLUSH);
        self.wait_idle()
    }

    /// Run IDENTIFY DEVICE and remember the reported capacity.
    ///
    /// Returns [`DriverError::NoDevice`] when the status register reads
    /// 0x00 or 0xFF right after the command, i.e. nothing is attached.
    pub fn identify(&mut self) -> Result<DriveInfo, DriverError> {
        // A failed IDENTIFY leaves the drive's size unknown.
        self.capacity = None;

        let regs = self.regs;
        self.ports.write_u8(regs.drive_head, self.drive.select());
        self.ports.write_u8(regs.sector_count, 0);
        self.ports.write_u8(regs.lba_low, 0);
        self.ports.write_u8(regs.lba_mid, 0);
        self.ports.write_u8(regs.lba_high, 0);
        self.ports.write_u8(regs.command, cmd::IDENTIFY);

        let status = self.ports.read_u8(regs.status);
        if status == 0x00 || status == 0xFF {
            log::debug!("ata: no drive at {:#x} ({:?})", regs.data, self.drive);
            return Err(DriverError::NoDevice);
        }

        let mut words = [0u16; WORDS_PER_SECTOR];
        for word in words.iter_mut() {
            self.wait_data_request()?;
            *word = self.ports.read_u16(regs.data);
        }

        let info = DriveInfo::parse(&words);
        log::debug!("ata: {:?} drive \"{}\", {} sectors", self.drive, info.model(), info.sectors);
        self.capacity = Some(info.sectors);
        Ok(info)
    }

    /// Check a transfer request and return the number of buffer bytes it
    /// covers.
    fn validate(&self, lba: u32, count: u8, len: usize) -> Result<usize, RequestError> {
        if count == 0 {
            return Err(RequestError::ZeroSectorCount);
        }

        let limit = self.capacity.map_or(LBA28_SECTORS, |c| c.min(LBA28_SECTORS));
        if u64::from(lba) + u64::from(count) > u64::from(limit) {
            return Err(RequestError::LbaOutOfRange { lba, count, limit });
        }

        let needed = usize::from(count) * SECTOR_SIZE;
        if len < needed {
            return Err(RequestError::BufferTooSmall { needed, actual: len });
        }
        Ok(needed)
    }

    /// Program the task file and start `command`. Order matters: the
    /// drive latches the other registers when the command byte lands.
    fn issue(&mut self, lba: u32, count: u8, command: u8) {
        let regs = self.regs;
        let high_nibble = ((lba >> 24) & 0x0F) as u8;

        self.ports.write_u8(regs.drive_head, self.drive.select() | high_nibble);
        self.ports.write_u8(regs.sector_count, count);
        self.ports.write_u8(regs.lba_low, lba as u8);
        self.ports.write_u8(regs.lba_mid, (lba >> 8) as u8);
        self.ports.write_u8(regs.lba_high, (lba >> 16) as u8);
        self.ports.write_u8(regs.command, command);
    }

    /// Spin until the drive requests a data word.
    fn wait_data_request(&mut self) -> Result<(), DriverError> {
        let status_port = self.regs.status;
        let ports = &mut self.ports;
        let status = self
            .budget
            .spin(|| {
                let status = AtaStatus::from_bits_retain(ports.read_u8(status_port));
                if status.contains(AtaStatus::BSY) {
                    ControlFlow::Continue(())
                } else if status.intersects(AtaStatus::ERR | AtaStatus::DF | AtaStatus::DRQ) {
                    ControlFlow::Break(status)
                } else {
                    ControlFlow::Continue(())
                }
            })
            .inspect_err(|err| log::warn!("ata: waiting for DRQ: {}", err))?;

        if status.intersects(AtaStatus::ERR | AtaStatus::DF) {
            return Err(self.device_error(status));
        }
        Ok(())
    }

    /// Spin until BSY clears, then check the outcome of the command.
    fn wait_idle(&mut self) -> Result<(), DriverError> {
        let status_port = self.regs.status;
        let ports = &mut self.ports;
        let status = self
            .budget
            .spin(|| {
                let status = AtaStatus::from_bits_retain(ports.read_u8(status_port));
                if status.contains(AtaStatus::BSY) {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(status)
                }
            })
            .inspect_err(|err| log::warn!("ata: waiting for BSY to clear: {}", err))?;

        if status.intersects(AtaStatus::ERR | AtaStatus::DF) {
            return Err(self.device_error(status));
        }
        Ok(())
    }

    fn device_error(&mut self, status: AtaStatus) -> DriverError {
        let error = self.ports.read_u8(self.regs.error);
        log::warn!("ata: device error, status {:#04x} error {:#04x}", status.bits(), error);
        DriverError::Device {
            status: status.bits(),
            error,
        }
    }
}

// ── Primary master drive ──────────────────────────────────────────

#[cfg(target_arch = "x86_64")]
mod primary {
    use spin::Mutex;

    use super::*;
    use crate::port::X86Ports;

    // SAFETY: the kernel runs at CPL0 and this handle is the only code that
    // drives the primary ATA channel.
    static PRIMARY_MASTER: Mutex<AtaDrive<X86Ports>> =
        Mutex::new(AtaDrive::new(unsafe { X86Ports::new() }, Bus::Primary, Drive::Master));

    /// Read `count` sectors from the primary master drive.
    ///
    /// The drive stays locked for the whole handshake and transfer.
    pub fn read_sectors(lba: u32, count: u8, buffer: &mut [u8]) -> Result<(), DriverError> {
        PRIMARY_MASTER.lock().read_sectors(lba, count, buffer)
    }

    /// Write `count` sectors to the primary master drive.
    pub fn write_sectors(lba: u32, count: u8, buffer: &[u8]) -> Result<(), DriverError> {
        PRIMARY_MASTER.lock().write_sectors(lba, count, buffer)
    }

    pub fn read_sector(lba: u32, buffer: &mut [u8; SECTOR_SIZE]) -> Result<(), DriverError> {
        PRIMARY_MASTER.lock().read_sector(lba, buffer)
    }

    pub fn write_sector(lba: u32, buffer: &[u8; SECTOR_SIZE]) -> Result<(), DriverError> {
        PRIMARY_MASTER.lock().write_sector(lba, buffer)
    }

    /// Identify the primary master drive; later requests are checked
    /// against the capacity it reports.
    pub fn identify() -> Result<DriveInfo, DriverError> {
        PRIMARY_MASTER.lock().identify()
    }
}

#[cfg(target_arch = "x86_64")]
pub use primary::{identify, read_sector, read_sectors, write_sector, write_sectors};
