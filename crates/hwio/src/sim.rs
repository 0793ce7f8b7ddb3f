//! Simulated register set for driver tests.
//!
//! Reads pop from a per-port script and fall back to a per-port default
//! once the script runs dry. Every access is recorded in order.

use std::collections::{BTreeMap, VecDeque};
use std::vec::Vec;

use crate::port::PortIo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadU8(u16, u8),
    WriteU8(u16, u8),
    ReadU16(u16, u16),
    WriteU16(u16, u16),
}

#[derive(Debug, Default)]
pub struct SimPorts {
    scripts: BTreeMap<u16, VecDeque<u16>>,
    defaults: BTreeMap<u16, u16>,
    log: Vec<Access>,
}

impl SimPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue values to be returned by successive reads of `port`.
    pub fn script(&mut self, port: u16, values: impl IntoIterator<Item = u16>) -> &mut Self {
        self.scripts.entry(port).or_default().extend(values);
        self
    }

    /// Value returned by `port` once its script is exhausted.
    pub fn default_value(&mut self, port: u16, value: u16) -> &mut Self {
        self.defaults.insert(port, value);
        self
    }

    pub fn log(&self) -> &[Access] {
        &self.log
    }

    pub fn reads_of(&self, port: u16) -> usize {
        self.log
            .iter()
            .filter(|a| matches!(a, Access::ReadU8(p, _) | Access::ReadU16(p, _) if *p == port))
            .count()
    }

    pub fn byte_writes_to(&self, port: u16) -> Vec<u8> {
        self.log
            .iter()
            .filter_map(|a| match a {
                Access::WriteU8(p, v) if *p == port => Some(*v),
                _ => None,
            })
            .collect()
    }

    pub fn word_writes_to(&self, port: u16) -> Vec<u16> {
        self.log
            .iter()
            .filter_map(|a| match a {
                Access::WriteU16(p, v) if *p == port => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// All byte writes, in issue order.
    pub fn byte_writes(&self) -> Vec<(u16, u8)> {
        self.log
            .iter()
            .filter_map(|a| match a {
                Access::WriteU8(p, v) => Some((*p, *v)),
                _ => None,
            })
            .collect()
    }

    fn next(&mut self, port: u16) -> u16 {
        self.scripts
            .get_mut(&port)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.defaults.get(&port).copied())
            .unwrap_or(0)
    }
}

impl PortIo for SimPorts {
    fn read_u8(&mut self, port: u16) -> u8 {
        let value = self.next(port) as u8;
        self.log.push(Access::ReadU8(port, value));
        value
    }

    fn write_u8(&mut self, port: u16, value: u8) {
        self.log.push(Access::WriteU8(port, value));
    }

    fn read_u16(&mut self, port: u16) -> u16 {
        let value = self.next(port);
        self.log.push(Access::ReadU16(port, value));
        value
    }

    fn write_u16(&mut self, port: u16, value: u16) {
        self.log.push(Access::WriteU16(port, value));
    }
}
