//! Sparse, breakpoint-tagged byte memory.
//!
//! Unlike a flat `Vec<u8>`, addresses here are defined only once they have
//! actually been written by assembly loading or by execution; reading an
//! address that was never written is a distinguished error rather than a
//! silent zero, mirroring the uninitialized-access detection the
//! reference interpreter performs.

use crate::constants::{self, Endian};
use crate::error::Error;
use byteorder::ByteOrder;
use std::collections::HashMap;

/// Breakpoint mode octal: bit 0 = execute, bit 1 = write, bit 2 = read.
/// Mode 8 is reserved to flag "this access touched uninitialized memory"
/// and is never set by the caller directly.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct MemBreakpoint(pub u8);

impl MemBreakpoint {
    pub fn execute(self) -> bool {
        self.0 & 0b001 != 0
    }
    pub fn write(self) -> bool {
        self.0 & 0b010 != 0
    }
    pub fn read(self) -> bool {
        self.0 & 0b100 != 0
    }

    pub fn from_mode_str(mode: &str) -> MemBreakpoint {
        let mut bits = 0u8;
        if mode.contains('r') {
            bits |= 0b100;
        }
        if mode.contains('w') {
            bits |= 0b010;
        }
        if mode.contains('e') {
            bits |= 0b001;
        }
        MemBreakpoint(bits)
    }
}

/// Outcome of a memory access that also needs to report a breakpoint hit
/// without treating the hit as a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointHit {
    pub addr: u32,
    pub mode: u8,
}

pub struct Memory {
    cells: HashMap<u32, u8>,
    breakpoints: HashMap<u32, MemBreakpoint>,
    changes: Vec<(u32, Option<u8>)>,
    pub last_breakpoint: Option<BreakpointHit>,
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new()
    }
}

impl Memory {
    pub fn new() -> Memory {
        Memory {
            cells: HashMap::new(),
            breakpoints: HashMap::new(),
            changes: Vec::new(),
            last_breakpoint: None,
        }
    }

    fn check_breakpoint(&mut self, addr: u32, read: bool, write: bool, execute: bool) {
        if let Some(bp) = self.breakpoints.get(&addr) {
            let hit = (read && bp.read()) || (write && bp.write()) || (execute && bp.execute());
            if hit {
                self.last_breakpoint = Some(BreakpointHit { addr, mode: bp.0 });
            }
        }
    }

    /// Read a single byte, failing if it was never written.
    pub fn read_byte(&mut self, addr: u32) -> Result<u8, Error> {
        self.check_breakpoint(addr, true, false, false);
        match self.cells.get(&addr) {
            Some(&b) => Ok(b),
            None => {
                self.last_breakpoint = Some(BreakpointHit { addr, mode: 8 });
                Err(Error::UninitializedMemory(addr))
            }
        }
    }

    /// Raw peek that neither errors on an unwritten address nor trips a
    /// breakpoint; used by the executor to snapshot pre-write values for
    /// history.
    pub fn peek_byte(&self, addr: u32) -> Option<u8> {
        self.cells.get(&addr).copied()
    }

    pub fn write_byte(&mut self, addr: u32, value: u8) {
        self.check_breakpoint(addr, false, true, false);
        self.changes.push((addr, self.cells.get(&addr).copied()));
        self.cells.insert(addr, value);
    }

    pub fn mark_executed(&mut self, addr: u32) {
        self.check_breakpoint(addr, false, false, true);
    }

    fn read_n(&mut self, addr: u32, size: u32) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        for i in 0..size {
            buf[i as usize] = self.read_byte(addr + i)?;
        }
        Ok(Endian::read_uint(&buf[..size as usize], size as usize) as u32)
    }

    fn write_n(&mut self, addr: u32, size: u32, value: u32) {
        let mut buf = [0u8; 4];
        Endian::write_uint(&mut buf[..size as usize], u64::from(value), size as usize);
        for i in 0..size {
            self.write_byte(addr + i, buf[i as usize]);
        }
    }

    pub fn read_word(&mut self, addr: u32) -> Result<u32, Error> {
        if addr % constants::WORD_BYTES != 0 {
            return Err(Error::Unaligned(addr));
        }
        self.read_n(addr, 4)
    }

    pub fn write_word(&mut self, addr: u32, value: u32) {
        self.write_n(addr, 4, value)
    }

    pub fn read_size(&mut self, addr: u32, byte: bool) -> Result<u32, Error> {
        if byte {
            self.read_byte(addr).map(u32::from)
        } else {
            self.read_word(addr)
        }
    }

    pub fn write_size(&mut self, addr: u32, byte: bool, value: u32) {
        if byte {
            self.write_byte(addr, value as u8)
        } else {
            self.write_word(addr, value)
        }
    }

    /// Bulk-load a contiguous block, as produced by assembling a section.
    /// Loading never trips a breakpoint or gets recorded as a "change".
    pub fn load(&mut self, base: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.cells.insert(base + i as u32, b);
        }
    }

    pub fn set_breakpoint(&mut self, addr: u32, mode: u8) {
        if mode == 0 {
            self.breakpoints.remove(&addr);
        } else {
            self.breakpoints.insert(addr, MemBreakpoint(mode));
        }
    }

    pub fn toggle_breakpoint(&mut self, addr: u32, mode: u8) {
        let current = self.breakpoints.get(&addr).copied().unwrap_or_default().0;
        self.set_breakpoint(addr, current ^ mode);
    }

    pub fn remove_execute_breakpoints(&mut self, addrs: &[u32]) {
        for addr in addrs {
            if let Some(bp) = self.breakpoints.get_mut(addr) {
                bp.0 &= !0b001;
                if bp.0 == 0 {
                    self.breakpoints.remove(addr);
                }
            }
        }
    }

    /// Partition all breakpoints into (read-only, write-only, read-write, execute) lists.
    pub fn breakpoints_by_mode(&self) -> (Vec<u32>, Vec<u32>, Vec<u32>, Vec<u32>) {
        let mut r = Vec::new();
        let mut w = Vec::new();
        let mut rw = Vec::new();
        let mut e = Vec::new();
        for (&addr, bp) in self.breakpoints.iter() {
            match bp.0 & 0b110 {
                0b100 => r.push(addr),
                0b010 => w.push(addr),
                0b110 => rw.push(addr),
                _ => {}
            }
            if bp.execute() {
                e.push(addr);
            }
        }
        (r, w, rw, e)
    }

    /// Consumed-on-read log of `(addr, old_byte)` pairs touched since the
    /// last call.
    pub fn take_changes(&mut self) -> Vec<(u32, Option<u8>)> {
        std::mem::take(&mut self.changes)
    }

    pub fn serialize(&self) -> Vec<(u32, u8)> {
        let mut v: Vec<(u32, u8)> = self.cells.iter().map(|(&a, &b)| (a, b)).collect();
        v.sort_by_key(|(a, _)| *a);
        v
    }

    pub fn restore_byte(&mut self, addr: u32, value: Option<u8>) {
        match value {
            Some(b) => {
                self.cells.insert(addr, b);
            }
            None => {
                self.cells.remove(&addr);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn uninitialized_read_errors() {
        let mut mem = Memory::new();
        assert_eq!(mem.read_byte(0x1000), Err(Error::UninitializedMemory(0x1000)));
    }

    #[test]
    fn load_then_read_word() {
        let mut mem = Memory::new();
        mem.load(0x1000, &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(mem.read_word(0x1000), Ok(0xDEADBEEF));
    }

    #[test]
    fn unaligned_word_access_errors() {
        let mut mem = Memory::new();
        mem.load(0x1000, &[0, 0, 0, 0, 0]);
        assert_eq!(mem.read_word(0x1001), Err(Error::Unaligned(0x1001)));
    }

    #[test]
    fn write_records_change_and_old_value() {
        let mut mem = Memory::new();
        mem.load(0x2000, &[0x11]);
        mem.write_byte(0x2000, 0xAA);
        assert_eq!(mem.take_changes(), vec![(0x2000, Some(0x11))]);
    }

    #[test]
    fn read_breakpoint_trips_on_read_but_not_write() {
        let mut mem = Memory::new();
        mem.load(0x3000, &[1]);
        mem.set_breakpoint(0x3000, 0b100);
        mem.write_byte(0x3000, 2);
        assert!(mem.last_breakpoint.is_none());
        mem.read_byte(0x3000).unwrap();
        assert_eq!(
            mem.last_breakpoint,
            Some(BreakpointHit { addr: 0x3000, mode: 0b100 })
        );
    }

    #[test]
    fn breakpoints_partition_by_mode() {
        let mut mem = Memory::new();
        mem.set_breakpoint(1, 0b100);
        mem.set_breakpoint(2, 0b010);
        mem.set_breakpoint(3, 0b110);
        mem.set_breakpoint(4, 0b001);
        let (r, w, rw, e) = mem.breakpoints_by_mode();
        assert_eq!(r, vec![1]);
        assert_eq!(w, vec![2]);
        assert_eq!(rw, vec![3]);
        assert_eq!(e, vec![4]);
    }
}
