//! Runtime error kinds for the decoder, executor, memory and history.
//!
//! Assembly-time errors (`SYNTAX`, `RANGE`, `INVINSTR`, `LINK`) live in
//! `armasm`; this crate only needs the kinds that can surface while a
//! program is actually executing.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Runtime decode failed to match any known instruction class.
    Decode(u32),
    /// Read of a byte that was never written.
    UninitializedMemory(u32),
    /// Word access at a non-word-aligned address.
    Unaligned(u32),
    /// A user assertion fired.
    Assert { line: u32, message: String },
    /// stepBack asked to go further than History retains.
    HistoryUnderflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Decode(word) => write!(f, "invalid decode mask for instruction {:#010x}", word),
            Error::UninitializedMemory(addr) => {
                write!(f, "read of uninitialized memory at {:#010x}", addr)
            }
            Error::Unaligned(addr) => write!(f, "unaligned word access at {:#010x}", addr),
            Error::Assert { line, message } => write!(f, "assertion failed at line {}: {}", line, message),
            Error::HistoryUnderflow => write!(f, "stepBack requested beyond recorded history"),
        }
    }
}

impl std::error::Error for Error {}
