//! Assembly-time diagnostics. Runtime errors live in `armvm::Error`; these
//! cover the four kinds a source file can provoke before a single byte is
//! ever executed.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Tokenizer rejected the line.
    Syntax,
    /// An operand value does not fit in its encoding field.
    Range,
    /// Unknown mnemonic, or an operand combination the mnemonic does not support.
    InvalidInstruction,
    /// Unresolved label, or a literal pool that overran its section.
    Link,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ErrorKind::Syntax => "SYNTAX",
            ErrorKind::Range => "RANGE",
            ErrorKind::InvalidInstruction => "INVINSTR",
            ErrorKind::Link => "LINK",
        };
        write!(f, "{}", s)
    }
}

/// One diagnostic tied to a source line. The assembler collects these
/// across the whole file rather than aborting on the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub line: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, line: u32, message: impl Into<String>) -> Diagnostic {
        Diagnostic { kind, line, message: message.into() }
    }

    pub fn syntax(line: u32, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(ErrorKind::Syntax, line, message)
    }

    pub fn range(line: u32, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(ErrorKind::Range, line, message)
    }

    pub fn invalid_instruction(line: u32, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(ErrorKind::InvalidInstruction, line, message)
    }

    pub fn link(line: u32, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(ErrorKind::Link, line, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (line {}): {}", self.kind, self.line, self.message)
    }
}

impl std::error::Error for Diagnostic {}
