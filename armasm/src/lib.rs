//! Assembler for the [armvm](../armvm/index.html) processor core.
//!
//! [`assemble`] takes a line-oriented ARMv4-class assembly source and
//! produces an [`armvm::image::Image`] plus the address<->line map the
//! debugger needs to translate breakpoints and report the current line.
//! Assembly is line-at-a-time: a syntax error on one line is collected as
//! a [`Diagnostic`] and does not stop the rest of the file from being
//! tokenized, so a single call surfaces every problem in the source.
//!
//! # Source syntax
//!
//! A program is made of lines belonging to one of three sections,
//! switched with `SECTION INTVEC|CODE|DATA`. A line may start with a
//! `label:` definition, followed optionally by one statement: a data
//! declaration (`DC8/DC16/DC32 v, v, ...` or `DS8/DS16/DS32 count`), an
//! `ASSERT "message"` directive, or an instruction. Instructions follow
//! `<mnemonic><cond?><suffix?> operand, operand, ...` in ARM UAL order
//! (condition before any `S`/`B`/addressing suffix). `;` starts a
//! comment that runs to the end of the line.

mod assembler;
mod encoder;
mod error;
mod mnemonic;
mod token;
mod tokenizer;

pub use assembler::{assemble, assemble_with_fill, AssembleOutput};
pub use error::{Diagnostic, ErrorKind};
pub use token::{Operand, Section, Token};

#[cfg(test)]
mod test;
