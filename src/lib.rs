extern crate num;
#[macro_use]
extern crate num_derive;

pub mod constants;
pub mod error;
pub mod executor;
pub mod history;
pub mod image;
pub mod instruction;
pub mod interpreter;
pub mod memory;
pub mod register;

pub use error::Error;
pub use executor::PcBehavior;
pub use interpreter::{Changes, Config, InterruptKind, Interpreter, StepMode, StopReason};
