//! Reference COMET II execution engine.

pub mod isa;
mod machine;

pub use isa::{Instruction, Mnemonic};
pub use machine::{Comet2, MEMORY_SIZE};
