//! Reference CASL II assembler.

mod assembler;
pub mod lexer;
mod symbols;

pub use assembler::Casl2;
pub use lexer::is_blank_or_comment;
