pub mod runner;

pub use runner::{run_program, IoConsole};
