use crate::config::EngineOptions;
use crate::error::Fault;
use crate::program::CompiledProgram;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub overflow: bool,
    pub sign: bool,
    pub zero: bool,
}

/// Registers, flags and program counter of the engine between two steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachineState {
    pub gr: [u16; 8],
    pub pr: u16,
    pub sp: u16,
    pub flags: Flags,
}

/// What the debugger needs to know about an instruction before running it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    Call,
    Return,
    /// Reads a line from the console.
    Input,
    Other,
}

/// Input/output hooks invoked synchronously while an instruction executes.
pub trait Console {
    /// Supplies one line for an input instruction, or `None` at end of input.
    fn read_line(&mut self) -> Option<String>;
    fn write_line(&mut self, text: &str);
}

/// An instruction-level execution engine.
pub trait Engine {
    fn init(&mut self, program: &CompiledProgram, options: &EngineOptions) -> Result<(), Fault>;

    /// Classifies the instruction at PR without executing it.
    fn next_instruction(&self) -> Result<InstructionKind, Fault>;

    /// Executes exactly one instruction. Returns `true` once the program has ended.
    fn step_into(&mut self, console: &mut dyn Console) -> Result<bool, Fault>;

    fn state(&self) -> MachineState;
}
