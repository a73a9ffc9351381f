use crate::config::CompileOptions;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A compile error reported against a zero-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[casl2] {} (line {})", self.message, self.line + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubroutineInfo {
    pub name: String,
    pub start_line: usize,
}

/// Address to line lookups produced alongside the machine code.
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    /// Address of every ordinary instruction or data word group.
    pub line_map: BTreeMap<u16, usize>,
    /// Address of every subroutine entry, mapped to its START line.
    pub subroutine_map: BTreeMap<u16, usize>,
    pub subroutines: Vec<SubroutineInfo>,
}

impl DebugInfo {
    pub fn line_at(&self, address: u16) -> Option<usize> {
        self.line_map.get(&address).copied()
    }

    /// Resolves the subroutine whose entry point is `address`.
    pub fn subroutine_at(&self, address: u16) -> Option<&SubroutineInfo> {
        let line = *self.subroutine_map.get(&address)?;
        self.subroutines.iter().find(|s| s.start_line == line)
    }

    /// The subroutine with the smallest start line.
    pub fn entry_subroutine(&self) -> Option<&SubroutineInfo> {
        self.subroutines.iter().min_by_key(|s| s.start_line)
    }

    pub fn entry_lines(&self) -> BTreeSet<usize> {
        self.subroutine_map.values().copied().collect()
    }
}

/// Machine code plus debug info. Never mutated after compilation.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub code: Vec<u16>,
    /// Execution start address.
    pub entry: u16,
    pub debug_info: DebugInfo,
}

#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub program: Option<CompiledProgram>,
}

impl CompileOutput {
    pub fn failed(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            program: None,
        }
    }

    pub fn succeeded(program: CompiledProgram) -> Self {
        Self {
            diagnostics: Vec::new(),
            program: Some(program),
        }
    }
}

/// Turns source text into machine code with debug info.
pub trait Compiler {
    fn compile(&self, source: &str, options: &CompileOptions) -> CompileOutput;
}
