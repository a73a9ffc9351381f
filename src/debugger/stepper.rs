use super::stack::{CallStack, StackFrame};
use crate::config::EngineOptions;
use crate::engine::{Console, Engine, InstructionKind, MachineState};
use crate::error::StepError;
use crate::program::{CompileOutput, CompiledProgram, Diagnostic};
use std::collections::BTreeSet;

/// Outcome of running the instruction needed to leave one source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepResult {
    pub program_end: bool,
    pub request_input: bool,
    /// `None` when execution moved to an address with no line mapping.
    pub next_line: Option<usize>,
}

impl StepResult {
    fn advanced(program_end: bool, next_line: Option<usize>) -> Self {
        Self {
            program_end,
            request_input: false,
            next_line,
        }
    }

    fn input_requested(line: usize) -> Self {
        Self {
            program_end: false,
            request_input: true,
            next_line: Some(line),
        }
    }
}

/// Holds at most one pending input value.
#[derive(Debug, Default)]
pub struct InputSlot(Option<String>);

impl InputSlot {
    pub fn put(&mut self, value: String) {
        if let Some(previous) = self.0.replace(value) {
            log::warn!("discarding unread input {:?}", previous);
        }
    }

    pub fn take(&mut self) -> Option<String> {
        self.0.take()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

/// Console handed to the engine for one step.
struct StepConsole<'a> {
    input: Option<String>,
    output: &'a mut Vec<String>,
}

impl Console for StepConsole<'_> {
    fn read_line(&mut self) -> Option<String> {
        self.input.take()
    }

    fn write_line(&mut self, text: &str) {
        self.output.push(text.to_string());
    }
}

/// The loaded program and its lookups.
struct Loaded {
    program: CompiledProgram,
    entry_lines: BTreeSet<usize>,
}

/// Turns single-instruction execution into single-line execution and keeps
/// the call stack.
pub struct LineStepper<E: Engine> {
    engine: E,
    loaded: Option<Loaded>,
    stack: CallStack,
    input: InputSlot,
    output: Vec<String>,
}

impl<E: Engine> LineStepper<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            loaded: None,
            stack: CallStack::new(),
            input: InputSlot::default(),
            output: Vec::new(),
        }
    }

    /// Loads a successful compile into the engine and seeds the call stack
    /// with the entry subroutine. Diagnostics are handed back untouched; when
    /// there are any, nothing is loaded.
    pub fn launch(
        &mut self,
        compiled: CompileOutput,
        options: &EngineOptions,
    ) -> Result<Vec<Diagnostic>, StepError> {
        let CompileOutput {
            diagnostics,
            program,
        } = compiled;
        let program = match program {
            _ if !diagnostics.is_empty() => return Ok(diagnostics),
            Some(program) => program,
            None => return Err(StepError::NoProgram),
        };

        let entry = program
            .debug_info
            .entry_subroutine()
            .ok_or(StepError::NoEntrySubroutine)?
            .name
            .clone();
        self.engine.init(&program, options)?;
        self.stack.reset(&entry);
        self.input = InputSlot::default();
        self.output.clear();
        self.loaded = Some(Loaded {
            entry_lines: program.debug_info.entry_lines(),
            program,
        });
        log::info!("launched at subroutine {}", entry);
        Ok(diagnostics)
    }

    /// Whether `line` declares a subroutine entry (its START line).
    pub fn is_entry_line(&self, line: usize) -> bool {
        self.loaded
            .as_ref()
            .is_some_and(|loaded| loaded.entry_lines.contains(&line))
    }

    /// The instruction that leaving `line` would execute, or `None` when
    /// `line` is a subroutine entry and nothing executes there.
    pub fn peek(&self, line: usize) -> Result<Option<InstructionKind>, StepError> {
        if self.loaded.is_none() {
            return Err(StepError::NotLaunched);
        }
        if self.is_entry_line(line) {
            return Ok(None);
        }
        Ok(Some(self.engine.next_instruction()?))
    }

    pub fn step_into(&mut self, execute_line: usize) -> Result<StepResult, StepError> {
        let loaded = self.loaded.as_ref().ok_or(StepError::NotLaunched)?;

        // START has no runtime effect
        if loaded.entry_lines.contains(&execute_line) {
            return Ok(StepResult::advanced(false, Some(execute_line + 1)));
        }

        let kind = self.engine.next_instruction()?;
        if kind == InstructionKind::Input && self.input.is_empty() {
            return Ok(StepResult::input_requested(execute_line));
        }

        let mut console = StepConsole {
            input: self.input.take(),
            output: &mut self.output,
        };
        let program_end = self.engine.step_into(&mut console)?;
        let pr = self.engine.state().pr;
        let debug_info = &loaded.program.debug_info;

        let next_line = if kind == InstructionKind::Call {
            let subroutine = debug_info
                .subroutine_at(pr)
                .ok_or(StepError::UnmappedCallTarget { address: pr })?;
            self.stack.enter(execute_line, &subroutine.name);
            Some(subroutine.start_line)
        } else {
            debug_info.line_at(pr)
        };

        if kind == InstructionKind::Return && !program_end {
            self.stack.leave();
        }

        Ok(StepResult::advanced(program_end, next_line))
    }

    pub fn set_input(&mut self, value: String) {
        self.input.put(value);
    }

    pub fn stack_frames(&self) -> &[StackFrame] {
        self.stack.frames()
    }

    pub fn stack_frame_count(&self) -> usize {
        self.stack.depth()
    }

    pub fn state(&self) -> MachineState {
        self.engine.state()
    }

    /// Lines written by the program since the last call.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }
}
