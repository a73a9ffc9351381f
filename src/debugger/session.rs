//! Protocol-facing stepping, breakpoint and evaluate state machine.

use super::breakpoints::{Breakpoint, BreakpointTable};
use super::stepper::{LineStepper, StepResult};
use super::stepping::{PendingAction, StopReason};
use super::variables::{self, Variable};
use crate::config::LaunchArguments;
use crate::engine::{Engine, InstructionKind};
use crate::error::{SessionError, SessionResult};
use crate::program::Compiler;
use std::fs;
use std::path::PathBuf;

/// Only files with this extension are launched.
pub const SOURCE_EXTENSION: &str = "cas";

/// `variablesReference` of the register scope.
pub const REGISTERS_REFERENCE: i64 = 1;

const INPUT_PROMPT: &str = "Input requested. Type a value in the debug console.\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running { line: usize },
    WaitingForInput { line: usize, pending: PendingAction },
    Terminated,
    ExceptionHalted { line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    Console,
    Stdout,
    Stderr,
}

impl OutputCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputCategory::Console => "console",
            OutputCategory::Stdout => "stdout",
            OutputCategory::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Stopped {
        reason: StopReason,
        description: Option<String>,
    },
    Terminated,
    Output {
        category: OutputCategory,
        text: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluateContext {
    Repl,
    Hover,
    Other,
}

impl EvaluateContext {
    pub fn parse(context: Option<&str>) -> Self {
        match context {
            Some("repl") => EvaluateContext::Repl,
            Some("hover") => EvaluateContext::Hover,
            _ => EvaluateContext::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// The expression was taken as program input.
    InputAccepted,
    Value(Variable),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameView {
    pub id: usize,
    pub name: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTrace {
    /// Innermost first.
    pub frames: Vec<FrameView>,
    pub total_frames: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub name: &'static str,
    pub variables_reference: i64,
}

/// Result of one line step as seen by a stepping loop.
enum Flow {
    Line(usize),
    /// The session stopped, terminated, halted or is waiting for input.
    Stopped,
}

/// A debugging session generic over the compiler and the engine.
pub struct SessionController<C: Compiler, E: Engine> {
    compiler: C,
    stepper: LineStepper<E>,
    breakpoints: BreakpointTable,
    source_file: Option<String>,
    state: SessionState,
    events: Vec<SessionEvent>,
}

impl<C: Compiler, E: Engine> SessionController<C, E> {
    pub fn new(compiler: C, engine: E) -> Self {
        Self {
            compiler,
            stepper: LineStepper::new(engine),
            breakpoints: BreakpointTable::new(),
            source_file: None,
            state: SessionState::Idle,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stepper(&self) -> &LineStepper<E> {
        &self.stepper
    }

    /// The line the session is stopped at, if any.
    pub fn current_line(&self) -> Option<usize> {
        match self.state {
            SessionState::Running { line }
            | SessionState::WaitingForInput { line, .. }
            | SessionState::ExceptionHalted { line } => Some(line),
            SessionState::Idle | SessionState::Terminated => None,
        }
    }

    /// Events produced since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn launch(&mut self, args: &LaunchArguments) -> SessionResult<()> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyLaunched);
        }

        let path = PathBuf::from(&args.program);
        if path.extension().and_then(|ext| ext.to_str()) != Some(SOURCE_EXTENSION) {
            log::warn!("refusing to launch {}", path.display());
            self.terminate();
            return Err(SessionError::UnsupportedSource(path));
        }

        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(source) => {
                self.terminate();
                return Err(SessionError::Io { path, source });
            }
        };

        let compiled = self.compiler.compile(&source, &args.compile_options);
        let diagnostics = match self.stepper.launch(compiled, &args.engine_options) {
            Ok(diagnostics) => diagnostics,
            Err(error) => {
                self.terminate();
                return Err(error.into());
            }
        };
        if !diagnostics.is_empty() {
            log::info!(
                "{} failed to compile with {} diagnostics",
                path.display(),
                diagnostics.len()
            );
            for diagnostic in &diagnostics {
                self.output(OutputCategory::Stderr, format!("{}\n", diagnostic));
            }
            self.terminate();
            return Ok(());
        }

        self.source_file = Some(args.program.clone());
        let line = 0;
        if args.stop_on_entry {
            self.stop(line, StopReason::Entry);
        } else if self.hits_breakpoint(line) {
            self.stop(line, StopReason::Breakpoint);
        } else {
            self.state = SessionState::Running { line };
            self.continue_running()?;
        }
        Ok(())
    }

    /// Replaces the breakpoints of `path`. The file is read to reject
    /// blank and comment-only lines.
    pub fn set_breakpoints(&mut self, path: &str, lines: &[usize]) -> Vec<Breakpoint> {
        let source = match fs::read_to_string(path) {
            Ok(source) => Some(source),
            Err(error) => {
                log::warn!("cannot read {} to verify breakpoints: {}", path, error);
                None
            }
        };
        self.breakpoints.set(path, source.as_deref(), lines)
    }

    pub fn breakpoints(&self, path: &str) -> &[Breakpoint] {
        self.breakpoints.get(path)
    }

    /// Runs until a breakpoint, input request, fault or the end of the
    /// program.
    pub fn continue_running(&mut self) -> SessionResult<()> {
        let Some(mut line) = self.begin_step()? else {
            return Ok(());
        };
        loop {
            match self.advance(line, PendingAction::Continue) {
                Flow::Stopped => return Ok(()),
                Flow::Line(next) if self.hits_breakpoint(next) => {
                    self.stop(next, StopReason::Breakpoint);
                    return Ok(());
                }
                Flow::Line(next) => line = next,
            }
        }
    }

    pub fn step_in(&mut self) -> SessionResult<()> {
        self.step_line(PendingAction::StepIn)
    }

    /// Runs until the enclosing subroutine regains control.
    pub fn step_out(&mut self) -> SessionResult<()> {
        let target_depth = self.stepper.stack_frame_count().saturating_sub(1);
        self.step_out_to(target_depth)
    }

    /// Steps over a CALL by running the callee to completion. Any other
    /// line is a plain step in.
    pub fn next(&mut self) -> SessionResult<()> {
        let Some(line) = self.begin_step()? else {
            return Ok(());
        };
        let is_call = match self.stepper.peek(line) {
            Ok(kind) => kind == Some(InstructionKind::Call),
            Err(error) => {
                self.halt(line, error.to_string());
                return Ok(());
            }
        };
        if !is_call {
            return self.step_line(PendingAction::Next);
        }

        let depth = self.stepper.stack_frame_count();
        match self.advance(line, PendingAction::Next) {
            Flow::Stopped => Ok(()),
            Flow::Line(next) if self.hits_breakpoint(next) => {
                self.stop(next, StopReason::Breakpoint);
                Ok(())
            }
            Flow::Line(next) => {
                self.state = SessionState::Running { line: next };
                self.step_out_to(depth)
            }
        }
    }

    /// Supplies input while the session waits for it; otherwise looks the
    /// expression up among the registers and flags.
    pub fn evaluate(
        &mut self,
        expression: &str,
        context: EvaluateContext,
    ) -> SessionResult<Evaluation> {
        if let SessionState::WaitingForInput { line, pending } = self.state {
            if context == EvaluateContext::Repl {
                log::info!("input received, resuming {:?}", pending);
                self.stepper.set_input(expression.to_string());
                self.state = SessionState::Running { line };
                self.resume(pending)?;
                return Ok(Evaluation::InputAccepted);
            }
        }

        if self.state == SessionState::Idle {
            return Err(SessionError::Unavailable(expression.to_string()));
        }
        variables::lookup(&self.stepper.state(), expression)
            .map(Evaluation::Value)
            .ok_or_else(|| SessionError::Unavailable(expression.to_string()))
    }

    /// Frames innermost first, skipping `start_frame` and keeping at most
    /// `levels` when given.
    pub fn stack_trace(&self, start_frame: usize, levels: Option<usize>) -> StackTrace {
        let Some(line) = self.current_line() else {
            return StackTrace::default();
        };
        let frames = self.stepper.stack_frames();
        let innermost = frames.len().saturating_sub(1);

        let views = frames
            .iter()
            .enumerate()
            .rev()
            .map(|(id, frame)| FrameView {
                id,
                name: frame.subroutine_name.clone(),
                line: if id == innermost {
                    line
                } else {
                    frame.call_line.unwrap_or(line)
                },
            })
            .skip(start_frame)
            .take(levels.filter(|&n| n > 0).unwrap_or(usize::MAX))
            .collect();

        StackTrace {
            frames: views,
            total_frames: frames.len(),
        }
    }

    pub fn scopes(&self) -> Vec<Scope> {
        vec![Scope {
            name: "Registers",
            variables_reference: REGISTERS_REFERENCE,
        }]
    }

    pub fn variables(&self, reference: i64) -> Vec<Variable> {
        if reference != REGISTERS_REFERENCE || self.state == SessionState::Idle {
            return Vec::new();
        }
        variables::registers(&self.stepper.state())
    }

    /// Abandons the session.
    pub fn terminate(&mut self) {
        log::info!("session terminated");
        self.state = SessionState::Terminated;
        self.events.push(SessionEvent::Terminated);
    }

    fn resume(&mut self, pending: PendingAction) -> SessionResult<()> {
        match pending {
            PendingAction::Continue => self.continue_running(),
            PendingAction::StepIn => self.step_in(),
            PendingAction::StepOut { target_depth } => self.step_out_to(target_depth),
            PendingAction::Next => self.next(),
        }
    }

    fn step_line(&mut self, pending: PendingAction) -> SessionResult<()> {
        let Some(line) = self.begin_step()? else {
            return Ok(());
        };
        if let Flow::Line(next) = self.advance(line, pending) {
            self.stop(next, StopReason::Step);
        }
        Ok(())
    }

    fn step_out_to(&mut self, target_depth: usize) -> SessionResult<()> {
        let Some(mut line) = self.begin_step()? else {
            return Ok(());
        };
        let pending = PendingAction::StepOut { target_depth };
        loop {
            match self.advance(line, pending) {
                Flow::Stopped => return Ok(()),
                // a breakpoint wins over the frame check on the same line
                Flow::Line(next) if self.hits_breakpoint(next) => {
                    self.stop(next, StopReason::Breakpoint);
                    return Ok(());
                }
                Flow::Line(next) if self.stepper.stack_frame_count() == target_depth => {
                    self.stop(next, StopReason::Step);
                    return Ok(());
                }
                Flow::Line(next) => line = next,
            }
        }
    }

    /// The line to step from. Stepping a finished session terminates it.
    fn begin_step(&mut self) -> SessionResult<Option<usize>> {
        match self.state {
            SessionState::Idle => Err(SessionError::NotLaunched),
            SessionState::Running { line } | SessionState::WaitingForInput { line, .. } => {
                Ok(Some(line))
            }
            SessionState::Terminated | SessionState::ExceptionHalted { .. } => {
                log::warn!("stepping requested on a finished session");
                self.terminate();
                Ok(None)
            }
        }
    }

    fn advance(&mut self, line: usize, pending: PendingAction) -> Flow {
        let result = self.stepper.step_into(line);
        for text in self.stepper.take_output() {
            self.output(OutputCategory::Stdout, format!("{}\n", text));
        }

        match result {
            Err(error) => {
                self.halt(line, error.to_string());
                Flow::Stopped
            }
            Ok(StepResult {
                program_end: true, ..
            }) => {
                self.terminate();
                Flow::Stopped
            }
            Ok(StepResult {
                request_input: true,
                ..
            }) => {
                log::info!("line {} waits for input", line);
                self.state = SessionState::WaitingForInput { line, pending };
                self.output(OutputCategory::Console, INPUT_PROMPT.to_string());
                Flow::Stopped
            }
            Ok(StepResult {
                next_line: Some(next),
                ..
            }) => Flow::Line(next),
            Ok(StepResult { next_line: None, .. }) => {
                let pr = self.stepper.state().pr;
                let message =
                    format!("execution reached #{:04X}, which maps to no source line", pr);
                self.halt(line, message);
                Flow::Stopped
            }
        }
    }

    fn hits_breakpoint(&self, line: usize) -> bool {
        self.source_file
            .as_deref()
            .is_some_and(|path| self.breakpoints.contains(path, line))
    }

    fn stop(&mut self, line: usize, reason: StopReason) {
        log::info!("stopped at line {} ({})", line, reason.as_str());
        self.state = SessionState::Running { line };
        self.events.push(SessionEvent::Stopped {
            reason,
            description: None,
        });
    }

    fn halt(&mut self, line: usize, message: String) {
        log::warn!("halted at line {}: {}", line, message);
        self.state = SessionState::ExceptionHalted { line };
        self.output(OutputCategory::Stderr, format!("{}\n", message));
        self.events.push(SessionEvent::Stopped {
            reason: StopReason::Exception,
            description: Some(message),
        });
    }

    fn output(&mut self, category: OutputCategory, text: String) {
        self.events.push(SessionEvent::Output { category, text });
    }
}
