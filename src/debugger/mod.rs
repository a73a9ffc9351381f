mod breakpoints;
mod session;
mod stack;
mod stepper;
mod stepping;
mod variables;

pub use breakpoints::Breakpoint;
pub use session::{
    EvaluateContext, Evaluation, FrameView, OutputCategory, Scope, SessionController,
    SessionEvent, SessionState, StackTrace, REGISTERS_REFERENCE, SOURCE_EXTENSION,
};
pub use stack::{CallStack, StackFrame};
pub use stepper::{LineStepper, StepResult};
pub use stepping::{PendingAction, StopReason};
pub use variables::Variable;
