/// The stepping request to resume once input arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    Continue,
    StepIn,
    /// Keeps the depth recorded when the step out began.
    StepOut { target_depth: usize },
    Next,
}

/// Why the session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Entry,
    Step,
    Breakpoint,
    Exception,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Entry => "entry",
            StopReason::Step => "step",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Exception => "exception",
        }
    }
}
