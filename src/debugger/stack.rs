/// One active subroutine invocation, reconstructed from observed CALL and
/// RET instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub subroutine_name: String,
    /// Line of the CALL made from this frame; `None` while nothing has been
    /// called from it.
    pub call_line: Option<usize>,
}

impl StackFrame {
    pub fn new(subroutine_name: impl Into<String>) -> Self {
        Self {
            subroutine_name: subroutine_name.into(),
            call_line: None,
        }
    }
}

/// Call stack ordered outermost first. Never empty once reset.
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Vec<StackFrame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn reset(&mut self, entry: &str) {
        self.frames.clear();
        self.frames.push(StackFrame::new(entry));
    }

    /// Records `call_line` on the active frame and pushes the callee.
    pub fn enter(&mut self, call_line: usize, subroutine_name: &str) {
        if let Some(top) = self.frames.last_mut() {
            top.call_line = Some(call_line);
        }
        self.frames.push(StackFrame::new(subroutine_name));
    }

    /// Pops the active frame. The bottom frame is never popped.
    pub fn leave(&mut self) -> Option<StackFrame> {
        if self.frames.len() <= 1 {
            log::warn!("RET at the bottom frame; call stack left unchanged");
            return None;
        }
        self.frames.pop()
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_records_the_call_line_on_the_caller() {
        let mut stack = CallStack::new();
        stack.reset("MAIN");
        stack.enter(4, "SUB");

        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.frames()[0].call_line, Some(4));
        assert_eq!(stack.frames()[1], StackFrame::new("SUB"));
    }

    #[test]
    fn bottom_frame_survives_leave() {
        let mut stack = CallStack::new();
        stack.reset("MAIN");
        stack.enter(1, "SUB");

        assert_eq!(stack.leave().map(|f| f.subroutine_name), Some("SUB".to_string()));
        assert_eq!(stack.leave(), None);
        assert_eq!(stack.depth(), 1);
    }
}
