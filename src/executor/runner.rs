use crate::casl2::Casl2;
use crate::comet2::Comet2;
use crate::config::{CompileOptions, EngineOptions};
use crate::engine::{Console, Engine};
use crate::error::RunError;
use crate::program::{CompileOutput, Compiler};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Console over a line reader and a writer.
///
/// Write failures cannot surface through [`Console::write_line`], so the
/// first one is kept and reported by [`IoConsole::finish`].
pub struct IoConsole<R: BufRead, W: Write> {
    input: R,
    output: W,
    error: Option<io::Error>,
}

impl<R: BufRead, W: Write> IoConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            error: None,
        }
    }

    pub fn finish(mut self) -> io::Result<W> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.output.flush()?;
        Ok(self.output)
    }
}

impl<R: BufRead, W: Write> Console for IoConsole<R, W> {
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) => {
                log::warn!("input failed: {}", e);
                None
            }
        }
    }

    fn write_line(&mut self, text: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = writeln!(self.output, "{}", text) {
            self.error = Some(e);
        }
    }
}

/// Assembles `path` and runs it to completion without the debugger.
/// Returns the number of instructions executed.
pub fn run_program<R: BufRead, W: Write>(
    path: &Path,
    compile_options: &CompileOptions,
    engine_options: &EngineOptions,
    input: R,
    output: W,
) -> Result<u64, RunError> {
    let source = fs::read_to_string(path).map_err(|source| RunError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let program = match Casl2::new().compile(&source, compile_options) {
        CompileOutput {
            diagnostics,
            program: Some(program),
        } if diagnostics.is_empty() => program,
        CompileOutput { diagnostics, .. } => return Err(RunError::Compile(diagnostics)),
    };

    let mut engine = Comet2::new();
    engine.init(&program, engine_options)?;
    let mut console = IoConsole::new(input, output);

    let mut steps = 0u64;
    loop {
        steps += 1;
        if engine.step_into(&mut console)? {
            break;
        }
    }
    log::info!("{} finished after {} steps", path.display(), steps);

    console.finish()?;
    Ok(steps)
}
