use crate::program::Diagnostic;
use std::path::PathBuf;

/// A fault raised by the execution engine while executing one instruction.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("invalid instruction #{word:04X} at #{address:04X}")]
    InvalidInstruction { address: u16, word: u16 },
    #[error("invalid register GR{register} at #{address:04X}")]
    InvalidRegister { address: u16, register: u16 },
    #[error("unknown SVC code {code} at #{address:04X}")]
    UnknownSupervisorCall { address: u16, code: u16 },
    #[error("program of {0} words does not fit in memory")]
    ProgramTooLarge(usize),
}

/// Errors raised while turning one source line into engine steps.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("runtime fault: {0}")]
    Engine(#[from] Fault),
    #[error("CALL jumped to #{address:04X}, which is not a subroutine entry")]
    UnmappedCallTarget { address: u16 },
    #[error("no program has been launched")]
    NotLaunched,
    #[error("the program declares no subroutine to start from")]
    NoEntrySubroutine,
    #[error("the compiler produced no program")]
    NoProgram,
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("only .cas files can be debugged: {}", .0.display())]
    UnsupportedSource(PathBuf),
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no program has been launched")]
    NotLaunched,
    #[error("a program has already been launched")]
    AlreadyLaunched,
    #[error("unavailable")]
    Unavailable(String),
    #[error("launch failed: {0}")]
    Launch(#[from] StepError),
}

#[derive(thiserror::Error, Debug)]
pub enum DapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message without a Content-Length header")]
    MissingContentLength,
    #[error("unsupported command {0}")]
    UnsupportedCommand(String),
    #[error("invalid arguments for {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors of a plain, non-debug run.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("assembly failed with {} diagnostics", .0.len())]
    Compile(Vec<Diagnostic>),
    #[error("runtime fault: {0}")]
    Fault(#[from] Fault),
    #[error("cannot write program output: {0}")]
    Output(#[from] std::io::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
