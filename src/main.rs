use argh::FromArgs;
use comet2_debugger::config::{CompileOptions, EngineOptions};
use comet2_debugger::dap;
use comet2_debugger::error::RunError;
use comet2_debugger::executor;
use log::LevelFilter;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(FromArgs)]
#[argh(help_triggers("-h", "--help"))]
/// CASL II assembler, COMET II simulator and debug adapter
struct Opts {
    /// serve the Debug Adapter Protocol on stdin/stdout
    #[argh(switch)]
    dap: bool,

    /// log level: off, error, warn, info, debug or trace
    #[argh(option, default = "LevelFilter::Warn")]
    log_level: LevelFilter,

    /// write logs to this file instead of stderr
    #[argh(option)]
    log_file: Option<PathBuf>,

    /// do not let register field 8 address SP
    #[argh(switch)]
    no_gr8_as_sp: bool,

    /// make every label global
    #[argh(switch)]
    no_label_scope: bool,

    /// program to assemble and run
    #[argh(positional)]
    program: Option<PathBuf>,
}

fn init_logging(opts: &Opts) -> io::Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    // an explicit flag wins over RUST_LOG
    if std::env::var_os("RUST_LOG").is_none() || opts.log_level != LevelFilter::Warn {
        builder.filter_level(opts.log_level);
    }
    match &opts.log_file {
        Some(path) => {
            let file = File::create(path)?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        None => {
            builder.target(env_logger::Target::Stderr);
        }
    }
    builder.init();
    Ok(())
}

fn main() -> ExitCode {
    let opts: Opts = argh::from_env();
    if let Err(e) = init_logging(&opts) {
        eprintln!("cannot open log file: {}", e);
        return ExitCode::FAILURE;
    }

    if opts.dap {
        return match dap::run_dap_mode() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("DAP server stopped: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let Some(program) = opts.program.as_deref() else {
        eprintln!("expected a program to run, or --dap");
        return ExitCode::FAILURE;
    };

    let compile_options = CompileOptions {
        enable_label_scope: !opts.no_label_scope,
        ..CompileOptions::default()
    };
    let engine_options = EngineOptions {
        use_gr8_as_sp: !opts.no_gr8_as_sp,
    };

    let stdin = io::stdin();
    match executor::run_program(
        program,
        &compile_options,
        &engine_options,
        stdin.lock(),
        io::stdout(),
    ) {
        Ok(_) => ExitCode::SUCCESS,
        Err(RunError::Compile(diagnostics)) => {
            for diagnostic in &diagnostics {
                eprintln!("{}", diagnostic);
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
