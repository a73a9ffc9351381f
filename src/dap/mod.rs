mod protocol;
mod server;

use crate::error::DapError;
use std::io;

pub use protocol::{DapMessage, DapMessageContent};
pub use server::DapServer;

/// Serves one debugging session over stdin/stdout.
pub fn run_dap_mode() -> Result<(), DapError> {
    log::info!("DAP server starting");
    let stdin = io::stdin();
    let mut server = DapServer::new(stdin.lock(), io::stdout());
    server.run()?;
    log::info!("DAP server exiting");
    Ok(())
}
