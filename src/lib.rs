//! Source-line debugger for CASL II programs running on a COMET II machine,
//! served to editors over the Debug Adapter Protocol.

pub mod casl2;
pub mod comet2;
pub mod config;
pub mod dap;
pub mod debugger;
pub mod engine;
pub mod error;
pub mod executor;
pub mod program;
