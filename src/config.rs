use serde::Deserialize;

/// Arguments of the DAP `launch` request, as written in the editor's launch
/// configuration:
///
/// ```json
/// {
///     "type": "comet2",
///     "request": "launch",
///     "program": "${file}",
///     "stopOnEntry": false
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    pub program: String,
    #[serde(default)]
    pub stop_on_entry: bool,
    #[serde(default)]
    pub engine_options: EngineOptions,
    #[serde(default)]
    pub compile_options: CompileOptions,
}

impl LaunchArguments {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            stop_on_entry: false,
            engine_options: EngineOptions::default(),
            compile_options: CompileOptions::default(),
        }
    }
}

/// Options passed to the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    #[serde(rename = "useGR8")]
    pub use_gr8: bool,
    #[serde(rename = "enableLabelScope")]
    pub enable_label_scope: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            use_gr8: true,
            enable_label_scope: true,
        }
    }
}

/// Options passed to the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Register field 8 addresses SP.
    #[serde(rename = "useGR8AsSP")]
    pub use_gr8_as_sp: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            use_gr8_as_sp: true,
        }
    }
}
