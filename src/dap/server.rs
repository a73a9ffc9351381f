use super::protocol::{DapMessage, DapMessageContent};
use crate::casl2::Casl2;
use crate::comet2::Comet2;
use crate::config::LaunchArguments;
use crate::debugger::{EvaluateContext, Evaluation, SessionController, SessionEvent};
use crate::error::DapError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::path::Path;

const THREAD_ID: i64 = 1;

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct InitializeArguments {
    lines_start_at1: Option<bool>,
}

#[derive(Deserialize)]
struct SourceBreakpoint {
    line: i64,
}

#[derive(Deserialize, Default)]
struct Source {
    path: Option<String>,
}

#[derive(Deserialize)]
struct SetBreakpointsArguments {
    #[serde(default)]
    source: Source,
    breakpoints: Option<Vec<SourceBreakpoint>>,
    lines: Option<Vec<i64>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct StackTraceArguments {
    start_frame: Option<usize>,
    levels: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariablesArguments {
    variables_reference: i64,
}

#[derive(Deserialize)]
struct EvaluateArguments {
    expression: String,
    context: Option<String>,
}

/// Reads framed DAP requests from `reader`, drives the session and writes
/// responses and events to `writer`.
pub struct DapServer<R: BufRead, W: Write> {
    reader: R,
    writer: W,
    seq: u64,
    session: SessionController<Casl2, Comet2>,
    lines_start_at1: bool,
    program: Option<String>,
}

impl<R: BufRead, W: Write> DapServer<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            seq: 0,
            session: SessionController::new(Casl2::new(), Comet2::new()),
            lines_start_at1: true,
            program: None,
        }
    }

    /// Serves requests until `disconnect` or the end of input.
    pub fn run(&mut self) -> Result<(), DapError> {
        loop {
            let msg = match self.read_message() {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    log::info!("client closed the stream");
                    return Ok(());
                }
                Err(DapError::Json(e)) => {
                    log::warn!("skipping malformed message: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match msg.content {
                DapMessageContent::Request { command, arguments } => {
                    if !self.handle_request(msg.seq, command, arguments)? {
                        return Ok(());
                    }
                }
                other => log::debug!("ignoring non-request message {:?}", other),
            }
        }
    }

    /// Returns `false` once the client has disconnected.
    pub fn handle_request(
        &mut self,
        seq: u64,
        command: String,
        arguments: Option<Value>,
    ) -> Result<bool, DapError> {
        log::debug!("request #{} {} {:?}", seq, command, arguments);

        let result = match command.as_str() {
            "initialize" => self.handle_initialize(arguments),
            "launch" => self.handle_launch(arguments),
            "setBreakpoints" => self.handle_set_breakpoints(arguments),
            "configurationDone" => Ok(None),
            "threads" => Ok(Some(json!({
                "threads": [{ "id": THREAD_ID, "name": "COMET II" }]
            }))),
            "stackTrace" => self.handle_stack_trace(arguments),
            "scopes" => Ok(Some(self.scopes())),
            "variables" => self.handle_variables(arguments),
            "continue" => self
                .session
                .continue_running()
                .map(|_| Some(json!({ "allThreadsContinued": true })))
                .map_err(DapError::from),
            "next" => self.session.next().map(|_| None).map_err(DapError::from),
            "stepIn" => self.session.step_in().map(|_| None).map_err(DapError::from),
            "stepOut" => self.session.step_out().map(|_| None).map_err(DapError::from),
            "evaluate" => self.handle_evaluate(arguments),
            "disconnect" => {
                log::info!("client disconnected");
                self.send_response(seq, command.clone(), Ok(None))?;
                return Ok(false);
            }
            _ => {
                log::warn!("unsupported command {}", command);
                Err(DapError::UnsupportedCommand(command.clone()))
            }
        };

        let initialized = command == "initialize" && result.is_ok();
        self.send_response(seq, command, result)?;
        if initialized {
            self.send_event("initialized", None)?;
        }
        self.flush_session_events()?;
        Ok(true)
    }

    fn handle_initialize(&mut self, arguments: Option<Value>) -> Result<Option<Value>, DapError> {
        let args: InitializeArguments = match arguments {
            Some(_) => parse_arguments("initialize", arguments)?,
            None => InitializeArguments::default(),
        };
        self.lines_start_at1 = args.lines_start_at1.unwrap_or(true);

        Ok(Some(json!({
            "supportsConfigurationDoneRequest": true,
            "supportsEvaluateForHovers": true,
            "supportsStepBack": false,
            "supportsFunctionBreakpoints": false,
            "supportsConditionalBreakpoints": false,
            "supportsSetVariable": false,
        })))
    }

    fn handle_launch(&mut self, arguments: Option<Value>) -> Result<Option<Value>, DapError> {
        let args: LaunchArguments = parse_arguments("launch", arguments)?;
        log::info!("launching {} (stopOnEntry: {})", args.program, args.stop_on_entry);
        self.program = Some(args.program.clone());
        self.session.launch(&args)?;
        Ok(None)
    }

    fn handle_set_breakpoints(
        &mut self,
        arguments: Option<Value>,
    ) -> Result<Option<Value>, DapError> {
        let args: SetBreakpointsArguments = parse_arguments("setBreakpoints", arguments)?;
        let path = args
            .source
            .path
            .ok_or_else(|| DapError::InvalidArguments("setBreakpoints".to_string()))?;

        let client_lines: Vec<i64> = match (args.breakpoints, args.lines) {
            (Some(breakpoints), _) => breakpoints.iter().map(|bp| bp.line).collect(),
            (None, Some(lines)) => lines,
            (None, None) => Vec::new(),
        };
        let lines: Vec<usize> = client_lines.iter().map(|&l| self.from_client(l)).collect();

        let breakpoints: Vec<Value> = self
            .session
            .set_breakpoints(&path, &lines)
            .iter()
            .map(|bp| {
                json!({
                    "id": bp.id,
                    "verified": bp.verified,
                    "line": self.to_client(bp.line),
                })
            })
            .collect();

        Ok(Some(json!({ "breakpoints": breakpoints })))
    }

    fn handle_stack_trace(&mut self, arguments: Option<Value>) -> Result<Option<Value>, DapError> {
        let args: StackTraceArguments = match arguments {
            Some(_) => parse_arguments("stackTrace", arguments)?,
            None => StackTraceArguments::default(),
        };
        let trace = self
            .session
            .stack_trace(args.start_frame.unwrap_or(0), args.levels);
        let source = self.source();

        let frames: Vec<Value> = trace
            .frames
            .iter()
            .map(|frame| {
                json!({
                    "id": frame.id,
                    "name": frame.name,
                    "line": self.to_client(frame.line),
                    "column": if self.lines_start_at1 { 1 } else { 0 },
                    "source": source,
                })
            })
            .collect();

        Ok(Some(json!({
            "stackFrames": frames,
            "totalFrames": trace.total_frames,
        })))
    }

    fn scopes(&self) -> Value {
        let scopes: Vec<Value> = self
            .session
            .scopes()
            .iter()
            .map(|scope| {
                json!({
                    "name": scope.name,
                    "variablesReference": scope.variables_reference,
                    "expensive": false,
                })
            })
            .collect();
        json!({ "scopes": scopes })
    }

    fn handle_variables(&mut self, arguments: Option<Value>) -> Result<Option<Value>, DapError> {
        let args: VariablesArguments = parse_arguments("variables", arguments)?;
        let variables: Vec<Value> = self
            .session
            .variables(args.variables_reference)
            .iter()
            .map(|v| {
                json!({
                    "name": v.name,
                    "value": v.value,
                    "type": v.type_name,
                    "variablesReference": 0,
                })
            })
            .collect();
        Ok(Some(json!({ "variables": variables })))
    }

    fn handle_evaluate(&mut self, arguments: Option<Value>) -> Result<Option<Value>, DapError> {
        let args: EvaluateArguments = parse_arguments("evaluate", arguments)?;
        let context = EvaluateContext::parse(args.context.as_deref());

        let body = match self.session.evaluate(&args.expression, context)? {
            Evaluation::InputAccepted => json!({ "result": "", "variablesReference": 0 }),
            Evaluation::Value(v) => json!({
                "result": v.value,
                "type": v.type_name,
                "variablesReference": 0,
            }),
        };
        Ok(Some(body))
    }

    fn source(&self) -> Value {
        let Some(path) = self.program.as_deref() else {
            return Value::Null;
        };
        let name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path);
        json!({ "name": name, "path": path })
    }

    fn to_client(&self, line: usize) -> usize {
        if self.lines_start_at1 {
            line + 1
        } else {
            line
        }
    }

    fn from_client(&self, line: i64) -> usize {
        let line = usize::try_from(line).unwrap_or(0);
        if self.lines_start_at1 {
            line.saturating_sub(1)
        } else {
            line
        }
    }

    fn flush_session_events(&mut self) -> Result<(), DapError> {
        for event in self.session.take_events() {
            match event {
                SessionEvent::Stopped {
                    reason,
                    description,
                } => {
                    let mut body = json!({
                        "reason": reason.as_str(),
                        "threadId": THREAD_ID,
                        "allThreadsStopped": true,
                    });
                    if let Some(description) = description {
                        body["description"] = json!(description);
                        body["text"] = json!(description);
                    }
                    self.send_event("stopped", Some(body))?;
                }
                SessionEvent::Terminated => self.send_event("terminated", None)?,
                SessionEvent::Output { category, text } => self.send_event(
                    "output",
                    Some(json!({ "category": category.as_str(), "output": text })),
                )?,
            }
        }
        Ok(())
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn send_response(
        &mut self,
        request_seq: u64,
        command: String,
        result: Result<Option<Value>, DapError>,
    ) -> Result<(), DapError> {
        let (success, message, body) = match result {
            Ok(body) => (true, None, body),
            Err(e) => {
                log::warn!("{} failed: {}", command, e);
                (false, Some(e.to_string()), None)
            }
        };
        let msg = DapMessage {
            seq: self.next_seq(),
            msg_type: "response".to_string(),
            content: DapMessageContent::Response {
                request_seq,
                success,
                command,
                message,
                body,
            },
        };
        self.send_message(&msg)
    }

    fn send_event(&mut self, event: &str, body: Option<Value>) -> Result<(), DapError> {
        let msg = DapMessage {
            seq: self.next_seq(),
            msg_type: "event".to_string(),
            content: DapMessageContent::Event {
                event: event.to_string(),
                body,
            },
        };
        self.send_message(&msg)
    }

    fn send_message(&mut self, msg: &DapMessage) -> Result<(), DapError> {
        let json = serde_json::to_string(msg)?;
        // exactly "Content-Length: {len}\r\n\r\n{json}", len in bytes
        write!(self.writer, "Content-Length: {}\r\n\r\n{}", json.len(), json)?;
        self.writer.flush()?;
        log::trace!("sent {}", json);
        Ok(())
    }

    /// `None` at the end of input.
    pub fn read_message(&mut self) -> Result<Option<DapMessage>, DapError> {
        let mut content_length = None;
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let line = line.trim_end();
            if line.is_empty() {
                if content_length.is_some() {
                    break;
                }
                continue;
            }
            if let Some(value) = line.strip_prefix("Content-Length:") {
                content_length = value.trim().parse::<usize>().ok();
            }
        }

        let length = content_length.ok_or(DapError::MissingContentLength)?;
        let mut buffer = vec![0u8; length];
        self.reader.read_exact(&mut buffer)?;
        Ok(Some(serde_json::from_slice(&buffer)?))
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

fn parse_arguments<T: DeserializeOwned>(
    command: &str,
    arguments: Option<Value>,
) -> Result<T, DapError> {
    let value = arguments.ok_or_else(|| DapError::InvalidArguments(command.to_string()))?;
    serde_json::from_value(value).map_err(|e| {
        log::warn!("bad {} arguments: {}", command, e);
        DapError::InvalidArguments(command.to_string())
    })
}
