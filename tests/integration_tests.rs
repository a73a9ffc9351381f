use comet2_debugger::casl2::Casl2;
use comet2_debugger::comet2::Comet2;
use comet2_debugger::config::{CompileOptions, EngineOptions};
use comet2_debugger::engine::{Console, Engine, InstructionKind};
use comet2_debugger::program::{CompileOutput, CompiledProgram, Compiler};
use std::fs;
use std::path::PathBuf;

const CALL_PROGRAM: &str = "MAIN   START
       LAD   GR1,1
       CALL  SUB
       LAD   GR2,2
       RET
       END
SUB    START
       LAD   GR3,3
       LAD   GR4,4
       RET
       END
";

const ECHO_PROGRAM: &str = "ECHO   START
       IN    BUF,LEN
       OUT   BUF,LEN
       RET
BUF    DS    256
LEN    DS    1
       END
";

// Helper to create a test program under the temp directory
fn create_test_program(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "comet2_debugger_it_{}_{}.cas",
        std::process::id(),
        name
    ));
    fs::write(&path, content).expect("Failed to write test file");
    path
}

fn cleanup(path: &PathBuf) {
    let _ = fs::remove_file(path);
}

fn assemble(source: &str) -> CompiledProgram {
    let output = Casl2::new().compile(source, &CompileOptions::default());
    assert!(
        output.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        output.diagnostics
    );
    output.program.expect("no program")
}

/// Console with canned input that records every output line.
#[derive(Default)]
struct RecordingConsole {
    input: Vec<String>,
    output: Vec<String>,
}

impl Console for RecordingConsole {
    fn read_line(&mut self) -> Option<String> {
        if self.input.is_empty() {
            None
        } else {
            Some(self.input.remove(0))
        }
    }

    fn write_line(&mut self, text: &str) {
        self.output.push(text.to_string());
    }
}

fn run_to_end(engine: &mut Comet2, console: &mut RecordingConsole) -> usize {
    let mut steps = 0;
    while !engine.step_into(console).expect("fault") {
        steps += 1;
        assert!(steps < 10_000, "program did not end");
    }
    steps + 1
}

#[cfg(test)]
mod assembler_tests {
    use super::*;

    #[test]
    fn test_line_and_subroutine_maps() {
        let program = assemble(CALL_PROGRAM);
        let info = &program.debug_info;

        assert_eq!(program.entry, 0);
        assert_eq!(info.line_at(0), Some(1));
        assert_eq!(info.line_at(2), Some(2));
        assert_eq!(info.line_at(4), Some(3));
        assert_eq!(info.line_at(6), Some(4));
        assert_eq!(info.line_at(7), Some(7));
        assert_eq!(info.line_at(11), Some(9));
        assert_eq!(info.line_at(1), None, "second word of LAD has no line");

        let sub = info.subroutine_at(7).expect("SUB entry");
        assert_eq!(sub.name, "SUB");
        assert_eq!(sub.start_line, 6);
        assert_eq!(info.entry_subroutine().map(|s| s.name.as_str()), Some("MAIN"));
        assert!(info.entry_lines().contains(&0));
        assert!(info.entry_lines().contains(&6));
    }

    #[test]
    fn test_data_words_are_not_mapped() {
        let program = assemble(ECHO_PROGRAM);
        let info = &program.debug_info;

        // IN and OUT expand to seven instructions each, all on their own line
        assert_eq!(info.line_at(0), Some(1));
        assert_eq!(info.line_at(8), Some(1));
        assert_eq!(info.line_at(12), Some(2));
        assert_eq!(info.line_at(24), Some(3));
        assert_eq!(info.line_at(25), None);
        assert_eq!(program.code.len(), 25 + 256 + 1);
    }

    #[test]
    fn test_literals_are_pooled_at_end() {
        let source = "MAIN   START
       LD    GR1,=5
       LD    GR2,=5
       LD    GR3,=#00FF
       RET
       END
";
        let program = assemble(source);
        // three two-word LDs and a RET, then two distinct literals
        assert_eq!(program.code.len(), 9);
        assert_eq!(program.code[7], 5);
        assert_eq!(program.code[8], 0x00FF);
        assert_eq!(program.code[1], 7);
        assert_eq!(program.code[3], 7);
        assert_eq!(program.code[5], 8);
    }

    #[test]
    fn test_undefined_label_is_reported_on_its_line() {
        let source = "MAIN   START
       LD    GR1,NOWHERE
       RET
       END
";
        let output = Casl2::new().compile(source, &CompileOptions::default());
        assert!(output.program.is_none());
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].line, 1);
        assert_eq!(
            output.diagnostics[0].to_string(),
            "[casl2] undefined label NOWHERE (line 2)"
        );
    }

    #[test]
    fn test_every_bad_line_gets_a_diagnostic() {
        let source = "MAIN   START
       FOO   GR1
       LD    GR9,1
       RET
";
        let output = Casl2::new().compile(source, &CompileOptions::default());
        let lines: Vec<usize> = output.diagnostics.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn test_label_scope() {
        let source = "MAIN   START
       LD    GR1,VAL
       CALL  SUB
       RET
VAL    DC    1
       END
SUB    START
       LD    GR2,VAL
       RET
VAL    DC    2
       END
";
        let scoped = Casl2::new().compile(source, &CompileOptions::default());
        assert!(scoped.diagnostics.is_empty(), "{:?}", scoped.diagnostics);

        let flat = Casl2::new().compile(
            source,
            &CompileOptions {
                enable_label_scope: false,
                ..CompileOptions::default()
            },
        );
        assert_eq!(flat.diagnostics.len(), 1);
        assert_eq!(flat.diagnostics[0].line, 9);
    }

    #[test]
    fn test_gr8_needs_option() {
        let source = "MAIN   START
       LD    GR1,GR8
       RET
       END
";
        let enabled = Casl2::new().compile(source, &CompileOptions::default());
        assert!(enabled.diagnostics.is_empty());

        let disabled = Casl2::new().compile(
            source,
            &CompileOptions {
                use_gr8: false,
                ..CompileOptions::default()
            },
        );
        assert_eq!(disabled.diagnostics.len(), 1);
    }

    #[test]
    fn test_missing_start() {
        let output: CompileOutput = Casl2::new().compile("; nothing here\n", &CompileOptions::default());
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.diagnostics[0].message.contains("START"));
    }
}

#[cfg(test)]
mod engine_tests {
    use super::*;

    #[test]
    fn test_call_and_return() {
        let program = assemble(CALL_PROGRAM);
        let mut engine = Comet2::new();
        engine
            .init(&program, &EngineOptions::default())
            .expect("init");
        let mut console = RecordingConsole::default();

        let steps = run_to_end(&mut engine, &mut console);
        let state = engine.state();

        assert_eq!(steps, 7);
        assert_eq!(&state.gr[1..5], &[1, 2, 3, 4]);
        assert_eq!(state.sp, 0);
    }

    #[test]
    fn test_next_instruction_classifies_without_executing() {
        let program = assemble(ECHO_PROGRAM);
        let mut engine = Comet2::new();
        engine
            .init(&program, &EngineOptions::default())
            .expect("init");
        let mut console = RecordingConsole {
            input: vec!["hi".to_string()],
            ..RecordingConsole::default()
        };

        let mut kinds = Vec::new();
        while engine.state().pr < 12 {
            kinds.push(engine.next_instruction().expect("decode"));
            let before = engine.state();
            assert_eq!(engine.next_instruction().expect("decode"), kinds[kinds.len() - 1]);
            assert_eq!(engine.state(), before);
            engine.step_into(&mut console).expect("step");
        }

        // PUSH, PUSH, LAD, LAD, SVC 1, POP, POP
        assert_eq!(kinds.len(), 7);
        assert_eq!(kinds[4], InstructionKind::Input);
        assert!(kinds
            .iter()
            .enumerate()
            .all(|(i, kind)| i == 4 || *kind == InstructionKind::Other));
    }

    #[test]
    fn test_call_and_ret_are_classified() {
        let program = assemble(CALL_PROGRAM);
        let mut engine = Comet2::new();
        engine
            .init(&program, &EngineOptions::default())
            .expect("init");
        let mut console = RecordingConsole::default();

        let mut kinds = Vec::new();
        loop {
            kinds.push(engine.next_instruction().expect("decode"));
            if engine.step_into(&mut console).expect("step") {
                break;
            }
        }

        assert_eq!(
            kinds,
            vec![
                InstructionKind::Other,
                InstructionKind::Call,
                InstructionKind::Other,
                InstructionKind::Other,
                InstructionKind::Return,
                InstructionKind::Other,
                InstructionKind::Return,
            ]
        );
    }

    #[test]
    fn test_adda_sets_overflow() {
        let source = "MAIN   START
       LD    GR1,A
       ADDA  GR1,B
       RET
A      DC    32767
B      DC    1
       END
";
        let program = assemble(source);
        let mut engine = Comet2::new();
        engine
            .init(&program, &EngineOptions::default())
            .expect("init");
        run_to_end(&mut engine, &mut RecordingConsole::default());

        let state = engine.state();
        assert_eq!(state.gr[1], 0x8000);
        assert!(state.flags.overflow);
        assert!(state.flags.sign);
        assert!(!state.flags.zero);
    }

    #[test]
    fn test_loop_with_compare() {
        let source = "MAIN   START
       LAD   GR1,0
LOOP   LAD   GR1,1,GR1
       CPA   GR1,=10
       JMI   LOOP
       RET
       END
";
        let program = assemble(source);
        let mut engine = Comet2::new();
        engine
            .init(&program, &EngineOptions::default())
            .expect("init");
        run_to_end(&mut engine, &mut RecordingConsole::default());

        let state = engine.state();
        assert_eq!(state.gr[1], 10);
        assert!(state.flags.zero);
    }

    #[test]
    fn test_input_and_output() {
        let program = assemble(ECHO_PROGRAM);
        let mut engine = Comet2::new();
        engine
            .init(&program, &EngineOptions::default())
            .expect("init");
        let mut console = RecordingConsole {
            input: vec!["CASL".to_string()],
            output: Vec::new(),
        };

        run_to_end(&mut engine, &mut console);

        assert_eq!(console.output, vec!["CASL".to_string()]);
        assert_eq!(engine.peek(25), u16::from(b'C'));
        assert_eq!(engine.peek(25 + 256), 4);
    }

    #[test]
    fn test_end_of_input_stores_minus_one() {
        let program = assemble(ECHO_PROGRAM);
        let mut engine = Comet2::new();
        engine
            .init(&program, &EngineOptions::default())
            .expect("init");

        run_to_end(&mut engine, &mut RecordingConsole::default());
        assert_eq!(engine.peek(25 + 256), 0xFFFF);
    }

    #[test]
    fn test_unknown_svc_faults() {
        let source = "MAIN   START
       SVC   9
       RET
       END
";
        let program = assemble(source);
        let mut engine = Comet2::new();
        engine
            .init(&program, &EngineOptions::default())
            .expect("init");

        let fault = engine
            .step_into(&mut RecordingConsole::default())
            .expect_err("SVC 9 should fault");
        assert!(fault.to_string().contains("SVC"));
    }

    #[test]
    fn test_gr8_is_sp() {
        let source = "MAIN   START
       PUSH  7
       LD    GR1,GR8
       POP   GR2
       RET
       END
";
        let program = assemble(source);
        let mut engine = Comet2::new();
        engine
            .init(&program, &EngineOptions::default())
            .expect("init");
        run_to_end(&mut engine, &mut RecordingConsole::default());

        let state = engine.state();
        assert_eq!(state.gr[1], 0xFFFF);
        assert_eq!(state.gr[2], 7);

        let mut strict = Comet2::new();
        strict
            .init(
                &program,
                &EngineOptions {
                    use_gr8_as_sp: false,
                },
            )
            .expect("init");
        let mut console = RecordingConsole::default();
        strict.step_into(&mut console).expect("PUSH");
        assert!(strict.step_into(&mut console).is_err());
    }
}

#[cfg(test)]
mod runner_tests {
    use super::*;
    use comet2_debugger::error::RunError;
    use comet2_debugger::executor::run_program;
    use std::io::Cursor;

    #[test]
    fn test_run_echo() {
        let path = create_test_program("run_echo", ECHO_PROGRAM);
        let mut output = Vec::new();

        let steps = run_program(
            &path,
            &CompileOptions::default(),
            &EngineOptions::default(),
            Cursor::new("hello\n"),
            &mut output,
        )
        .expect("run failed");

        assert_eq!(String::from_utf8(output).expect("utf8"), "hello\n");
        assert_eq!(steps, 15);
        cleanup(&path);
    }

    #[test]
    fn test_run_reports_diagnostics() {
        let path = create_test_program("run_bad", "MAIN   START\n       JUMP  AWAY\n       END\n");

        let result = run_program(
            &path,
            &CompileOptions::default(),
            &EngineOptions::default(),
            Cursor::new(""),
            Vec::new(),
        );

        match result {
            Err(RunError::Compile(diagnostics)) => assert_eq!(diagnostics.len(), 1),
            other => panic!("expected a compile error, got {:?}", other.map(|_| ())),
        }
        cleanup(&path);
    }

    #[test]
    fn test_run_missing_file() {
        let path = std::env::temp_dir().join("comet2_debugger_it_does_not_exist.cas");
        let result = run_program(
            &path,
            &CompileOptions::default(),
            &EngineOptions::default(),
            Cursor::new(""),
            Vec::new(),
        );
        assert!(matches!(result, Err(RunError::Read { .. })));
    }
}

#[cfg(test)]
mod dap_tests {
    use super::*;
    use comet2_debugger::dap::DapServer;
    use serde_json::{json, Value};
    use std::io::Cursor;

    fn frame(seq: u64, command: &str, arguments: Value) -> String {
        let body = json!({
            "seq": seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        })
        .to_string();
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body)
    }

    fn parse_frames(bytes: &[u8]) -> Vec<Value> {
        let text = String::from_utf8(bytes.to_vec()).expect("utf8");
        let mut rest = text.as_str();
        let mut messages = Vec::new();
        while let Some(start) = rest.find("Content-Length: ") {
            let after = &rest[start + "Content-Length: ".len()..];
            let header_end = after.find("\r\n\r\n").expect("header terminator");
            let length: usize = after[..header_end].parse().expect("length");
            let body = &after[header_end + 4..header_end + 4 + length];
            messages.push(serde_json::from_str(body).expect("json body"));
            rest = &after[header_end + 4 + length..];
        }
        messages
    }

    fn serve(requests: &[String]) -> Vec<Value> {
        let input = requests.concat();
        let mut server = DapServer::new(Cursor::new(input.into_bytes()), Vec::new());
        server.run().expect("server failed");
        parse_frames(&server.into_writer())
    }

    fn response<'a>(messages: &'a [Value], command: &str) -> &'a Value {
        messages
            .iter()
            .find(|m| m["type"] == "response" && m["command"] == command)
            .unwrap_or_else(|| panic!("no {} response", command))
    }

    fn events<'a>(messages: &'a [Value], event: &str) -> Vec<&'a Value> {
        messages
            .iter()
            .filter(|m| m["type"] == "event" && m["event"] == event)
            .collect()
    }

    #[test]
    fn test_initialize_sends_capabilities_then_initialized() {
        let messages = serve(&[frame(1, "initialize", json!({ "adapterID": "comet2" }))]);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["type"], "response");
        assert_eq!(messages[0]["request_seq"], 1);
        assert_eq!(messages[0]["success"], true);
        assert_eq!(
            messages[0]["body"]["supportsConfigurationDoneRequest"],
            true
        );
        assert_eq!(messages[1]["event"], "initialized");
        assert!(messages[1]["seq"].as_u64() > messages[0]["seq"].as_u64());
    }

    #[test]
    fn test_unknown_command_fails() {
        let messages = serve(&[frame(1, "restartFrame", json!({}))]);
        let reply = response(&messages, "restartFrame");
        assert_eq!(reply["success"], false);
        assert!(reply["message"].as_str().is_some());
    }

    #[test]
    fn test_launch_step_and_inspect() {
        let path = create_test_program("dap_step", CALL_PROGRAM);
        let program = path.to_string_lossy().to_string();

        let messages = serve(&[
            frame(1, "initialize", json!({ "linesStartAt1": true })),
            frame(
                2,
                "launch",
                json!({ "program": program, "stopOnEntry": true }),
            ),
            frame(3, "stepIn", json!({ "threadId": 1 })),
            frame(4, "next", json!({ "threadId": 1 })),
            frame(5, "stackTrace", json!({ "threadId": 1 })),
            frame(6, "scopes", json!({ "frameId": 0 })),
            frame(7, "variables", json!({ "variablesReference": 1 })),
            frame(8, "evaluate", json!({ "expression": "GR1", "context": "hover" })),
            frame(9, "evaluate", json!({ "expression": "FOO", "context": "hover" })),
            frame(10, "disconnect", json!({})),
        ]);

        assert_eq!(response(&messages, "launch")["success"], true);
        let stops: Vec<&str> = events(&messages, "stopped")
            .iter()
            .map(|e| e["body"]["reason"].as_str().expect("reason"))
            .collect();
        assert_eq!(stops, vec!["entry", "step", "step"]);

        // stepIn leaves the START line, next executes LAD GR1,1
        let trace = &response(&messages, "stackTrace")["body"];
        assert_eq!(trace["totalFrames"], 1);
        assert_eq!(trace["stackFrames"][0]["name"], "MAIN");
        assert_eq!(trace["stackFrames"][0]["line"], 3);

        let scopes = &response(&messages, "scopes")["body"]["scopes"];
        assert_eq!(scopes[0]["name"], "Registers");

        let variables = response(&messages, "variables")["body"]["variables"]
            .as_array()
            .expect("variables");
        assert_eq!(variables.len(), 13);
        assert_eq!(variables[1]["name"], "GR1");
        assert_eq!(variables[1]["value"], "1");

        let evaluations: Vec<&Value> = messages
            .iter()
            .filter(|m| m["command"] == "evaluate")
            .collect();
        assert_eq!(evaluations[0]["body"]["result"], "1");
        assert_eq!(evaluations[1]["success"], false);
        assert_eq!(evaluations[1]["message"], "unavailable");

        cleanup(&path);
    }

    #[test]
    fn test_breakpoints_use_client_lines() {
        let path = create_test_program("dap_bp", CALL_PROGRAM);
        let program = path.to_string_lossy().to_string();

        let messages = serve(&[
            frame(1, "initialize", json!({})),
            frame(
                2,
                "setBreakpoints",
                json!({
                    "source": { "path": program },
                    "breakpoints": [{ "line": 12 }, { "line": 9 }],
                }),
            ),
            frame(3, "launch", json!({ "program": program })),
            frame(4, "stackTrace", json!({ "threadId": 1 })),
            frame(5, "continue", json!({ "threadId": 1 })),
            frame(6, "disconnect", json!({})),
        ]);

        let breakpoints = &response(&messages, "setBreakpoints")["body"]["breakpoints"];
        // past the end of the file
        assert_eq!(breakpoints[0]["line"], 12);
        assert_eq!(breakpoints[0]["verified"], false);
        assert_eq!(breakpoints[0]["id"], 1000);
        assert_eq!(breakpoints[1]["line"], 9);
        assert_eq!(breakpoints[1]["verified"], true);

        let stopped = events(&messages, "stopped");
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0]["body"]["reason"], "breakpoint");

        let trace = &response(&messages, "stackTrace")["body"]["stackFrames"];
        assert_eq!(trace[0]["name"], "SUB");
        assert_eq!(trace[0]["line"], 9);
        assert_eq!(trace[1]["name"], "MAIN");
        assert_eq!(trace[1]["line"], 3);

        assert_eq!(events(&messages, "terminated").len(), 1);
        cleanup(&path);
    }

    #[test]
    fn test_launch_rejects_other_extensions() {
        let path = std::env::temp_dir().join("comet2_debugger_it_program.txt");
        let messages = serve(&[frame(
            1,
            "launch",
            json!({ "program": path.to_string_lossy() }),
        )]);

        assert_eq!(response(&messages, "launch")["success"], false);
        assert_eq!(events(&messages, "terminated").len(), 1);
    }

    #[test]
    fn test_input_through_evaluate() {
        let path = create_test_program("dap_input", ECHO_PROGRAM);
        let program = path.to_string_lossy().to_string();

        let messages = serve(&[
            frame(1, "initialize", json!({})),
            frame(2, "launch", json!({ "program": program })),
            frame(3, "evaluate", json!({ "expression": "abc", "context": "repl" })),
            frame(4, "disconnect", json!({})),
        ]);

        let outputs: Vec<(&str, &str)> = events(&messages, "output")
            .iter()
            .map(|e| {
                (
                    e["body"]["category"].as_str().expect("category"),
                    e["body"]["output"].as_str().expect("output"),
                )
            })
            .collect();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].0, "console");
        assert_eq!(outputs[1], ("stdout", "abc\n"));
        assert_eq!(response(&messages, "evaluate")["success"], true);
        assert_eq!(events(&messages, "terminated").len(), 1);
        cleanup(&path);
    }
}
