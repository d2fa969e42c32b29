use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use super::*;
use crate::{BreakpointUpdateKind, Command, DebuggerStop, ScriptPosition, StopReason};

fn run(engine: &ScriptEngine, src: &str) -> Result<Vec<Value>, EngineError> {
	engine.invoke(&Pipeline::script(src))
}

/// Waits for the next event matching `pred`, skipping others.
fn next_event(rx: &mut broadcast::Receiver<EngineEvent>, pred: impl Fn(&EngineEvent) -> bool) -> EngineEvent {
	let deadline = std::time::Instant::now() + Duration::from_secs(5);
	loop {
		match rx.try_recv() {
			Ok(event) if pred(&event) => return event,
			Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
			Err(broadcast::error::TryRecvError::Empty) => {
				assert!(std::time::Instant::now() < deadline, "timed out waiting for event");
				thread::sleep(Duration::from_millis(2));
			}
			Err(broadcast::error::TryRecvError::Closed) => panic!("event channel closed"),
		}
	}
}

fn wait_stopped(engine: &ScriptEngine) -> &dyn Debugger {
	let debugger = engine.debugger().expect("script engine has a debugger");
	for _ in 0..2500 {
		if debugger.is_stopped() {
			return debugger;
		}
		thread::sleep(Duration::from_millis(2));
	}
	panic!("debugger never stopped");
}

#[test]
fn variables_persist_across_invocations() {
	let engine = ScriptEngine::new();
	run(&engine, "$x = 100").expect("assign");
	run(&engine, "$x += 200").expect("add");
	run(&engine, "$x = $x / 100").expect("divide");
	assert_eq!(run(&engine, "$x").expect("read"), vec![Value::Int(3)]);
	assert_eq!(engine.get_variable("X").expect("not busy"), Some(Value::Int(3)));
	assert_eq!(engine.get_variable("missing").expect("not busy"), None);
}

#[test]
fn arithmetic_follows_shell_rules() {
	let engine = ScriptEngine::new();
	assert_eq!(run(&engine, "7 / 2").expect("div"), vec![Value::Float(3.5)]);
	assert_eq!(run(&engine, "$undefined + 5").expect("null is zero"), vec![Value::Int(5)]);
	assert_eq!(run(&engine, "'a' + 1 + 2").expect("concat"), vec![Value::from("a12")]);
	assert_eq!(run(&engine, "-(2 + 3) * 2").expect("negate"), vec![Value::Int(-10)]);
	assert_eq!(run(&engine, "1, 2, 3").expect("list"), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
}

#[test]
fn oversized_string_repetition_is_a_runtime_error() {
	let engine = ScriptEngine::new();
	assert_eq!(run(&engine, "'ab' * 3").expect("repeat"), vec![Value::from("ababab")]);

	let err = run(&engine, "'a' * 9223372036854775807").expect_err("too long");
	assert!(err.message().contains("too long"), "{err}");
	assert_eq!(engine.availability(), Availability::Available);
	assert_eq!(run(&engine, "1").expect("engine still usable"), vec![Value::Int(1)]);
}

#[test]
fn runtime_errors_carry_the_statement_position() {
	let engine = ScriptEngine::new();
	let err = run(&engine, "$a = 1\n  $b = $a / 0").expect_err("divide by zero");
	assert_eq!(
		err,
		EngineError::Runtime {
			message: "Attempted to divide by zero.".into(),
			position: Some(ScriptPosition::new(None, 2, 3)),
		}
	);

	let err = run(&engine, "throw 'boom'").expect_err("throw");
	assert_eq!(err.message(), "boom");
	assert_eq!(err.position().map(|p| p.line), Some(1));
}

#[test]
fn parse_errors_are_reported_without_running_anything() {
	let engine = ScriptEngine::new();
	let err = run(&engine, "$ran = 1\n$x = (").expect_err("parse error");
	assert!(matches!(err, EngineError::Parse { ref position, .. } if position.line == 2), "{err:?}");
	assert_eq!(engine.get_variable("ran").expect("not busy"), None);
}

#[test]
fn unknown_commands_are_runtime_errors() {
	let engine = ScriptEngine::new();
	let err = run(&engine, "Get-Nothing").expect_err("unknown");
	assert!(err.message().contains("'Get-Nothing' is not recognized"), "{err}");
}

#[test]
fn host_pipelines_feed_each_stage_into_the_next() {
	let engine = ScriptEngine::new();
	run(&engine, "$greeting = 'hi'").expect("assign");
	let pipeline = Pipeline::from(Command::new("Get-Variable").parameter("Name", "greeting"))
		.then(Command::new("Write-Output").argument(2))
		.then(Command::new("Out-String"));
	assert_eq!(engine.invoke(&pipeline).expect("pipeline"), vec![Value::from("hi\n2")]);
}

#[test]
fn overlapping_work_is_refused_as_busy() {
	let engine = Arc::new(ScriptEngine::new());
	let sleeper = thread::spawn({
		let engine = Arc::clone(&engine);
		move || run(&engine, "Start-Sleep -Milliseconds 300; 1")
	});

	let mut rx = engine.subscribe();
	for _ in 0..500 {
		if engine.availability() == Availability::Busy {
			break;
		}
		thread::sleep(Duration::from_millis(1));
	}
	assert_eq!(run(&engine, "2"), Err(EngineError::Busy));
	assert_eq!(engine.get_variable("x"), Err(EngineError::Busy));
	assert_eq!(engine.version_table(), Err(EngineError::Busy));

	assert_eq!(sleeper.join().expect("sleeper thread").expect("sleep"), vec![Value::Int(1)]);
	next_event(&mut rx, |e| matches!(e, EngineEvent::Idle));
	assert_eq!(run(&engine, "2").expect("idle again"), vec![Value::Int(2)]);
}

#[test]
fn breakpoint_stops_and_nested_commands_see_the_frame() {
	let engine = Arc::new(ScriptEngine::new());
	let mut rx = engine.subscribe();
	assert_eq!(run(&engine, "Set-PSBreakpoint -Line 2").expect("set"), vec![Value::Int(1)]);
	let EngineEvent::BreakpointUpdated(update) = next_event(&mut rx, |e| matches!(e, EngineEvent::BreakpointUpdated(_))) else {
		unreachable!()
	};
	assert_eq!(update.kind, BreakpointUpdateKind::Added);
	assert_eq!(update.breakpoint.line, 2);

	let script = thread::spawn({
		let engine = Arc::clone(&engine);
		move || run(&engine, "$frame = 41\n$frame += 1\n$frame")
	});

	let debugger = wait_stopped(&engine);
	let stop = next_event(&mut rx, |e| matches!(e, EngineEvent::DebuggerStopped(_)));
	assert_eq!(
		stop,
		EngineEvent::DebuggerStopped(DebuggerStop {
			reason: StopReason::Breakpoint(1),
			line: 2,
		})
	);
	assert_eq!(engine.availability(), Availability::AvailableForNestedCommand);
	assert_eq!(run(&engine, "1"), Err(EngineError::Busy));
	assert_eq!(debugger.process_command(&Pipeline::script("$frame")).expect("nested"), vec![Value::Int(41)]);

	debugger.resume(ResumeAction::Continue).expect("resume");
	assert_eq!(script.join().expect("script thread").expect("script"), vec![Value::Int(42)]);
	assert!(!debugger.is_stopped());
}

#[test]
fn stop_action_aborts_the_running_script() {
	let engine = Arc::new(ScriptEngine::new());
	let script = thread::spawn({
		let engine = Arc::clone(&engine);
		move || run(&engine, "$before = 1\nWait-Debugger\n$after = 1")
	});

	let debugger = wait_stopped(&engine);
	debugger.resume(ResumeAction::Stop).expect("resume");
	assert_eq!(script.join().expect("script thread"), Err(EngineError::Stopped));
	assert_eq!(engine.get_variable("before").expect("idle"), Some(Value::Int(1)));
	assert_eq!(engine.get_variable("after").expect("idle"), None);
}

#[test]
fn step_mode_stops_at_the_next_statement() {
	let engine = Arc::new(ScriptEngine::new());
	let (started_tx, started_rx) = std::sync::mpsc::channel();
	let script = thread::spawn({
		let engine = Arc::clone(&engine);
		move || {
			let _ = started_tx.send(());
			run(&engine, "Start-Sleep -Milliseconds 100\n$a = 1\n$b = 2")
		}
	});
	started_rx.recv().expect("script started");
	let debugger = engine.debugger().expect("debugger");
	debugger.set_step_mode(true);

	let debugger = wait_stopped(&engine);
	debugger.resume(ResumeAction::StepOver).expect("step");
	// StepOver keeps step mode on, so the script stops again on line 3.
	thread::sleep(Duration::from_millis(20));
	let debugger = wait_stopped(&engine);
	assert_eq!(engine.get_variable("b"), Err(EngineError::Busy));
	debugger.resume(ResumeAction::Continue).expect("continue");
	script.join().expect("script thread").expect("script");
	assert_eq!(engine.get_variable("b").expect("idle"), Some(Value::Int(2)));
}

#[test]
fn debugger_calls_fail_when_not_stopped() {
	let engine = ScriptEngine::new();
	let debugger = engine.debugger().expect("debugger");
	assert_eq!(debugger.resume(ResumeAction::Continue), Err(EngineError::NotStopped));
	assert_eq!(debugger.process_command(&Pipeline::script("1")), Err(EngineError::NotStopped));
}

#[test]
fn nested_commands_never_stop() {
	let engine = Arc::new(ScriptEngine::new());
	let script = thread::spawn({
		let engine = Arc::clone(&engine);
		move || run(&engine, "Wait-Debugger")
	});
	let debugger = wait_stopped(&engine);
	let nested = debugger.process_command(&Pipeline::script("Wait-Debugger; 5")).expect("nested");
	assert_eq!(nested, vec![Value::Int(5)]);
	debugger.resume(ResumeAction::Continue).expect("resume");
	script.join().expect("script thread").expect("script");
}

#[test]
fn script_files_run_with_escaped_paths_and_arguments() {
	let dir = tempfile::tempdir().expect("tempdir");
	let folder = dir.path().join("my [scripts]");
	std::fs::create_dir(&folder).expect("mkdir");
	let path = folder.join("add.ps1");
	std::fs::write(&path, "$Base + $Extra\n$args").expect("write script");

	let escaped = path.to_string_lossy().replace('[', "`[").replace(']', "`]").replace(' ', "` ");
	let engine = ScriptEngine::new();
	let out = run(&engine, &format!("{escaped} -Base 10 -Extra 5 7")).expect("run script");
	assert_eq!(out, vec![Value::Int(15), Value::Int(7)]);

	let direct = engine
		.invoke(&Pipeline::from(Command::new(path.to_string_lossy()).parameter("Base", 1).parameter("Extra", 2)))
		.expect("run as command");
	assert_eq!(direct, vec![Value::Int(3)]);
}

#[test]
fn errors_inside_script_files_name_the_file() {
	let dir = tempfile::tempdir().expect("tempdir");
	let path = dir.path().join("fail.ps1");
	std::fs::write(&path, "\nthrow 'inner'").expect("write script");
	let file = path.to_string_lossy().to_string();

	let engine = ScriptEngine::new();
	let err = engine.invoke(&Pipeline::from(Command::new(file.clone()))).expect_err("throws");
	assert_eq!(err.position(), Some(&ScriptPosition::new(Some(file), 2, 1)));
}

#[test]
fn version_table_can_be_missing() {
	let engine = ScriptEngine::new().without_version_table();
	assert!(matches!(engine.version_table(), Err(EngineError::Runtime { .. })));
	let engine = ScriptEngine::new().with_version(VersionTable::new(EngineVersion::new(3, 0), "Desktop"));
	assert_eq!(engine.version_table().expect("version").version, EngineVersion::new(3, 0));
}

#[test]
fn idle_follows_every_top_level_invoke() {
	let engine = ScriptEngine::new();
	let mut rx = engine.subscribe();
	let _ = run(&engine, "throw 'x'");
	next_event(&mut rx, |e| matches!(e, EngineEvent::Idle));
	assert!(rx.try_recv().is_err(), "idle is the last event of an invoke");
}
