//! Engine session end to end: REPL loop, data commands and the debugger.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use common::{ScriptedDebugger, ScriptedInterpreter, TestClient, test_config};
use rjsession::bridge::protocol::codes;
use rjsession::data::value::{Attributes, Vector};
use rjsession::data::Store;
use rjsession::dbg::callstack::{FLAG_NOSTEPPING, FLAG_TOPFRAME};
use rjsession::dbg::tracepoint::{FLAG_ENABLED, FLAG_EXPR_EVAL_FAILED, FLAG_TEMPORARY};
use rjsession::dbg::{
    CtrlOp, CtrlOutcome, CtrlReport, DbgCommand, DbgReply, DbgRequest, ElementTracepointPositions,
    Frame, FrameContextDetailRequest, FrameRef, InstallationResult, SrcfileData,
    TracepointInstallationRequest, TracepointPosition, TracepointState, TracepointStatesUpdate,
    TracepointType,
};
use rjsession::{
    Answer, CommandItem, CommandKind, DataCmd, EngineSession, Handle, Severity, SlotId, Status,
    Value,
};

fn data(cmd: DataCmd) -> CommandItem {
    CommandItem::new(SlotId::PRIMARY, CommandKind::Data(cmd))
}

fn debug(cmd: DbgCommand) -> CommandItem {
    CommandItem::new(SlotId::PRIMARY, CommandKind::Debug(cmd))
}

fn is_read(item: &CommandItem) -> bool {
    matches!(item.kind, CommandKind::ConsoleRead { .. })
}

fn answer_of(item: CommandItem) -> Answer {
    item.answer.expect("item was not answered")
}

fn status(answer: Answer) -> Status {
    match answer {
        Answer::Status(status) => status,
        other => panic!("expected a status, got {other:?}"),
    }
}

fn session(interp: ScriptedInterpreter) -> EngineSession<ScriptedInterpreter> {
    EngineSession::new(interp, test_config()).unwrap()
}

#[test]
fn assign_then_sum_over_the_console_loop() {
    let mut session = session(ScriptedInterpreter::new());
    let exchange = Arc::clone(session.exchange());
    let client = TestClient::connect(&exchange, SlotId::PRIMARY);
    let engine = thread::spawn(move || {
        session.run_repl("> ");
        session
    });
    client.poll_until(vec![], is_read);

    let assign = data(DataCmd::AssignData {
        target: "x".into(),
        value: Value::integer([1, 2, 3]),
    });
    let seen = client.poll_until(vec![assign], |item| item.is_answered());
    let assigned = seen.into_iter().find(|item| item.is_answered()).unwrap();
    assert_eq!(assigned.answer, Some(Answer::Done));

    let sum = data(DataCmd::EvalData {
        expr: "sum(x)".into(),
    });
    let seen = client.poll_until(vec![sum], |item| item.is_answered());
    let result = seen.into_iter().find(|item| item.is_answered()).unwrap();
    assert_eq!(result.answer, Some(Answer::Value(Value::integer([6]))));

    exchange.shutdown();
    let mut session = engine.join().unwrap();
    assert_eq!(
        session.interpreter().global("x"),
        Some(&Value::integer([1, 2, 3]))
    );
}

#[test]
fn answers_keep_submission_order_around_output() {
    let mut session = session(ScriptedInterpreter::new());
    let exchange = Arc::clone(session.exchange());
    let client = TestClient::connect(&exchange, SlotId::PRIMARY);
    let engine = thread::spawn(move || session.run_repl("> "));
    client.poll_until(vec![], is_read);

    let a = data(DataCmd::EvalData { expr: "1L".into() });
    let b = data(DataCmd::EvalVoid {
        expr: "cat(\"hello\")".into(),
    });
    let mut next = vec![a, b];
    let mut seen = Vec::new();
    while seen.iter().filter(|item: &&CommandItem| item.is_answered()).count() < 2 {
        seen.extend(client.poll(std::mem::take(&mut next)).items);
    }
    let order: Vec<_> = seen
        .iter()
        .filter_map(|item| match (&item.kind, &item.answer) {
            (CommandKind::ConsoleWriteOut { text }, _) => Some(text.clone()),
            (CommandKind::Data(DataCmd::EvalData { .. }), Some(_)) => Some("A".into()),
            (CommandKind::Data(DataCmd::EvalVoid { .. }), Some(_)) => Some("B".into()),
            _ => None,
        })
        .collect();
    assert_eq!(order, ["A", "hello", "B"]);

    exchange.shutdown();
    engine.join().unwrap();
}

#[test]
fn console_input_is_evaluated() {
    let mut session = session(ScriptedInterpreter::new());
    let exchange = Arc::clone(session.exchange());
    let client = TestClient::connect(&exchange, SlotId::PRIMARY);
    let engine = thread::spawn(move || session.run_repl("> "));

    let read = client
        .poll_until(vec![], is_read)
        .into_iter()
        .find(is_read)
        .unwrap();
    let line = read.answered(Answer::Text("stop(\"boom\")".into()));
    let seen = client.poll_until(vec![line], |item| {
        matches!(item.kind, CommandKind::ConsoleWriteErr { .. })
    });
    let err = seen
        .iter()
        .find_map(|item| match &item.kind {
            CommandKind::ConsoleWriteErr { text } => Some(text.clone()),
            _ => None,
        })
        .unwrap();
    assert!(err.contains("boom"), "{err}");

    exchange.shutdown();
    engine.join().unwrap();
}

#[test]
fn data_command_errors_become_statuses() {
    let mut session = session(ScriptedInterpreter::new());

    let failed = status(answer_of(session.dispatch(data(DataCmd::EvalData {
        expr: "stop(\"boom\")".into(),
    }))));
    assert_eq!(failed.severity, Severity::Error);
    assert_eq!(failed.code, codes::EVAL_FAILED);
    assert!(failed.message.unwrap().contains("boom"));

    let unparsable = status(answer_of(session.dispatch(data(DataCmd::EvalVoid {
        expr: "sum(x".into(),
    }))));
    assert_eq!(unparsable.code, codes::EVAL_FAILED);

    let stale = status(answer_of(
        session.dispatch(data(DataCmd::ResolveData { handle: 0 })),
    ));
    assert_eq!(stale.code, codes::INVALID_REFERENCE);

    let shape = Value::integer([1, 2]).to_struct();
    let refused = status(answer_of(session.dispatch(data(DataCmd::AssignData {
        target: "y".into(),
        value: shape,
    }))));
    assert_eq!(refused.code, codes::PROTOCOL);

}

#[test]
fn interrupt_cancels_only_the_running_evaluation() {
    let mut session = session(ScriptedInterpreter::new());
    let exchange = Arc::clone(session.exchange());
    session.interpreter().interrupt_via = Some(exchange);

    let cancelled = status(answer_of(session.dispatch(data(DataCmd::EvalVoid {
        expr: "repeat".into(),
    }))));
    assert_eq!(cancelled.severity, Severity::Cancel);
    assert_eq!(cancelled.code, codes::CANCELLED);
    assert!(!session.exchange().is_interrupted());

    let next = answer_of(session.dispatch(data(DataCmd::EvalData { expr: "1L".into() })));
    assert_eq!(next, Answer::Value(Value::integer([1])));
}

#[test]
fn interrupt_while_idle_is_dropped() {
    let mut session = session(ScriptedInterpreter::new());
    session.exchange().interrupt(SlotId::PRIMARY);
    let answer = answer_of(session.dispatch(data(DataCmd::EvalData { expr: "2L".into() })));
    assert_eq!(answer, Answer::Value(Value::integer([2])));
    assert!(!session.exchange().is_interrupted());
}

#[test]
fn interrupted_console_line_leaves_the_loop_usable() {
    let mut session = session(ScriptedInterpreter::new());
    let exchange = Arc::clone(session.exchange());
    session.interpreter().interrupt_via = Some(Arc::clone(&exchange));
    let client = TestClient::connect(&exchange, SlotId::PRIMARY);
    let engine = thread::spawn(move || session.run_repl("> "));

    let read = client
        .poll_until(vec![], is_read)
        .into_iter()
        .find(is_read)
        .unwrap();
    let line = read.answered(Answer::Text("repeat".into()));
    let seen = client.poll_until(vec![line], is_read);
    assert!(seen.iter().any(|item| matches!(
        &item.kind,
        CommandKind::ConsoleWriteErr { text } if text.contains("interrupted")
    )));

    let sum = data(DataCmd::EvalData { expr: "3L".into() });
    let seen = client.poll_until(vec![sum], |item| item.is_answered());
    let result = seen.into_iter().find(|item| item.is_answered()).unwrap();
    assert_eq!(result.answer, Some(Answer::Value(Value::integer([3]))));

    exchange.shutdown();
    engine.join().unwrap();
}

#[test]
fn struct_requests_return_shapes() {
    let mut session = session(ScriptedInterpreter::new());
    session.dispatch(data(DataCmd::AssignData {
        target: "x".into(),
        value: Value::numeric([1.5, 2.5, 3.5]),
    }));

    let Answer::Value(value) = answer_of(session.dispatch(data(DataCmd::EvalStruct {
        expr: "x".into(),
    }))) else {
        panic!("expected a value");
    };
    assert!(value.is_shape_only());
    assert_eq!(value, Value::numeric([1.5, 2.5, 3.5]).to_struct());

    let Answer::Value(full) = answer_of(session.dispatch(data(DataCmd::EvalData {
        expr: "x".into(),
    }))) else {
        panic!("expected a value");
    };
    assert_eq!(full, Value::numeric([1.5, 2.5, 3.5]));
}

#[test]
fn custom_attributes_travel_with_values() {
    let mut session = session(ScriptedInterpreter::new());
    let mut tagged = Vector::new(Store::Integer(vec![4, 5]));
    tagged.attributes = Some(
        Attributes::new()
            .with("comment", Value::character(["measured"]))
            .with("units", Value::character(["cm"])),
    );
    session.dispatch(data(DataCmd::AssignData {
        target: "x".into(),
        value: Value::Vector(tagged.clone()),
    }));

    let answer = answer_of(session.dispatch(data(DataCmd::EvalData { expr: "x".into() })));
    assert_eq!(answer, Answer::Value(Value::Vector(tagged.clone())));

    let Answer::Value(shape) = answer_of(session.dispatch(data(DataCmd::EvalStruct {
        expr: "x".into(),
    }))) else {
        panic!("expected a value");
    };
    assert_eq!(shape, Value::Vector(tagged).to_struct());
}

#[test]
fn logical_sum_promotes_to_integer() {
    let mut session = session(ScriptedInterpreter::new());
    session.dispatch(data(DataCmd::AssignData {
        target: "flags".into(),
        value: Value::vector(Store::Logical(vec![Some(true), Some(false), Some(true)])),
    }));
    let answer = answer_of(session.dispatch(data(DataCmd::EvalData {
        expr: "sum(flags)".into(),
    })));
    assert_eq!(answer, Answer::Value(Value::integer([2])));
}

// ---- debugger ----

fn stack() -> Vec<Frame> {
    let mut wrapper = Frame::new(1, "helper()", 0x20);
    wrapper.flags |= FLAG_NOSTEPPING;
    vec![
        Frame::new(0, "main()", 0x10),
        wrapper,
        Frame::new(2, "inner(x)", 0x30),
    ]
}

fn debug_session(suspended: bool) -> EngineSession<ScriptedInterpreter> {
    session(ScriptedInterpreter::with_debugger(ScriptedDebugger {
        frames: stack(),
        suspended,
        accept_suspend: true,
        ..ScriptedDebugger::default()
    }))
}

fn ctrl(session: &mut EngineSession<ScriptedInterpreter>, request: DbgRequest) -> CtrlReport {
    match answer_of(session.dispatch(debug(DbgCommand::Control(request)))) {
        Answer::Debug(DbgReply::Ctrl(report)) => report,
        other => panic!("expected a control report, got {other:?}"),
    }
}

#[test]
fn frame_list_marks_top_frame() {
    let mut session = debug_session(true);
    let Answer::Debug(DbgReply::CallStack(stack)) =
        answer_of(session.dispatch(debug(DbgCommand::LoadFrameList)))
    else {
        panic!("expected a call stack");
    };
    assert_eq!(stack.frames.len(), 3);
    assert_ne!(stack.frames[2].flags & FLAG_TOPFRAME, 0);

    let Answer::Debug(DbgReply::FrameContext(context)) = answer_of(session.dispatch(debug(
        DbgCommand::LoadFrameContext(FrameContextDetailRequest { position: 2 }),
    ))) else {
        panic!("expected a frame context");
    };
    assert_eq!(context.position, 2);
    assert_eq!(context.call.as_deref(), Some("inner(x)"));

    let missing = status(answer_of(session.dispatch(debug(DbgCommand::LoadFrameContext(
        FrameContextDetailRequest { position: 9 },
    )))));
    assert_eq!(missing.code, codes::EVAL_FAILED);
}

#[test]
fn step_requests_need_a_suspended_engine() {
    let mut session = debug_session(false);
    let report = ctrl(&mut session, DbgRequest::StepOver);
    assert_eq!(report, CtrlReport::not_applicable(CtrlOp::StepOver, false));
    assert!(session.interpreter().debug.as_ref().unwrap().ctrl_log.is_empty());

    let Answer::Debug(DbgReply::Ctrl(suspend)) =
        answer_of(session.dispatch(debug(DbgCommand::RequestSuspend)))
    else {
        panic!("expected a control report");
    };
    assert_eq!(suspend, CtrlReport::executed(CtrlOp::Suspend, true));

    let again = answer_of(session.dispatch(debug(DbgCommand::RequestSuspend)));
    assert_eq!(
        again,
        Answer::Debug(DbgReply::Ctrl(CtrlReport::not_applicable(CtrlOp::Suspend, true)))
    );

    let report = ctrl(&mut session, DbgRequest::Resume);
    assert_eq!(report.outcome, CtrlOutcome::Executed);
    assert!(!report.suspended);
}

#[test]
fn step_return_targets() {
    let mut session = debug_session(true);

    // positions need a loaded snapshot
    let report = ctrl(
        &mut session,
        DbgRequest::StepReturn {
            target: FrameRef::Position(2),
        },
    );
    assert_eq!(report, CtrlReport::not_applicable(CtrlOp::StepReturn, true));

    session.dispatch(debug(DbgCommand::LoadFrameList));
    let report = ctrl(
        &mut session,
        DbgRequest::StepReturn {
            target: FrameRef::Position(2),
        },
    );
    assert!(report.is_executed());

    // handles resolve against a fresh stack; the filter skips the wrapper frame
    session.dispatch(debug(DbgCommand::ResetFilterState(
        rjsession::dbg::DbgFilterState { step_filter: true },
    )));
    let report = ctrl(
        &mut session,
        DbgRequest::StepReturn {
            target: FrameRef::Handle(0x20),
        },
    );
    assert!(report.is_executed());

    let unknown = ctrl(
        &mut session,
        DbgRequest::StepReturn {
            target: FrameRef::Handle(0x99),
        },
    );
    assert_eq!(unknown, CtrlReport::not_applicable(CtrlOp::StepReturn, true));

    let log = &session.interpreter().debug.as_ref().unwrap().ctrl_log;
    assert_eq!(
        log,
        &[
            (CtrlOp::StepReturn, Some(0x30)),
            (CtrlOp::StepReturn, Some(0x10)),
        ]
    );
}

#[test]
fn debugging_without_backend_is_not_supported() {
    let mut session = session(ScriptedInterpreter::new());
    let list = status(answer_of(session.dispatch(debug(DbgCommand::LoadFrameList))));
    assert_eq!(list.code, codes::NOT_SUPPORTED);
    assert_eq!(
        ctrl(&mut session, DbgRequest::StepInto),
        CtrlReport::not_supported(CtrlOp::StepInto, false)
    );
}

// ---- tracepoints ----

const FILE: &str = "/work/analysis.R";
const ELEMENT: &str = "fit";

fn breakpoint(id: i64, flags: u32, expr: Option<&str>) -> TracepointState {
    TracepointState {
        tp_type: TracepointType::LineBreakpoint,
        id,
        file_path: FILE.into(),
        element_id: ELEMENT.into(),
        index: vec![2, id as i32],
        element_label: Some("fit <- function(x)".into()),
        flags,
        expr: expr.map(String::from),
    }
}

fn install(
    session: &mut EngineSession<ScriptedInterpreter>,
    ids: &[i64],
) -> Vec<InstallationResult> {
    let request = TracepointInstallationRequest {
        elements: vec![ElementTracepointPositions {
            srcfile: SrcfileData::new(FILE),
            element_id: ELEMENT.into(),
            element_srcref: None,
            positions: ids
                .iter()
                .map(|&id| {
                    TracepointPosition::new(TracepointType::LineBreakpoint, id, vec![2, id as i32])
                })
                .collect(),
        }],
    };
    match answer_of(session.dispatch(debug(DbgCommand::InstallTracepoints(request)))) {
        Answer::Debug(DbgReply::Installation(report)) => report.results,
        other => panic!("expected an installation report, got {other:?}"),
    }
}

fn set_live(session: &mut EngineSession<ScriptedInterpreter>, ids: &[i64]) {
    let debug = session.interpreter().debug.as_mut().unwrap();
    debug.live = ids
        .iter()
        .map(|&id| (FILE.to_string(), ELEMENT.to_string(), id))
        .collect();
}

fn update(session: &mut EngineSession<ScriptedInterpreter>, states: Vec<TracepointState>) {
    let answer = answer_of(session.dispatch(debug(DbgCommand::UpdateTracepointStates(
        TracepointStatesUpdate {
            reset: false,
            states,
        },
    ))));
    assert_eq!(answer, Answer::Done);
}

#[test]
fn installation_reports_one_result_per_position() {
    let mut session = debug_session(false);
    update(
        &mut session,
        vec![
            breakpoint(1, FLAG_ENABLED, None),
            breakpoint(2, FLAG_ENABLED, None),
            breakpoint(3, FLAG_ENABLED, None),
        ],
    );
    set_live(&mut session, &[1, 2, 3]);
    assert_eq!(install(&mut session, &[1]), [InstallationResult::FoundAndSet]);

    // 3 vanished from the element after a reparse
    set_live(&mut session, &[1, 2]);
    assert_eq!(
        install(&mut session, &[1, 2, 3]),
        [
            InstallationResult::FoundUnchanged,
            InstallationResult::FoundAndSet,
            InstallationResult::NotFound,
        ]
    );

    update(&mut session, vec![breakpoint(2, 0, None)]);
    assert_eq!(
        install(&mut session, &[1, 2]),
        [
            InstallationResult::FoundUnchanged,
            InstallationResult::FoundButWasUnset,
        ]
    );
}

#[test]
fn tracepoint_hits_honour_guards() {
    let mut session = debug_session(false);
    let env = Handle::new(0xe0);
    let ready = Value::vector(Store::Logical(vec![Some(false)]));
    session
        .interpreter()
        .frames
        .insert(env.get(), HashMap::from([("ready".to_string(), ready)]));
    update(
        &mut session,
        vec![
            breakpoint(1, FLAG_ENABLED, None),
            breakpoint(2, FLAG_ENABLED, Some("ready")),
            breakpoint(3, FLAG_ENABLED, Some("stop(\"no such device\")")),
            breakpoint(4, 0, None),
        ],
    );
    set_live(&mut session, &[1, 2, 3, 4]);
    install(&mut session, &[1, 2, 3, 4]);

    assert!(session.tracepoint_hit(FILE, ELEMENT, 1, Some(env)));
    assert!(!session.tracepoint_hit(FILE, ELEMENT, 2, Some(env)));
    // a failing guard still stops so the user sees the problem
    assert!(session.tracepoint_hit(FILE, ELEMENT, 3, Some(env)));
    let failed = session.debugger().tracepoints().state(FILE, 3).unwrap();
    assert_ne!(failed.flags & FLAG_EXPR_EVAL_FAILED, 0);
    assert!(!session.tracepoint_hit(FILE, ELEMENT, 4, Some(env)));
    // never installed
    assert!(!session.tracepoint_hit(FILE, ELEMENT, 5, Some(env)));

    session.dispatch(debug(DbgCommand::SetEnablement(
        rjsession::dbg::DbgEnablement {
            breakpoints_enabled: false,
        },
    )));
    assert!(!session.tracepoint_hit(FILE, ELEMENT, 1, Some(env)));
}

#[test]
fn temporary_tracepoint_fires_once_and_notifies_client() {
    let mut session = debug_session(false);
    let exchange = Arc::clone(session.exchange());
    let client = TestClient::connect(&exchange, SlotId::PRIMARY);
    update(
        &mut session,
        vec![breakpoint(7, FLAG_ENABLED | FLAG_TEMPORARY, None)],
    );
    set_live(&mut session, &[7]);
    install(&mut session, &[7]);

    assert!(session.tracepoint_hit(FILE, ELEMENT, 7, None));
    assert!(!session.tracepoint_hit(FILE, ELEMENT, 7, None));
    assert!(session.debugger().tracepoints().state(FILE, 7).is_none());

    let seen = client.poll_until(vec![], |item| {
        matches!(
            item.kind,
            CommandKind::Debug(DbgCommand::NotifyTracepointEvent(_))
        )
    });
    let event = seen
        .into_iter()
        .find_map(|item| match item.kind {
            CommandKind::Debug(DbgCommand::NotifyTracepointEvent(event)) => Some(event),
            _ => None,
        })
        .unwrap();
    assert_eq!(event.id, 7);
    assert_eq!(event.file_path.as_deref(), Some(FILE));
    assert_eq!(event.label.as_deref(), Some("fit <- function(x)"));
    exchange.shutdown();
}
