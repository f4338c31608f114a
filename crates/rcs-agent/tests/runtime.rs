//! Tick ordering and queue handling of the endpoint runtime.

use std::sync::Arc;
use std::time::Duration;

use rcs_agent::runtime::DispatchError;
use rcs_agent::{EndpointRuntime, RuntimeLimits};
use rcs_core::harness::{recording_executor, Injected};
use rcs_core::keymap::vk;
use rcs_core::{ConsentBridge, InputCommand, KeyPress, ManualClock, SessionManager};
use rcs_proto::v1::{
    ClientId, ConsentDecision, InputKind, RelayFrame, SessionCommand, SessionId, SessionState,
};
use rcs_supervisor::{ControlRequest, ControlSession};

fn client() -> ClientId {
    ClientId::from("lab-07")
}

fn limits(input_budget: usize, input_queue: usize) -> RuntimeLimits {
    RuntimeLimits {
        tick_interval: Duration::from_millis(10),
        input_budget,
        session_queue: 8,
        input_queue,
        status_queue: 16,
    }
}

fn move_frame(id: &SessionId, x: f64) -> RelayFrame {
    RelayFrame::InputCommand(InputCommand::MouseMove { x, y: 0.0 }.to_wire(client(), id.clone()))
}

#[tokio::test]
async fn test_session_command_and_decision_in_one_tick() {
    let clock = Arc::new(ManualClock::starting_now());
    let bridge = ConsentBridge::in_memory();
    let (executor, log) = recording_executor();
    let manager = SessionManager::new(client(), "Lab 07", bridge.clone(), executor, clock);
    let (mut runtime, handle, mut statuses) = EndpointRuntime::new(manager, limits(4, 16));

    let id = SessionId::generate().unwrap();
    handle
        .dispatch(RelayFrame::SessionCommand(SessionCommand::request_start(
            client(),
            id.clone(),
            "ops",
            30,
            600,
        )))
        .unwrap();
    runtime.tick_once().await;
    assert_eq!(statuses.recv().await.unwrap().state, SessionState::PendingApproval);

    bridge
        .submit_decision(&ConsentDecision {
            session_id: id.clone(),
            approved: true,
            message: None,
        })
        .await
        .unwrap();
    // input queued in the same tick as the approval is applied after it
    handle.dispatch(move_frame(&id, 0.5)).unwrap();
    runtime.tick_once().await;
    assert_eq!(statuses.recv().await.unwrap().state, SessionState::Approved);
    assert_eq!(log.events(), vec![Injected::Move(960, 0)]);
}

fn key_a() -> KeyPress {
    KeyPress {
        key: Some("a".into()),
        code: Some("KeyA".into()),
        ctrl: false,
        alt: false,
        shift: false,
    }
}

#[tokio::test]
async fn test_key_up_sent_before_stop_is_injected() {
    let clock = Arc::new(ManualClock::starting_now());
    let bridge = ConsentBridge::in_memory();
    let (executor, log) = recording_executor();
    let manager = SessionManager::new(client(), "Lab 07", bridge.clone(), executor, clock);
    let (mut runtime, handle, mut statuses) = EndpointRuntime::new(manager, limits(4, 16));

    let (mut session, start) = ControlSession::request(&ControlRequest {
        client_id: client(),
        requested_by: "ops".into(),
        approval_timeout_seconds: 30,
        max_session_seconds: 600,
    })
    .unwrap();
    handle.dispatch(start).unwrap();
    runtime.tick_once().await;
    assert!(session.on_status(&statuses.recv().await.unwrap()));

    bridge
        .submit_decision(&ConsentDecision {
            session_id: session.session_id().clone(),
            approved: true,
            message: None,
        })
        .await
        .unwrap();
    runtime.tick_once().await;
    assert!(session.on_status(&statuses.recv().await.unwrap()));
    assert!(session.is_active());

    handle.dispatch(session.key(key_a(), true).unwrap()).unwrap();
    runtime.tick_once().await;

    // the viewport closes with the key still held
    let frames = session.stop();
    assert_eq!(frames.len(), 2);
    for frame in frames {
        handle.dispatch(frame).unwrap();
    }
    runtime.tick_once().await;

    let ended = statuses.recv().await.unwrap();
    assert_eq!(ended.state, SessionState::Ended);
    assert_eq!(
        log.events(),
        vec![
            Injected::Key(vk::KEY_A, true),
            Injected::Key(vk::KEY_A, false),
            Injected::ReleaseAll,
        ]
    );
}

#[tokio::test]
async fn test_input_after_stop_waits_for_the_stop() {
    let clock = Arc::new(ManualClock::starting_now());
    let bridge = ConsentBridge::in_memory();
    let (executor, log) = recording_executor();
    let mut manager = SessionManager::new(client(), "Lab 07", bridge, executor, clock);
    let id = SessionId::generate().unwrap();
    manager
        .handle_session_command(SessionCommand::request_start(client(), id.clone(), "ops", 30, 600))
        .await;
    manager
        .apply_decision(ConsentDecision {
            session_id: id.clone(),
            approved: true,
            message: None,
        })
        .await;

    let (mut runtime, handle, _statuses) = EndpointRuntime::new(manager, limits(4, 16));
    handle.dispatch(move_frame(&id, 0.25)).unwrap();
    handle
        .dispatch(RelayFrame::SessionCommand(SessionCommand::stop(client(), id.clone())))
        .unwrap();
    handle.dispatch(move_frame(&id, 0.5)).unwrap();
    runtime.tick_once().await;

    // the second move belongs to a stopped session
    assert_eq!(log.events(), vec![Injected::Move(480, 0), Injected::ReleaseAll]);
}

#[tokio::test]
async fn test_input_budget_bounds_each_tick() {
    let clock = Arc::new(ManualClock::starting_now());
    let bridge = ConsentBridge::in_memory();
    let (executor, log) = recording_executor();
    let mut manager = SessionManager::new(client(), "Lab 07", bridge, executor, clock);
    let id = SessionId::generate().unwrap();
    manager
        .handle_session_command(SessionCommand::request_start(client(), id.clone(), "ops", 30, 600))
        .await;
    manager
        .apply_decision(ConsentDecision {
            session_id: id.clone(),
            approved: true,
            message: None,
        })
        .await;

    let (mut runtime, handle, _statuses) = EndpointRuntime::new(manager, limits(3, 16));
    for i in 0..7 {
        handle.dispatch(move_frame(&id, f64::from(i) / 8.0)).unwrap();
    }

    runtime.tick_once().await;
    assert_eq!(log.len(), 3);
    runtime.tick_once().await;
    assert_eq!(log.len(), 6);
    runtime.tick_once().await;
    // arrival order is preserved
    let xs: Vec<i32> = log
        .events()
        .into_iter()
        .map(|e| match e {
            Injected::Move(x, _) => x,
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    assert_eq!(xs, vec![0, 240, 480, 720, 960, 1200, 1440]);
}

#[tokio::test]
async fn test_full_input_queue_rejects_without_blocking() {
    let clock = Arc::new(ManualClock::starting_now());
    let (executor, _log) = recording_executor();
    let manager = SessionManager::new(client(), "Lab 07", ConsentBridge::in_memory(), executor, clock);
    let (_runtime, handle, _statuses) = EndpointRuntime::new(manager, limits(1, 2));
    let id = SessionId::generate().unwrap();

    handle.dispatch(move_frame(&id, 0.1)).unwrap();
    handle.dispatch(move_frame(&id, 0.2)).unwrap();
    assert_eq!(
        handle.dispatch(move_frame(&id, 0.3)),
        Err(DispatchError::QueueFull("input"))
    );
    // session commands have their own queue
    handle
        .dispatch(RelayFrame::SessionCommand(SessionCommand::stop(client(), id)))
        .unwrap();
}

#[tokio::test]
async fn test_undecodable_input_is_refused() {
    let clock = Arc::new(ManualClock::starting_now());
    let (executor, _log) = recording_executor();
    let manager = SessionManager::new(client(), "Lab 07", ConsentBridge::in_memory(), executor, clock);
    let (_runtime, handle, _statuses) = EndpointRuntime::new(manager, limits(1, 2));

    let wire = rcs_proto::v1::InputCommand::new(client(), SessionId::generate().unwrap(), InputKind::MouseDown);
    assert!(matches!(
        handle.dispatch(RelayFrame::InputCommand(wire)),
        Err(DispatchError::BadInput(_))
    ));
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let clock = Arc::new(ManualClock::starting_now());
    let (executor, _log) = recording_executor();
    let manager = SessionManager::new(client(), "Lab 07", ConsentBridge::in_memory(), executor, clock.clone());
    let (runtime, handle, mut statuses) = EndpointRuntime::new(manager, limits(1, 2));

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(runtime.run(async move {
        let _ = stop_rx.await;
    }));

    let id = SessionId::generate().unwrap();
    handle
        .submit_session(SessionCommand::request_start(client(), id, "ops", 5, 60))
        .unwrap();
    let first = tokio::time::timeout(Duration::from_secs(2), statuses.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.state, SessionState::PendingApproval);

    clock.advance(Duration::from_secs(6));
    let second = tokio::time::timeout(Duration::from_secs(2), statuses.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.state, SessionState::Expired);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}
