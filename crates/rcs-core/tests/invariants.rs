//! Property tests over random command sequences.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use rcs_core::harness::{recording_executor, Injected};
use rcs_core::{ConsentBridge, InputCommand, ManualClock, SessionInput, SessionManager, SessionSlot};
use rcs_proto::v1::{ClientId, ConsentDecision, SessionCommand, SessionId, SessionState};

#[derive(Debug, Clone)]
enum Op {
    Start(u8),
    Stop(u8),
    Decide(u8, bool),
    Input(u8),
    Advance(u16),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4).prop_map(Op::Start),
        (0u8..4).prop_map(Op::Stop),
        ((0u8..4), any::<bool>()).prop_map(|(id, ok)| Op::Decide(id, ok)),
        (0u8..4).prop_map(Op::Input),
        (0u16..40).prop_map(Op::Advance),
    ]
}

fn sid(n: u8) -> SessionId {
    SessionId::from_wire(format!("{:x}", n).repeat(64))
}

fn client() -> ClientId {
    ClientId::from("lab-01")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The slot only ever holds the most recently started session, and input
    /// reaches the executor only under the active id.
    #[test]
    fn prop_single_session_and_gated_input(ops in prop::collection::vec(op(), 1..60)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async move {
            let clock = Arc::new(ManualClock::starting_now());
            let bridge = ConsentBridge::in_memory();
            let (executor, log) = recording_executor();
            let mut manager = SessionManager::new(client(), "Lab 01", bridge, executor, clock.clone());
            let mut last_started: Option<SessionId> = None;

            for op in ops {
                let before_active = match manager.slot() {
                    SessionSlot::Active(a) => Some(a.session_id.clone()),
                    _ => None,
                };
                let events_before = log.events().len();

                let status = match op {
                    Op::Start(n) => {
                        last_started = Some(sid(n));
                        manager
                            .handle_session_command(SessionCommand::request_start(
                                client(), sid(n), "prop", 10, 30,
                            ))
                            .await
                    }
                    Op::Stop(n) => {
                        manager
                            .handle_session_command(SessionCommand::stop(client(), sid(n)))
                            .await
                    }
                    Op::Decide(n, approved) => {
                        manager
                            .apply_decision(ConsentDecision {
                                session_id: sid(n),
                                approved,
                                message: None,
                            })
                            .await
                    }
                    Op::Input(n) => {
                        let status = manager
                            .handle_input(SessionInput {
                                client_id: client(),
                                session_id: sid(n),
                                command: InputCommand::MouseMove { x: 0.5, y: 0.5 },
                            })
                            .await;
                        let injected: Vec<Injected> = log.events()[events_before..]
                            .iter()
                            .copied()
                            .filter(|e| matches!(e, Injected::Move(..)))
                            .collect();
                        if before_active.as_ref() != Some(&sid(n)) {
                            assert!(injected.is_empty());
                            assert!(status.is_none());
                        }
                        status
                    }
                    Op::Advance(secs) => {
                        clock.advance(Duration::from_secs(u64::from(secs)));
                        manager.check_deadlines().await
                    }
                };

                if let Some(current) = manager.slot().session_id() {
                    assert_eq!(Some(current), last_started.as_ref());
                }
                if let Some(status) = status {
                    if status.state.is_terminal() {
                        assert!(manager.slot().session_id().is_none());
                    }
                    if status.state == SessionState::Approved {
                        assert!(matches!(manager.slot(), SessionSlot::Active(_)));
                    }
                }
            }
        });
    }
}
