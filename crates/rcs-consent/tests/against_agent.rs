//! The consent surface driving the agent's real loopback endpoint.

use chrono::Utc;
use rcs_agent::consent_api::{self, ConsentApiState};
use rcs_consent::{BridgeClient, BridgeClientError, ConsentEndpoint, ConsentSurface, PromptAnswer, Prompter};
use rcs_core::ConsentBridge;
use rcs_proto::v1::{ConsentRequest, SessionId};
use std::time::Duration;

const TOKEN: &str = "surface-token";

struct Always(PromptAnswer);

#[async_trait::async_trait]
impl Prompter for Always {
    async fn prompt(&mut self, _: &ConsentRequest, _: Duration) -> std::io::Result<PromptAnswer> {
        Ok(self.0)
    }
}

async fn start(bridge: ConsentBridge) -> String {
    let listener = consent_api::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(consent_api::serve(
        listener,
        ConsentApiState {
            bridge,
            token: TOKEN.to_string(),
        },
    ));
    format!("http://{}", addr)
}

fn request(id: &SessionId) -> ConsentRequest {
    ConsentRequest {
        session_id: id.clone(),
        requested_by: "ms.novak".into(),
        approval_timeout_seconds: 30,
        max_session_seconds: 300,
        issued_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_approval_reaches_the_bridge() {
    let bridge = ConsentBridge::in_memory();
    let id = SessionId::generate().unwrap();
    bridge.publish_request(&request(&id)).await.unwrap();
    let base = start(bridge.clone()).await;

    let client = BridgeClient::new(base, TOKEN).unwrap();
    let mut surface = ConsentSurface::new(client, Always(PromptAnswer::Allow));
    let posted = surface.poll_once().await.unwrap().unwrap();
    assert_eq!(posted.session_id, id);

    let decision = bridge.take_decision().await.unwrap().unwrap();
    assert!(decision.approved);
    // the endpoint cleared the request, nothing left to prompt for
    assert!(surface.poll_once().await.unwrap().is_none());
}

#[tokio::test]
async fn test_wrong_token_is_reported() {
    let bridge = ConsentBridge::in_memory();
    let base = start(bridge).await;
    let client = BridgeClient::new(base, "nope").unwrap();
    assert!(matches!(
        client.pending_request().await,
        Err(BridgeClientError::Unauthorized)
    ));
}

#[tokio::test]
async fn test_nothing_pending_over_http() {
    let base = start(ConsentBridge::in_memory()).await;
    let client = BridgeClient::new(base, TOKEN).unwrap();
    assert!(client.pending_request().await.unwrap().is_none());
}
