//! Poll loop, local countdown, and automatic deny.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rcs_proto::v1::{ConsentDecision, ConsentRequest, SessionId};
use rcs_proto::Validate;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::{BridgeClientError, ConsentEndpoint};
use crate::prompt::{PromptAnswer, Prompter};

pub const DENIED_BY_USER: &str = "denied by user";
pub const NO_RESPONSE: &str = "no response from user before timeout";

/// Time left to answer `request` at `now`, never more than the window the
/// session owner enforces.
pub fn countdown(request: &ConsentRequest, now: DateTime<Utc>) -> Duration {
    let secs = request.approval_window_secs();
    let window = Duration::from_secs(u64::from(secs));
    let deadline = request.issued_at + chrono::Duration::seconds(i64::from(secs));
    match (deadline - now).to_std() {
        Ok(left) => left.min(window),
        // already past the deadline
        Err(_) => Duration::ZERO,
    }
}

pub struct ConsentSurface<E, P> {
    endpoint: E,
    prompter: P,
    poll_interval: Duration,
    /// Only one request is pending at a time, so the last answer is enough.
    last_answered: Option<SessionId>,
}

impl<E: ConsentEndpoint, P: Prompter> ConsentSurface<E, P> {
    pub fn new(endpoint: E, prompter: P) -> Self {
        Self {
            endpoint,
            prompter,
            poll_interval: Duration::from_secs(1),
            last_answered: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// One poll: prompt for a request not seen before and post the answer.
    pub async fn poll_once(&mut self) -> Result<Option<ConsentDecision>, BridgeClientError> {
        let Some(request) = self.endpoint.pending_request().await? else {
            return Ok(None);
        };
        if let Err(e) = request.validate() {
            warn!("Ignoring malformed consent request: {}", e);
            return Ok(None);
        }
        if self.last_answered.as_ref() == Some(&request.session_id) {
            return Ok(None);
        }
        self.last_answered = Some(request.session_id.clone());

        let left = countdown(&request, Utc::now());
        info!(
            session = %request.session_id.short(),
            requested_by = %request.requested_by,
            countdown_secs = left.as_secs(),
            "control requested"
        );

        let decision = self.ask(&request, left).await;
        self.endpoint.submit_decision(&decision).await?;
        info!(
            session = %decision.session_id.short(),
            approved = decision.approved,
            "decision submitted"
        );
        Ok(Some(decision))
    }

    async fn ask(&mut self, request: &ConsentRequest, left: Duration) -> ConsentDecision {
        let deny = |message: &str| ConsentDecision {
            session_id: request.session_id.clone(),
            approved: false,
            message: Some(message.to_string()),
        };
        if left.is_zero() {
            return deny(NO_RESPONSE);
        }
        match tokio::time::timeout(left, self.prompter.prompt(request, left)).await {
            Ok(Ok(PromptAnswer::Allow)) => ConsentDecision {
                session_id: request.session_id.clone(),
                approved: true,
                message: None,
            },
            Ok(Ok(PromptAnswer::Deny)) => deny(DENIED_BY_USER),
            Ok(Err(e)) => {
                warn!("Consent prompt failed, denying: {}", e);
                deny(DENIED_BY_USER)
            }
            Err(_) => deny(NO_RESPONSE),
        }
    }

    /// Poll until `shutdown` completes. Endpoint errors are logged and retried
    /// on the next poll.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("consent surface stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(_) => {}
                        Err(BridgeClientError::Unauthorized) => {
                            warn!("Consent endpoint rejected our token");
                        }
                        Err(e) => debug!("Consent endpoint unreachable: {}", e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeEndpoint {
        pending: Arc<Mutex<Option<ConsentRequest>>>,
        submitted: Arc<Mutex<Vec<ConsentDecision>>>,
        keep_request: bool,
    }

    #[async_trait]
    impl ConsentEndpoint for FakeEndpoint {
        async fn pending_request(&self) -> Result<Option<ConsentRequest>, BridgeClientError> {
            Ok(self.pending.lock().unwrap().clone())
        }

        async fn submit_decision(&self, decision: &ConsentDecision) -> Result<(), BridgeClientError> {
            self.submitted.lock().unwrap().push(decision.clone());
            if !self.keep_request {
                *self.pending.lock().unwrap() = None;
            }
            Ok(())
        }
    }

    enum Script {
        Answer(PromptAnswer),
        Fail,
        Never,
    }

    struct ScriptedPrompter {
        script: Script,
        prompts: Arc<Mutex<Vec<Duration>>>,
    }

    #[async_trait]
    impl Prompter for ScriptedPrompter {
        async fn prompt(
            &mut self,
            _request: &ConsentRequest,
            countdown: Duration,
        ) -> io::Result<PromptAnswer> {
            self.prompts.lock().unwrap().push(countdown);
            match self.script {
                Script::Answer(a) => Ok(a),
                Script::Fail => Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")),
                Script::Never => std::future::pending().await,
            }
        }
    }

    fn request(timeout: u32, issued_at: DateTime<Utc>) -> ConsentRequest {
        ConsentRequest {
            session_id: SessionId::from_wire("0f".repeat(32)),
            requested_by: "mr.diaz".into(),
            approval_timeout_seconds: timeout,
            max_session_seconds: 600,
            issued_at,
        }
    }

    fn surface(
        endpoint: &FakeEndpoint,
        script: Script,
    ) -> (ConsentSurface<FakeEndpoint, ScriptedPrompter>, Arc<Mutex<Vec<Duration>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let prompter = ScriptedPrompter {
            script,
            prompts: prompts.clone(),
        };
        (ConsentSurface::new(endpoint.clone(), prompter), prompts)
    }

    #[test]
    fn test_countdown_is_capped_and_floored() {
        let now = Utc::now();
        assert_eq!(countdown(&request(30, now), now), Duration::from_secs(30));
        // issued in the future (clock skew) never extends the window
        let ahead = now + chrono::Duration::seconds(100);
        assert_eq!(countdown(&request(30, ahead), now), Duration::from_secs(30));
        let behind = now - chrono::Duration::seconds(40);
        assert_eq!(countdown(&request(30, behind), now), Duration::ZERO);
        let partly = now - chrono::Duration::seconds(10);
        assert_eq!(countdown(&request(30, partly), now), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_allow() {
        let endpoint = FakeEndpoint::default();
        *endpoint.pending.lock().unwrap() = Some(request(30, Utc::now()));
        let (mut surface, _) = surface(&endpoint, Script::Answer(PromptAnswer::Allow));

        let decision = surface.poll_once().await.unwrap().unwrap();
        assert!(decision.approved);
        assert_eq!(decision.message, None);
        assert_eq!(endpoint.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_deny_message() {
        let endpoint = FakeEndpoint::default();
        *endpoint.pending.lock().unwrap() = Some(request(30, Utc::now()));
        let (mut surface, _) = surface(&endpoint, Script::Answer(PromptAnswer::Deny));

        let decision = surface.poll_once().await.unwrap().unwrap();
        assert!(!decision.approved);
        assert_eq!(decision.message.as_deref(), Some(DENIED_BY_USER));
    }

    #[tokio::test]
    async fn test_failed_prompt_denies() {
        let endpoint = FakeEndpoint::default();
        *endpoint.pending.lock().unwrap() = Some(request(30, Utc::now()));
        let (mut surface, _) = surface(&endpoint, Script::Fail);

        let decision = surface.poll_once().await.unwrap().unwrap();
        assert!(!decision.approved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_prompt_is_denied_when_countdown_elapses() {
        let endpoint = FakeEndpoint::default();
        *endpoint.pending.lock().unwrap() = Some(request(20, Utc::now()));
        let (mut surface, prompts) = surface(&endpoint, Script::Never);

        let decision = surface.poll_once().await.unwrap().unwrap();
        assert!(!decision.approved);
        assert_eq!(decision.message.as_deref(), Some(NO_RESPONSE));
        assert_eq!(prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_request_is_denied_without_prompting() {
        let endpoint = FakeEndpoint::default();
        let stale = Utc::now() - chrono::Duration::seconds(60);
        *endpoint.pending.lock().unwrap() = Some(request(30, stale));
        let (mut surface, prompts) = surface(&endpoint, Script::Answer(PromptAnswer::Allow));

        let decision = surface.poll_once().await.unwrap().unwrap();
        assert!(!decision.approved);
        assert_eq!(decision.message.as_deref(), Some(NO_RESPONSE));
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_session_is_prompted_once() {
        let endpoint = FakeEndpoint {
            keep_request: true,
            ..Default::default()
        };
        *endpoint.pending.lock().unwrap() = Some(request(30, Utc::now()));
        let (mut surface, prompts) = surface(&endpoint, Script::Answer(PromptAnswer::Deny));

        assert!(surface.poll_once().await.unwrap().is_some());
        assert!(surface.poll_once().await.unwrap().is_none());
        assert_eq!(prompts.lock().unwrap().len(), 1);
        assert_eq!(endpoint.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_timeout_gets_the_enforced_window() {
        let now = Utc::now();
        assert_eq!(
            countdown(&request(0, now), now),
            Duration::from_secs(u64::from(rcs_proto::v1::MIN_APPROVAL_TIMEOUT_SECS))
        );

        let endpoint = FakeEndpoint::default();
        *endpoint.pending.lock().unwrap() = Some(request(0, Utc::now()));
        let (mut surface, prompts) = surface(&endpoint, Script::Answer(PromptAnswer::Allow));
        let decision = surface.poll_once().await.unwrap().unwrap();
        assert!(decision.approved);
        assert_eq!(prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_next_session_is_prompted_after_an_answer() {
        let endpoint = FakeEndpoint {
            keep_request: true,
            ..Default::default()
        };
        *endpoint.pending.lock().unwrap() = Some(request(30, Utc::now()));
        let (mut surface, prompts) = surface(&endpoint, Script::Answer(PromptAnswer::Deny));
        assert!(surface.poll_once().await.unwrap().is_some());

        let mut next = request(30, Utc::now());
        next.session_id = SessionId::from_wire("1e".repeat(32));
        *endpoint.pending.lock().unwrap() = Some(next);
        assert!(surface.poll_once().await.unwrap().is_some());
        assert!(surface.poll_once().await.unwrap().is_none());
        assert_eq!(prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_nothing_pending() {
        let endpoint = FakeEndpoint::default();
        let (mut surface, prompts) = surface(&endpoint, Script::Answer(PromptAnswer::Allow));
        assert!(surface.poll_once().await.unwrap().is_none());
        assert!(prompts.lock().unwrap().is_empty());
    }
}
