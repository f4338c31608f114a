use std::path::Path;

use async_trait::async_trait;
use rcs_proto::v1::{ConsentDecision, ConsentRequest};
use reqwest::StatusCode;
use thiserror::Error;

/// Name of the token file the agent writes into its bridge directory.
pub const TOKEN_FILE: &str = "bridge.token";

#[derive(Debug, Error)]
pub enum BridgeClientError {
    #[error("http error: {0}")]
    Http(String),
    #[error("consent endpoint rejected the token")]
    Unauthorized,
    #[error("bad response: {0}")]
    BadResponse(String),
    #[error("failed to read token file {path}: {source}")]
    Token {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The two operations the surface needs from the session owner.
#[async_trait]
pub trait ConsentEndpoint: Send + Sync {
    /// The pending, unanswered request, if any.
    async fn pending_request(&self) -> Result<Option<ConsentRequest>, BridgeClientError>;

    async fn submit_decision(&self, decision: &ConsentDecision) -> Result<(), BridgeClientError>;
}

/// HTTP client for the agent's loopback consent endpoint.
#[derive(Clone)]
pub struct BridgeClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl BridgeClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, BridgeClientError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| BridgeClientError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    /// Read the token the agent generated into `bridge_dir`.
    pub async fn read_token(bridge_dir: &Path) -> Result<String, BridgeClientError> {
        let path = bridge_dir.join(TOKEN_FILE);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| BridgeClientError::Token {
                path: path.display().to_string(),
                source,
            })?;
        Ok(raw.trim().to_string())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn bad_response(resp: reqwest::Response) -> BridgeClientError {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return BridgeClientError::Unauthorized;
    }
    BridgeClientError::BadResponse(format!("status={} body={:?}", status, resp.text().await.ok()))
}

#[async_trait]
impl ConsentEndpoint for BridgeClient {
    async fn pending_request(&self) -> Result<Option<ConsentRequest>, BridgeClientError> {
        let resp = self
            .client
            .get(self.url("/v1/consent/request"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BridgeClientError::Http(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => {
                let request = resp
                    .json::<ConsentRequest>()
                    .await
                    .map_err(|e| BridgeClientError::BadResponse(e.to_string()))?;
                Ok(Some(request))
            }
            StatusCode::NO_CONTENT => Ok(None),
            _ => Err(bad_response(resp).await),
        }
    }

    async fn submit_decision(&self, decision: &ConsentDecision) -> Result<(), BridgeClientError> {
        let resp = self
            .client
            .post(self.url("/v1/consent/decision"))
            .bearer_auth(&self.token)
            .json(decision)
            .send()
            .await
            .map_err(|e| BridgeClientError::Http(e.to_string()))?;

        if resp.status() == StatusCode::ACCEPTED {
            Ok(())
        } else {
            Err(bad_response(resp).await)
        }
    }
}
