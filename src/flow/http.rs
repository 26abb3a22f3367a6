//! Flow backend talking to a waypoint server over HTTP.
//!
//! Point queries and mutations use the JSON API; the push channel reads the
//! checkpoint SSE stream and decodes each `data:` line as a row change.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::bus::Change;
use crate::checkpoint::{CheckpointFeed, OpenOutcome, ResolveStatus};
use crate::error::FlowError;
use crate::flow::FlowBackend;
use crate::identity::{Identity, SessionCreator};
use crate::rest::dto::{
    CreateSessionRequest, CreateSessionResponse, CreateStatus, IncrementResponse,
    ResolutionRequest, WaitingResponse,
};
use crate::rest::error::ErrorResponse;
use crate::types::{Event, EventBody, SessionId, SessionOrigin};

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:7410`
    pub fn new(base_url: impl Into<String>) -> Result<Self, FlowError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn session_url(&self, session: &SessionId, path: &str) -> String {
        self.url(&format!("/sessions/{session}{path}"))
    }
}

/// Turn non-2xx responses into [`FlowError::Rejected`]
async fn check(response: Response) -> Result<Response, FlowError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.message)
        .unwrap_or(body);
    Err(FlowError::Rejected {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, FlowError> {
    let bytes = check(response).await?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Decode one SSE line carrying a row change
fn parse_data_line(line: &[u8]) -> Option<Event> {
    let line = std::str::from_utf8(line).ok()?.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?.trim_start();
    match serde_json::from_str::<Change<Event>>(data) {
        Ok(change) => Some(change.into_row()),
        Err(e) => {
            tracing::debug!(error = %e, "skipping undecodable SSE payload");
            None
        }
    }
}

fn sse_events(response: Response) -> BoxStream<'static, Event> {
    let bytes = Box::pin(response.bytes_stream());
    futures_util::stream::unfold((bytes, Vec::<u8>::new()), |(mut bytes, mut buf)| async move {
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                if let Some(event) = parse_data_line(&line) {
                    return Some((event, (bytes, buf)));
                }
                continue;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "checkpoint stream interrupted");
                    return None;
                }
                None => return None,
            }
        }
    })
    .boxed()
}

#[async_trait]
impl CheckpointFeed for HttpBackend {
    async fn resolutions(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<BoxStream<'static, Event>, FlowError> {
        let response = self
            .client
            .get(self.session_url(session, "/checkpoints/stream"))
            .query(&[("resolution", resolution)])
            .send()
            .await?;
        Ok(sse_events(check(response).await?))
    }

    async fn latest(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<Option<Event>, FlowError> {
        let response = self
            .client
            .get(self.session_url(session, "/checkpoints/latest"))
            .query(&[("resolution", resolution)])
            .send()
            .await?;
        decode(response).await
    }
}

#[async_trait]
impl SessionCreator for HttpBackend {
    async fn create_session(&self, origin: &SessionOrigin) -> Result<Identity, FlowError> {
        let response = self
            .client
            .post(self.url("/sessions"))
            .json(&CreateSessionRequest {
                address: origin.address.clone(),
                client_signature: origin.client_signature.clone(),
            })
            .send()
            .await?;
        let created: CreateSessionResponse = decode(response).await?;
        Ok(identity_from(created))
    }
}

/// Offline answers keep the sentinel id the server issued
fn identity_from(created: CreateSessionResponse) -> Identity {
    match (created.status, created.id) {
        (CreateStatus::Created | CreateStatus::Reused, Some(id)) => Identity::Session(id),
        (CreateStatus::Closed, _) => Identity::Closed,
        (_, Some(id)) if id.is_offline() => Identity::Offline(id),
        _ => Identity::offline(),
    }
}

#[async_trait]
impl FlowBackend for HttpBackend {
    async fn checkpoint_waiting(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<bool, FlowError> {
        let response = self
            .client
            .get(self.session_url(session, "/checkpoints/waiting"))
            .query(&[("resolution", resolution)])
            .send()
            .await?;
        let waiting: WaitingResponse = decode(response).await?;
        Ok(waiting.waiting)
    }

    async fn open_checkpoint(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<OpenOutcome, FlowError> {
        let response = self
            .client
            .post(self.session_url(session, "/checkpoints"))
            .json(&ResolutionRequest {
                resolution: resolution.to_string(),
            })
            .send()
            .await?;
        decode(response).await
    }

    async fn clear_stale(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<ResolveStatus, FlowError> {
        let response = self
            .client
            .post(self.session_url(session, "/checkpoints/clear-stale"))
            .json(&ResolutionRequest {
                resolution: resolution.to_string(),
            })
            .send()
            .await?;
        decode(response).await
    }

    async fn increment_step(&self, session: &SessionId) -> Result<u32, FlowError> {
        let response = self
            .client
            .post(self.session_url(session, "/step/increment"))
            .send()
            .await?;
        let incremented: IncrementResponse = decode(response).await?;
        Ok(incremented.new_index)
    }

    async fn record_event(&self, session: &SessionId, body: EventBody) -> Result<Event, FlowError> {
        let response = self
            .client
            .post(self.session_url(session, "/events"))
            .json(&body)
            .send()
            .await?;
        decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CheckpointStatus, DualOutcome, EventId};
    use chrono::Utc;

    fn resolved_event() -> Event {
        Event {
            id: EventId::new(),
            session_id: SessionId::from("s"),
            seq: 3,
            created_at: Utc::now(),
            body: EventBody::Checkpoint {
                resolution: "R".to_string(),
                status: CheckpointStatus::Resolved,
                outcome: Some(DualOutcome::Good),
            },
        }
    }

    #[test]
    fn test_parse_data_line() {
        let event = resolved_event();
        let json = serde_json::to_string(&Change::Update { row: event.clone() }).unwrap();
        let line = format!("data: {json}\n");
        assert_eq!(parse_data_line(line.as_bytes()), Some(event));
    }

    #[test]
    fn test_identity_from_create_response() {
        let offline = identity_from(CreateSessionResponse {
            status: CreateStatus::Offline,
            id: Some(SessionId::offline()),
        });
        assert_eq!(offline, Identity::Offline(SessionId::offline()));

        let created = identity_from(CreateSessionResponse {
            status: CreateStatus::Created,
            id: Some(SessionId::from("s-1")),
        });
        assert_eq!(created.session_id(), Some(&SessionId::from("s-1")));

        let closed = identity_from(CreateSessionResponse {
            status: CreateStatus::Closed,
            id: None,
        });
        assert_eq!(closed.session_id(), None);

        // A created answer without an id degrades to the sentinel
        let broken = identity_from(CreateSessionResponse {
            status: CreateStatus::Created,
            id: None,
        });
        assert_eq!(broken, Identity::offline());
    }

    #[test]
    fn test_parse_ignores_non_data_lines() {
        assert_eq!(parse_data_line(b"event: update\n"), None);
        assert_eq!(parse_data_line(b":\n"), None);
        assert_eq!(parse_data_line(b"data: not-json\n"), None);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = HttpBackend::with_client(Client::new(), "http://localhost:7410/");
        assert_eq!(
            backend.session_url(&SessionId::from("abc"), "/step"),
            "http://localhost:7410/api/v1/sessions/abc/step"
        );
    }
}
