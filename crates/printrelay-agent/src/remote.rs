// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP client for the order server's print-job queue.
//
// Endpoints (relative to `server_url`):
//   GET  pending-jobs          jobs waiting for this agent's token
//   POST jobs/{id}/claim       {"client_id": ...}
//   POST jobs/{id}/complete
//   POST jobs/{id}/fail        {"error": ...}
// Every request carries `Authorization: Token <api_token>`. Job ids are
// opaque and percent-encoded as a single path segment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url, header};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use printrelay_core::config::AgentConfig;
use printrelay_core::error::{RelayError, Result};
use printrelay_core::types::{JobId, JobKind, JobOutcome, JobStatus, PrintJob};

/// Server answer to a claim request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This agent now owns the job.
    Claimed,
    /// Another agent got there first; do not print.
    AlreadyClaimed,
    /// The server has no claim endpoint; print without one.
    Unsupported,
}

/// The remote job queue, as seen by the agent.
#[async_trait]
pub trait RemoteQueue: Send + Sync {
    /// Pending jobs in server order.
    async fn fetch_pending(&self) -> Result<Vec<PrintJob>>;

    /// Ask the server to mark the job as in progress for `agent_id`.
    async fn claim(&self, id: &JobId, agent_id: &str) -> Result<ClaimOutcome>;

    /// Record the final outcome. Safe to call more than once.
    async fn report(&self, id: &JobId, outcome: &JobOutcome) -> Result<()>;
}

/// `RemoteQueue` over HTTP with reqwest.
pub struct HttpRemoteQueue {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRemoteQueue {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Token {}", config.api_token.trim()))
            .map_err(|_| RelayError::Config("api_token contains invalid header characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("printrelay/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| RelayError::Config(format!("cannot build HTTP client: {e}")))?;

        let base_url = Url::parse(config.base_url())
            .map_err(|e| RelayError::Config(format!("server_url is not a valid URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RelayError::Config(format!("server_url cannot take a path: {base_url}")));
        }

        Ok(Self { client, base_url })
    }

    /// `server_url` followed by `segments`, each encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn job_endpoint(&self, id: &JobId, verb: &str) -> Url {
        self.endpoint(&["jobs", id.as_str(), verb])
    }

    async fn post(&self, url: Url, body: Value) -> Result<StatusCode> {
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        check_auth(status)?;
        Ok(status)
    }
}

fn transport(e: reqwest::Error) -> RelayError {
    RelayError::Transport(e.to_string())
}

fn check_auth(status: StatusCode) -> Result<()> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(RelayError::Auth(format!("server answered {status}")))
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl RemoteQueue for HttpRemoteQueue {
    #[instrument(skip_all)]
    async fn fetch_pending(&self) -> Result<Vec<PrintJob>> {
        let response = self
            .client
            .get(self.endpoint(&["pending-jobs"]))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        check_auth(status)?;
        if !status.is_success() {
            return Err(RelayError::Transport(format!("fetching jobs: server answered {status}")));
        }
        let body: Value = response.json().await.map_err(transport)?;
        decode_jobs(body)
    }

    #[instrument(skip(self, agent_id), fields(job_id = %id))]
    async fn claim(&self, id: &JobId, agent_id: &str) -> Result<ClaimOutcome> {
        let status = self
            .post(self.job_endpoint(id, "claim"), json!({ "client_id": agent_id }))
            .await?;
        let outcome = match status {
            s if s.is_success() => ClaimOutcome::Claimed,
            StatusCode::CONFLICT | StatusCode::BAD_REQUEST => ClaimOutcome::AlreadyClaimed,
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED => ClaimOutcome::Unsupported,
            other => {
                return Err(RelayError::Transport(format!("claim: server answered {other}")));
            }
        };
        debug!(?outcome, "claim answered");
        Ok(outcome)
    }

    #[instrument(skip(self, outcome), fields(job_id = %id, status = ?outcome.status()))]
    async fn report(&self, id: &JobId, outcome: &JobOutcome) -> Result<()> {
        let status = match outcome {
            JobOutcome::Completed => self.post(self.job_endpoint(id, "complete"), json!({})).await?,
            JobOutcome::Failed { reason } => {
                self.post(self.job_endpoint(id, "fail"), json!({ "error": reason }))
                    .await?
            }
        };
        match status {
            s if s.is_success() => Ok(()),
            // The job is gone or already final; there is nothing left to tell.
            StatusCode::NOT_FOUND | StatusCode::CONFLICT => {
                warn!(%status, "server no longer tracks this job; acknowledgement dropped");
                Ok(())
            }
            other => Err(RelayError::Transport(format!("report: server answered {other}"))),
        }
    }
}

/// One job as the server sends it.
#[derive(Debug, Deserialize)]
struct WireJob {
    id: Option<JobId>,
    #[serde(alias = "job_type")]
    kind: Option<JobKind>,
    #[serde(default)]
    payload: Option<Value>,
    /// Ticket text the server already rendered.
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    created_at: Option<String>,
}

/// Decode a pending-jobs response: a bare array, or `{"count", "jobs"}`.
///
/// Jobs without an id are skipped; jobs with an unknown kind are kept so
/// they can be reported as failed.
pub fn decode_jobs(body: Value) -> Result<Vec<PrintJob>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("jobs") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(RelayError::Transport(
                    "pending-jobs response has no `jobs` array".into(),
                ));
            }
        },
        other => {
            return Err(RelayError::Transport(format!(
                "unexpected pending-jobs response: {other}"
            )));
        }
    };

    let mut jobs = Vec::with_capacity(items.len());
    for item in items {
        let wire: WireJob = match serde_json::from_value(item) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(error = %e, "skipping undecodable job");
                continue;
            }
        };
        let Some(id) = wire.id else {
            warn!("skipping job without an id");
            continue;
        };
        let payload = match (wire.payload, wire.content) {
            (Some(payload), _) if !payload.is_null() => payload,
            (_, Some(content)) => Value::String(content),
            _ => Value::Null,
        };
        jobs.push(PrintJob {
            id,
            kind: wire.kind.unwrap_or_else(|| JobKind::Unrecognised(String::new())),
            payload,
            status: wire.status.unwrap_or(JobStatus::Pending),
            created_at: wire
                .created_at
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        });
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct Server {
        seen: Arc<Mutex<Vec<String>>>,
    }

    async fn pending(State(s): State<Server>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        s.seen.lock().unwrap().push(format!("GET {auth}"));
        if auth != "Token good-token" {
            return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "bad token"})));
        }
        let body = json!({
            "count": 2,
            "jobs": [
                {"id": 1, "job_type": "kot", "content": "1x Chai", "status": "pending",
                 "created_at": "2026-03-02T19:30:00.123456Z"},
                {"id": "2", "kind": "RECEIPT", "payload": {"total": 5}}
            ]
        });
        (StatusCode::OK, Json(body))
    }

    async fn action(
        State(s): State<Server>,
        Path((id, verb)): Path<(String, String)>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        s.seen.lock().unwrap().push(format!("POST {id}/{verb} {body}"));
        match (id.as_str(), verb.as_str()) {
            ("7", "claim") => StatusCode::CONFLICT,
            ("8", "claim") => StatusCode::NOT_FOUND,
            (_, "claim" | "complete" | "fail") => StatusCode::OK,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    async fn spawn_server() -> (String, Server) {
        let state = Server::default();
        let app = Router::new()
            .route("/api/pending-jobs", get(pending))
            .route("/api/jobs/{id}/{verb}", post(action))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/api/"), state)
    }

    fn queue(server_url: &str, token: &str) -> HttpRemoteQueue {
        let config = AgentConfig {
            server_url: server_url.into(),
            api_token: token.into(),
            ..AgentConfig::default()
        };
        HttpRemoteQueue::new(&config).unwrap()
    }

    #[tokio::test]
    async fn fetches_and_decodes_envelope() {
        let (url, server) = spawn_server().await;
        let jobs = queue(&url, "good-token").fetch_pending().await.unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id.as_str(), "1");
        assert_eq!(jobs[0].kind, JobKind::KitchenOrder);
        assert_eq!(jobs[0].payload, Value::String("1x Chai".into()));
        assert!(jobs[0].created_at.is_some());
        assert_eq!(jobs[1].kind, JobKind::Receipt);
        assert_eq!(server.seen.lock().unwrap()[0], "GET Token good-token");
    }

    #[tokio::test]
    async fn rejected_token_is_auth_error() {
        let (url, _server) = spawn_server().await;
        let err = queue(&url, "stale-token").fetch_pending().await.unwrap_err();
        assert!(matches!(err, RelayError::Auth(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = queue(&format!("http://127.0.0.1:{port}"), "good-token")
            .fetch_pending()
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }

    #[tokio::test]
    async fn claim_outcomes() {
        let (url, server) = spawn_server().await;
        let q = queue(&url, "good-token");
        assert_eq!(q.claim(&"6".into(), "agent-a").await.unwrap(), ClaimOutcome::Claimed);
        assert_eq!(q.claim(&"7".into(), "agent-a").await.unwrap(), ClaimOutcome::AlreadyClaimed);
        assert_eq!(q.claim(&"8".into(), "agent-a").await.unwrap(), ClaimOutcome::Unsupported);
        assert!(server.seen.lock().unwrap()[0].contains("\"client_id\":\"agent-a\""));
    }

    #[tokio::test]
    async fn reports_complete_and_fail() {
        let (url, server) = spawn_server().await;
        let q = queue(&url, "good-token");
        q.report(&"3".into(), &JobOutcome::Completed).await.unwrap();
        q.report(&"4".into(), &JobOutcome::failed("cannot render ticket"))
            .await
            .unwrap();

        let seen = server.seen.lock().unwrap();
        assert!(seen[0].starts_with("POST 3/complete"));
        assert!(seen[1].starts_with("POST 4/fail"));
        assert!(seen[1].contains("cannot render ticket"));
    }

    #[test]
    fn job_ids_are_one_path_segment() {
        let q = queue("http://127.0.0.1:9/api/", "good-token");
        let url = q.job_endpoint(&"a/b?x=1#y".into(), "complete");
        assert_eq!(url.path(), "/api/jobs/a%2Fb%3Fx=1%23y/complete");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
        assert_eq!(
            q.endpoint(&["pending-jobs"]).as_str(),
            "http://127.0.0.1:9/api/pending-jobs"
        );
    }

    #[tokio::test]
    async fn report_reaches_the_job_with_a_slash_in_its_id() {
        let (url, server) = spawn_server().await;
        let q = queue(&url, "good-token");
        q.report(&"a/b".into(), &JobOutcome::Completed).await.unwrap();

        let seen = server.seen.lock().unwrap();
        assert!(seen[0].starts_with("POST a/b/complete"), "{seen:?}");
    }

    #[test]
    fn decodes_bare_array_and_skips_jobs_without_id() {
        let jobs = decode_jobs(json!([
            {"kind": "KITCHEN_ORDER", "payload": {}},
            {"id": 5, "kind": "label_printer", "payload": {}},
            {"id": 6, "kind": "BAR_ORDER", "payload": {"items": []}}
        ]))
        .unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].kind, JobKind::Unrecognised("label_printer".into()));
        assert_eq!(jobs[1].kind, JobKind::BarOrder);
    }

    #[test]
    fn rejects_unexpected_shape() {
        assert!(matches!(
            decode_jobs(json!({"detail": "maintenance"})),
            Err(RelayError::Transport(_))
        ));
    }
}
