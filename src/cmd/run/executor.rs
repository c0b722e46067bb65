use std::time::Duration;

use rama::{
    error::OpaqueError,
    http::{BodyExtractExt as _, Request, Response, service::client::HttpClientExt as _},
    service::BoxService,
    telemetry::tracing,
};
use tokio::time::Instant;

/// Outcome of a single request lifecycle.
///
/// Consumed by the log sink and by tests; never persisted. No variant may
/// escape the request that produced it: the dispatch loop and other
/// in-flight requests are unaffected by any of them.
#[derive(Debug)]
pub(super) enum RequestOutcome {
    /// Response received and its body parsed as JSON.
    Success {
        status: u16,
        latency: Duration,
        body: serde_json::Value,
    },
    /// Response received but the body is not valid JSON.
    /// A recognized, degraded outcome rather than a harness failure.
    ProtocolError { status: u16, latency: Duration },
    /// Transport-level failure: timeout, refused connection, DNS, ...
    NetworkError { error: String },
}

/// Performs one HTTP call, measures its latency, classifies the outcome and
/// emits exactly one log record per invocation.
pub(super) struct RequestExecutor {
    client: BoxService<Request, Response, OpaqueError>,
    target: String,
}

impl RequestExecutor {
    pub(super) fn new(
        client: BoxService<Request, Response, OpaqueError>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            client,
            target: target.into(),
        }
    }

    pub(super) async fn execute(&self, rid: u64) -> RequestOutcome {
        let url = self.request_url(rid);

        let start = Instant::now();
        let outcome = match self.client.get(url).send().await {
            Ok(resp) => {
                // latency reflects response-head arrival and is kept
                // even when the body turns out not to be JSON
                let latency = start.elapsed();
                let status = resp.status().as_u16();
                match resp.try_into_json::<serde_json::Value>().await {
                    Ok(body) => RequestOutcome::Success {
                        status,
                        latency,
                        body,
                    },
                    Err(_) => RequestOutcome::ProtocolError { status, latency },
                }
            }
            Err(err) => RequestOutcome::NetworkError {
                error: err.to_string(),
            },
        };

        log_outcome(rid, &outcome);
        outcome
    }

    /// The target URL with the request identifier appended as query parameter,
    /// so server-side logs can be correlated with client-side logs.
    fn request_url(&self, rid: u64) -> String {
        let sep = if self.target.contains('?') { '&' } else { '?' };
        format!("{}{}rid={}", self.target, sep, rid)
    }
}

fn log_outcome(rid: u64, outcome: &RequestOutcome) {
    match outcome {
        RequestOutcome::Success {
            status,
            latency,
            body,
        } => {
            tracing::info!(%rid, %status, ?latency, "request completed: {body}");
        }
        RequestOutcome::ProtocolError { status, latency } => {
            tracing::info!(%rid, %status, ?latency, "response body is not valid JSON");
        }
        RequestOutcome::NetworkError { error } => {
            tracing::error!(%rid, "request failed: {error}");
        }
    }
}
