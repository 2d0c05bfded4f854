//! Live host-fault feed over server-sent events.
//!
//! `GET /host/inject?type=cpu&duration=30` starts the fault and streams one
//! `data: {"state","msg","timestamp"}` frame per event until the terminal
//! event. Closing the connection does not stop the fault.

use crate::server::ChaosAgent;
use axum::extract::Query;
use axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::Extension;
use fault_types::FaultSubmission;
use serde::Deserialize;
use std::sync::Arc;

/// Query parameters of `/host/inject`.
#[derive(Debug, Default, Deserialize)]
pub struct HostQuery {
    /// Fault kind (`cpu`, `memory`, `disk`, `network`).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Network subtype (`delay` or `loss`).
    pub subtype: Option<String>,
    /// Latency (`200ms`) or loss (`10%`).
    pub val: Option<String>,
    /// Latency jitter.
    pub jitter: Option<String>,
    /// Interface to shape.
    pub interface: Option<String>,
    /// Seconds; anything unparseable or non-positive means the default.
    pub duration: Option<String>,
    /// Run a ping probe during network faults.
    pub visualize: Option<bool>,
}

impl HostQuery {
    /// Convert to an engine submission. Host faults never carry a container.
    pub fn into_submission(self) -> FaultSubmission {
        FaultSubmission {
            container_id: None,
            kind: self.kind,
            subtype: self.subtype,
            value: self.val,
            jitter: self.jitter,
            interface: self.interface,
            duration_secs: self.duration.and_then(|d| d.trim().parse().ok()),
            visualize: self.visualize,
        }
    }
}

/// `GET /host/inject`
pub async fn inject_handler(
    Extension(agent): Extension<Arc<ChaosAgent>>,
    Query(query): Query<HostQuery>,
) -> impl IntoResponse {
    let feed = agent.engine().spawn(query.into_submission());
    tracing::debug!(id = %feed.id, "host fault feed opened");

    let stream = futures_util::stream::unfold(feed.events, |mut events| async move {
        let event = events.recv().await?;
        Some((Event::default().json_data(&event), events))
    });

    ([(ACCESS_CONTROL_ALLOW_ORIGIN, "*")], Sse::new(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing;
    use axum::http::{header, StatusCode};
    use fault_engine::drivers::ScriptedRun;
    use fault_types::{FaultEvent, Phase};

    fn frames(body: &str) -> Vec<FaultEvent> {
        body.split("\n\n")
            .filter_map(|frame| frame.strip_prefix("data: "))
            .map(|json| serde_json::from_str(json).unwrap())
            .collect()
    }

    #[test]
    fn duration_parsing_is_lenient() {
        let query = HostQuery {
            kind: "cpu".into(),
            duration: Some("abc".into()),
            ..Default::default()
        };
        assert_eq!(query.into_submission().duration_secs, None);

        let query = HostQuery {
            kind: "cpu".into(),
            duration: Some(" 30 ".into()),
            ..Default::default()
        };
        assert_eq!(query.into_submission().duration_secs, Some(30));
    }

    #[tokio::test]
    async fn streams_stress_output_until_completed() {
        let t = testing::agent();
        t.launcher.queue_run(ScriptedRun::new(
            &["stress-ng: info: dispatching hogs: 4 cpu"],
            0,
        ));

        let response = t.get("/host/inject?type=cpu&duration=5").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let events = frames(&testing::body_text(response).await);
        let phases: Vec<_> = events.iter().map(|e| e.state).collect();
        assert_eq!(
            phases,
            vec![Phase::Start, Phase::Injecting, Phase::Log, Phase::Completed]
        );
        assert_eq!(events[1].msg, "Started cpu stress test for 5s");
        assert_eq!(events[2].msg, "stress-ng: info: dispatching hogs: 4 cpu");
        assert_eq!(
            t.launcher.started()[0].args,
            vec!["--cpu", "0", "--timeout", "5s", "-v"]
        );
    }

    #[tokio::test]
    async fn network_delay_uses_defaults_and_cleans_up() {
        let t = testing::agent();

        let response = t.get("/host/inject?type=network&duration=0").await;
        let events = frames(&testing::body_text(response).await);

        assert_eq!(events[0].msg, "Network: Adding 200ms latency to eth0");
        assert!(events.iter().any(|e| e.state == Phase::Cleaning));
        assert_eq!(events.last().unwrap().state, Phase::Completed);
        assert_eq!(t.tc.rule_count("eth0"), 0);
        assert_eq!(t.launcher.started()[0].args[1], "10");
    }

    #[tokio::test]
    async fn unknown_type_is_a_single_error_frame() {
        let t = testing::agent();

        let response = t.get("/host/inject?type=gpu").await;
        assert_eq!(response.status(), StatusCode::OK);

        let events = frames(&testing::body_text(response).await);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state, Phase::Error);
        assert_eq!(events[0].msg, "unknown fault kind: gpu");
        assert!(t.launcher.started().is_empty());
    }

    #[tokio::test]
    async fn missing_type_is_rejected_in_feed() {
        let t = testing::agent();
        let events = frames(&testing::body_text(t.get("/host/inject").await).await);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state, Phase::Error);
    }
}
