use crate::batch::Batch;
use crate::error::DeliveryError;
use crate::line_protocol::encode_batch;
use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize)]
struct InfluxErrorBody {
    error: String,
}

/// HTTP writer for the InfluxDB 1.x `/write` endpoint.
///
/// The inner client pools connections, so one instance is kept for the
/// lifetime of the process.
#[derive(Clone)]
pub struct DeliveryClient {
    client: Client,
    write_url: Url,
}

impl DeliveryClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let base = Url::parse(&format!("http://{host}:{port}"))
            .with_context(|| format!("invalid database address {host}:{port}"))?;
        let write_url = base.join("write").context("build write url")?;
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, write_url })
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }

    /// Writes `batch` in one request. No retries; the next cycle is the retry.
    pub async fn deliver(&self, batch: &Batch) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.write_url.clone())
            .query(&[
                ("db", batch.database()),
                ("precision", batch.precision().as_str()),
            ])
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(encode_batch(batch))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<InfluxErrorBody>(&body)
            .map(|parsed| parsed.error)
            .unwrap_or_else(|_| body.trim().to_string());
        Err(DeliveryError::Rejected { status, message })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::batch::Precision;
    use crate::sensor::Reading;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    pub(crate) struct CapturedWrite {
        pub(crate) query: HashMap<String, String>,
        pub(crate) body: String,
    }

    #[derive(Clone)]
    struct FakeInflux {
        status: StatusCode,
        reply: &'static str,
        writes: Arc<Mutex<Vec<CapturedWrite>>>,
    }

    async fn write_handler(
        State(state): State<FakeInflux>,
        Query(query): Query<HashMap<String, String>>,
        body: String,
    ) -> (StatusCode, &'static str) {
        state.writes.lock().unwrap().push(CapturedWrite { query, body });
        (state.status, state.reply)
    }

    /// Serves `/write` on an ephemeral port, answering every request with
    /// `status` and `reply`.
    pub(crate) async fn spawn_fake_influx(
        status: StatusCode,
        reply: &'static str,
    ) -> (u16, Arc<Mutex<Vec<CapturedWrite>>>) {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/write", post(write_handler))
            .with_state(FakeInflux {
                status,
                reply,
                writes: writes.clone(),
            });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (port, writes)
    }

    /// A port nothing listens on.
    pub(crate) fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn sample_batch() -> Batch {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut batch = Batch::new("temperature", Precision::Seconds);
        let reading = Reading {
            sensor_id: "28-0316a2795aff".to_string(),
            value: 21.437,
            timestamp: ts,
        };
        batch.add_at(&reading, "temp", ts);
        batch
    }

    #[test]
    fn write_url_targets_write_endpoint() {
        let client = DeliveryClient::new("127.0.0.1", 8086, Duration::from_secs(1)).unwrap();
        assert_eq!(client.write_url().as_str(), "http://127.0.0.1:8086/write");
    }

    #[test]
    fn invalid_host_is_rejected_at_startup() {
        assert!(DeliveryClient::new("bad host", 8086, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn deliver_posts_line_protocol_with_db_and_precision() {
        let (port, writes) = spawn_fake_influx(StatusCode::NO_CONTENT, "").await;
        let client = DeliveryClient::new("127.0.0.1", port, Duration::from_secs(5)).unwrap();

        client.deliver(&sample_batch()).await.unwrap();

        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].query.get("db").map(String::as_str), Some("temperature"));
        assert_eq!(writes[0].query.get("precision").map(String::as_str), Some("s"));
        assert_eq!(
            writes[0].body,
            "temp,sensor=28-0316a2795aff value=21.437 1700000000\n"
        );
    }

    #[tokio::test]
    async fn deliver_maps_error_status_to_rejected() {
        let (port, _writes) = spawn_fake_influx(
            StatusCode::NOT_FOUND,
            r#"{"error":"database not found: \"temperature\""}"#,
        )
        .await;
        let client = DeliveryClient::new("127.0.0.1", port, Duration::from_secs(5)).unwrap();

        let err = client.deliver(&sample_batch()).await.unwrap_err();
        match err {
            DeliveryError::Rejected { status, message } => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
                assert_eq!(message, "database not found: \"temperature\"");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deliver_to_closed_port_is_unreachable() {
        let client =
            DeliveryClient::new("127.0.0.1", closed_port(), Duration::from_secs(5)).unwrap();

        let err = client.deliver(&sample_batch()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Unreachable(_)), "{err}");
    }
}
