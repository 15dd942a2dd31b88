//! HTTP implementation of [`MessagingClient`] for the PubNub REST API.
//!
//! Transient failures (connect errors, timeouts, 429, 5xx) are retried with
//! exponential backoff before an error is returned; whatever comes back out
//! of this client is final for the orchestration layer. Retrying happens
//! inside the request future, so dropping a subscribe future (the session's
//! cancellation path) also abandons any pending retry.

use std::time::Duration;

use async_trait::async_trait;
use loopcast_core::{
    ChannelSet, ClientError, Delivery, History, Message, MessagingClient, OperationKind,
};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::PubNubConfig;
use crate::protocol::{self, INITIAL_TIMETOKEN};

/// Longest error body kept in [`ClientError::Status`], in bytes.
const MAX_ERROR_BODY: usize = 512;

/// PubNub REST client.
#[derive(Debug)]
pub struct PubNubClient {
    http: reqwest::Client,
    config: PubNubConfig,
    origin: Url,
    uuid: String,
    timetoken: Mutex<String>,
}

impl PubNubClient {
    /// Create a client. Fails when the origin is not a base URL.
    pub fn new(config: PubNubConfig) -> Result<Self, ClientError> {
        let origin = Url::parse(&config.origin)
            .map_err(|e| ClientError::InvalidRequest(format!("origin {}: {e}", config.origin)))?;
        if origin.cannot_be_a_base() {
            return Err(ClientError::InvalidRequest(format!(
                "origin {} cannot be a base URL",
                config.origin
            )));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("loopcast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            config,
            origin,
            uuid: uuid::Uuid::now_v7().to_string(),
            timetoken: Mutex::new(INITIAL_TIMETOKEN.to_string()),
        })
    }

    /// Presence identity sent with every request.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Timetoken the next subscribe will resume from.
    pub fn timetoken(&self) -> String {
        self.timetoken.lock().clone()
    }

    fn endpoint(&self, segments: &[String]) -> Result<Url, ClientError> {
        let mut url = self.origin.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                ClientError::InvalidRequest("origin cannot be a base URL".into())
            })?;
            let _ = path.pop_if_empty().extend(segments);
        }
        let _ = url.query_pairs_mut().append_pair("uuid", &self.uuid);
        Ok(url)
    }

    /// GET `url` and decode a JSON body, retrying transient failures.
    async fn get_json(
        &self,
        op: OperationKind,
        url: Url,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let mut attempt = 0;
        loop {
            match self.get_once(url.clone(), timeout).await {
                Ok(body) => return Ok(body),
                Err(e) if self.config.retry.should_retry(attempt, &e) => {
                    let delay = self.config.retry.delay(attempt, rand::random::<f64>());
                    warn!(
                        op = %op,
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        category = e.category(),
                        error = %e,
                        "transient broker error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: Url, timeout: Duration) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut message, MAX_ERROR_BODY);
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))
    }
}

fn truncate_on_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn map_reqwest_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Transport(e.to_string())
    }
}

#[async_trait]
impl MessagingClient for PubNubClient {
    async fn publish(&self, channel: &str, message: &Message) -> Result<(), ClientError> {
        let path = protocol::publish_path(
            &self.config.publish_key,
            &self.config.subscribe_key,
            channel,
            message,
        )?;
        let url = self.endpoint(&path)?;
        let body = self
            .get_json(OperationKind::Publish, url, self.config.request_timeout)
            .await?;
        protocol::parse_publish(&body)
    }

    async fn history(&self, channel: &str, count: usize) -> Result<History, ClientError> {
        let url = self.endpoint(&protocol::history_path(
            &self.config.subscribe_key,
            channel,
            count,
        ))?;
        let body = self
            .get_json(OperationKind::FetchHistory, url, self.config.request_timeout)
            .await?;
        protocol::parse_history(body, count)
    }

    async fn subscribe(&self, channels: &ChannelSet) -> Result<Vec<Delivery>, ClientError> {
        let timetoken = self.timetoken();
        let url = self.endpoint(&protocol::subscribe_path(
            &self.config.subscribe_key,
            channels,
            &timetoken,
        ))?;
        let body = self
            .get_json(OperationKind::Subscribe, url, self.config.subscribe_timeout)
            .await?;
        let batch = protocol::parse_subscribe(body, channels)?;

        debug!(
            from = %timetoken,
            to = %batch.timetoken,
            messages = batch.deliveries.len(),
            "subscribe cycle complete"
        );
        *self.timetoken.lock() = batch.timetoken;
        Ok(batch.deliveries)
    }

    async fn unsubscribe(&self, channels: &ChannelSet) -> Result<(), ClientError> {
        let url = self.endpoint(&protocol::leave_path(&self.config.subscribe_key, channels))?;
        let body = self
            .get_json(OperationKind::Unsubscribe, url, self.config.request_timeout)
            .await?;
        protocol::parse_leave(&body)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use loopcast_core::retry::RetryPolicy;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, retry: RetryPolicy) -> PubNubConfig {
        PubNubConfig {
            origin: server.uri(),
            publish_key: "pk".into(),
            subscribe_key: "sk".into(),
            request_timeout: Duration::from_secs(5),
            subscribe_timeout: Duration::from_secs(5),
            retry,
        }
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
        }
    }

    fn channels() -> ChannelSet {
        ChannelSet::new(["my_channel", "demo_channel"]).unwrap()
    }

    #[test]
    fn rejects_non_base_origin() {
        let config = PubNubConfig {
            origin: "mailto:someone@example.com".into(),
            ..PubNubConfig::default()
        };
        assert_matches!(PubNubClient::new(config), Err(ClientError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn publish_sends_encoded_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/publish/pk/sk/0/my_channel/0/.+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, "Sent", "1"])))
            .expect(1)
            .mount(&server)
            .await;

        let client = PubNubClient::new(config_for(&server, RetryPolicy::none())).unwrap();
        client
            .publish("my_channel", &Message::new(42, "Hello, world!"))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let url = &requests[0].url;
        let last = url.path_segments().unwrap().next_back().unwrap();
        let decoded = url::form_urlencoded::parse(format!("x={last}").as_bytes())
            .next()
            .unwrap()
            .1
            .into_owned();
        assert_eq!(
            serde_json::from_str::<Value>(&decoded).unwrap(),
            json!({"num": 42, "str": "Hello, world!"})
        );
        assert!(url.query_pairs().any(|(k, v)| k == "uuid" && v == client.uuid()));
    }

    #[tokio::test]
    async fn publish_rejection_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([0, "Invalid Key", "0"])))
            .expect(1)
            .mount(&server)
            .await;

        let client = PubNubClient::new(config_for(&server, fast_retry(3))).unwrap();
        let err = client
            .publish("my_channel", &Message::new(1, "x"))
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::Rejected(_));
    }

    #[tokio::test]
    async fn history_fetches_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/sk/my_channel/0/10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"num": 1}, {"num": 2}])))
            .mount(&server)
            .await;

        let client = PubNubClient::new(config_for(&server, RetryPolicy::none())).unwrap();
        let history = client.history("my_channel", 10).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn subscribe_advances_timetoken() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscribe/sk/my_channel,demo_channel/0/0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([[], "100"])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/subscribe/sk/my_channel,demo_channel/0/100"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([[{"num": 37}], "200", "demo_channel"])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = PubNubClient::new(config_for(&server, RetryPolicy::none())).unwrap();
        let set = channels();

        assert!(client.subscribe(&set).await.unwrap().is_empty());
        assert_eq!(client.timetoken(), "100");

        let deliveries = client.subscribe(&set).await.unwrap();
        assert_eq!(deliveries, vec![Delivery::new("demo_channel", json!({"num": 37}))]);
        assert_eq!(client.timetoken(), "200");
    }

    #[tokio::test]
    async fn unsubscribe_keeps_timetoken() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscribe/sk/my_channel,demo_channel/0/0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([[], "300"])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/presence/sub_key/sk/channel/my_channel,demo_channel/leave"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 200, "action": "leave"})))
            .mount(&server)
            .await;

        let client = PubNubClient::new(config_for(&server, RetryPolicy::none())).unwrap();
        let set = channels();
        let _ = client.subscribe(&set).await.unwrap();
        client.unsubscribe(&set).await.unwrap();
        assert_eq!(client.timetoken(), "300");

        let requests = server.received_requests().await.unwrap();
        let leave = requests.last().unwrap();
        assert!(leave.url.query_pairs().any(|(k, v)| k == "uuid" && v == client.uuid()));
    }

    #[tokio::test]
    async fn transient_status_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, "Sent", "1"])))
            .mount(&server)
            .await;

        let client = PubNubClient::new(config_for(&server, fast_retry(3))).unwrap();
        client.publish("my_channel", &Message::new(1, "x")).await.unwrap();
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn retries_exhausted_returns_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = PubNubClient::new(config_for(&server, fast_retry(2))).unwrap();
        let err = client.history("my_channel", 10).await.unwrap_err();
        assert_matches!(err, ClientError::Status { status: 500, ref message } if message == "boom");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn long_non_ascii_error_body_is_cut_on_char_boundary() {
        let server = MockServer::start().await;
        let body = format!("{}{}", "a".repeat(511), "é".repeat(10));
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string(body))
            .mount(&server)
            .await;

        let client = PubNubClient::new(config_for(&server, RetryPolicy::none())).unwrap();
        let err = client
            .publish("my_channel", &Message::new(1, "x"))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            ClientError::Status { status: 403, ref message } if *message == "a".repeat(511)
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut text = String::from("Forbidden");
        truncate_on_char_boundary(&mut text, MAX_ERROR_BODY);
        assert_eq!(text, "Forbidden");

        let mut text = "ü".repeat(300);
        truncate_on_char_boundary(&mut text, MAX_ERROR_BODY);
        assert_eq!(text.len(), 512);
        assert_eq!(text.chars().count(), 256);
    }

    #[tokio::test]
    async fn request_timeout_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([[], "1"]))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut config = config_for(&server, RetryPolicy::none());
        config.subscribe_timeout = Duration::from_millis(50);
        let client = PubNubClient::new(config).unwrap();
        let err = client.subscribe(&channels()).await.unwrap_err();
        assert_matches!(err, ClientError::Timeout);
    }
}
