//! HTTP adapter for the Twitter v2 filtered-stream API.
//!
//! One [`TwitterClient`] implements all three remote traits. The stream is
//! newline-delimited JSON with blank keep-alive lines; [`LineDecoder`] splits
//! the byte stream into frames.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use tweetwatch_core::{Author, EntityId, EventId, Handle, Rule, RuleId, StreamEvent};

use crate::client::{EventSource, RuleClient, StreamClient, StreamRequest, UserDirectory};
use crate::error::{Result, StreamError};

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";

/// Frames longer than this without a newline abort the connection.
const MAX_FRAME_LEN: usize = 1 << 20;

/// Connection settings.
#[derive(Clone)]
pub struct TwitterConfig {
    pub bearer_token: String,
    pub api_base: String,
    /// Total timeout for rule and user requests.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// The stream is considered stalled after this long without any bytes,
    /// keep-alives included.
    pub idle_timeout: Duration,
}

impl TwitterConfig {
    pub fn new(bearer_token: impl Into<String>) -> Self {
        Self {
            bearer_token: bearer_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(90),
        }
    }
}

impl fmt::Debug for TwitterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitterConfig")
            .field("bearer_token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

/// Twitter v2 client.
#[derive(Clone)]
pub struct TwitterClient {
    /// For short requests; has a total timeout.
    http: Client,
    /// For the stream; only the connect phase is bounded.
    stream_http: Client,
    config: TwitterConfig,
}

impl TwitterClient {
    pub fn new(config: TwitterConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StreamError::RemoteUnavailable(format!("failed to build HTTP client: {}", e)))?;
        let stream_http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StreamError::RemoteUnavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            stream_http,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn rules_url(&self) -> String {
        self.url("/2/tweets/search/stream/rules")
    }
}

// ─────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiError {
    title: Option<String>,
    detail: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    value: Option<String>,
    #[serde(default)]
    details: Vec<String>,
    disconnect_type: Option<String>,
}

impl ApiError {
    fn is_disconnect(&self) -> bool {
        self.disconnect_type.is_some()
            || self.title.as_deref() == Some("operational-disconnect")
            || self
                .kind
                .as_deref()
                .map_or(false, |k| k.ends_with("/operational-disconnect"))
    }

    fn is_not_found(&self) -> bool {
        self.kind
            .as_deref()
            .map_or(false, |k| k.ends_with("/resource-not-found"))
            || self.title.as_deref() == Some("Not Found Error")
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title.as_deref().unwrap_or("error"))?;
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        if !self.details.is_empty() {
            write!(f, ": {}", self.details.join("; "))?;
        }
        if let Some(value) = &self.value {
            write!(f, " ({})", value)?;
        }
        Ok(())
    }
}

fn describe(errors: &[ApiError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Deserialize)]
struct WireRule {
    id: RuleId,
    value: String,
}

impl From<WireRule> for Rule {
    fn from(wire: WireRule) -> Self {
        Rule::remote(wire.id, wire.value)
    }
}

#[derive(Debug, Deserialize)]
struct RulesResponse {
    #[serde(default)]
    data: Vec<WireRule>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Serialize)]
struct NewRule<'a> {
    value: &'a str,
}

#[derive(Serialize)]
struct AddRules<'a> {
    add: [NewRule<'a>; 1],
}

#[derive(Serialize)]
struct DeleteIds<'a> {
    ids: &'a [RuleId],
}

#[derive(Serialize)]
struct DeleteRules<'a> {
    delete: DeleteIds<'a>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: EntityId,
    username: String,
    name: Option<String>,
    profile_image_url: Option<String>,
}

impl From<WireUser> for Author {
    fn from(user: WireUser) -> Self {
        Author {
            id: user.id,
            handle: Handle::new(&user.username).ok(),
            name: user.name,
            profile_image_url: user.profile_image_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: Option<WireUser>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct WireTweet {
    id: EventId,
    text: String,
    author_id: Option<EntityId>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<WireUser>,
}

#[derive(Debug, Deserialize)]
struct MatchingRule {
    id: RuleId,
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    data: Option<WireTweet>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    matching_rules: Vec<MatchingRule>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

// ─────────────────────────────────────────────────────────────────────
// Response handling
// ─────────────────────────────────────────────────────────────────────

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

fn request_error(e: reqwest::Error) -> StreamError {
    if e.is_timeout() {
        StreamError::Timeout(e.to_string())
    } else {
        StreamError::RemoteUnavailable(e.to_string())
    }
}

/// Map non-success statuses. Rate limits and server errors are transient.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = format!("{} {}", status, truncate(&body, 320));
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(StreamError::RemoteUnavailable(detail))
    } else {
        Err(StreamError::Rejected(detail))
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    let response = check_status(response).await?;
    response
        .json()
        .await
        .map_err(|e| StreamError::Malformed(e.to_string()))
}

#[async_trait]
impl RuleClient for TwitterClient {
    async fn get_rules(&self) -> Result<Vec<Rule>> {
        let response = self
            .http
            .get(self.rules_url())
            .bearer_auth(&self.config.bearer_token)
            .send()
            .await
            .map_err(request_error)?;

        let body: RulesResponse = read_json(response).await?;
        if body.data.is_empty() && !body.errors.is_empty() {
            return Err(StreamError::Rejected(describe(&body.errors)));
        }
        Ok(body.data.into_iter().map(Rule::from).collect())
    }

    async fn add_rules(&self, expression: &str) -> Result<Rule> {
        let request = AddRules {
            add: [NewRule { value: expression }],
        };
        let response = self
            .http
            .post(self.rules_url())
            .bearer_auth(&self.config.bearer_token)
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        let body: RulesResponse = read_json(response).await?;
        match body.data.into_iter().next() {
            Some(rule) => Ok(rule.into()),
            None if !body.errors.is_empty() => Err(StreamError::Rejected(describe(&body.errors))),
            None => Err(StreamError::Malformed("rule creation returned no rule".into())),
        }
    }

    async fn delete_rules(&self, ids: &[RuleId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let request = DeleteRules {
            delete: DeleteIds { ids },
        };
        let response = self
            .http
            .post(self.rules_url())
            .bearer_auth(&self.config.bearer_token)
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        let body: RulesResponse = read_json(response).await?;
        if !body.errors.is_empty() {
            tracing::warn!(errors = %describe(&body.errors), "rule deletion reported errors");
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for TwitterClient {
    async fn resolve(&self, handle: &Handle) -> Result<Option<EntityId>> {
        let url = self.url(&format!("/2/users/by/username/{}", handle));
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.config.bearer_token)
            .send()
            .await
            .map_err(request_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: UserResponse = read_json(response).await?;
        match body.data {
            Some(user) => Ok(Some(user.id)),
            None if body.errors.iter().any(ApiError::is_not_found) => Ok(None),
            None => Err(StreamError::Malformed(format!(
                "user lookup for {} returned no data: {}",
                handle,
                describe(&body.errors)
            ))),
        }
    }
}

#[async_trait]
impl StreamClient for TwitterClient {
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn EventSource>> {
        let query: Vec<(&str, String)> = [
            ("expansions", &request.expansions),
            ("user.fields", &request.user_fields),
            ("tweet.fields", &request.tweet_fields),
        ]
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(key, values)| (key, values.join(",")))
        .collect();

        let response = self
            .stream_http
            .get(self.url("/2/tweets/search/stream"))
            .bearer_auth(&self.config.bearer_token)
            .query(&query)
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response).await?;

        tracing::debug!(status = %response.status(), "stream connection opened");
        Ok(Box::new(TwitterEventSource::new(
            response.bytes_stream(),
            self.config.idle_timeout,
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Stream decoding
// ─────────────────────────────────────────────────────────────────────

/// Splits a byte stream into newline-terminated lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// The next complete line, without its `\n` or `\r\n` terminator.
    pub fn next_line(&mut self) -> Option<Bytes> {
        let newline = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line = self.buffer.split_to(newline + 1);
        line.truncate(newline);
        if line.last() == Some(&b'\r') {
            line.truncate(newline - 1);
        }
        Some(line.freeze())
    }

    /// Bytes buffered without a terminator yet.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// What a single stream line means.
#[derive(Debug)]
enum Frame {
    Event(StreamEvent),
    /// The remote announced it is closing the connection.
    Disconnect(String),
    /// Keep-alive or a frame we cannot use.
    Skip(Option<String>),
}

fn decode_frame(line: &[u8]) -> Frame {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Frame::Skip(None);
    }

    let payload: StreamPayload = match serde_json::from_slice(line) {
        Ok(payload) => payload,
        Err(e) => return Frame::Skip(Some(format!("invalid JSON: {}", e))),
    };

    if let Some(tweet) = payload.data {
        return match into_event(tweet, payload.includes, payload.matching_rules) {
            Some(event) => Frame::Event(event),
            None => Frame::Skip(Some("post without author".into())),
        };
    }

    if payload.errors.iter().any(ApiError::is_disconnect) {
        return Frame::Disconnect(describe(&payload.errors));
    }
    Frame::Skip(Some(if payload.errors.is_empty() {
        "frame without data".into()
    } else {
        describe(&payload.errors)
    }))
}

fn into_event(
    tweet: WireTweet,
    includes: Includes,
    matching_rules: Vec<MatchingRule>,
) -> Option<StreamEvent> {
    // Expanded users may include mentions, so the author is never guessed.
    let author_id = tweet.author_id?;
    let mut users = includes.users;

    let author: Option<Author> = match users.iter().position(|u| u.id == author_id) {
        Some(index) => Some(users.swap_remove(index).into()),
        None => None,
    };

    let mut event = StreamEvent::new(
        tweet.id,
        author_id,
        tweet.text,
        tweet.created_at.unwrap_or_else(Utc::now),
    );
    event.author = author;
    event.matching_rules = matching_rules.into_iter().map(|r| r.id).collect();
    Some(event)
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// A live stream connection.
pub struct TwitterEventSource {
    body: Option<ByteStream>,
    decoder: LineDecoder,
    idle_timeout: Duration,
}

impl TwitterEventSource {
    fn new<S>(body: S, idle_timeout: Duration) -> Self
    where
        S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    {
        Self {
            body: Some(Box::pin(body)),
            decoder: LineDecoder::new(),
            idle_timeout,
        }
    }
}

#[async_trait]
impl EventSource for TwitterEventSource {
    async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        loop {
            while let Some(line) = self.decoder.next_line() {
                match decode_frame(&line) {
                    Frame::Event(event) => return Ok(Some(event)),
                    Frame::Disconnect(reason) => {
                        self.body = None;
                        return Err(StreamError::RemoteUnavailable(reason));
                    }
                    Frame::Skip(None) => tracing::trace!("keep-alive"),
                    Frame::Skip(Some(reason)) => {
                        tracing::warn!(reason = %reason, "skipping stream frame")
                    }
                }
            }

            if self.decoder.pending() > MAX_FRAME_LEN {
                self.body = None;
                return Err(StreamError::Malformed(format!(
                    "frame exceeds {} bytes",
                    MAX_FRAME_LEN
                )));
            }

            let Some(body) = self.body.as_mut() else {
                return Ok(None);
            };

            match tokio::time::timeout(self.idle_timeout, body.next()).await {
                Err(_) => {
                    self.body = None;
                    return Err(StreamError::Timeout(format!(
                        "no data for {:?}",
                        self.idle_timeout
                    )));
                }
                Ok(None) => {
                    self.body = None;
                    return Ok(None);
                }
                Ok(Some(Err(e))) => {
                    self.body = None;
                    return Err(request_error(e));
                }
                Ok(Some(Ok(chunk))) => self.decoder.push(&chunk),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.body = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RULES_PATH: &str = "/2/tweets/search/stream/rules";

    fn client(server: &MockServer) -> TwitterClient {
        let mut config = TwitterConfig::new("secret");
        config.api_base = server.uri();
        TwitterClient::new(config).unwrap()
    }

    #[test]
    fn test_line_decoder_handles_split_chunks() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"{\"a\":");
        assert!(decoder.next_line().is_none());

        decoder.push(b"1}\r\n\r\n{\"b\"");
        assert_eq!(decoder.next_line().unwrap().as_ref(), b"{\"a\":1}");
        assert_eq!(decoder.next_line().unwrap().as_ref(), b"");
        assert!(decoder.next_line().is_none());
        assert_eq!(decoder.pending(), 4);
    }

    #[test]
    fn test_decode_frame_event_with_author() {
        let line = json!({
            "data": {
                "id": "1600",
                "text": "Rust 1.80 is out",
                "author_id": "42",
                "created_at": "2024-07-25T15:00:00.000Z"
            },
            "includes": {
                "users": [
                    {"id": "7", "username": "someone"},
                    {"id": "42", "username": "rustlang", "name": "Rust", "profile_image_url": "https://img"}
                ]
            },
            "matching_rules": [{"id": "9", "tag": ""}]
        })
        .to_string();

        let Frame::Event(event) = decode_frame(line.as_bytes()) else {
            panic!("expected an event");
        };
        assert_eq!(event.author_id, EntityId::new("42"));
        assert_eq!(event.author_handle().unwrap().as_str(), "rustlang");
        assert_eq!(event.matching_rules, vec![RuleId::new("9")]);
        assert_eq!(
            event.url().unwrap(),
            "https://twitter.com/rustlang/status/1600"
        );
    }

    #[test]
    fn test_decode_frame_without_author_id_is_skipped() {
        let line = json!({
            "data": {"id": "1601", "text": "hi @someone"},
            "includes": {"users": [{"id": "7", "username": "someone"}]}
        })
        .to_string();

        assert!(matches!(
            decode_frame(line.as_bytes()),
            Frame::Skip(Some(reason)) if reason == "post without author"
        ));
    }

    #[test]
    fn test_decode_frame_disconnect_and_garbage() {
        let disconnect = json!({
            "errors": [{
                "title": "operational-disconnect",
                "disconnect_type": "UpstreamOperationalDisconnect",
                "detail": "This stream has been disconnected upstream for operational reasons.",
                "type": "https://api.twitter.com/2/problems/operational-disconnect"
            }]
        })
        .to_string();
        assert!(matches!(
            decode_frame(disconnect.as_bytes()),
            Frame::Disconnect(_)
        ));

        assert!(matches!(decode_frame(b"not json"), Frame::Skip(Some(_))));
        assert!(matches!(decode_frame(b"  "), Frame::Skip(None)));
    }

    #[tokio::test]
    async fn test_get_rules() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(RULES_PATH))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"id": "1", "value": "from:ann OR from:bob"},
                    {"id": "2", "value": "from:carl"}
                ],
                "meta": {"result_count": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rules = client(&server).get_rules().await.unwrap();
        assert_eq!(
            rules,
            vec![
                Rule::remote(RuleId::new("1"), "from:ann OR from:bob"),
                Rule::remote(RuleId::new("2"), "from:carl"),
            ]
        );
    }

    #[tokio::test]
    async fn test_get_rules_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(RULES_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"meta": {"result_count": 0}})),
            )
            .mount(&server)
            .await;

        assert!(client(&server).get_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_rule() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(RULES_PATH))
            .and(body_json(json!({"add": [{"value": "from:ann"}]})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": [{"id": "77", "value": "from:ann"}],
                "meta": {"summary": {"created": 1, "not_created": 0}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rule = client(&server).add_rules("from:ann").await.unwrap();
        assert_eq!(rule, Rule::remote(RuleId::new("77"), "from:ann"));
    }

    #[tokio::test]
    async fn test_add_rule_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(RULES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{
                    "value": "from:ann",
                    "details": ["Rule value exceeds maximum length"],
                    "title": "Invalid Rule",
                    "type": "https://api.twitter.com/2/problems/invalid-rules"
                }],
                "meta": {"summary": {"created": 0, "invalid": 1}}
            })))
            .mount(&server)
            .await;

        let err = client(&server).add_rules("from:ann").await.unwrap_err();
        assert!(matches!(err, StreamError::Rejected(ref m) if m.contains("Invalid Rule")));
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(RULES_PATH))
            .and(body_json(json!({"delete": {"ids": ["1", "2"]}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"summary": {"deleted": 2, "not_deleted": 0}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        client
            .delete_rules(&[RuleId::new("1"), RuleId::new("2")])
            .await
            .unwrap();
        client.delete_rules(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(RULES_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("over capacity"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(RULES_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(matches!(
            client.get_rules().await,
            Err(StreamError::RemoteUnavailable(_))
        ));
        assert!(matches!(
            client.add_rules("from:ann").await,
            Err(StreamError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/users/by/username/rustlang"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"id": "165262", "name": "Rust", "username": "rustlang"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2/users/by/username/ghost"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{
                    "value": "ghost",
                    "detail": "Could not find user with username: [ghost].",
                    "title": "Not Found Error",
                    "type": "https://api.twitter.com/2/problems/resource-not-found"
                }]
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(
            client
                .resolve(&Handle::new("rustlang").unwrap())
                .await
                .unwrap(),
            Some(EntityId::new("165262"))
        );
        assert_eq!(
            client.resolve(&Handle::new("ghost").unwrap()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_stream_reads_events_until_close() {
        let server = MockServer::start().await;
        let event = json!({
            "data": {"id": "1", "text": "hello", "author_id": "42"},
            "includes": {"users": [{"id": "42", "username": "ann"}]}
        });
        let body = format!("\r\n{}\r\n\r\n", event);

        Mock::given(method("GET"))
            .and(path("/2/tweets/search/stream"))
            .and(query_param("expansions", "author_id"))
            .and(query_param("user.fields", "username,name,profile_image_url"))
            .and(query_param("tweet.fields", "created_at"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let mut source = client(&server)
            .open(&StreamRequest::default())
            .await
            .unwrap();

        let first = source.next_event().await.unwrap().unwrap();
        assert_eq!(first.text, "hello");
        assert_eq!(first.author_handle().unwrap().as_str(), "ann");

        assert!(source.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_open_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/tweets/search/stream"))
            .respond_with(ResponseTemplate::new(429).set_body_string("TooManyConnections"))
            .mount(&server)
            .await;

        let result = client(&server).open(&StreamRequest::default()).await;
        assert!(matches!(result, Err(StreamError::RemoteUnavailable(_))));
    }
}
