//! Client for the theme's AJAX endpoint.
//!
//! Every call carries an `action` and the current `nonce`. Replies come wrapped as
//! `{ "success": bool, "data": ... }`; a `new_nonce` at the top level or in `data` replaces the stored nonce.

use std::sync::Arc;

use feed::{Comment, Feed, FeedError, LikeId, LikeToggle};
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{action} rejected: {message}")]
    Rejected { action: String, message: String },
    #[error("unexpected reply to {action}: {detail}")]
    Malformed { action: String, detail: String },
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthReply {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    endpoint: Url,
    nonce: Arc<RwLock<String>>,
}

impl ApiClient {
    pub fn new(endpoint: &str, nonce: impl Into<String>) -> Result<Self, ApiError> {
        let http = Client::builder().cookie_store(true).build()?;
        Self::with_client(http, endpoint, nonce)
    }

    pub fn with_client(http: Client, endpoint: &str, nonce: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self { http, endpoint: Url::parse(endpoint)?, nonce: Arc::new(RwLock::new(nonce.into())) })
    }

    pub fn nonce(&self) -> String { self.nonce.read().clone() }

    pub fn set_nonce(&self, nonce: impl Into<String>) { *self.nonce.write() = nonce.into(); }

    async fn post(&self, action: &str, fields: &[(&str, &str)]) -> Result<Value, ApiError> {
        let nonce = self.nonce();
        let mut form = vec![("action", action), ("nonce", nonce.as_str())];
        form.extend_from_slice(fields);
        debug!(action, "POST");
        let resp = self.http.post(self.endpoint.clone()).form(&form).send().await?;
        self.read_body(action, resp).await
    }

    async fn get(&self, action: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        let nonce = self.nonce();
        let mut params = vec![("action", action), ("nonce", nonce.as_str())];
        params.extend_from_slice(query);
        debug!(action, "GET");
        let resp = self.http.get(self.endpoint.clone()).query(&params).send().await?;
        self.read_body(action, resp).await
    }

    // Error replies keep the envelope and carry a 4xx/5xx status, so the body is read regardless.
    async fn read_body(&self, action: &str, resp: reqwest::Response) -> Result<Value, ApiError> {
        let status = resp.status();
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Malformed {
            action: action.to_string(),
            detail: format!("status {status}: {e}"),
        })
    }

    /// Unwraps `{success, data}`, rotating the nonce when the reply carries a new one.
    fn open_envelope(&self, action: &str, body: Value) -> Result<Value, ApiError> {
        let Value::Object(mut obj) = body else {
            return Err(ApiError::Malformed { action: action.into(), detail: "reply is not an object".into() });
        };
        let success = obj.get("success").and_then(Value::as_bool).unwrap_or(false);
        let data = obj.remove("data").unwrap_or(Value::Null);
        let fresh = obj.get("new_nonce").or_else(|| data.get("new_nonce")).and_then(Value::as_str);
        if let Some(fresh) = fresh {
            debug!(action, "nonce rotated by reply");
            self.set_nonce(fresh);
        }
        if !success {
            let message = data.get("message").and_then(Value::as_str).unwrap_or("request failed").to_string();
            warn!(action, %message, "server rejected request");
            return Err(ApiError::Rejected { action: action.into(), message });
        }
        Ok(data)
    }

    async fn call(&self, action: &str, fields: &[(&str, &str)]) -> Result<Value, ApiError> {
        let body = self.post(action, fields).await?;
        self.open_envelope(action, body)
    }

    pub async fn slides(&self) -> Result<Feed, ApiError> {
        let data = self.call("tt_get_slides_data_ajax", &[]).await?;
        Ok(Feed::from_value(data)?)
    }

    pub async fn toggle_like(&self, like_id: &LikeId) -> Result<LikeToggle, ApiError> {
        let action = "toggle_like";
        let data = self.call(action, &[("post_id", like_id.as_str())]).await?;
        serde_json::from_value(data).map_err(|e| ApiError::Malformed { action: action.into(), detail: e.to_string() })
    }

    pub async fn comments(&self, like_id: &LikeId) -> Result<Vec<Comment>, ApiError> {
        let action = "tt_get_comments";
        let body = self.get(action, &[("post_id", like_id.as_str())]).await?;
        let data = self.open_envelope(action, body)?;
        serde_json::from_value(data).map_err(|e| ApiError::Malformed { action: action.into(), detail: e.to_string() })
    }

    /// Returns the post's new comment count.
    pub async fn add_comment(&self, like_id: &LikeId, text: &str) -> Result<u64, ApiError> {
        let action = "tt_add_comment";
        let data = self.call(action, &[("post_id", like_id.as_str()), ("comment", text)]).await?;
        count_field(&data, "newCount")
            .ok_or_else(|| ApiError::Malformed { action: action.into(), detail: "missing newCount".into() })
    }

    pub async fn login(&self, user: &str, password: &str) -> Result<AuthReply, ApiError> {
        self.auth("tt_ajax_login", &[("log", user), ("pwd", password)]).await
    }

    pub async fn logout(&self) -> Result<AuthReply, ApiError> { self.auth("tt_ajax_logout", &[]).await }

    // A refused login is an answer, not an error.
    async fn auth(&self, action: &str, fields: &[(&str, &str)]) -> Result<AuthReply, ApiError> {
        let reply = match self.call(action, fields).await {
            Ok(data) => AuthReply { success: true, message: message_of(&data) },
            Err(ApiError::Rejected { message, .. }) => return Ok(AuthReply { success: false, message }),
            Err(e) => return Err(e),
        };
        // Login state changed server-side; the old nonce no longer validates.
        self.refresh_nonce().await?;
        info!(action, "authentication state changed");
        Ok(reply)
    }

    /// The refresh endpoint answers with a bare `{success, nonce}`.
    pub async fn refresh_nonce(&self) -> Result<String, ApiError> {
        let action = "tt_refresh_nonce";
        let body = self.post(action, &[]).await?;
        let nonce = body
            .get("success")
            .and_then(Value::as_bool)
            .filter(|ok| *ok)
            .and_then(|_| body.get("nonce"))
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::Malformed { action: action.into(), detail: "no nonce in reply".into() })?;
        self.set_nonce(nonce);
        debug!("nonce refreshed");
        Ok(nonce.to_string())
    }
}

fn message_of(data: &Value) -> String {
    data.get("message").and_then(Value::as_str).unwrap_or_default().to_string()
}

fn count_field(data: &Value, key: &str) -> Option<u64> {
    match data.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed::LikeStatus;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    async fn read_request(sock: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 2048];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 { break; }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let len = text[..end]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len { break; }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Answers one connection per canned body and hands back the raw requests.
    async fn serve(bodies: Vec<Value>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let mut seen = Vec::new();
            for body in bodies {
                let (mut sock, _) = listener.accept().await.unwrap();
                seen.push(read_request(&mut sock).await);
                let body = body.to_string();
                let resp = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                sock.write_all(resp.as_bytes()).await.unwrap();
                let _ = sock.shutdown().await;
            }
            seen
        });
        (format!("http://{addr}/wp-admin/admin-ajax.php"), task)
    }

    #[tokio::test]
    async fn toggle_like_sends_action_nonce_and_post_id() {
        let (url, server) = serve(vec![json!({ "success": true, "data": { "status": "liked", "count": 11 } })]).await;
        let client = ApiClient::new(&url, "abc").unwrap();
        let toggle = client.toggle_like(&LikeId::new("42")).await.unwrap();
        assert_eq!(toggle, LikeToggle { status: LikeStatus::Liked, count: 11 });
        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("POST /wp-admin/admin-ajax.php"));
        assert!(requests[0].contains("action=toggle_like&nonce=abc&post_id=42"));
    }

    #[tokio::test]
    async fn rejected_reply_carries_server_message() {
        let (url, server) = serve(vec![json!({ "success": false, "data": { "message": "login required" } })]).await;
        let client = ApiClient::new(&url, "abc").unwrap();
        let err = client.add_comment(&LikeId::new("7"), "hi").await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected { ref message, .. } if message == "login required"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn comments_are_fetched_with_get() {
        let (url, server) = serve(vec![json!({ "success": true, "data": [
            { "id": "3", "text": "hey", "author": "ana", "avatar": "", "timestamp": "2024-05-01 12:00:00", "isOwnComment": true }
        ] })])
        .await;
        let client = ApiClient::new(&url, "abc").unwrap();
        let comments = client.comments(&LikeId::new("7")).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].id, 3);
        assert!(comments[0].is_own_comment);
        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /wp-admin/admin-ajax.php?action=tt_get_comments&nonce=abc&post_id=7"));
    }

    #[tokio::test]
    async fn successful_login_refreshes_the_nonce() {
        let (url, server) = serve(vec![
            json!({ "success": true, "data": { "message": "welcome" } }),
            json!({ "success": true, "nonce": "n2" }),
        ])
        .await;
        let client = ApiClient::new(&url, "n1").unwrap();
        let reply = client.login("ana", "secret").await.unwrap();
        assert_eq!(reply, AuthReply { success: true, message: "welcome".into() });
        assert_eq!(client.nonce(), "n2");
        let requests = server.await.unwrap();
        assert!(requests[0].contains("log=ana&pwd=secret"));
        assert!(requests[1].contains("action=tt_refresh_nonce&nonce=n1"));
    }

    #[tokio::test]
    async fn failed_login_is_a_reply_not_an_error() {
        let (url, server) = serve(vec![json!({ "success": false, "data": { "message": "bad credentials" } })]).await;
        let client = ApiClient::new(&url, "n1").unwrap();
        let reply = client.login("ana", "nope").await.unwrap();
        assert!(!reply.success);
        assert_eq!(reply.message, "bad credentials");
        assert_eq!(client.nonce(), "n1");
        server.await.unwrap();
    }

    #[test]
    fn envelope_rotates_nonce_and_unwraps_data() {
        let client = ApiClient::new("http://localhost/ajax", "old").unwrap();
        let data = client
            .open_envelope("x", json!({ "success": true, "data": { "newCount": "5", "new_nonce": "fresh" } }))
            .unwrap();
        assert_eq!(count_field(&data, "newCount"), Some(5));
        assert_eq!(client.nonce(), "fresh");
        assert!(matches!(client.open_envelope("x", json!([1])), Err(ApiError::Malformed { .. })));
    }

    #[test]
    fn top_level_nonce_rotates_even_on_rejection() {
        let client = ApiClient::new("http://localhost/ajax", "old").unwrap();
        let data = client.open_envelope("x", json!({ "success": true, "new_nonce": "top", "data": [] })).unwrap();
        assert_eq!(data, json!([]));
        assert_eq!(client.nonce(), "top");
        let err = client
            .open_envelope("x", json!({ "success": false, "new_nonce": "again", "data": { "message": "expired" } }))
            .unwrap_err();
        assert!(matches!(err, ApiError::Rejected { ref message, .. } if message == "expired"));
        assert_eq!(client.nonce(), "again");
    }
}
