//! Message transport seam.
//!
//! The delivery sender only sees [`MessageTransport`] and the classified
//! [`SendOutcome`]; the Telegram Bot API implementation lives behind it so
//! tests can substitute a mock.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Classified result of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Message accepted by the transport.
    Sent,
    /// Transport asked to retry after the given number of seconds.
    RateLimited { retry_after_secs: u64 },
    /// Recipient has blocked the sender.
    Blocked,
    /// Malformed request or bad recipient reference; not transient.
    BadRequest(String),
    /// Transient network or timeout error.
    Network(String),
    /// Any other transport-level error.
    Other(String),
}

/// One-shot message delivery to a chat recipient.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> SendOutcome;
}

/// Telegram Bot API transport.
pub struct TelegramTransport {
    client: reqwest::Client,
    token: String,
}

impl TelegramTransport {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
        }
    }

    fn send_url(&self) -> String {
        format!("https://api.telegram.org/bot{}/sendMessage", self.token)
    }
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    async fn send(&self, chat_id: i64, text: &str) -> SendOutcome {
        let body = json!({
            "chat_id": chat_id,
            "text": text,
        });

        let resp = match self.client.post(self.send_url()).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => return SendOutcome::Network(e.to_string()),
        };

        let status = resp.status();
        let payload: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => return SendOutcome::Network(e.to_string()),
        };

        if payload.get("ok").and_then(|v| v.as_bool()) == Some(true) {
            debug!(chat_id, "message accepted by transport");
            return SendOutcome::Sent;
        }

        let description = payload
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
            .to_string();

        match status.as_u16() {
            429 => {
                let retry_after_secs = payload
                    .pointer("/parameters/retry_after")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(1);
                SendOutcome::RateLimited { retry_after_secs }
            }
            403 => SendOutcome::Blocked,
            400 => SendOutcome::BadRequest(description),
            _ => SendOutcome::Other(description),
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Scripted transport: pops one outcome per send, records every call.
    pub struct MockTransport {
        outcomes: Mutex<Vec<SendOutcome>>,
        pub calls: Mutex<Vec<(i64, String)>>,
    }

    impl MockTransport {
        /// `outcomes` are consumed in order; once exhausted, every further
        /// send reports `Sent`.
        pub fn new(outcomes: Vec<SendOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageTransport for MockTransport {
        async fn send(&self, chat_id: i64, text: &str) -> SendOutcome {
            self.calls.lock().unwrap().push((chat_id, text.to_string()));
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                SendOutcome::Sent
            } else {
                outcomes.remove(0)
            }
        }
    }
}
