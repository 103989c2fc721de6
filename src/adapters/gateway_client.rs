use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::ports::{ChallengeCompleter, CompleterError, Completion, CompletionRequest};

pub const COMPLETE_CHALLENGE_PATH: &str = "/payment/v2/3dsecure/auth";
const DEFAULT_DECLINE_CODE: &str = "GATEWAY_DECLINED";

/// Gateway reply to a challenge completion.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionResponse {
    status: String,
    error_code: Option<Value>,
    error_message: Option<String>,
    auth_code: Option<String>,
}

/// HTTP client for the gateway's "finish 3-D Secure challenge" call
#[derive(Clone)]
pub struct HttpChallengeCompleter {
    client: Client,
    base_url: String,
    api_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HttpChallengeCompleter {
    /// Creates a completer with the default circuit breaker (3 failures, 60-120s open)
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Self {
        Self::with_circuit_breaker(base_url, api_key, timeout, 3, 60)
    }

    /// Creates a completer with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        api_key: String,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        HttpChallengeCompleter {
            client,
            base_url,
            api_key,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }
}

#[async_trait]
impl ChallengeCompleter for HttpChallengeCompleter {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompleterError> {
        let url = format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            COMPLETE_CHALLENGE_PATH
        );
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let body = json!({
            "locale": "en",
            "conversationId": request.conversation_id,
            "paymentId": request.payment_id,
            "conversationData": request.conversation_data,
        });

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .header("x-api-key", api_key)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| {
                        if e.is_timeout() {
                            CompleterError::Timeout
                        } else {
                            CompleterError::Transport(e.to_string())
                        }
                    })?;

                let status = response.status();
                if status.is_server_error() {
                    return Err(CompleterError::Transport(format!(
                        "gateway returned {}",
                        status
                    )));
                }

                let raw = response
                    .json::<Value>()
                    .await
                    .map_err(|e| CompleterError::InvalidResponse(e.to_string()))?;
                Ok(raw)
            })
            .await;

        let raw = match result {
            Ok(raw) => raw,
            Err(FailsafeError::Rejected) => {
                return Err(CompleterError::CircuitOpen(
                    "gateway circuit breaker is open".to_string(),
                ))
            }
            Err(FailsafeError::Inner(e)) => return Err(e),
        };

        let parsed: CompletionResponse = serde_json::from_value(raw.clone())
            .map_err(|e| CompleterError::InvalidResponse(e.to_string()))?;

        if parsed.status.eq_ignore_ascii_case("success") {
            return Ok(Completion::Approved {
                auth_code: parsed.auth_code,
                raw,
            });
        }

        let error_code = match parsed.error_code {
            Some(Value::String(code)) if !code.is_empty() => code,
            Some(Value::Number(code)) => code.to_string(),
            _ => DEFAULT_DECLINE_CODE.to_string(),
        };
        Ok(Completion::Declined {
            error_code,
            error_message: parsed
                .error_message
                .unwrap_or_else(|| "Payment declined by gateway".to_string()),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            payment_id: "pay-1".to_string(),
            conversation_id: "conv-1".to_string(),
            conversation_data: None,
        }
    }

    #[test]
    fn test_circuit_breaker_state() {
        let client = HttpChallengeCompleter::new(
            "https://sandbox-api.example.com".to_string(),
            "key".to_string(),
            Duration::from_secs(5),
        );
        assert_eq!(client.circuit_state(), "closed");
    }

    #[tokio::test]
    async fn test_complete_approved() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", COMPLETE_CHALLENGE_PATH)
            .match_header("x-api-key", "key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "paymentId": "pay-1",
                "conversationId": "conv-1"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"success","paymentId":"pay-1","authCode":"A1B2"}"#)
            .create_async()
            .await;

        let client =
            HttpChallengeCompleter::new(server.url(), "key".to_string(), Duration::from_secs(5));
        let completion = client.complete(&request()).await.unwrap();

        match completion {
            Completion::Approved { auth_code, raw } => {
                assert_eq!(auth_code.as_deref(), Some("A1B2"));
                assert_eq!(raw["paymentId"], "pay-1");
            }
            other => panic!("expected approval, got {:?}", other),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_declined() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", COMPLETE_CHALLENGE_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"failure","errorCode":10051,"errorMessage":"Insufficient funds"}"#)
            .create_async()
            .await;

        let client =
            HttpChallengeCompleter::new(server.url(), "key".to_string(), Duration::from_secs(5));
        let completion = client.complete(&request()).await.unwrap();

        assert!(matches!(
            completion,
            Completion::Declined { ref error_code, ref error_message, .. }
                if error_code == "10051" && error_message == "Insufficient funds"
        ));
    }

    #[tokio::test]
    async fn test_non_json_response_is_invalid() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", COMPLETE_CHALLENGE_PATH)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client =
            HttpChallengeCompleter::new(server.url(), "key".to_string(), Duration::from_secs(5));
        let result = client.complete(&request()).await;

        assert!(matches!(result, Err(CompleterError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", COMPLETE_CHALLENGE_PATH)
            .with_status(500)
            .expect_at_least(2)
            .create_async()
            .await;

        let client = HttpChallengeCompleter::with_circuit_breaker(
            server.url(),
            "key".to_string(),
            Duration::from_secs(5),
            2,
            60,
        );

        for _ in 0..2 {
            let result = client.complete(&request()).await;
            assert!(matches!(result, Err(CompleterError::Transport(_))));
        }

        let result = client.complete(&request()).await;
        assert!(matches!(result, Err(CompleterError::CircuitOpen(_))));
        assert_eq!(client.circuit_state(), "open");
    }
}
