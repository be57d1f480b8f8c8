use std::thread;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) attempts: usize,
    pub(crate) retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(6),
            attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Same timeouts, no retries. Used for non-idempotent writes.
    pub(crate) fn single_attempt(self) -> Self {
        Self {
            attempts: 1,
            ..self
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum HttpError {
    #[error("request failed after {attempts} attempt(s): HTTP status {status}{}", body_suffix(.body))]
    Status {
        status: u16,
        body: String,
        attempts: usize,
    },
    #[error("request failed after {attempts} attempt(s): transport error: {message}")]
    Transport { message: String, attempts: usize },
    #[error("request failed: response decode failed: {0}")]
    Decode(String),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" ({body})")
    }
}

fn should_retry_http_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

pub(crate) fn send_with_retries(
    method: Method,
    url: &str,
    query: &[(String, String)],
    json_body: Option<&str>,
    policy: RetryPolicy,
) -> Result<String, HttpError> {
    let attempts = policy.attempts.max(1);
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(policy.connect_timeout)
        .timeout_read(policy.read_timeout)
        .timeout_write(policy.read_timeout)
        .build();

    for attempt in 1..=attempts {
        let mut request = agent
            .request(method.as_str(), url)
            .set("Accept", "application/json");
        for (key, value) in query {
            request = request.query(key, value);
        }

        let result = match json_body {
            Some(body) => request
                .set("Content-Type", "application/json")
                .send_string(body),
            None => request.call(),
        };

        match result {
            Ok(response) => {
                return response
                    .into_string()
                    .map_err(|err| HttpError::Decode(err.to_string()));
            }
            Err(ureq::Error::Status(status, response)) => {
                let response_body = response.into_string().ok().unwrap_or_default();
                let body = response_body.trim().chars().take(240).collect::<String>();

                if should_retry_http_status(status) && attempt < attempts {
                    tracing::debug!(status, attempt, url, "retrying after retryable status");
                    thread::sleep(policy.retry_delay);
                    continue;
                }
                return Err(HttpError::Status {
                    status,
                    body,
                    attempts: attempt,
                });
            }
            Err(ureq::Error::Transport(err)) => {
                if attempt < attempts {
                    tracing::debug!(attempt, url, error = %err, "retrying after transport error");
                    thread::sleep(policy.retry_delay);
                    continue;
                }
                return Err(HttpError::Transport {
                    message: err.to_string(),
                    attempts: attempt,
                });
            }
        }
    }

    Err(HttpError::Transport {
        message: "exhausted attempts without a concrete error".to_string(),
        attempts,
    })
}


#[cfg(test)]
mod tests {
    use super::test_server::{Behavior, TestServer};
    use super::*;

    fn fast_policy(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            connect_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(200),
            attempts,
            retry_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn retries_retryable_statuses_until_success() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(500, "server-error".to_string()),
            Behavior::Respond(429, "throttled".to_string()),
            Behavior::Respond(200, "ok".to_string()),
        ]);
        let query = vec![("viewer".to_string(), "me".to_string())];

        let result = send_with_retries(Method::Get, &server.base_url, &query, None, fast_policy(3));

        assert_eq!(result.expect("should eventually succeed"), "ok");
        assert_eq!(server.request_count(), 3);
    }

    #[test]
    fn does_not_retry_hard_client_errors() {
        let server = TestServer::spawn(vec![Behavior::Respond(404, "not-found".to_string())]);

        let result = send_with_retries(Method::Delete, &server.base_url, &[], None, fast_policy(5));

        let err = result.expect_err("404 should not be retried");
        assert!(
            matches!(err, HttpError::Status { status: 404, .. }),
            "unexpected error: {err}"
        );
        assert!(err.to_string().contains("HTTP status 404 (not-found)"));
        assert_eq!(server.request_count(), 1);
    }

    #[test]
    fn retries_transport_timeout_and_recovers() {
        let server = TestServer::spawn(vec![
            Behavior::DelayRespond(Duration::from_millis(120), 200, "slow".to_string()),
            Behavior::Respond(200, "ok".to_string()),
        ]);
        let policy = RetryPolicy {
            connect_timeout: Duration::from_millis(250),
            read_timeout: Duration::from_millis(20),
            attempts: 2,
            retry_delay: Duration::from_millis(1),
        };

        let result = send_with_retries(Method::Get, &server.base_url, &[], None, policy);

        assert_eq!(result.expect("timeout should be retried"), "ok");
        assert_eq!(server.request_count(), 2);
    }

    #[test]
    fn returns_retry_exhausted_error_for_retryable_status() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(503, "down".to_string()),
            Behavior::Respond(503, "still-down".to_string()),
        ]);

        let result = send_with_retries(Method::Get, &server.base_url, &[], None, fast_policy(2));

        let err = result.expect_err("retryable failures should eventually error");
        let message = err.to_string();
        assert!(
            message.contains("after 2 attempt(s)") && message.contains("HTTP status 503"),
            "unexpected error message: {message}"
        );
        assert_eq!(server.request_count(), 2);
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(503, "down".to_string()),
            Behavior::Respond(200, "ok".to_string()),
        ]);

        let result = send_with_retries(
            Method::Post,
            &server.base_url,
            &[],
            Some("{}"),
            fast_policy(3).single_attempt(),
        );

        assert!(result.is_err());
        assert_eq!(server.request_count(), 1);
        assert!(server.request_lines()[0].starts_with("POST "));
    }
}
