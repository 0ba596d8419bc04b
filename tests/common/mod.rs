//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use resilience_gateway::policy::{
    BackoffKind, BackoffPolicy, BreakerPolicy, Policy, RateLimitPolicy,
};
use resilience_gateway::AttemptError;

/// A policy with generous limits; tests override the fields they exercise.
pub fn policy(name: &str) -> Policy {
    Policy {
        name: name.to_string(),
        max_attempts: 3,
        per_attempt_timeout_ms: 1_000,
        backoff: BackoffPolicy {
            kind: BackoffKind::Fixed,
            base_ms: 10,
            cap_ms: 10,
            jitter: 0.0,
        },
        rate_limit: RateLimitPolicy {
            capacity: 1_000,
            refill_per_second: 1_000.0,
        },
        breaker: BreakerPolicy {
            window_size: 10,
            min_volume: 5,
            failure_rate_threshold: 0.5,
            open_duration_ms: 1_000,
            half_open_trials: 1,
        },
    }
}

/// Counts calls and fails the first `failures` of them with a retryable error.
#[derive(Clone, Default)]
pub struct Flaky {
    calls: Arc<AtomicU32>,
    failures: u32,
}

impl Flaky {
    pub fn failing(failures: u32) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            failures,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call(&self) -> impl Future<Output = Result<u32, AttemptError<String>>> + Send + 'static {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let failures = self.failures;
        async move {
            if n < failures {
                Err(AttemptError::retryable(format!("failure {}", n + 1)))
            } else {
                Ok(n + 1)
            }
        }
    }
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            503 => "503 Service Unavailable",
                            _ => "500 Internal Server Error",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// GET `url`, classifying 5xx and transport errors as retryable and 4xx as fatal.
pub async fn fetch(client: reqwest::Client, url: String) -> Result<String, AttemptError<String>> {
    let res = client
        .get(&url)
        .send()
        .await
        .map_err(|e| AttemptError::retryable(e.to_string()))?;

    let status = res.status();
    if status.is_server_error() {
        return Err(AttemptError::retryable(format!("status {}", status)));
    }
    if status.is_client_error() {
        return Err(AttemptError::fatal(format!("status {}", status)));
    }
    res.text()
        .await
        .map_err(|e| AttemptError::retryable(e.to_string()))
}
