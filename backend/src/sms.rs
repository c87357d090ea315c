use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Gateway requests allowed in flight at once during a dispatch.
pub const MAX_IN_FLIGHT: usize = 8;

/// Outcome of one dispatch across all recipients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub success: i32,
    pub failure: i32,
}

impl DispatchReport {
    pub fn total(&self) -> i32 {
        self.success + self.failure
    }
}

#[derive(Serialize)]
struct OutgoingSms<'a> {
    to: &'a str,
    message: &'a str,
}

/// HTTP SMS gateway client. Without a configured endpoint every message is
/// reported as delivered without leaving the process.
#[derive(Debug, Clone)]
pub struct SmsGateway {
    client: Client,
    endpoint: Option<String>,
    api_key: Option<String>,
}

impl SmsGateway {
    pub fn new(endpoint: Option<String>, api_key: Option<String>) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Self::new(config.sms_gateway_url.clone(), config.sms_gateway_api_key.clone())
    }

    pub fn is_simulated(&self) -> bool {
        self.endpoint.is_none()
    }

    pub async fn dispatch(&self, message: &str, recipients: &[String]) -> DispatchReport {
        let Some(endpoint) = &self.endpoint else {
            debug!(recipients = recipients.len(), "Simulating SMS delivery");
            return DispatchReport {
                success: recipients.len() as i32,
                failure: 0,
            };
        };

        let requests: Vec<_> = recipients
            .iter()
            .map(|to| self.send_one(endpoint, to, message))
            .collect();
        let delivered: Vec<bool> = stream::iter(requests)
            .buffer_unordered(MAX_IN_FLIGHT)
            .collect()
            .await;

        let success = delivered.iter().filter(|ok| **ok).count() as i32;
        let report = DispatchReport {
            success,
            failure: delivered.len() as i32 - success,
        };

        info!(
            success = report.success,
            failure = report.failure,
            "SMS dispatch finished"
        );
        report
    }

    async fn send_one(&self, endpoint: &str, to: &str, message: &str) -> bool {
        let mut request = self
            .client
            .post(endpoint)
            .json(&OutgoingSms { to, message });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(recipient = %to, status = %response.status(), "SMS gateway rejected message");
                false
            }
            Err(e) => {
                warn!(recipient = %to, "SMS gateway unreachable: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::Value;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[derive(Default)]
    struct Load {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    async fn slow_gateway(State(load): State<Arc<Load>>, Json(body): Json<Value>) -> StatusCode {
        let now = load.current.fetch_add(1, Ordering::SeqCst) + 1;
        load.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        load.current.fetch_sub(1, Ordering::SeqCst);

        if body["to"] == "0000000000" {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::OK
        }
    }

    #[tokio::test]
    async fn dispatch_fans_out_with_a_bounded_number_of_requests() {
        let load = Arc::new(Load::default());
        let router = Router::new()
            .route("/sms", post(slow_gateway))
            .with_state(load.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });

        let gateway = SmsGateway::new(Some(format!("http://{addr}/sms")), None).unwrap();
        let mut recipients: Vec<String> = (0..20).map(|i| format!("98000000{i:02}")).collect();
        recipients.push("0000000000".to_string());

        let report = gateway.dispatch("Polling starts at 7am", &recipients).await;

        assert_eq!(report, DispatchReport { success: 20, failure: 1 });
        let peak = load.peak.load(Ordering::SeqCst);
        assert!(peak > 1, "requests were sent one at a time");
        assert!(peak <= MAX_IN_FLIGHT, "{peak} requests in flight");
    }

    #[tokio::test]
    async fn simulated_gateway_delivers_everything() {
        let gateway = SmsGateway::new(None, None).unwrap();
        assert!(gateway.is_simulated());

        let recipients = vec!["9800000001".to_string(), "9800000002".to_string()];
        let report = gateway.dispatch("Polling starts at 7am", &recipients).await;
        assert_eq!(report, DispatchReport { success: 2, failure: 0 });
        assert_eq!(report.total(), 2);
    }

    #[tokio::test]
    async fn unreachable_gateway_counts_failures() {
        let gateway = SmsGateway::new(Some("http://127.0.0.1:9/sms".into()), Some("key".into())).unwrap();
        let report = gateway.dispatch("hello", &["9800000001".to_string()]).await;
        assert_eq!(report, DispatchReport { success: 0, failure: 1 });
    }
}
