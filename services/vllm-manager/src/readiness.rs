use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls `{endpoint}/v1/models` until it answers 2xx.
#[derive(Clone)]
pub struct ReadinessProber {
    client: reqwest::Client,
    interval: Duration,
}

impl ReadinessProber {
    pub fn new(client: reqwest::Client, interval: Duration) -> Self {
        Self { client, interval }
    }

    /// `true` once the backend answers, `false` after `timeout`. Fixed
    /// interval, no backoff; the caller decides what a timeout means.
    pub async fn wait_until_ready(&self, model: &str, endpoint: &str, timeout: Duration) -> bool {
        let url = format!("{}/v1/models", endpoint.trim_end_matches('/'));
        let deadline = Instant::now() + timeout;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.client.get(&url).timeout(REQUEST_TIMEOUT).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(model, attempts, "readiness: backend is up");
                    return true;
                }
                Ok(resp) => debug!(model, status = %resp.status(), "readiness: not yet"),
                Err(e) => debug!(model, "readiness: not yet ({e})"),
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(self.interval.min(deadline - now)).await;
        }
    }
}
