//! Reachability probe feeding the connectivity monitor.

use std::sync::Arc;
use std::time::Duration;

use basecamp_core::{ConnectivityMonitor, Signal};
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::debug;

/// Probe requests give up quickly; a slow answer counts as unreachable.
const PROBE_TIMEOUT_SECS: u64 = 5;

pub struct ReachabilityProbe {
    client: Client,
    url: String,
}

impl ReachabilityProbe {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Any HTTP answer, even an error status, means the service is reachable.
    pub async fn check(&self) -> Signal {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                debug!(url = %self.url, status = %response.status(), "Service reachable");
                Signal::Online
            }
            Err(e) if e.is_builder() => {
                debug!(url = %self.url, error = %e, "Probe URL unusable");
                Signal::Unknown
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Service unreachable");
                Signal::Offline
            }
        }
    }

    /// Probe once and report the result.
    pub async fn report_to(&self, monitor: &ConnectivityMonitor) -> Signal {
        let signal = self.check().await;
        monitor.report(signal);
        signal
    }

    /// Keep probing every `interval` until the handle is aborted.
    pub fn spawn(self, monitor: Arc<ConnectivityMonitor>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.report_to(&monitor).await;
            }
        })
    }
}
