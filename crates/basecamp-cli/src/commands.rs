//! Command handlers.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use basecamp_core::{
    ApiClient, Connectivity, ConnectivityMonitor, DiscardedMutation, FileStore, Gateway,
    ReadOptions, ResourceCategory, WriteRequest, WriteVerb,
};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::info;

use crate::cli::{CacheAction, Command, QueueAction};
use crate::config::Config;
use crate::credentials::{CredentialStore, KeyringAuth, TOKEN_ENV};
use crate::probe::ReachabilityProbe;

/// Everything a command needs once configuration is resolved.
pub struct Session {
    pub config: Config,
    pub gateway: Arc<Gateway>,
    probe: Option<ReachabilityProbe>,
}

impl Session {
    /// Wire storage, transport, auth and connectivity into a gateway.
    ///
    /// With `offline` set the service is never probed.
    pub async fn open(config: Config, base_url: Option<String>, offline: bool) -> Result<Self> {
        let base_url = config.resolve_base_url(base_url)?;
        let data_dir = config.data_dir()?;
        let storage = Arc::new(
            FileStore::new(data_dir.clone())
                .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?,
        );

        let auth = Arc::new(KeyringAuth::new(
            config.last_username.clone(),
            std::env::var(TOKEN_ENV).ok(),
        ));
        let client = ApiClient::with_timeout(&base_url, config.engine.request_timeout())
            .context("Failed to create HTTP client")?;

        let connectivity = Arc::new(ConnectivityMonitor::new(Connectivity::Offline));
        let probe = if offline {
            None
        } else {
            let probe = ReachabilityProbe::new(&base_url)?;
            let signal = probe.report_to(&connectivity).await;
            info!(base_url = %base_url, ?signal, "Initial reachability");
            Some(probe)
        };

        let gateway = Gateway::new(storage, Arc::new(client), connectivity, config.engine.clone())
            .with_auth(auth);

        Ok(Self {
            config,
            gateway: Arc::new(gateway),
            probe,
        })
    }
}

pub async fn run(mut session: Session, command: Command) -> Result<()> {
    match command {
        Command::Get {
            endpoint,
            ttl,
            refresh,
        } => get(&session, &endpoint, ttl, refresh).await,
        Command::Prefetch { endpoints, refresh } => prefetch(&session, &endpoints, refresh).await,
        Command::Write {
            category,
            method,
            endpoint,
            data,
        } => {
            let request = build_write(&category, &method, &endpoint, data.as_deref())?;
            write(&session, request).await
        }
        Command::Pending => pending(&session).await,
        Command::Sync => sync(&session).await,
        Command::Cache { action } => cache(&session, action).await,
        Command::Queue {
            action: QueueAction::Clear { yes },
        } => clear_queue(&session, yes).await,
        Command::Status => status(&session).await,
        Command::Watch { interval } => watch(session, interval).await,
        Command::Login { username } => login(&mut session.config, &username),
        Command::Logout { username } => logout(&mut session.config, &username),
    }
}

/// Parse CLI arguments into a write request.
pub fn build_write(
    category: &str,
    method: &str,
    endpoint: &str,
    data: Option<&str>,
) -> Result<WriteRequest> {
    let category = ResourceCategory::from_str(category)?;
    let method = WriteVerb::from_str(method)?;
    let payload = match data {
        Some(raw) => serde_json::from_str(raw).context("--data is not valid JSON")?,
        None => Value::Null,
    };
    if endpoint.trim().is_empty() {
        bail!("Endpoint must not be empty");
    }
    Ok(WriteRequest::new(category, method, endpoint, payload))
}

async fn get(session: &Session, endpoint: &str, ttl: Option<u64>, refresh: bool) -> Result<()> {
    let options = ReadOptions {
        ttl: ttl.map(|secs| chrono::Duration::seconds(secs.min(i64::MAX as u64 / 1000) as i64)),
        force_refresh: refresh,
    };
    let data = session
        .gateway
        .read_endpoint(endpoint, options)
        .await
        .with_context(|| format!("Failed to read {}", endpoint))?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

async fn prefetch(session: &Session, endpoints: &[String], refresh: bool) -> Result<()> {
    let options = ReadOptions {
        force_refresh: refresh,
        ..ReadOptions::default()
    };
    let results = session.gateway.prefetch(endpoints, options).await;
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    for (endpoint, result) in &results {
        match result {
            Ok(_) => println!("cached   {}", endpoint),
            Err(e) => println!("failed   {}: {}", endpoint, e),
        }
    }
    if failed > 0 {
        bail!("{} of {} endpoints could not be fetched", failed, results.len());
    }
    Ok(())
}

async fn write(session: &Session, request: WriteRequest) -> Result<()> {
    let summary = format!("{} {}", request.method, request.endpoint);
    let outcome = session
        .gateway
        .write(request)
        .await
        .with_context(|| format!("Write failed: {}", summary))?;

    if outcome.queued {
        println!(
            "Offline: queued {} ({})",
            summary,
            outcome.queue_id.unwrap_or_default()
        );
    } else if let Some(response) = outcome.response.filter(|r| !r.is_null()) {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("Applied {}", summary);
    }
    Ok(())
}

async fn pending(session: &Session) -> Result<()> {
    let entries = session.gateway.pending().await;
    if entries.is_empty() {
        println!("No pending writes");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {}  {}",
            entry.id,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.summary()
        );
    }
    Ok(())
}

async fn sync(session: &Session) -> Result<()> {
    if !session.gateway.connectivity().is_online() {
        bail!("Service is unreachable; {} writes remain queued", session.gateway.pending_count().await);
    }

    let mut discarded = session.gateway.subscribe_discarded();
    let report = session.gateway.sync().await;
    print_discarded(&mut discarded);

    println!(
        "Sent {}, kept {} for retry, discarded {}",
        report.succeeded,
        report.retained(),
        report.discarded
    );
    Ok(())
}

fn print_discarded(events: &mut broadcast::Receiver<DiscardedMutation>) {
    while let Ok(event) = events.try_recv() {
        eprintln!("Rejected by server: {} ({})", event.entry.summary(), event.reason);
    }
}

async fn cache(session: &Session, action: CacheAction) -> Result<()> {
    let cache = session.gateway.cache();
    match action {
        CacheAction::Ls => {
            for entry in cache.entries().await {
                println!(
                    "{}  cached {}  expires in {}s",
                    entry.key,
                    entry.age_display(),
                    entry.time_to_live().num_seconds()
                );
            }
        }
        CacheAction::Prune => println!("Removed {} expired entries", cache.purge_expired().await),
        CacheAction::Clear => println!("Removed {} entries", session.gateway.clear_cache().await),
    }
    Ok(())
}

async fn clear_queue(session: &Session, yes: bool) -> Result<()> {
    let count = session.gateway.pending_count().await;
    if !yes {
        bail!("This drops {} unsent writes. Re-run with --yes to confirm", count);
    }
    let removed = session.gateway.clear_queue().await?;
    println!("Dropped {} queued writes", removed);
    Ok(())
}

async fn status(session: &Session) -> Result<()> {
    let gateway = &session.gateway;
    println!("Service:      {}", gateway.connectivity().current_state());
    println!(
        "User:         {}",
        session.config.last_username.as_deref().unwrap_or("(not logged in)")
    );
    println!("Pending:      {}", gateway.pending_count().await);
    println!("Cached:       {}", gateway.cache().entries().await.len());
    println!("Default TTL:  {}s", session.config.engine.default_ttl_secs);
    Ok(())
}

async fn watch(session: Session, interval: u64) -> Result<()> {
    let Session { gateway, probe, .. } = session;
    let mut discarded = gateway.subscribe_discarded();

    let prober = probe.map(|probe| {
        probe.spawn(
            Arc::clone(gateway.connectivity()),
            Duration::from_secs(interval.max(1)),
        )
    });
    let syncer = gateway.spawn_reconnect_sync();

    eprintln!("Watching for connectivity changes, Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = discarded.recv() => match event {
                Ok(event) => eprintln!("Rejected by server: {} ({})", event.entry.summary(), event.reason),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    eprintln!("{} rejected writes not shown", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    syncer.abort();
    if let Some(prober) = prober {
        prober.abort();
    }
    println!("{} writes still pending", gateway.pending_count().await);
    Ok(())
}

pub fn login(config: &mut Config, username: &str) -> Result<()> {
    let token = rpassword::prompt_password(format!("API token for {}: ", username))
        .context("Failed to read token")?;
    if token.trim().is_empty() {
        bail!("Token must not be empty");
    }
    CredentialStore::store(username, token.trim())?;
    config.last_username = Some(username.to_string());
    config.save()?;
    println!("Stored token for {}", username);
    Ok(())
}

pub fn logout(config: &mut Config, username: &str) -> Result<()> {
    if CredentialStore::has_credentials(username) {
        CredentialStore::delete(username)?;
    }
    if config.last_username.as_deref() == Some(username) {
        config.last_username = None;
        config.save()?;
    }
    println!("Logged out {}", username);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_write_parses_arguments() {
        let request =
            build_write("attendance:4", "UPDATE", "/attendance/activity/4", Some(r#"{"present":[1]}"#))
                .unwrap();

        assert_eq!(request.category, ResourceCategory::Attendance { activity_id: "4".to_string() });
        assert_eq!(request.method, WriteVerb::Update);
        assert_eq!(request.payload, json!({"present": [1]}));
    }

    #[test]
    fn test_build_write_without_data_sends_null() {
        let request = build_write("participant", "delete", "/participants/7", None).unwrap();
        assert!(request.payload.is_null());
    }

    #[test]
    fn test_build_write_rejects_bad_input() {
        assert!(build_write("unicorn", "create", "/x", None).is_err());
        assert!(build_write("group", "patch", "/groups", None).is_err());
        assert!(build_write("group", "create", "/groups", Some("{not json")).is_err());
        assert!(build_write("group", "create", "  ", None).is_err());
    }
}
