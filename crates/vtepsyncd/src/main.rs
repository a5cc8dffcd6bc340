//! VTEP Sync Daemon
//!
//! Main entry point for the vtepsyncd daemon.
//! Pops gateway change-sets from a Redis list, reconciles them into the
//! hardware VTEP tables and publishes L2 population notifications.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-3: Content of Audit Records - Structured logging
//! - AU-12: Audit Record Generation - Log daemon lifecycle
//! - SI-4: System Monitoring - Change-set processing outcomes logged

use anyhow::Context;
use clap::Parser;
use sonic_vtepsyncd::config_file::AgentSource;
use sonic_vtepsyncd::{
    AgentDirectory, ChangeMessage, RedisAdapter, RedisAgentDirectory, RedisEntityStore,
    RedisNotifier, StaticAgentDirectory, VtepSync, VtepsyncConfig,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// SONiC hardware VTEP synchronization daemon
#[derive(Parser, Debug)]
#[command(name = "vtepsyncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = sonic_vtepsyncd::config_file::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Redis server host, overrides the config file
    #[arg(long)]
    redis_host: Option<String>,

    /// Redis server port, overrides the config file
    #[arg(long)]
    redis_port: Option<u16>,

    /// Drain the change-set queue and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("vtepsyncd: Starting hardware VTEP synchronization daemon");

    let mut config = VtepsyncConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(host) = args.redis_host {
        config.database.redis_host = host;
    }
    if let Some(port) = args.redis_port {
        config.database.redis_port = port;
    }
    config.validate().context("invalid configuration")?;

    match run_daemon(&config, args.once).await {
        Ok(()) => {
            info!("vtepsyncd: Daemon exiting normally");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "vtepsyncd: Daemon exiting with error");
            Err(e)
        }
    }
}

/// Initialize structured logging
fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("failed to set logger")?;
    Ok(())
}

async fn run_daemon(config: &VtepsyncConfig, once: bool) -> anyhow::Result<()> {
    let shutdown = setup_signal_handlers();
    let db = &config.database;

    let redis = RedisAdapter::connect(
        &db.redis_host,
        db.redis_port,
        db.db_number,
        config.connection_timeout(),
    )
    .await
    .with_context(|| format!("connecting to Redis at {}:{}", db.redis_host, db.redis_port))?;

    let agents: Arc<dyn AgentDirectory> = match config.agents.source {
        AgentSource::Redis => Arc::new(RedisAgentDirectory::new(
            redis.clone(),
            config.agents.agent_table.clone(),
        )),
        AgentSource::Static => Arc::new(StaticAgentDirectory::from_config(
            &config.agents.static_agents,
        )),
    };

    let sync = VtepSync::with_agent_type(
        Arc::new(RedisEntityStore::new(redis.clone())),
        agents,
        Arc::new(RedisNotifier::new(redis.clone(), config.notifier.topic.clone())),
        config.agents.agent_type.clone(),
    );

    info!(queue = %db.changeset_queue, "vtepsyncd: Waiting for change-sets");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("vtepsyncd: Received shutdown signal");
            break;
        }

        match redis.blpop(&db.changeset_queue, config.poll_timeout()).await {
            Ok(Some(payload)) => {
                handle_change_message(&sync, &redis, &db.changeset_queue, payload, config).await
            }
            Ok(None) if once => break,
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "vtepsyncd: Failed to poll change-set queue");
                tokio::time::sleep(config.poll_timeout()).await;
            }
        }
    }

    let stats = sync.stats();
    info!(
        change_sets = stats.change_sets,
        records = stats.records,
        records_rejected = stats.records_rejected,
        fdb_added = stats.fdb_added,
        fdb_removed = stats.fdb_removed,
        resolution_failures = stats.resolution_failures,
        "vtepsyncd: Graceful shutdown complete"
    );
    Ok(())
}

async fn handle_change_message(
    sync: &VtepSync,
    redis: &RedisAdapter,
    queue: &str,
    payload: String,
    config: &VtepsyncConfig,
) {
    let message = match ChangeMessage::from_json(&payload) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "vtepsyncd: Dropping undecodable change-set");
            return;
        }
    };

    let gateway = message.ovsdb_identifier;
    if message.changes.is_empty() {
        debug!(gateway = %gateway, "vtepsyncd: Skipping empty change-set");
        return;
    }

    match sync.process(&gateway, message.changes).await {
        Ok(summary) => {
            debug!(
                gateway = %gateway,
                rejected = summary.rejected,
                notifications = summary.notifications(),
                "vtepsyncd: Change-set done"
            );
        }
        Err(e) if e.is_retryable() => {
            warn!(gateway = %gateway, error = %e, "vtepsyncd: Change-set failed, requeueing");
            if let Err(e) = redis.lpush(queue, &payload).await {
                error!(gateway = %gateway, error = %e, "vtepsyncd: Failed to requeue change-set");
            }
            tokio::time::sleep(config.poll_timeout()).await;
        }
        Err(e) => {
            error!(gateway = %gateway, error = %e, "vtepsyncd: Dropping change-set");
        }
    }
}

/// Setup signal handlers for graceful shutdown
fn setup_signal_handlers() -> Arc<AtomicBool> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("vtepsyncd: Received SIGINT");
            shutdown_flag_clone.store(true, Ordering::Relaxed);
        }
    });

    shutdown_flag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["vtepsyncd"]);
        assert_eq!(args.config, PathBuf::from("/etc/sonic/vtepsyncd.conf"));
        assert_eq!(args.log_level, "info");
        assert!(args.redis_host.is_none());
        assert!(!args.once);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "vtepsyncd",
            "--redis-host",
            "10.1.1.1",
            "--redis-port",
            "6380",
            "--once",
        ]);
        assert_eq!(args.redis_host.as_deref(), Some("10.1.1.1"));
        assert_eq!(args.redis_port, Some(6380));
        assert!(args.once);
    }

    #[test]
    fn test_shutdown_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        assert!(!flag.load(Ordering::Relaxed));
        flag.store(true, Ordering::Relaxed);
        assert!(flag.load(Ordering::Relaxed));
    }
}
