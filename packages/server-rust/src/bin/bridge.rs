//! `bridge` - runs the dispatcher, the maintenance schedule, and the audit
//! trail against the in-process broker until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bridge_server::audit::{AuditSink, MemoryAuditStore};
use bridge_server::config::{
    BridgeConfig, DatabaseConfig, JobConfig, PoolConfig, DEFAULT_CREDENTIALS_PATH,
    DEFAULT_INBOUND_QUEUE,
};
use bridge_server::remote::LoopbackConnector;
use bridge_server::transport::{consume, InProcessBroker};
use bridge_server::{
    AuditStore, JobSchedule, LifecycleRegistry, MessageDispatcher, ResourceAdapter,
    ScheduledJobRunner,
};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AuditBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Parser)]
#[command(name = "bridge", version, about = "Suite Bridge resource adapter")]
struct Cli {
    /// Service-account credentials file.
    #[arg(long, env = "BRIDGE_CREDENTIALS_PATH", default_value = DEFAULT_CREDENTIALS_PATH)]
    credentials_path: PathBuf,

    #[arg(long, env = "BRIDGE_DATABASE_URL", default_value = "postgres://localhost:5432/bridge")]
    database_url: String,

    #[arg(long, env = "BRIDGE_DATABASE_USERNAME", default_value = "bridge")]
    database_username: String,

    #[arg(long, env = "BRIDGE_DATABASE_PASSWORD", default_value = "", hide_env_values = true)]
    database_password: String,

    /// Maximum number of pooled remote connections.
    #[arg(long, env = "BRIDGE_POOL_MAX_SIZE", default_value_t = 10)]
    pool_max_size: usize,

    #[arg(long, env = "BRIDGE_POOL_ACQUIRE_TIMEOUT_MS", default_value_t = 5_000)]
    pool_acquire_timeout_ms: u64,

    /// Interval of the maintenance job.
    #[arg(long, env = "BRIDGE_JOB_INTERVAL_MS", default_value_t = 3_600_000)]
    job_interval_ms: u64,

    #[arg(long, env = "BRIDGE_INBOUND_QUEUE", default_value = DEFAULT_INBOUND_QUEUE)]
    inbound_queue: String,

    #[arg(long, env = "BRIDGE_AUDIT_STORE", value_enum, default_value_t = AuditBackend::Memory)]
    audit_store: AuditBackend,

    #[arg(long, env = "BRIDGE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    fn to_config(&self) -> BridgeConfig {
        BridgeConfig {
            credentials_path: self.credentials_path.clone(),
            database: DatabaseConfig {
                url: self.database_url.clone(),
                username: self.database_username.clone(),
                password: self.database_password.clone(),
            },
            pool: PoolConfig {
                max_size: self.pool_max_size,
                acquire_timeout: Duration::from_millis(self.pool_acquire_timeout_ms),
            },
            job: JobConfig {
                interval: Duration::from_millis(self.job_interval_ms),
            },
            inbound_queue: self.inbound_queue.clone(),
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

async fn open_store(backend: AuditBackend, config: &BridgeConfig) -> anyhow::Result<Arc<dyn AuditStore>> {
    match backend {
        AuditBackend::Memory => Ok(Arc::new(MemoryAuditStore::new())),
        #[cfg(feature = "postgres")]
        AuditBackend::Postgres => {
            let store = bridge_server::audit::PostgresAuditStore::connect(&config.database).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        AuditBackend::Postgres => {
            let _ = config;
            anyhow::bail!("audit store `postgres` requires the `postgres` feature")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = Arc::new(cli.to_config());
    config.validate()?;
    let credentials = config
        .load_credentials()
        .context("loading service-account credentials")?;
    info!(
        credential = %credentials.reference(),
        queue = %config.inbound_queue,
        pool_max_size = config.pool.max_size,
        "configuration loaded"
    );

    let adapter = Arc::new(ResourceAdapter::new(
        &config,
        Arc::new(LoopbackConnector::new()),
    ));
    let sink = Arc::new(AuditSink::open(open_store(cli.audit_store, &config).await?).await?);

    let broker = Arc::new(InProcessBroker::default());
    let inbound = broker.declare(&config.inbound_queue);
    let dispatcher = MessageDispatcher::new(adapter.connection_factory(credentials.clone()))
        .with_replies(broker.clone())
        .with_status(Arc::clone(adapter.status()));

    let job = Arc::new(ScheduledJobRunner::new(
        adapter.connection_factory(credentials),
        Some(sink),
    ));
    let schedule = Arc::new(JobSchedule::new(job, config.job.interval));

    let registry = LifecycleRegistry::new();
    registry.register(adapter.clone());
    registry.register(schedule);
    registry.start_all().await?;

    let consumer = consume(
        config.inbound_queue.clone(),
        inbound,
        dispatcher,
        adapter.status().subscribe(),
    );

    tokio::signal::ctrl_c()
        .await
        .context("installing interrupt handler")?;
    info!("interrupt received; shutting down");

    let stopped = registry.stop_all().await;
    if let Err(err) = consumer.await {
        tracing::warn!(error = %err, "consumer task ended abnormally");
    }
    stopped
}
