//! Call quality pipeline server entry point.
//!
//! Loads configuration, constructs the broker and persistence layer,
//! registers every stage's consumer runtime, and serves `/healthz` +
//! `/metrics`. There is no business-data HTTP façade: producers publish
//! directly onto the broker (see `callaudit_stages::ingestion`) and
//! consumers read the persisted read models directly, both bypassing
//! this process's HTTP surface entirely.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use callaudit_broker::{ConsumerRuntime, InMemoryBroker};
use callaudit_config::{rules, AlertConfig, ScoringConfig, Settings};
use callaudit_core::topics::Topic;
use callaudit_persistence::{PersistenceError, ScyllaClient, ScyllaConfig};
use callaudit_server::backend::Stores;
use callaudit_server::{create_router, init_metrics, AppState};
use callaudit_stages::{
    AggregatorHandler, AlertDispatcher, CorrelatorHandler, SentimentProjector,
    TranscriptionProjector, VocProjector,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("CALL_AUDIT_ENV").ok();
    let settings = match Settings::load(env.as_deref()) {
        Ok(settings) => {
            eprintln!(
                "Loaded configuration from files (env: {})",
                env.as_deref().unwrap_or("development")
            );
            settings
        }
        Err(e) => {
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&settings);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting call quality pipeline server");
    tracing::info!(environment = ?settings.environment, "configuration loaded");

    let scoring = load_scoring_config(&settings.scoring_config_path);
    let alerts = load_alert_config(&settings.alert_config_path);
    let rule_set = load_rule_set(&settings.rules_path);

    let metrics_handle = init_metrics();
    tracing::info!("initialized Prometheus metrics at /metrics");

    let (stores, persistence_ready) = if settings.persistence.enabled {
        match init_persistence(&settings).await {
            Ok(client) => {
                tracing::info!(
                    hosts = ?settings.persistence.scylla_hosts,
                    keyspace = %settings.persistence.keyspace,
                    "ScyllaDB persistence initialized"
                );
                (Stores::scylla(&client), true)
            }
            Err(e) => {
                tracing::error!("failed to initialize ScyllaDB: {e}. Falling back to in-memory stores.");
                (Stores::in_memory(), true)
            }
        }
    } else {
        tracing::info!("persistence disabled, using in-memory stores");
        (Stores::in_memory(), true)
    };

    let settings = Arc::new(settings);
    let broker = InMemoryBroker::new(settings.broker.partition_count);

    let Stores {
        transcriptions,
        sentiments,
        voc,
        audit,
        agent_performance,
        notifications,
    } = stores;

    let transcription_store = Arc::new(transcriptions);
    let sentiment_store = Arc::new(sentiments);
    let voc_store = Arc::new(voc);
    let audit_store = Arc::new(audit);
    let agent_performance_store = Arc::new(agent_performance);
    let notification_store = Arc::new(notifications);

    let drain = Duration::from_secs(settings.broker.shutdown_drain_secs);
    let retry = settings.broker.retry.clone();

    let mut runtimes = Vec::new();

    runtimes.push(ConsumerRuntime::spawn(
        broker.clone(),
        Topic::CallsTranscribed,
        Arc::new(TranscriptionProjector::new(transcription_store)),
        retry.clone(),
        drain,
    ));
    runtimes.push(ConsumerRuntime::spawn(
        broker.clone(),
        Topic::CallsSentimentAnalyzed,
        Arc::new(SentimentProjector::new(sentiment_store)),
        retry.clone(),
        drain,
    ));
    runtimes.push(ConsumerRuntime::spawn(
        broker.clone(),
        Topic::CallsVocAnalyzed,
        Arc::new(VocProjector::new(voc_store)),
        retry.clone(),
        drain,
    ));

    let correlator = Arc::new(CorrelatorHandler::new(
        audit_store,
        scoring,
        rule_set,
        broker.clone(),
        &settings.correlator,
    ));
    let correlator_sweep_shutdown = correlator.spawn_sweep();
    for topic in [Topic::CallsTranscribed, Topic::CallsSentimentAnalyzed, Topic::CallsVocAnalyzed] {
        runtimes.push(ConsumerRuntime::spawn(
            broker.clone(),
            topic,
            correlator.clone(),
            retry.clone(),
            drain,
        ));
    }

    let aggregator = Arc::new(AggregatorHandler::new(agent_performance_store, &settings.aggregator));
    let aggregator_flush_shutdown = aggregator.spawn_flush();
    for topic in [Topic::CallsSentimentAnalyzed, Topic::CallsVocAnalyzed, Topic::CallsAudited] {
        runtimes.push(ConsumerRuntime::spawn(
            broker.clone(),
            topic,
            aggregator.clone(),
            retry.clone(),
            drain,
        ));
    }

    let alert_dispatcher = Arc::new(AlertDispatcher::new(alerts, notification_store));
    for topic in [Topic::CallsSentimentAnalyzed, Topic::CallsVocAnalyzed, Topic::CallsAudited] {
        runtimes.push(ConsumerRuntime::spawn(
            broker.clone(),
            topic,
            alert_dispatcher.clone(),
            retry.clone(),
            drain,
        ));
    }

    tracing::info!(runtimes = runtimes.len(), "all stage consumer runtimes registered");

    let state = AppState::new(settings.clone(), metrics_handle, persistence_ready);
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("shutting down stage consumer runtimes");
    let _ = correlator_sweep_shutdown.send(true);
    let _ = aggregator_flush_shutdown.send(true);
    for runtime in runtimes {
        runtime.shutdown().await;
    }

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("callaudit={},tower_http=debug", settings.server.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.server.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}

async fn init_persistence(settings: &Settings) -> Result<ScyllaClient, PersistenceError> {
    let client = ScyllaClient::connect(ScyllaConfig::from(settings.persistence.clone())).await?;
    client.ensure_schema().await?;
    Ok(client)
}

fn load_scoring_config(path: &str) -> ScoringConfig {
    if Path::new(path).exists() {
        match ScoringConfig::load(path) {
            Ok(cfg) => {
                tracing::info!(path, "loaded scoring config");
                return cfg;
            }
            Err(e) => tracing::warn!(path, %e, "failed to load scoring config, using defaults"),
        }
    } else {
        tracing::info!(path, "scoring config not found, using defaults");
    }
    ScoringConfig::default()
}

fn load_alert_config(path: &str) -> AlertConfig {
    if Path::new(path).exists() {
        match AlertConfig::load(path) {
            Ok(cfg) => {
                tracing::info!(path, "loaded alert config");
                return cfg;
            }
            Err(e) => tracing::warn!(path, %e, "failed to load alert config, using defaults"),
        }
    } else {
        tracing::info!(path, "alert config not found, using defaults");
    }
    AlertConfig::default()
}

fn load_rule_set(path: &str) -> callaudit_core::rules::RuleSet {
    if Path::new(path).exists() {
        match rules::load(path) {
            Ok(set) => {
                tracing::info!(path, rules = set.rules.len(), "loaded compliance rule set");
                return set;
            }
            Err(e) => tracing::warn!(path, %e, "failed to load rule set, using built-in defaults"),
        }
    } else {
        tracing::info!(path, "rule set not found, using built-in defaults");
    }
    rules::default_rules()
}
