use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use busview_api::{RecordPublisher, RecordSource};
use transport_memory::{MemoryBus, MemoryBusConfig};
use window_api_server::AppState;
use window_engine::{
    BoundedWindow, IngestSettings, IngestionLoop, ProduceGateway, WindowQuery,
};

use crate::config::{ServerConfig, TransportKind};
use crate::error::ServerError;

/// How long the HTTP server gets to drain in-flight requests on shutdown.
const API_DRAIN: Duration = Duration::from_secs(5);

/// Producer-side handle kept until shutdown so pending deliveries can be flushed.
enum Outbound {
    Memory(MemoryBus),
    #[cfg(feature = "kafka")]
    Kafka(Arc<transport_kafka::KafkaPublisher>),
}

struct Transport {
    source: Box<dyn RecordSource>,
    publisher: Arc<dyn RecordPublisher>,
    outbound: Outbound,
}

fn build_transport(config: &ServerConfig) -> Result<Transport, ServerError> {
    match config.transport {
        TransportKind::Memory => {
            let bus = MemoryBus::new(
                config.topic.clone(),
                MemoryBusConfig {
                    partitions: config.memory_partitions,
                    max_batch: config.max_batch,
                    ..MemoryBusConfig::default()
                },
            )?;
            tracing::info!(
                topic = %config.topic,
                partitions = config.memory_partitions,
                "using in-process bus"
            );
            Ok(Transport {
                source: Box::new(bus.source()),
                publisher: Arc::new(bus.clone()),
                outbound: Outbound::Memory(bus),
            })
        }
        #[cfg(feature = "kafka")]
        TransportKind::Kafka => {
            let mut kafka = transport_kafka::KafkaTransportConfig::new(
                config.bootstrap.clone(),
                config.group_id.clone(),
            );
            kafka.max_batch = config.max_batch;
            kafka.consumer = config.consumer.clone();
            kafka.producer = config.producer.clone();

            let source = transport_kafka::KafkaSource::new(&kafka)?;
            let publisher = Arc::new(transport_kafka::KafkaPublisher::new(&kafka, config.topic.clone())?);
            Ok(Transport {
                source: Box::new(source),
                publisher: publisher.clone(),
                outbound: Outbound::Kafka(publisher),
            })
        }
        #[cfg(not(feature = "kafka"))]
        TransportKind::Kafka => Err(ServerError::Config {
            context: "transport",
            detail: "kafka transport requires building with --features kafka".into(),
        }),
    }
}

pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    tracing::info!(
        bootstrap = %config.bootstrap,
        topic = %config.topic,
        group = %config.group_id,
        transport = ?config.transport,
        max_messages = config.max_messages,
        "busview-server starting"
    );

    // --- Window + transport ---
    let window = Arc::new(BoundedWindow::new(config.max_messages)?);
    let Transport { source, publisher, outbound } = build_transport(&config)?;

    // --- Ingestion ---
    let mut ingest = IngestionLoop::new(
        window.clone(),
        IngestSettings {
            poll_timeout: config.poll_timeout(),
            stop_grace: config.stop_grace(),
        },
    );
    ingest.start(source, &config.topic)?;

    // --- HTTP API ---
    let token = CancellationToken::new();
    let state = AppState::new(
        WindowQuery::new(window),
        ProduceGateway::new(publisher, config.produce_timeout()),
        &config.bootstrap,
        &config.topic,
    );
    let mut api_handle = tokio::spawn(window_api_server::run(config.port, state, token.clone()));

    tracing::info!("server ready");

    // --- Wait for Ctrl+C, or the API dying on its own (e.g. bind failure) ---
    let api_early = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            None
        }
        res = &mut api_handle => Some(res),
    };
    tracing::info!("shutting down...");
    token.cancel();

    let api_result = match api_early {
        Some(res) => res,
        None => match tokio::time::timeout(API_DRAIN, &mut api_handle).await {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(drain = ?API_DRAIN, "http server did not drain, aborting");
                api_handle.abort();
                Ok(Ok(()))
            }
        },
    };

    if let Err(e) = ingest.stop().await {
        tracing::warn!(error = %e, "ingestion stopped with error");
    }
    tracing::info!(
        batches = ingest.batches(),
        records = ingest.records(),
        "ingestion totals"
    );

    match outbound {
        Outbound::Memory(bus) => bus.close(),
        #[cfg(feature = "kafka")]
        Outbound::Kafka(publisher) => {
            if let Err(e) = publisher.flush(Duration::from_secs(5)) {
                tracing::error!(error = %e, "producer flush error");
            }
        }
    }

    match api_result {
        Ok(res) => res?,
        Err(join) if join.is_cancelled() => {}
        Err(join) => return Err(ServerError::Task(join.to_string())),
    }

    tracing::info!("shutdown complete");
    Ok(())
}
