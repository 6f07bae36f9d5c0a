use std::collections::BTreeMap;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::error::ServerError;

#[derive(Parser, Debug, Default)]
#[command(name = "busview-server", about = "Live dashboard over one message bus topic")]
pub struct Cli {
    /// Optional TOML file with base settings; flags and env override it.
    #[arg(long, env = "CONFIG_PATH")]
    pub config: Option<String>,

    /// Bus bootstrap address.
    #[arg(long, env = "KAFKA_BOOTSTRAP")]
    pub bootstrap: Option<String>,

    #[arg(long, env = "KAFKA_TOPIC")]
    pub topic: Option<String>,

    /// Consumer group id.
    #[arg(long = "group", env = "KAFKA_GROUP")]
    pub group_id: Option<String>,

    // Numeric and enum settings are taken as text so that an empty env
    // value means "unset" instead of a parse failure; see `apply`.

    /// HTTP listen port.
    #[arg(long, env = "PORT")]
    pub port: Option<String>,

    /// Window capacity.
    #[arg(long, env = "MAX_MESSAGES")]
    pub max_messages: Option<String>,

    /// memory | kafka
    #[arg(long, env = "BUS_TRANSPORT")]
    pub transport: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// In-process bus, nothing leaves the process.
    Memory,
    /// Kafka via librdkafka (needs the `kafka` feature).
    Kafka,
}

// ---- TOML Config ----

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bootstrap")]
    pub bootstrap: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_transport")]
    pub transport: TransportKind,

    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    #[serde(default = "default_produce_timeout_ms")]
    pub produce_timeout_ms: u64,
    /// Upper bound of one ingest batch.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    /// Partition count of the in-process bus.
    #[serde(default = "default_memory_partitions")]
    pub memory_partitions: usize,

    /// Extra producer properties passed to the transport unchanged.
    #[serde(default)]
    pub producer: BTreeMap<String, String>,
    /// Extra consumer properties passed to the transport unchanged.
    #[serde(default)]
    pub consumer: BTreeMap<String, String>,
}

fn default_bootstrap() -> String {
    "kafka-kafka-bootstrap:9092".into()
}
fn default_topic() -> String {
    "demo".into()
}
fn default_group_id() -> String {
    "web-demo".into()
}
fn default_port() -> u16 {
    8080
}
fn default_max_messages() -> usize {
    200
}
fn default_transport() -> TransportKind {
    if cfg!(feature = "kafka") {
        TransportKind::Kafka
    } else {
        TransportKind::Memory
    }
}
fn default_poll_timeout_ms() -> u64 {
    500
}
fn default_stop_grace_ms() -> u64 {
    1000
}
fn default_produce_timeout_ms() -> u64 {
    30_000
}
fn default_max_batch() -> usize {
    500
}
fn default_memory_partitions() -> usize {
    3
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bootstrap: default_bootstrap(),
            topic: default_topic(),
            group_id: default_group_id(),
            port: default_port(),
            max_messages: default_max_messages(),
            transport: default_transport(),
            poll_timeout_ms: default_poll_timeout_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            produce_timeout_ms: default_produce_timeout_ms(),
            max_batch: default_max_batch(),
            memory_partitions: default_memory_partitions(),
            producer: BTreeMap::new(),
            consumer: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::from_toml(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// File (if any) first, then flags/env on top, then validation.
    pub fn from_cli(cli: &Cli) -> Result<Self, ServerError> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(cli)?;
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, cli: &Cli) -> Result<(), ServerError> {
        fn non_empty(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.is_empty())
        }
        fn parse<T: std::str::FromStr>(name: &'static str, v: &str) -> Result<T, ServerError>
        where
            T::Err: std::fmt::Display,
        {
            v.parse()
                .map_err(|e| ServerError::Config { context: name, detail: format!("'{v}': {e}") })
        }

        if let Some(v) = non_empty(&cli.bootstrap) {
            self.bootstrap = v.to_string();
        }
        if let Some(v) = non_empty(&cli.topic) {
            self.topic = v.to_string();
        }
        if let Some(v) = non_empty(&cli.group_id) {
            self.group_id = v.to_string();
        }
        if let Some(v) = non_empty(&cli.port) {
            self.port = parse("port", v)?;
        }
        if let Some(v) = non_empty(&cli.max_messages) {
            self.max_messages = parse("max_messages", v)?;
        }
        if let Some(v) = non_empty(&cli.transport) {
            self.transport = TransportKind::from_str(v, true).map_err(|e| ServerError::Config {
                context: "transport",
                detail: e,
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        let invalid = |detail: &str| ServerError::Config { context: "validate", detail: detail.to_string() };
        if self.max_messages == 0 {
            return Err(invalid("max_messages must be positive"));
        }
        if self.topic.is_empty() {
            return Err(invalid("topic must not be empty"));
        }
        if self.memory_partitions == 0 {
            return Err(invalid("memory_partitions must be positive"));
        }
        if self.max_batch == 0 {
            return Err(invalid("max_batch must be positive"));
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn produce_timeout(&self) -> Duration {
        Duration::from_millis(self.produce_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ServerConfig::default();
        assert_eq!(c.bootstrap, "kafka-kafka-bootstrap:9092");
        assert_eq!(c.topic, "demo");
        assert_eq!(c.group_id, "web-demo");
        assert_eq!(c.port, 8080);
        assert_eq!(c.max_messages, 200);
        assert_eq!(c.poll_timeout(), Duration::from_millis(500));
        assert_eq!(c.stop_grace(), Duration::from_secs(1));
        assert_eq!(c.produce_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn empty_toml_is_default() {
        let c = ServerConfig::from_toml("").unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.transport, default_transport());
        assert!(c.producer.is_empty());
    }

    #[test]
    fn toml_sets_fields_and_pass_through_properties() {
        let c = ServerConfig::from_toml(
            r#"
            topic = "orders"
            max_messages = 50
            transport = "memory"

            [producer]
            "compression.type" = "lz4"
            "#,
        )
        .unwrap();
        assert_eq!(c.topic, "orders");
        assert_eq!(c.max_messages, 50);
        assert_eq!(c.transport, TransportKind::Memory);
        assert_eq!(c.producer.get("compression.type").map(String::as_str), Some("lz4"));
    }

    #[test]
    fn flags_override_file_values_and_skip_empty_strings() {
        let mut c = ServerConfig::from_toml("topic = \"orders\"\nport = 9000").unwrap();
        let cli = Cli {
            topic: Some(String::new()),
            bootstrap: Some("broker:19092".into()),
            port: Some("9100".into()),
            transport: Some("MEMORY".into()),
            ..Cli::default()
        };
        c.apply(&cli).unwrap();
        assert_eq!(c.topic, "orders");
        assert_eq!(c.bootstrap, "broker:19092");
        assert_eq!(c.port, 9100);
        assert_eq!(c.transport, TransportKind::Memory);
    }

    #[test]
    fn zero_capacity_rejected() {
        let cli = Cli { max_messages: Some("0".into()), ..Cli::default() };
        let err = ServerConfig::from_cli(&cli).unwrap_err();
        assert!(err.to_string().contains("max_messages"), "{err}");
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let cli = Cli::try_parse_from([
            "busview-server",
            "--port",
            "",
            "--max-messages",
            "",
            "--transport",
            "",
            "--topic",
            "",
        ])
        .unwrap();
        let c = ServerConfig::from_cli(&cli).unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.max_messages, 200);
        assert_eq!(c.transport, default_transport());
        assert_eq!(c.topic, "demo");
    }

    #[test]
    fn unparsable_values_are_config_errors() {
        let cli = Cli { port: Some("eighty".into()), ..Cli::default() };
        assert!(matches!(
            ServerConfig::from_cli(&cli),
            Err(ServerError::Config { context: "port", .. })
        ));

        let cli = Cli { transport: Some("carrier-pigeon".into()), ..Cli::default() };
        assert!(matches!(
            ServerConfig::from_cli(&cli),
            Err(ServerError::Config { context: "transport", .. })
        ));
    }

    #[test]
    fn missing_file_is_config_error() {
        let cli = Cli { config: Some("/nonexistent/busview.toml".into()), ..Cli::default() };
        assert!(matches!(
            ServerConfig::from_cli(&cli),
            Err(ServerError::Config { context: "read", .. })
        ));
    }
}
