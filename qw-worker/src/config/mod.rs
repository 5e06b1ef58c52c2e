//! Configuration loading (spec.md §6.1), layered exactly as the teacher
//! does: an embedded default TOML, an optional local file override, then
//! environment variables with a `__` separator, then `try_deserialize`,
//! then an explicit `validate()` that asserts on required fields.

use config::FileFormat;
use lazy_static_include::lazy_static_include_str;
use serde_derive::Deserialize;
use tracing::debug;

lazy_static_include_str! {
    DEFAULT_CONFIG => "src/config/default.toml",
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub worker: WorkerConfig,
    pub worker_lists: WorkerListsConfig,
    pub registry: RegistryConfig,
    pub discovery: DiscoveryConfig,
    pub prometheus: PrometheusConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub host: String,
    pub port: u16,
    pub default_qty: usize,
    pub queue_size: usize,
    pub wkname: String,
    pub nofiles: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct WorkerListsConfig {
    pub normal: String,
    pub high: String,
}

impl WorkerListsConfig {
    pub fn normal_addrs(&self) -> Vec<(String, u16)> {
        parse_host_port_list(&self.normal)
    }

    pub fn high_addrs(&self) -> Vec<(String, u16)> {
        parse_host_port_list(&self.high)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    pub url: String,
    pub list_key: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PrometheusConfig {
    pub port: u16,
}

impl Config {
    pub fn load(local_file: Option<String>) -> Config {
        let mut config_builder = config::Config::builder();
        config_builder =
            config_builder.add_source(config::File::from_str(&DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(local_file) = local_file {
            debug!("Loading local configuration from {}", local_file);
            config_builder = config_builder.add_source(config::File::with_name(&local_file));
        }

        let config_builder = config_builder
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .ignore_empty(true),
            )
            .build()
            .expect("Could not load configuration");

        config_builder
            .try_deserialize()
            .expect("Could not deserialize configuration")
    }

    pub fn validate(&self) {
        assert!(!self.worker.host.is_empty(), "Host is required");
        assert!(self.worker.port > 0, "Port is required");
        assert!(self.worker.queue_size > 0, "Queue size must be positive");
        assert!(self.worker.default_qty > 0, "Thread pool size must be positive");
        assert!(!self.worker.wkname.is_empty(), "Worker base name is required");
        assert!(!self.registry.url.is_empty(), "Registry URL is required");
        assert!(!self.registry.list_key.is_empty(), "Registry list key is required");
        assert!(self.discovery.port > 0, "Discovery port is required");
    }
}

fn parse_host_port_list(raw: &str) -> Vec<(String, u16)> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (host, port) = entry.split_once(':')?;
            let port: u16 = port.parse().ok()?;
            Some((host.to_string(), port))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_host_port_list() {
        let parsed = parse_host_port_list("127.0.0.1:8181, 10.0.0.2:9000");
        assert_eq!(
            parsed,
            vec![
                ("127.0.0.1".to_string(), 8181),
                ("10.0.0.2".to_string(), 9000),
            ]
        );
    }

    #[test]
    fn default_config_loads_and_validates() {
        let config = Config::load(None);
        config.validate();
        assert_eq!(config.worker.queue_size, 4);
        assert_eq!(config.worker.default_qty, 4);
    }
}
