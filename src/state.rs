use std::sync::Arc;

use crate::{config::ProviderConfig, metrics::AppMetrics, provider::Dispatcher};

/// Where each request gets its backend descriptor from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Re-read the process environment for every request.
    Environment,
    Fixed(ProviderConfig),
}

impl ConfigSource {
    pub fn resolve(&self) -> ProviderConfig {
        match self {
            ConfigSource::Environment => ProviderConfig::from_env(),
            ConfigSource::Fixed(config) => config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub config: ConfigSource,
    pub metrics: Arc<AppMetrics>,
}

impl AppState {
    pub fn from_env() -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::from_env()),
            config: ConfigSource::Environment,
            metrics: Arc::new(AppMetrics::new()),
        }
    }

    pub fn new_for_tests(config: ProviderConfig, dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            config: ConfigSource::Fixed(config),
            metrics: Arc::new(AppMetrics::new()),
        }
    }
}
