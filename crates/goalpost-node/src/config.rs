//! Node configuration from the environment.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use goalpost_engine::EngineConfig;

/// Configuration of one node process.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address the API server listens on.
    pub bind: SocketAddr,

    pub engine: EngineConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            engine: EngineConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Read `GOALPOST_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(bind) = lookup("GOALPOST_BIND") {
            config.bind = bind
                .parse()
                .with_context(|| format!("GOALPOST_BIND is not a socket address: {}", bind))?;
        }
        if let Some(name) = lookup("GOALPOST_NAME") {
            config.engine.name = name;
        }
        if let Some(registration) = lookup("GOALPOST_REGISTRATION") {
            config.engine.registration = registration;
        }
        if let Some(fetch) = lookup("GOALPOST_ADMISSION_FETCH") {
            config.engine.admission.fetch = fetch
                .parse()
                .with_context(|| format!("GOALPOST_ADMISSION_FETCH is not a number: {}", fetch))?;
        }
        if let Some(concurrent) = lookup("GOALPOST_ADMISSION_CONCURRENT") {
            config.engine.admission.concurrent = concurrent.parse().with_context(|| {
                format!("GOALPOST_ADMISSION_CONCURRENT is not a number: {}", concurrent)
            })?;
        }
        if let Some(cancellable) = lookup("GOALPOST_CANCELLABLE") {
            let names: Vec<String> = cancellable
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            config.engine.cancellable = Some(names);
        }

        config.engine.validate()?;
        Ok(config)
    }
}
