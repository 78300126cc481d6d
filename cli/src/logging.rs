//! Tracing / logging initialisation.

use std::collections::HashMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level per component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: crate name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// `RUST_LOG` wins when set; otherwise the configured level plus
    /// per-component directives.
    pub fn directives(&self) -> String {
        if let Ok(env) = std::env::var(EnvFilter::DEFAULT_ENV) {
            if !env.trim().is_empty() {
                return env;
            }
        }
        let mut directives = self.level.clone();
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

/// Parse `component=level` pairs (from `--log-component` / `LOG_COMPONENTS`).
pub fn parse_components(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut components = HashMap::new();
    for pair in pairs.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((component, level)) if !component.trim().is_empty() && !level.trim().is_empty() => {
                components.insert(component.trim().to_string(), level.trim().to_lowercase());
            }
            _ => bail!("log component '{pair}' is not of the form name=level"),
        }
    }
    Ok(components)
}

/// Initialise tracing. Call once at startup.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_new(config.directives()).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_directives() {
        if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
            return;
        }
        let mut cfg = LogConfig {
            level: "warn".into(),
            ..Default::default()
        };
        cfg.components.insert("richscan-core".into(), "debug".into());
        assert_eq!(cfg.directives(), "warn,richscan_core=debug");
    }

    #[test]
    fn parses_component_levels() {
        let parsed = parse_components(&[
            "richscan-http=DEBUG".to_string(),
            " tower_http = trace ".to_string(),
            String::new(),
        ])
        .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["richscan-http"], "debug");
        assert_eq!(parsed["tower_http"], "trace");

        assert!(parse_components(&["richscan-core".to_string()]).is_err());
        assert!(parse_components(&["=debug".to_string()]).is_err());
    }
}
