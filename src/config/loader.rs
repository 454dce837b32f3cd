//! Configuration loading: YAML file, layered with environment overrides.
//!
//! Follows the teacher's `config` crate + `dotenvy` convention: `.env` is
//! loaded first (best-effort), then a YAML file is layered under
//! `GATEWAY__`-prefixed environment variables (double underscore as the
//! nested-key separator, matching the `config` crate's default).

use super::GatewayConfig;
use crate::utils::error::{GatewayError, Result};
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config/gateway.yaml";
const ENV_PREFIX: &str = "GATEWAY";

/// Load configuration the way the binary entrypoint does: `.env`, then
/// `GATEWAY_CONFIG_PATH` (or the default path) if the file exists, then
/// environment overrides.
pub fn load() -> Result<GatewayConfig> {
    let _ = dotenvy::dotenv();
    let path = std::env::var("GATEWAY_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_from(Path::new(&path))
}

/// Load configuration from a specific file path (or defaults, if the file
/// does not exist), layered under environment overrides.
pub fn load_from(path: &Path) -> Result<GatewayConfig> {
    let mut builder = config::Config::builder();

    if path.exists() {
        builder = builder.add_source(config::File::from(path));
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let built = builder
        .build()
        .map_err(|e| GatewayError::Config(format!("failed to build config: {e}")))?;

    // `config`'s deserializer does not apply serde(default) for entirely
    // absent sections, so merge onto GatewayConfig::default() explicitly.
    let mut cfg = GatewayConfig::default();
    if let Ok(partial) = built.clone().try_deserialize::<serde_json::Value>() {
        if let Ok(merged) = merge_onto(&cfg, &partial) {
            cfg = merged;
        }
    }
    Ok(cfg)
}

fn merge_onto(base: &GatewayConfig, overlay: &serde_json::Value) -> Result<GatewayConfig> {
    let mut base_value = serde_json::to_value(base)?;
    merge_json(&mut base_value, overlay);
    Ok(serde_json::from_value(base_value)?)
}

fn merge_json(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}
