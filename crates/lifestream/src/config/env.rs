use std::str::FromStr;

use lifestream_core::{Algorithm, Rule};

use super::{Config, LogFormat};

pub const ENV_CONFIG: &str = "LIFESTREAM_CONFIG";

pub fn apply_env_overrides(config: &mut Config) {
    apply_env_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply `LIFESTREAM_*` overrides read through `lookup`. Invalid values are
/// logged and ignored.
pub(crate) fn apply_env_overrides_from<F>(config: &mut Config, mut lookup: F)
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(algorithm) = parsed::<Algorithm, _>(&mut lookup, "LIFESTREAM_ALGORITHM") {
        config.engine.algorithm = algorithm;
    }

    if let Some(rule) = parsed::<Rule, _>(&mut lookup, "LIFESTREAM_RULE") {
        config.engine.rule = rule;
    }

    if let Some(raw) = lookup("LIFESTREAM_MAX_CACHE_NODES") {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("unbounded") {
            config.engine.max_cache_nodes = None;
        } else {
            match trimmed.parse::<usize>() {
                Ok(value) => config.engine.max_cache_nodes = Some(value),
                Err(err) => {
                    tracing::warn!("invalid LIFESTREAM_MAX_CACHE_NODES, ignoring: {err}");
                }
            }
        }
    }

    if let Some(value) = parsed::<u64, _>(&mut lookup, "LIFESTREAM_GENERATIONS_PER_TICK") {
        config.pacing.generations_per_tick = value;
    }

    if let Some(value) = parsed::<f64, _>(&mut lookup, "LIFESTREAM_TICKS_PER_SECOND") {
        config.pacing.ticks_per_second = value;
    }

    if let Some(raw) = lookup("LIFESTREAM_LOG_STDOUT") {
        if let Some(value) = parse_boolish(&raw) {
            config.logging.stdout = value;
        } else {
            tracing::warn!("invalid LIFESTREAM_LOG_STDOUT, ignoring: {raw}");
        }
    }

    if let Some(raw) = lookup("LIFESTREAM_LOG_FORMAT") {
        if let Some(format) = parse_log_format(&raw) {
            config.logging.stdout_format = format;
        } else {
            tracing::warn!("invalid LIFESTREAM_LOG_FORMAT, ignoring: {raw}");
        }
    }
}

fn parsed<T, F>(lookup: &mut F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: FnMut(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("invalid {key}, ignoring: {err}");
            None
        }
    }
}

fn parse_boolish(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pretty" => Some(LogFormat::Pretty),
        "compact" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}
