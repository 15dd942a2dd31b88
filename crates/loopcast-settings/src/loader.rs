//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LoopcastSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `LOOPCAST_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{IdleUnsubscribe, LoopcastSettings, MAX_HISTORY_COUNT};

/// Resolve the default settings file (`~/.loopcast/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".loopcast").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LoopcastSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LoopcastSettings> {
    let defaults = serde_json::to_value(LoopcastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: LoopcastSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `LOOPCAST_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut LoopcastSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning, leaving the file/default value
/// in place.
pub fn apply_overrides(settings: &mut LoopcastSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Broker ──────────────────────────────────────────────────────
    if let Some(v) = env.string("LOOPCAST_ORIGIN") {
        settings.broker.origin = v;
    }
    if let Some(v) = env.string("LOOPCAST_PUBLISH_KEY") {
        settings.broker.publish_key = v;
    }
    if let Some(v) = env.string("LOOPCAST_SUBSCRIBE_KEY") {
        settings.broker.subscribe_key = v;
    }
    if let Some(v) = env.u64("LOOPCAST_REQUEST_TIMEOUT_MS", 100, 600_000) {
        settings.broker.request_timeout_ms = v;
    }
    if let Some(v) = env.u64("LOOPCAST_SUBSCRIBE_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.broker.subscribe_timeout_ms = v;
    }

    // ── Channels ────────────────────────────────────────────────────
    if let Some(v) = env.string("LOOPCAST_PRIMARY_CHANNEL") {
        settings.channels.primary = v;
    }
    if let Some(v) = env.string("LOOPCAST_CHANNELS") {
        settings.channels.subscribe = parse_channel_list(&v);
    }

    // ── Flow ────────────────────────────────────────────────────────
    if let Some(v) = env.usize("LOOPCAST_HISTORY_COUNT", 1, MAX_HISTORY_COUNT) {
        settings.bootstrap.history_count = v;
    }
    if let Some(v) = env.u64("LOOPCAST_PREEMPT_PERIOD_MS", 1, 86_400_000) {
        settings.preemption.period_ms = v;
    }
    if let Some(v) = env.string("LOOPCAST_IDLE_UNSUBSCRIBE") {
        match parse_idle_unsubscribe(&v) {
            Some(policy) => settings.preemption.idle_unsubscribe = policy,
            None => tracing::warn!(key = "LOOPCAST_IDLE_UNSUBSCRIBE", value = %v, "invalid policy, ignoring"),
        }
    }
    if let Some(v) = env.bool("LOOPCAST_CLOCK_ENABLED") {
        settings.clock.enabled = v;
    }
    if let Some(v) = env.u64("LOOPCAST_CLOCK_PERIOD_MS", 1, 86_400_000) {
        settings.clock.period_ms = v;
    }

    // ── Retry / logging ─────────────────────────────────────────────
    if let Some(v) = env.u64("LOOPCAST_MAX_RETRIES", 0, 20) {
        #[allow(clippy::cast_possible_truncation)]
        let v = v as u32;
        settings.retry.max_retries = v;
    }
    if let Some(v) = env.string("LOOPCAST_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated channel list, trimming blanks.
pub fn parse_channel_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse an idle-unsubscribe policy name.
pub fn parse_idle_unsubscribe(val: &str) -> Option<IdleUnsubscribe> {
    match val.to_lowercase().as_str() {
        "issue" => Some(IdleUnsubscribe::Issue),
        "skip" => Some(IdleUnsubscribe::Skip),
        _ => None,
    }
}

// ── Env readers (thin wrappers) ─────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
