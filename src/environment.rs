//! # Environment Module
//!
//! Startup configuration, resolved once from `SAGEMAKER_INFERENCE_*`
//! environment variables and passed by reference to the installer, the code
//! locator and the request server.
//!
//! ## Environment Variables
//!
//! | Variable | Default |
//! |---|---|
//! | `SAGEMAKER_INFERENCE_BASE_DIRECTORY` | `/opt/ml/model` |
//! | `SAGEMAKER_INFERENCE_CODE_DIRECTORY` | unset |
//! | `SAGEMAKER_INFERENCE_CODE` | `inference.handler` |
//! | `SAGEMAKER_INFERENCE_REQUIREMENTS` | `requirements.txt` |
//! | `SAGEMAKER_INFERENCE_INSTALLER` | `python3 -m pip install -r` |
//! | `SAGEMAKER_INFERENCE_LOGGING_LEVEL` | `10` (debug) |
//! | `SAGEMAKER_INFERENCE_PORT` | `8080` |
//! | `SAGEMAKER_INFERENCE_WORKERS` | `min(32, cpus + 4)` |
//! | `SAGEMAKER_INFERENCE_STACK_SIZE` | `0x10000` |
//!
//! Numeric values that fail to parse fall back to their defaults. The stack
//! size accepts decimal (`65536`) or hexadecimal (`0x10000`).

use crate::worker_pool::WorkerPoolConfig;
use serde::Serialize;
use std::path::PathBuf;
use tracing::Level;

const PREFIX: &str = "SAGEMAKER_INFERENCE_";

pub const DEFAULT_BASE_DIRECTORY: &str = "/opt/ml/model";
pub const DEFAULT_CODE: &str = "inference.handler";
pub const DEFAULT_REQUIREMENTS: &str = "requirements.txt";
pub const DEFAULT_INSTALLER: &str = "python3 -m pip install -r";
pub const DEFAULT_LOGGING_LEVEL: &str = "10";
pub const DEFAULT_PORT: u16 = 8080;
/// 64 KB coroutine stacks
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Resolved startup configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    /// Root directory of the model artifacts
    pub base_directory: PathBuf,
    /// Subdirectory of `base_directory` holding the handler unit
    pub code_directory: Option<PathBuf>,
    /// Handler reference, `<module>.<symbol>`
    pub code: String,
    /// Requirements file name inside the code directory
    pub requirements: String,
    /// Installer command; the requirements path is appended as the last argument
    pub installer: String,
    /// Numeric level (`10`, `20`, ...) or level name
    pub logging_level: String,
    pub port: u16,
    /// Worker pool size for blocking handlers
    pub workers: usize,
    /// Coroutine stack size in bytes
    pub stack_size: usize,
}

impl Default for Environment {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Environment {
    /// Read the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve against `lookup`, which receives full variable names.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            base_directory: PathBuf::from(
                get("BASE_DIRECTORY").unwrap_or_else(|| DEFAULT_BASE_DIRECTORY.to_string()),
            ),
            code_directory: get("CODE_DIRECTORY").map(PathBuf::from),
            code: get("CODE").unwrap_or_else(|| DEFAULT_CODE.to_string()),
            requirements: get("REQUIREMENTS").unwrap_or_else(|| DEFAULT_REQUIREMENTS.to_string()),
            installer: get("INSTALLER").unwrap_or_else(|| DEFAULT_INSTALLER.to_string()),
            logging_level: get("LOGGING_LEVEL")
                .unwrap_or_else(|| DEFAULT_LOGGING_LEVEL.to_string()),
            port: get("PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            workers: get("WORKERS")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or_else(WorkerPoolConfig::default_workers),
            stack_size: get("STACK_SIZE")
                .and_then(|s| parse_size(&s))
                .unwrap_or(DEFAULT_STACK_SIZE),
        }
    }

    /// Directory the handler unit and requirements file live in
    #[must_use]
    pub fn code_path(&self) -> PathBuf {
        match &self.code_directory {
            Some(dir) => self.base_directory.join(dir),
            None => self.base_directory.clone(),
        }
    }

    /// The configured logging level as a `tracing` level
    #[must_use]
    pub fn log_level(&self) -> Level {
        parse_log_level(&self.logging_level).unwrap_or(Level::DEBUG)
    }
}

/// Parse a size in decimal or `0x` hexadecimal
pub fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Map a numeric level (`10` debug, `20` info, ...) or a level name
pub fn parse_log_level(value: &str) -> Option<Level> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(match n {
            i64::MIN..=9 => Level::TRACE,
            10..=19 => Level::DEBUG,
            20..=29 => Level::INFO,
            30..=39 => Level::WARN,
            _ => Level::ERROR,
        });
    }
    match value.to_ascii_lowercase().as_str() {
        "trace" | "notset" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" | "critical" | "fatal" => Some(Level::ERROR),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_with(pairs: &[(&str, &str)]) -> Environment {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{PREFIX}{k}"), v.to_string()))
            .collect();
        Environment::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let env = Environment::default();
        assert_eq!(env.base_directory, PathBuf::from("/opt/ml/model"));
        assert_eq!(env.code_directory, None);
        assert_eq!(env.code, "inference.handler");
        assert_eq!(env.requirements, "requirements.txt");
        assert_eq!(env.installer, "python3 -m pip install -r");
        assert_eq!(env.port, 8080);
        assert_eq!(env.stack_size, 0x10000);
        assert_eq!(env.workers, WorkerPoolConfig::default_workers());
        assert_eq!(env.log_level(), Level::DEBUG);
    }

    #[test]
    fn test_overrides() {
        let env = env_with(&[
            ("BASE_DIRECTORY", "/srv/model"),
            ("CODE_DIRECTORY", "code"),
            ("CODE", "serve.predict"),
            ("PORT", "9090"),
            ("WORKERS", "3"),
            ("STACK_SIZE", "0x8000"),
            ("LOGGING_LEVEL", "20"),
        ]);
        assert_eq!(env.code_path(), PathBuf::from("/srv/model/code"));
        assert_eq!(env.code, "serve.predict");
        assert_eq!(env.port, 9090);
        assert_eq!(env.workers, 3);
        assert_eq!(env.stack_size, 0x8000);
        assert_eq!(env.log_level(), Level::INFO);
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let env = env_with(&[("PORT", "http"), ("WORKERS", "0"), ("STACK_SIZE", "big")]);
        assert_eq!(env.port, DEFAULT_PORT);
        assert_eq!(env.workers, WorkerPoolConfig::default_workers());
        assert_eq!(env.stack_size, DEFAULT_STACK_SIZE);
    }

    #[test]
    fn test_code_path_without_subdirectory() {
        let env = env_with(&[("BASE_DIRECTORY", "/srv/model")]);
        assert_eq!(env.code_path(), PathBuf::from("/srv/model"));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("16384"), Some(16384));
        assert_eq!(parse_size("0x4000"), Some(0x4000));
        assert_eq!(parse_size("0X4000"), Some(0x4000));
        assert_eq!(parse_size("0xZZ"), None);
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("5"), Some(Level::TRACE));
        assert_eq!(parse_log_level("10"), Some(Level::DEBUG));
        assert_eq!(parse_log_level("30"), Some(Level::WARN));
        assert_eq!(parse_log_level("50"), Some(Level::ERROR));
        assert_eq!(parse_log_level("WARNING"), Some(Level::WARN));
        assert_eq!(parse_log_level("verbose"), None);
    }
}
