//! # PMOBrowser Configuration Module
//!
//! This module provides configuration management for PMOBrowser, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//! - Process-wide shared access
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::get_config;
//!
//! let config = get_config()?;
//! let timeout = config.get_http_timeout();
//! let targets = config.get_search_targets();
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Result, anyhow};
use dirs::home_dir;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
    time::Duration,
};
use tracing::{info, warn};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmobrowser.yaml");

static CONFIG: OnceLock<Arc<Config>> = OnceLock::new();

const ENV_CONFIG_DIR: &str = "PMOBROWSER_CONFIG";
const ENV_PREFIX: &str = "PMOBROWSER_CONFIG__";
const CONFIG_DIR_NAME: &str = ".pmobrowser";

// Default values for configuration
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DESCRIPTION_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MSEARCH_MX: u64 = 3;
const DEFAULT_USE_DESKTOP_DEFAULTS: bool = true;
const DEFAULT_SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:MediaServer:1";

/// Macro to generate getter/setter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> u64 {
            match self.get_value($path) {
                Ok(Value::Number(n)) => n.as_u64().unwrap_or($default),
                Ok(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                    warn!(path = ?$path, value = %s, "Invalid number, using default {}", $default);
                    $default
                }),
                _ => $default,
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for PMOBrowser
///
/// Holds the merged YAML tree (embedded defaults, `config.yaml`, environment
/// overrides) and writes it back to `config.yaml` on every change.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        // Default fallback
        CONFIG_DIR_NAME.to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `PMOBROWSER_CONFIG` environment variable
    /// 3. `.pmobrowser` in the current directory
    /// 4. `.pmobrowser` in the user's home directory
    ///
    /// The directory is created if it doesn't exist.
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))
            .map_err(|e| anyhow!("Cannot use config directory {}: {}", dir_path, e))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut config_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path, "Loaded config file");
                let external_value: Value = serde_yaml::from_slice(&data)?;
                merge_yaml(&mut config_value, &external_value);
            }
            Err(_) => {
                info!(config_file = %path, "Config file not found, using default embedded config");
            }
        }

        let mut config_value = lower_keys_value(config_value);
        apply_env_overrides(&mut config_value, env::vars());

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    fn data(&self) -> Result<MutexGuard<'_, Value>> {
        self.data
            .lock()
            .map_err(|_| anyhow!("Configuration mutex poisoned"))
    }

    /// Directory holding `config.yaml`
    pub fn dir(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.data()?)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["browser", "http_timeout_secs"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data()?;
            set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    /// Gets a configuration value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data()?;
        get_value_internal(&data, path)
    }

    impl_u64_config!(
        get_http_timeout_secs,
        set_http_timeout_secs,
        &["browser", "http_timeout_secs"],
        DEFAULT_HTTP_TIMEOUT_SECS
    );

    impl_u64_config!(
        get_description_timeout_secs,
        set_description_timeout_secs,
        &["discovery", "description_timeout_secs"],
        DEFAULT_DESCRIPTION_TIMEOUT_SECS
    );

    impl_u64_config!(
        get_msearch_mx,
        set_msearch_mx,
        &["discovery", "msearch_mx"],
        DEFAULT_MSEARCH_MX
    );

    impl_bool_config!(
        get_use_desktop_defaults,
        set_use_desktop_defaults,
        &["launcher", "use_desktop_defaults"],
        DEFAULT_USE_DESKTOP_DEFAULTS
    );

    /// Timeout of one ContentDirectory round trip
    pub fn get_http_timeout(&self) -> Duration {
        Duration::from_secs(self.get_http_timeout_secs().max(1))
    }

    /// Timeout of one device description fetch
    pub fn get_description_timeout(&self) -> Duration {
        Duration::from_secs(self.get_description_timeout_secs().max(1))
    }

    /// Récupère le niveau de log minimum depuis la configuration
    pub fn get_log_min_level(&self) -> String {
        match self.get_value(&["host", "logger", "min_level"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => s,
            _ => DEFAULT_LOG_MIN_LEVEL.to_string(),
        }
    }

    /// Définit le niveau de log minimum dans la configuration
    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }

    /// Log file, resolved against the config directory when relative
    pub fn get_log_file(&self) -> Option<String> {
        match self.get_value(&["host", "logger", "file"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => {
                let path = Path::new(s.trim());
                if path.is_absolute() {
                    Some(path.to_string_lossy().to_string())
                } else {
                    Some(
                        Path::new(&self.config_dir)
                            .join(path)
                            .to_string_lossy()
                            .to_string(),
                    )
                }
            }
            _ => None,
        }
    }

    /// SSDP search targets sent in M-SEARCH requests
    pub fn get_search_targets(&self) -> Vec<String> {
        let targets: Vec<String> = match self.get_value(&["discovery", "search_targets"]) {
            Ok(Value::Sequence(seq)) => seq
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    _ => None,
                })
                .collect(),
            Ok(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        };

        if targets.is_empty() {
            vec![DEFAULT_SEARCH_TARGET.to_string()]
        } else {
            targets
        }
    }

    /// Configured MIME pattern → command line pairs, in file order
    pub fn get_launcher_handlers(&self) -> Vec<(String, String)> {
        match self.get_value(&["launcher", "handlers"]) {
            Ok(Value::Mapping(map)) => map
                .into_iter()
                .filter_map(|(k, v)| match (k, v) {
                    (Value::String(pattern), Value::String(command))
                        if !command.trim().is_empty() =>
                    {
                        Some((pattern, command))
                    }
                    (k, _) => {
                        warn!(pattern = ?k, "Ignoring launcher handler without command");
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Adds or replaces a launcher handler
    pub fn set_launcher_handler(&self, pattern: &str, command: &str) -> Result<()> {
        self.set_value(
            &["launcher", "handlers", pattern],
            Value::String(command.to_string()),
        )
    }
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    if let Value::Mapping(map) = data {
        let key_value = Value::String(path[0].to_lowercase());
        if path.len() == 1 {
            map.insert(key_value, value);
        } else {
            let entry = map
                .entry(key_value)
                .or_insert(Value::Mapping(Mapping::new()));
            set_value_internal(entry, &path[1..], value)?;
        }
        Ok(())
    } else {
        Err(anyhow!("Current node is not a map"))
    }
}

fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
    let mut current = data;
    for (i, key) in path.iter().enumerate() {
        if let Value::Mapping(map) = current {
            match map.get(Value::String(key.to_lowercase())) {
                Some(next) => current = next,
                None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
            }
        } else {
            return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
        }
    }
    Ok(current.clone())
}

/// Applies `PMOBROWSER_CONFIG__SECTION__KEY=value` overrides
fn apply_env_overrides<I>(config: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let key_path = stripped.split("__").collect::<Vec<_>>();
        if let Err(err) = set_value_internal(config, &key_path, convert_env_value(&value)) {
            warn!(env_var = %key, "Ignoring configuration override: {}", err);
        }
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                let k = match k {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                new_map.insert(k, lower_keys_value(v));
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Merges external YAML configuration into default configuration
///
/// - For mappings (objects), it merges keys from external into default
/// - For scalars and sequences, external values replace default values
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(), // pour les scalaires ou séquences, on remplace
    }
}

/// Loads the process-wide configuration from `directory` (empty string for
/// the default lookup). Later calls return the already loaded instance.
pub fn init_config(directory: &str) -> Result<Arc<Config>> {
    if let Some(config) = CONFIG.get() {
        return Ok(config.clone());
    }
    let config = Arc::new(Config::load_config(directory)?);
    Ok(CONFIG.get_or_init(|| config).clone())
}

/// Returns the global configuration instance, loading it on first access.
pub fn get_config() -> Result<Arc<Config>> {
    init_config("")
}
