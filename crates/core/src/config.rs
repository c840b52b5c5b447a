use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ensemble::EnsembleWeights;
use crate::strategy::StrategyBands;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub engine: EngineConfig,
    pub artifacts: ArtifactConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

/// Engine knobs from the recognized-options table. Everything has a default;
/// operators normally only touch `horizon_days` and the parallelism caps.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub horizon_days: u32,
    pub strategy_bands: StrategyBands,
    pub ensemble_weights: EnsembleWeights,
    pub llm_bound_pct: f64,
    pub per_entity_deadline_secs: u64,
    pub llm_deadline_secs: u64,
    pub pms_deadline_secs: u64,
    pub retry_attempts: u32,
    pub retry_backoff_secs: Vec<u64>,
    pub tenant_parallelism: usize,
    pub global_parallelism: usize,
    pub model_parallelism: usize,
    pub llm_parallelism: usize,
    pub default_local_tick_hour: u32,
}

#[derive(Clone, Debug)]
pub struct ArtifactConfig {
    /// Root of the content-addressed model artifact store.
    pub store_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub horizon_days: Option<u32>,
    pub artifact_store_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://priceye.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
            },
            engine: EngineConfig::default(),
            artifacts: ArtifactConfig { store_dir: PathBuf::from("artifacts") },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            horizon_days: 180,
            strategy_bands: StrategyBands::default(),
            ensemble_weights: EnsembleWeights::default(),
            llm_bound_pct: 30.0,
            per_entity_deadline_secs: 600,
            llm_deadline_secs: 30,
            pms_deadline_secs: 60,
            retry_attempts: 3,
            retry_backoff_secs: vec![1, 4, 16],
            tenant_parallelism: 4,
            global_parallelism: 32,
            model_parallelism: 16,
            llm_parallelism: 4,
            default_local_tick_hour: 4,
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("priceye.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(api_key_value.into());
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(horizon_days) = engine.horizon_days {
                self.engine.horizon_days = horizon_days;
            }
            if let Some(prudent) = engine.prudent_band_pct {
                self.engine.strategy_bands.prudent_pct = prudent;
            }
            if let Some(balanced) = engine.balanced_band_pct {
                self.engine.strategy_bands.balanced_pct = balanced;
            }
            if let Some(aggressive) = engine.aggressive_band_pct {
                self.engine.strategy_bands.aggressive_pct = aggressive;
            }
            if let Some(weights) = engine.ensemble_weights {
                if let Some(demand) = weights.demand_derived {
                    self.engine.ensemble_weights.demand_derived = demand;
                }
                if let Some(xgboost) = weights.xgboost {
                    self.engine.ensemble_weights.xgboost = xgboost;
                }
                if let Some(neural_net) = weights.neural_net {
                    self.engine.ensemble_weights.neural_net = neural_net;
                }
                if let Some(llm) = weights.llm {
                    self.engine.ensemble_weights.llm = llm;
                }
            }
            if let Some(llm_bound_pct) = engine.llm_bound_pct {
                self.engine.llm_bound_pct = llm_bound_pct;
            }
            if let Some(deadline) = engine.per_entity_deadline_secs {
                self.engine.per_entity_deadline_secs = deadline;
            }
            if let Some(deadline) = engine.llm_deadline_secs {
                self.engine.llm_deadline_secs = deadline;
            }
            if let Some(deadline) = engine.pms_deadline_secs {
                self.engine.pms_deadline_secs = deadline;
            }
            if let Some(attempts) = engine.retry_attempts {
                self.engine.retry_attempts = attempts;
            }
            if let Some(backoff) = engine.retry_backoff_secs {
                self.engine.retry_backoff_secs = backoff;
            }
            if let Some(parallelism) = engine.tenant_parallelism {
                self.engine.tenant_parallelism = parallelism;
            }
            if let Some(parallelism) = engine.global_parallelism {
                self.engine.global_parallelism = parallelism;
            }
            if let Some(parallelism) = engine.model_parallelism {
                self.engine.model_parallelism = parallelism;
            }
            if let Some(parallelism) = engine.llm_parallelism {
                self.engine.llm_parallelism = parallelism;
            }
            if let Some(hour) = engine.default_local_tick_hour {
                self.engine.default_local_tick_hour = hour;
            }
        }

        if let Some(artifacts) = patch.artifacts {
            if let Some(store_dir) = artifacts.store_dir {
                self.artifacts.store_dir = PathBuf::from(store_dir);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PRICEYE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PRICEYE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("PRICEYE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PRICEYE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PRICEYE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PRICEYE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("PRICEYE_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("PRICEYE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("PRICEYE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PRICEYE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PRICEYE_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PRICEYE_ENGINE_HORIZON_DAYS") {
            self.engine.horizon_days = parse_u32("PRICEYE_ENGINE_HORIZON_DAYS", &value)?;
        }
        if let Some(value) = read_env("PRICEYE_ENGINE_TICK_HOUR") {
            self.engine.default_local_tick_hour = parse_u32("PRICEYE_ENGINE_TICK_HOUR", &value)?;
        }

        if let Some(value) = read_env("PRICEYE_ARTIFACT_STORE_DIR") {
            self.artifacts.store_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("PRICEYE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PRICEYE_SERVER_PORT") {
            self.server.port = parse_u16("PRICEYE_SERVER_PORT", &value)?;
        }

        let log_level = read_env("PRICEYE_LOGGING_LEVEL").or_else(|| read_env("PRICEYE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PRICEYE_LOGGING_FORMAT").or_else(|| read_env("PRICEYE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(llm_api_key.into());
        }
        if let Some(horizon_days) = overrides.horizon_days {
            self.engine.horizon_days = horizon_days;
        }
        if let Some(store_dir) = overrides.artifact_store_dir {
            self.artifacts.store_dir = store_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_engine(&self.engine)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("priceye.toml"), PathBuf::from("config/priceye.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.horizon_days == 0 || engine.horizon_days > 730 {
        return Err(ConfigError::Validation(
            "engine.horizon_days must be in range 1..=730".to_string(),
        ));
    }

    if engine.default_local_tick_hour > 23 {
        return Err(ConfigError::Validation(
            "engine.default_local_tick_hour must be in range 0..=23".to_string(),
        ));
    }

    let weights = &engine.ensemble_weights;
    for (name, value) in [
        ("demand_derived", weights.demand_derived),
        ("xgboost", weights.xgboost),
        ("neural_net", weights.neural_net),
        ("llm", weights.llm),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "engine.ensemble_weights.{name} must be in range 0..=1"
            )));
        }
    }
    let weight_sum = weights.demand_derived + weights.xgboost + weights.neural_net + weights.llm;
    if weight_sum <= 0.0 {
        return Err(ConfigError::Validation(
            "engine.ensemble_weights must not all be zero".to_string(),
        ));
    }

    if !(0.0..=100.0).contains(&engine.llm_bound_pct) {
        return Err(ConfigError::Validation(
            "engine.llm_bound_pct must be in range 0..=100".to_string(),
        ));
    }

    if engine.retry_backoff_secs.len() < engine.retry_attempts as usize {
        return Err(ConfigError::Validation(
            "engine.retry_backoff_secs must provide a delay per retry attempt".to_string(),
        ));
    }

    for (name, value) in [
        ("tenant_parallelism", engine.tenant_parallelism),
        ("global_parallelism", engine.global_parallelism),
        ("model_parallelism", engine.model_parallelism),
        ("llm_parallelism", engine.llm_parallelism),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation(format!(
                "engine.{name} must be greater than zero"
            )));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    engine: Option<EnginePatch>,
    artifacts: Option<ArtifactPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    horizon_days: Option<u32>,
    prudent_band_pct: Option<f64>,
    balanced_band_pct: Option<f64>,
    aggressive_band_pct: Option<f64>,
    ensemble_weights: Option<WeightsPatch>,
    llm_bound_pct: Option<f64>,
    per_entity_deadline_secs: Option<u64>,
    llm_deadline_secs: Option<u64>,
    pms_deadline_secs: Option<u64>,
    retry_attempts: Option<u32>,
    retry_backoff_secs: Option<Vec<u64>>,
    tenant_parallelism: Option<usize>,
    global_parallelism: Option<usize>,
    model_parallelism: Option<usize>,
    llm_parallelism: Option<usize>,
    default_local_tick_hour: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WeightsPatch {
    demand_derived: Option<f64>,
    xgboost: Option<f64>,
    neural_net: Option<f64>,
    llm: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ArtifactPatch {
    store_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_the_recognized_options_table() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.engine.horizon_days == 180, "default horizon should be 180 days")?;
        ensure(config.engine.llm_bound_pct == 30.0, "default llm bound should be 30%")?;
        ensure(
            config.engine.retry_backoff_secs == vec![1, 4, 16],
            "default backoff should be 1/4/16 seconds",
        )?;
        ensure(config.engine.default_local_tick_hour == 4, "default tick hour should be 04:00")?;
        ensure(config.engine.tenant_parallelism == 4, "default tenant parallelism should be 4")?;
        Ok(())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_PRICEYE_LLM_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("priceye.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_key = "${TEST_PRICEYE_LLM_KEY}"
model = "gpt-4o-mini"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let api_key = config.llm.api_key.as_ref().ok_or("api key should be set")?;
            ensure(
                api_key.expose_secret() == "sk-from-env",
                "api key should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_PRICEYE_LLM_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PRICEYE_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("priceye.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[engine]
horizon_days = 90

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win over env and file",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.engine.horizon_days == 90, "file horizon should apply")?;
            Ok(())
        })();

        clear_vars(&["PRICEYE_DATABASE_URL"]);
        result
    }

    #[test]
    fn validation_rejects_api_provider_without_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("priceye.toml");
        fs::write(
            &path,
            r#"
[llm]
provider = "openai"
"#,
        )
        .map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() }) {
                Ok(_) => return Err("expected validation failure".to_string()),
                Err(error) => error,
            };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("llm.api_key")
        );
        ensure(has_message, "validation failure should mention llm.api_key")
    }

    #[test]
    fn validation_rejects_out_of_range_tick_hour() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PRICEYE_ENGINE_TICK_HOUR", "25");
        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected validation failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("tick_hour")
                ),
                "validation failure should mention the tick hour",
            )
        })();

        clear_vars(&["PRICEYE_ENGINE_TICK_HOUR"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PRICEYE_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["PRICEYE_LLM_API_KEY"]);
        result
    }
}
