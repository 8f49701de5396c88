use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::error::{EngineError, Result};

/// Which number a statement cell shows for a numeric fact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignConvention {
    /// Reported value multiplied by the balance-type sign (credit flips).
    Canonical,
    /// Value exactly as tagged, after scale and the `sign` attribute.
    Reported,
}

impl FromStr for SignConvention {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "canonical" => Ok(SignConvention::Canonical),
            "reported" => Ok(SignConvention::Reported),
            other => Err(EngineError::Config(format!(
                "unknown sign convention '{}', expected 'canonical' or 'reported'",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub fetch_retries: u32,
    pub retry_base_delay: Duration,
    pub max_workers: usize,
    pub output_dir: PathBuf,
    pub role_policy_path: Option<PathBuf>,
    pub sign_convention: SignConvention,
    pub include_all_facts: bool,
    pub include_dimensional: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_agent: "software@example.com".to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            fetch_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            max_workers: 4,
            output_dir: PathBuf::from("output"),
            role_policy_path: None,
            sign_convention: SignConvention::Reported,
            include_all_facts: true,
            include_dimensional: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let user_agent = std::env::var("USER_AGENT").unwrap_or(defaults.user_agent);

        let connect_timeout = env_parse::<u64>("IXSHEET_CONNECT_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout);

        let read_timeout = env_parse::<u64>("IXSHEET_FETCH_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.read_timeout);

        let fetch_retries =
            env_parse::<u32>("IXSHEET_FETCH_RETRIES")?.unwrap_or(defaults.fetch_retries);

        let retry_base_delay = env_parse::<u64>("IXSHEET_RETRY_BASE_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_base_delay);

        let max_workers = env_parse::<usize>("IXSHEET_MAX_WORKERS")?
            .unwrap_or(defaults.max_workers)
            .max(1);

        let output_dir = std::env::var("IXSHEET_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);

        let role_policy_path = std::env::var("IXSHEET_ROLE_POLICY").ok().map(PathBuf::from);

        let sign_convention = match std::env::var("IXSHEET_SIGN_CONVENTION") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.sign_convention,
        };

        let include_all_facts =
            env_parse::<bool>("IXSHEET_ALL_FACTS")?.unwrap_or(defaults.include_all_facts);

        let include_dimensional = env_parse::<bool>("IXSHEET_DIMENSIONAL_ROWS")?
            .unwrap_or(defaults.include_dimensional);

        Ok(Self {
            user_agent,
            connect_timeout,
            read_timeout,
            fetch_retries,
            retry_base_delay,
            max_workers,
            output_dir,
            role_policy_path,
            sign_convention,
            include_all_facts,
            include_dimensional,
        })
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| EngineError::Config(format!("{} has invalid value '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}
