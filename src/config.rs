use std::path::PathBuf;
use std::time::Duration;

use apiscout::DiscoverOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum ConfigError {
    #[error("failed to read config \"{path}\": {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Deserialize, Serialize, Default, Debug, PartialEq)]
pub(crate) struct Network {
    /// Permit plain http:// targets. Development only.
    #[serde(default)]
    pub allow_insecure_scheme: bool,
    /// Permit targets resolving to loopback. Development only.
    #[serde(default)]
    pub allow_loopback: bool,
    pub user_agent: Option<String>,
    pub page_timeout_ms: Option<u64>,
    pub max_body_bytes: Option<usize>,
    pub max_redirects: Option<u32>,
}

#[derive(Deserialize, Serialize, Default, Debug, PartialEq)]
pub(crate) struct Probe {
    pub timeout_ms: Option<u64>,
    pub max_candidates: Option<usize>,
}

#[derive(Deserialize, Serialize, Default, Debug, PartialEq)]
pub(crate) struct Config {
    pub api_key: Option<String>,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub probe: Probe,
}

impl Config {
    /// Library options with every configured value applied over the defaults.
    pub(crate) fn discover_options(&self) -> DiscoverOptions {
        let mut options = DiscoverOptions::default();

        options.api_key = self.api_key.clone();
        options.policy.allow_insecure_scheme = self.network.allow_insecure_scheme;
        options.policy.allow_loopback = self.network.allow_loopback;

        if let Some(user_agent) = &self.network.user_agent {
            options.user_agent = user_agent.clone();
        }

        if let Some(ms) = self.network.page_timeout_ms {
            options.page_limits.total_timeout = Duration::from_millis(ms);
        }

        if let Some(bytes) = self.network.max_body_bytes {
            options.page_limits.max_body_bytes = bytes;
        }

        if let Some(hops) = self.network.max_redirects {
            options.page_limits.max_hops = hops;
            options.probe_limits.max_hops = hops;
        }

        if let Some(ms) = self.probe.timeout_ms {
            options.probe_limits.total_timeout = Duration::from_millis(ms);
        }

        if let Some(n) = self.probe.max_candidates {
            options.max_probed_candidates = n;
        }

        options
    }
}

fn get_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME");

    if let Some(home) = home {
        let home = PathBuf::from(home);

        const USER_PATHS: [&str; 2] = [".config/apiscout/config.toml", ".apiscout.toml"];

        for &path in USER_PATHS.iter() {
            let fullpath = home.join(path);

            if fullpath.exists() {
                return Some(fullpath);
            }
        }
    }

    let system_config = PathBuf::from("/etc/apiscout.toml");

    if system_config.exists() {
        Some(system_config)
    } else {
        None
    }
}

fn extra_fields_helper<'a>(
    path: &mut Vec<&'a str>,
    user_config: &'a toml::Table,
    config: &'a toml::Table,
    extra: &mut Vec<String>,
) {
    for (user_key, user_value) in user_config {
        path.push(user_key);

        match (user_value, config.get(user_key)) {
            (toml::Value::Table(user_value), Some(toml::Value::Table(config_value))) => {
                extra_fields_helper(path, user_value, config_value, extra)
            }
            (_, Some(_)) => {}
            (_, None) => extra.push(path.join(".")),
        }

        path.pop();
    }
}

/// Dotted paths of keys in `raw_config` that `config` does not know about.
fn extra_fields(config: &Config, raw_config: &str) -> Result<Vec<String>, ConfigError> {
    let user_config: toml::Table = toml::from_str(raw_config)?;

    // Options left unset are dropped on serialization; mark them all present
    // so that only unknown keys remain.
    let known = Config {
        api_key: Some(String::new()),
        network: Network {
            allow_insecure_scheme: config.network.allow_insecure_scheme,
            allow_loopback: config.network.allow_loopback,
            user_agent: Some(String::new()),
            page_timeout_ms: Some(0),
            max_body_bytes: Some(0),
            max_redirects: Some(0),
        },
        probe: Probe {
            timeout_ms: Some(0),
            max_candidates: Some(0),
        },
    };

    let known = match toml::Value::try_from(&known) {
        Ok(toml::Value::Table(table)) => table,
        _ => toml::Table::new(),
    };

    let mut path = Vec::new();
    let mut extra = Vec::new();

    extra_fields_helper(&mut path, &user_config, &known, &mut extra);

    Ok(extra)
}

pub(crate) fn parse_config(raw_config: &str) -> Result<(Config, Vec<String>), ConfigError> {
    let config: Config = toml::from_str(raw_config)?;

    let extra = extra_fields(&config, raw_config)?;

    Ok((config, extra))
}

pub(crate) fn read_config(config: Option<PathBuf>) -> Result<Config, ConfigError> {
    let config_path = config.or_else(get_config_path);

    let Some(path) = config_path else {
        return Ok(Config::default());
    };

    let raw_config = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    let (config, extra) = parse_config(&raw_config)?;

    for key in extra {
        crate::warn!("config contains extraneous key \"{}\", ignoring", key);
    }

    Ok(config)
}
