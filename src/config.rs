use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

pub const CONFIG_PATH_ENV: &str = "TRACKER_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    /// Number of consecutive moving reports required before an alert.
    pub window_size: usize,
    pub alert_cooldown_secs: u64,
    pub notify_timeout_secs: u64,
    pub maps_api_key: Option<String>,
    pub alert_email_to: Option<String>,
    pub alert_email_from: Option<String>,
    pub sendmail_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 3000,
            window_size: 3,
            alert_cooldown_secs: 5 * 60,
            notify_timeout_secs: 30,
            maps_api_key: None,
            alert_email_to: None,
            alert_email_from: None,
            sendmail_path: PathBuf::from("/usr/sbin/sendmail"),
        }
    }
}

impl Config {
    /// Read the JSON file named by `TRACKER_CONFIG` (if any), then apply env overrides.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load(path.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn load<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse config at {}", path.display()))?
            }
            _ => Config::default(),
        };

        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = non_empty(env("HOST")) {
            self.bind_address = host;
        }
        if let Some(port) = parse_env(&env, "PORT")? {
            self.port = port;
        }
        if let Some(size) = parse_env(&env, "MOVEMENT_WINDOW")? {
            self.window_size = size;
        }
        if let Some(secs) = parse_env(&env, "ALERT_COOLDOWN_SECS")? {
            self.alert_cooldown_secs = secs;
        }
        if let Some(secs) = parse_env(&env, "NOTIFY_TIMEOUT_SECS")? {
            self.notify_timeout_secs = secs;
        }
        if let Some(key) = non_empty(env("MAPS_API")) {
            self.maps_api_key = Some(key);
        }
        if let Some(to) = non_empty(env("ALERT_EMAIL_TO")) {
            self.alert_email_to = Some(to);
        }
        if let Some(from) = non_empty(env("ALERT_EMAIL_FROM")) {
            self.alert_email_from = Some(from);
        }
        if let Some(path) = non_empty(env("SENDMAIL_PATH")) {
            self.sendmail_path = PathBuf::from(path);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            bail!("window_size must be at least 1");
        }
        if self.notify_timeout_secs == 0 {
            bail!("notify_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip = IpAddr::from_str(&self.bind_address)
            .with_context(|| format!("invalid bind address '{}'", self.bind_address))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn alert_cooldown(&self) -> chrono::Duration {
        // chrono panics past i64::MAX milliseconds
        let secs = self.alert_cooldown_secs.min(i64::MAX as u64 / 1_000);
        chrono::Duration::seconds(secs as i64)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_env<F, T>(env: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty(env(key)) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value '{raw}' for {key}")),
        None => Ok(None),
    }
}
