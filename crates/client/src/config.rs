use std::path::PathBuf;
use std::time::Duration;

/// Default REST API base.
const DEFAULT_API_URL: &str = "http://localhost:8000/api/";
/// Default WebSocket base; job sockets live under `jobs/<id>/`.
const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws/";
/// Default HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
/// Default number of reconnect attempts for a dropped live subscription.
const DEFAULT_LIVE_RECONNECT_ATTEMPTS: u32 = 5;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a backend running locally.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST API base URL, always ending in `/`.
    pub api_url: String,
    /// WebSocket base URL, always ending in `/`.
    pub ws_url: String,
    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,
    /// Where the session tokens are persisted.
    pub session_file: PathBuf,
    /// Reconnect attempts before a live subscription gives up.
    pub live_reconnect_attempts: u32,
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be an {expected} URL, got `{value}`")]
    InvalidUrl {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{var} must be a non-negative integer, got `{value}`")]
    InvalidNumber { var: &'static str, value: String },
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                       |
    /// |----------------------------------|-------------------------------|
    /// | `VR180_API_URL`                  | `http://localhost:8000/api/`  |
    /// | `VR180_WS_URL`                   | `ws://localhost:8000/ws/`     |
    /// | `VR180_REQUEST_TIMEOUT_SECS`     | `60`                          |
    /// | `VR180_SESSION_FILE`             | `$HOME/.vr180/session.json`   |
    /// | `VR180_LIVE_RECONNECT_ATTEMPTS`  | `5`                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("VR180_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let ws_url = lookup("VR180_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.into());

        let request_timeout_secs: u64 = parse_number(
            "VR180_REQUEST_TIMEOUT_SECS",
            lookup("VR180_REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let live_reconnect_attempts: u32 = parse_number(
            "VR180_LIVE_RECONNECT_ATTEMPTS",
            lookup("VR180_LIVE_RECONNECT_ATTEMPTS"),
            DEFAULT_LIVE_RECONNECT_ATTEMPTS,
        )?;

        let session_file = lookup("VR180_SESSION_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_session_file(lookup("HOME")));

        let mut config = Self {
            api_url: String::new(),
            ws_url: String::new(),
            request_timeout: Duration::from_secs(request_timeout_secs),
            session_file,
            live_reconnect_attempts,
        };
        config.set_api_url(&api_url)?;
        config.set_ws_url(&ws_url)?;
        Ok(config)
    }

    /// Override the REST API base URL.
    pub fn set_api_url(&mut self, url: &str) -> Result<(), ConfigError> {
        self.api_url = normalize_base("VR180_API_URL", url, &["http://", "https://"], "http(s)")?;
        Ok(())
    }

    /// Override the WebSocket base URL.
    pub fn set_ws_url(&mut self, url: &str) -> Result<(), ConfigError> {
        self.ws_url = normalize_base("VR180_WS_URL", url, &["ws://", "wss://"], "ws(s)")?;
        Ok(())
    }

    /// Absolute URL of a REST endpoint, e.g. `endpoint("vr_conv/jobs/")`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path.trim_start_matches('/'))
    }

    /// Live update socket for one job.
    pub fn job_socket_url(&self, job_id: &str) -> String {
        format!("{}jobs/{}/", self.ws_url, job_id)
    }

    /// Backend origin: the API base without its trailing `/api/`.
    pub fn backend_origin(&self) -> &str {
        let base = self.api_url.trim_end_matches('/');
        base.strip_suffix("/api").unwrap_or(base)
    }

    /// Resolve an output location reported by the backend into a URL the
    /// user can open. Absolute URLs are returned unchanged.
    pub fn media_url(&self, output_location: &str) -> String {
        if output_location.starts_with("http://") || output_location.starts_with("https://") {
            return output_location.to_string();
        }
        format!(
            "{}/{}",
            self.backend_origin(),
            output_location.trim_start_matches('/')
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            ws_url: DEFAULT_WS_URL.into(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            session_file: default_session_file(std::env::var("HOME").ok()),
            live_reconnect_attempts: DEFAULT_LIVE_RECONNECT_ATTEMPTS,
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    var: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

fn normalize_base(
    var: &'static str,
    url: &str,
    schemes: &[&str],
    expected: &'static str,
) -> Result<String, ConfigError> {
    let url = url.trim();
    let valid = schemes
        .iter()
        .any(|scheme| url.len() > scheme.len() && url.starts_with(scheme));
    if !valid {
        return Err(ConfigError::InvalidUrl {
            var,
            expected,
            value: url.to_string(),
        });
    }
    Ok(format!("{}/", url.trim_end_matches('/')))
}

fn default_session_file(home: Option<String>) -> PathBuf {
    match home {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(".vr180").join("session.json"),
        _ => PathBuf::from(".vr180-session.json"),
    }
}
