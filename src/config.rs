//! Importer configuration: the immutable settings value and its file loader.
//!
//! The configuration file is a small INI-style document:
//!
//! ```text
//! [server]
//! url = https://recipes.example.com
//! api_token = "abc123"
//!
//! [import]
//! delay_between_requests = 30   # seconds between URLs
//! ```
//!
//! Section headers are accepted for readability but keys are global. Values may
//! be bare or double-quoted; `#` and `;` start a comment outside of quotes.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::retry::{DEFAULT_MAX_RETRIES, DEFAULT_RATE_LIMIT_DELAY, RetryPolicy};

/// Default pause between two URLs that touched the server.
pub const DEFAULT_DELAY_BETWEEN_REQUESTS: Duration = Duration::from_secs(30);

/// Default page size used when building the duplicate index.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// File name looked up in the config directories and the working directory.
pub const CONFIG_FILE_NAME: &str = "config.conf";

const CONFIG_DIR_NAME: &str = "recipe-importer";

/// Values shipped in `config.conf.example`; a config still carrying them was never filled in.
const PLACEHOLDER_URL: &str = "https://your-recipe-server.example.com";
const PLACEHOLDER_TOKEN: &str = "your_api_token_here";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration file exists at the resolved path.
    #[error(
        "configuration file not found: {path}\n  Suggestion: copy config.conf.example to {path} and set `url` and `api_token`"
    )]
    NotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// The configuration file exists but could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A line is not `key = value`, a section header, or a comment.
    #[error("invalid configuration syntax on line {line}: {message}")]
    Syntax {
        /// 1-based line number.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    /// A key the importer does not recognize.
    #[error("unknown configuration key '{key}' on line {line}")]
    UnknownKey {
        /// 1-based line number.
        line: usize,
        /// The unrecognized key.
        key: String,
    },

    /// A required value is absent or empty.
    #[error("missing required configuration value `{key}`")]
    Missing {
        /// Name of the missing key.
        key: &'static str,
    },

    /// A value is present but unusable.
    #[error("invalid configuration value for `{key}`: {message}")]
    Invalid {
        /// Name of the offending key.
        key: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }

    fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }
}

/// Bearer credential for the recipe server.
///
/// `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for building the `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(<redacted>)")
    }
}

impl fmt::Display for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Immutable settings passed into the client, index builder and orchestrator.
#[derive(Debug, Clone)]
pub struct ImporterConfig {
    server_url: Url,
    api_token: ApiToken,
    delay_between_requests: Duration,
    max_attempts: u32,
    rate_limit_delay: Duration,
    page_size: u32,
}

impl ImporterConfig {
    /// Creates a configuration for the given server and token with default pacing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for empty values and
    /// [`ConfigError::Invalid`] when the URL is not an absolute http(s) URL or
    /// either value is the example-file placeholder.
    pub fn new(server_url: &str, api_token: &str) -> Result<Self, ConfigError> {
        let server_url = parse_server_url(server_url)?;

        let api_token = api_token.trim();
        if api_token.is_empty() {
            return Err(ConfigError::Missing { key: "api_token" });
        }
        if api_token == PLACEHOLDER_TOKEN {
            return Err(ConfigError::invalid(
                "api_token",
                "still set to the example placeholder; paste your server's API token",
            ));
        }

        Ok(Self {
            server_url,
            api_token: ApiToken::new(api_token),
            delay_between_requests: DEFAULT_DELAY_BETWEEN_REQUESTS,
            max_attempts: DEFAULT_MAX_RETRIES,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Overrides the pause between URLs.
    #[must_use]
    pub fn with_delay_between_requests(mut self, delay: Duration) -> Self {
        self.delay_between_requests = delay;
        self
    }

    /// Overrides the maximum attempts per phase (minimum 1).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Overrides the backoff used when a 429 carries no `Retry-After`.
    #[must_use]
    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    /// Overrides the duplicate-index page size (minimum 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Server base URL, always ending in `/`.
    #[must_use]
    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    /// Bearer token.
    #[must_use]
    pub fn api_token(&self) -> &ApiToken {
        &self.api_token
    }

    #[must_use]
    pub fn delay_between_requests(&self) -> Duration {
        self.delay_between_requests
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn rate_limit_delay(&self) -> Duration {
        self.rate_limit_delay
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Builds the retry policy shared by the index builder and the orchestrator.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.max_attempts)
            .with_rate_limit_delay(self.rate_limit_delay)
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when the file is absent, [`ConfigError::Read`]
    /// when it cannot be read, and parse/validation errors otherwise.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded configuration file");
        Self::from_config_str(&raw)
    }

    /// Parses configuration text in the `config.conf` format.
    ///
    /// # Errors
    ///
    /// Returns syntax, unknown-key, missing and range errors.
    pub fn from_config_str(raw: &str) -> Result<Self, ConfigError> {
        let file = parse_config_str(raw)?;

        let url = file.url.ok_or(ConfigError::Missing { key: "url" })?;
        let token = file
            .api_token
            .ok_or(ConfigError::Missing { key: "api_token" })?;
        let mut config = Self::new(&url, &token)?;

        if let Some(secs) = file.delay_between_requests {
            check_range("delay_between_requests", secs, 1, 3600)?;
            config = config.with_delay_between_requests(Duration::from_secs(secs));
        }
        if let Some(attempts) = file.max_attempts {
            check_range("max_attempts", attempts, 1, 10)?;
            config = config.with_max_attempts(u32::try_from(attempts).unwrap_or(1));
        }
        if let Some(secs) = file.rate_limit_delay {
            check_range("rate_limit_delay", secs, 1, 3600)?;
            config = config.with_rate_limit_delay(Duration::from_secs(secs));
        }
        if let Some(size) = file.page_size {
            check_range("page_size", size, 1, 1000)?;
            config = config.with_page_size(u32::try_from(size).unwrap_or(DEFAULT_PAGE_SIZE));
        }

        Ok(config)
    }
}

fn parse_server_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::Missing { key: "url" });
    }
    if trimmed == PLACEHOLDER_URL {
        return Err(ConfigError::invalid(
            "url",
            "still set to the example placeholder; set it to your recipe server's address",
        ));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::invalid(
            "url",
            format!("{trimmed} must start with http:// or https://"),
        ));
    }

    // The trailing slash makes relative endpoint joins keep any sub-path the server is mounted under.
    let parsed = Url::parse(&format!("{trimmed}/"))
        .map_err(|e| ConfigError::invalid("url", format!("{trimmed}: {e}")))?;
    if parsed.host().is_none() {
        return Err(ConfigError::invalid("url", format!("{trimmed} has no host")));
    }
    Ok(parsed)
}

fn check_range(key: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            key,
            format!("{value} is outside the allowed range {min}..={max}"),
        ))
    }
}

/// Resolves which configuration file to read.
///
/// Priority:
/// 1. the explicit path (from `--config`)
/// 2. `$XDG_CONFIG_HOME/recipe-importer/config.conf`
/// 3. `$HOME/.config/recipe-importer/config.conf`
/// 4. `./config.conf`
///
/// Candidates 2 and 3 are only chosen when the file exists.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    let candidates = [
        env_var_non_empty_os("XDG_CONFIG_HOME").map(PathBuf::from),
        env_var_non_empty_os("HOME").map(|home| PathBuf::from(home).join(".config")),
    ];
    candidates
        .into_iter()
        .flatten()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .find(|path| path.is_file())
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

#[derive(Debug, Default)]
struct FileConfig {
    url: Option<String>,
    api_token: Option<String>,
    delay_between_requests: Option<u64>,
    max_attempts: Option<u64>,
    rate_limit_delay: Option<u64>,
    page_size: Option<u64>,
}

fn parse_config_str(raw: &str) -> Result<FileConfig, ConfigError> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('[') {
            if !line.ends_with(']') || line.len() < 3 {
                return Err(ConfigError::syntax(line_no, "malformed section header"));
            }
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            return Err(ConfigError::syntax(line_no, "expected key = value"));
        };

        let key = raw_key.trim();
        let value = parse_value(raw_value.trim())
            .map_err(|message| ConfigError::syntax(line_no, message))?;

        match key {
            "url" => cfg.url = Some(value),
            "api_token" => cfg.api_token = Some(value),
            "delay_between_requests" => {
                cfg.delay_between_requests = Some(parse_integer_u64("delay_between_requests", &value)?);
            }
            "max_attempts" => {
                cfg.max_attempts = Some(parse_integer_u64("max_attempts", &value)?);
            }
            "rate_limit_delay" => {
                cfg.rate_limit_delay = Some(parse_integer_u64("rate_limit_delay", &value)?);
            }
            "page_size" => {
                cfg.page_size = Some(parse_integer_u64("page_size", &value)?);
            }
            unknown => {
                return Err(ConfigError::UnknownKey {
                    line: line_no,
                    key: unknown.to_string(),
                });
            }
        }
    }
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' | ';' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_value(raw_value: &str) -> Result<String, String> {
    if raw_value.starts_with('"') {
        if raw_value.len() < 2 || !raw_value.ends_with('"') {
            return Err("unterminated double-quoted string".to_string());
        }
        return Ok(raw_value[1..raw_value.len() - 1].to_string());
    }
    Ok(raw_value.to_string())
}

fn parse_integer_u64(key: &'static str, raw_value: &str) -> Result<u64, ConfigError> {
    let token = raw_value.trim();
    if token.is_empty() {
        return Err(ConfigError::invalid(key, "expected an integer"));
    }
    let value = token
        .parse::<i128>()
        .map_err(|e| ConfigError::invalid(key, format!("'{token}' is not an integer: {e}")))?;
    if value < 0 {
        return Err(ConfigError::invalid(key, "expected a non-negative integer"));
    }
    u64::try_from(value).map_err(|_| ConfigError::invalid(key, "integer out of range"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALID: &str = r#"
[server]
url = https://recipes.example.com/
api_token = "secret-token"

[import]
delay_between_requests = 5 # seconds
"#;

    #[test]
    fn test_parse_valid_config() {
        let config = ImporterConfig::from_config_str(VALID).unwrap();
        assert_eq!(config.server_url().as_str(), "https://recipes.example.com/");
        assert_eq!(config.api_token().expose(), "secret-token");
        assert_eq!(config.delay_between_requests(), Duration::from_secs(5));
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.rate_limit_delay(), DEFAULT_RATE_LIMIT_DELAY);
        assert_eq!(config.page_size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_delay_defaults_to_thirty_seconds() {
        let config =
            ImporterConfig::from_config_str("url = https://r.example.com\napi_token = t\n").unwrap();
        assert_eq!(config.delay_between_requests(), Duration::from_secs(30));
    }

    #[test]
    fn test_sub_path_is_preserved_with_trailing_slash() {
        let config = ImporterConfig::new("https://example.com/recipes", "t").unwrap();
        assert_eq!(config.server_url().as_str(), "https://example.com/recipes/");
    }

    #[test]
    fn test_missing_url_rejected() {
        let err = ImporterConfig::from_config_str("api_token = t\n").unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: "url" }));
    }

    #[test]
    fn test_missing_token_rejected() {
        let err = ImporterConfig::from_config_str("url = https://r.example.com\n").unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: "api_token" }));
    }

    #[test]
    fn test_placeholder_values_rejected() {
        let err = ImporterConfig::new(PLACEHOLDER_URL, "t").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "url", .. }));

        let err = ImporterConfig::new("https://r.example.com", PLACEHOLDER_TOKEN).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "api_token", .. }));
    }

    #[test]
    fn test_shipped_example_parses_but_needs_filling_in() {
        let err = ImporterConfig::from_config_str(include_str!("../config.conf.example"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "url", .. }));
    }

    #[test]
    fn test_non_http_url_rejected() {
        let err = ImporterConfig::new("ftp://r.example.com", "t").unwrap_err();
        assert!(err.to_string().contains("http://"));
    }

    #[test]
    fn test_delay_out_of_range_rejected() {
        let raw = "url = https://r.example.com\napi_token = t\ndelay_between_requests = 0\n";
        let err = ImporterConfig::from_config_str(raw).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "delay_between_requests",
                ..
            }
        ));

        let raw = "url = https://r.example.com\napi_token = t\ndelay_between_requests = 3601\n";
        assert!(ImporterConfig::from_config_str(raw).is_err());
    }

    #[test]
    fn test_negative_integer_rejected() {
        let raw = "url = https://r.example.com\napi_token = t\nmax_attempts = -2\n";
        let err = ImporterConfig::from_config_str(raw).unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }

    #[test]
    fn test_optional_retry_settings_parsed() {
        let raw = "url = https://r.example.com\napi_token = t\nmax_attempts = 5\nrate_limit_delay = 90\npage_size = 50\n";
        let config = ImporterConfig::from_config_str(raw).unwrap();
        assert_eq!(config.max_attempts(), 5);
        assert_eq!(config.rate_limit_delay(), Duration::from_secs(90));
        assert_eq!(config.page_size(), 50);
        assert_eq!(config.retry_policy().max_attempts(), 5);
    }

    #[test]
    fn test_unknown_key_reports_line() {
        let raw = "url = https://r.example.com\nbogus = 1\n";
        let err = ImporterConfig::from_config_str(raw).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { line: 2, .. }));
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = ImporterConfig::from_config_str("\n\njust words\n").unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { line: 3, .. }));
    }

    #[test]
    fn test_comment_inside_quotes_is_kept() {
        let raw = "url = https://r.example.com\napi_token = \"abc#def;ghi\"\n";
        let config = ImporterConfig::from_config_str(raw).unwrap();
        assert_eq!(config.api_token().expose(), "abc#def;ghi");
    }

    #[test]
    fn test_token_redacted_in_debug() {
        let config = ImporterConfig::new("https://r.example.com", "super-secret").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"), "token leaked: {debug}");
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.conf");
        let err = ImporterConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert!(err.to_string().contains("config.conf.example"));
    }

    #[test]
    fn test_load_reads_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.conf");
        std::fs::write(&path, VALID).unwrap();
        let config = ImporterConfig::load(&path).unwrap();
        assert_eq!(config.api_token().expose(), "secret-token");
    }

    #[test]
    fn test_resolve_config_path_prefers_explicit() {
        let explicit = Path::new("/tmp/custom.conf");
        assert_eq!(resolve_config_path(Some(explicit)), explicit.to_path_buf());
    }
}
