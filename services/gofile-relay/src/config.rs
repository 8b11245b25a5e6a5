//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! GoFile tokens are loaded from the GOFILE_TOKENS env var or `tokens_file`,
//! never stored in the TOML directly to avoid leaking secrets.

use account_pool::{PoolOptions, RetryPolicy};
use common::Secret;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub gofile: GofileConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

/// HTTP listener and transfer settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Uploads and downloads running at once; further requests wait
    #[serde(default = "default_max_concurrent_transfers")]
    pub max_concurrent_transfers: usize,
    /// Where request bodies and downloads are staged before upload
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
    /// Overall limit on fetching a remote file for `/upload-url`
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

/// GoFile API settings
#[derive(Debug, Deserialize)]
pub struct GofileConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    /// Timeout for account lookups
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
    /// Timeout for a single upload attempt
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
    /// Upload into this folder instead of a new one per file
    #[serde(default)]
    pub folder_id: Option<String>,
    /// File with one token per line (alternative to GOFILE_TOKENS env var)
    #[serde(default)]
    pub tokens_file: Option<PathBuf>,
    #[serde(skip)]
    pub tokens: Vec<Secret<String>>,
}

/// Account pool behaviour
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    /// Seconds between usage probes; 0 disables background probing
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    #[serde(default)]
    pub reactivate_exhausted: bool,
    #[serde(default = "default_exhaustion_threshold")]
    pub exhaustion_threshold: f64,
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_connections() -> usize {
    1000
}

fn default_max_concurrent_transfers() -> usize {
    4
}

fn default_spool_dir() -> PathBuf {
    std::env::temp_dir().join("gofile-relay")
}

fn default_max_upload_mb() -> u64 {
    4096
}

fn default_download_timeout() -> u64 {
    3600
}

fn default_api_base() -> String {
    gofile::API_BASE.to_string()
}

fn default_upload_url() -> String {
    gofile::UPLOAD_URL.to_string()
}

fn default_api_timeout() -> u64 {
    30
}

fn default_upload_timeout() -> u64 {
    3600
}

fn default_probe_interval() -> u64 {
    300
}

fn default_exhaustion_threshold() -> f64 {
    1.0
}

fn default_transient_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for GofileConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            upload_url: default_upload_url(),
            timeout_secs: default_api_timeout(),
            upload_timeout_secs: default_upload_timeout(),
            folder_id: None,
            tokens_file: None,
            tokens: Vec::new(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval(),
            reactivate_exhausted: false,
            exhaustion_threshold: default_exhaustion_threshold(),
            transient_retries: default_transient_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl PoolConfig {
    pub fn options(&self) -> PoolOptions {
        PoolOptions {
            exhaustion_threshold: self.exhaustion_threshold,
            reactivate_exhausted: self.reactivate_exhausted,
        }
    }
}

impl ServerConfig {
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Token resolution order:
    /// 1. GOFILE_TOKENS env var (comma or whitespace separated)
    /// 2. tokens_file path from config (one per line, `#` comments)
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        config.gofile.tokens = match std::env::var("GOFILE_TOKENS") {
            Ok(raw) => parse_tokens(&raw, false),
            Err(_) => match &config.gofile.tokens_file {
                Some(file) => {
                    let raw = std::fs::read_to_string(file).map_err(|e| {
                        common::Error::Credentials(format!(
                            "failed to read tokens_file {}: {e}",
                            file.display()
                        ))
                    })?;
                    parse_tokens(&raw, true)
                }
                None => Vec::new(),
            },
        };

        if config.gofile.tokens.is_empty() {
            return Err(common::Error::Credentials(
                "no GoFile tokens configured: set GOFILE_TOKENS or gofile.tokens_file".into(),
            ));
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        for (name, url) in [
            ("api_base", &self.gofile.api_base),
            ("upload_url", &self.gofile.upload_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        for (name, value) in [
            ("gofile.timeout_secs", self.gofile.timeout_secs),
            ("gofile.upload_timeout_secs", self.gofile.upload_timeout_secs),
            ("server.max_upload_mb", self.server.max_upload_mb),
            ("server.download_timeout_secs", self.server.download_timeout_secs),
        ] {
            if value == 0 {
                return Err(common::Error::Config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.server.max_concurrent_transfers == 0 {
            return Err(common::Error::Config(
                "max_concurrent_transfers must be greater than 0".into(),
            ));
        }

        let threshold = self.pool.exhaustion_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(common::Error::Config(format!(
                "exhaustion_threshold must be in (0, 1], got: {threshold}"
            )));
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            transient_retries: self.pool.transient_retries,
            retry_delay: Duration::from_millis(self.pool.retry_delay_ms),
            attempt_timeout: Duration::from_secs(self.gofile.upload_timeout_secs),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("gofile-relay.toml")
    }
}

/// Split a token list. Files may carry `#` comment lines.
///
/// A token names one account, so repeats are dropped and the first
/// occurrence keeps its place in the rotation.
fn parse_tokens(raw: &str, allow_comments: bool) -> Vec<Secret<String>> {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    let entries = raw
        .lines()
        .map(str::trim)
        .filter(|line| !(allow_comments && line.starts_with('#')))
        .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    for (position, token) in entries.enumerate() {
        if seen.insert(token) {
            tokens.push(Secret::new(token.to_string()));
        } else {
            warn!(position, "duplicate GoFile token ignored");
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn minimal_toml() -> &'static str {
        r#"
[server]
listen_addr = "127.0.0.1:8080"
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("gofile-relay.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn exposed(tokens: &[Secret<String>]) -> Vec<&str> {
        tokens.iter().map(|t| t.expose().as_str()).collect()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, minimal_toml());

        unsafe { set_env("GOFILE_TOKENS", "tok-a") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("GOFILE_TOKENS") };

        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.server.max_concurrent_transfers, 4);
        assert_eq!(config.server.max_upload_mb, 4096);
        assert_eq!(config.gofile.api_base, "https://api.gofile.io");
        assert_eq!(config.gofile.upload_url, "https://upload.gofile.io/uploadfile");
        assert!(config.gofile.folder_id.is_none());
        assert_eq!(config.pool.probe_interval_secs, 300);
        assert!(!config.pool.reactivate_exhausted);
        assert_eq!(config.pool.exhaustion_threshold, 1.0);

        let policy = config.retry_policy();
        assert_eq!(policy.transient_retries, 2);
        assert_eq!(policy.retry_delay, Duration::from_millis(500));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(3600));
    }

    #[test]
    fn full_config_overrides_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
listen_addr = "0.0.0.0:9000"
max_concurrent_transfers = 2
spool_dir = "/srv/spool"
max_upload_mb = 10

[gofile]
api_base = "http://127.0.0.1:7000"
upload_url = "http://127.0.0.1:7001/uploadfile"
folder_id = "fold-1"

[pool]
probe_interval_secs = 0
reactivate_exhausted = true
exhaustion_threshold = 0.995
transient_retries = 0
"#,
        );

        unsafe { set_env("GOFILE_TOKENS", "a,b") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("GOFILE_TOKENS") };

        assert_eq!(config.server.spool_dir, PathBuf::from("/srv/spool"));
        assert_eq!(config.server.max_upload_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.gofile.folder_id.as_deref(), Some("fold-1"));
        assert_eq!(config.pool.probe_interval_secs, 0);
        let options = config.pool.options();
        assert!(options.reactivate_exhausted);
        assert_eq!(options.exhaustion_threshold, 0.995);
        assert_eq!(config.retry_policy().transient_retries, 0);
    }

    #[test]
    fn tokens_from_env_split_on_commas_and_whitespace() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, minimal_toml());

        unsafe { set_env("GOFILE_TOKENS", " tok-1, tok-2\ntok-3 ,, ") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("GOFILE_TOKENS") };

        assert_eq!(exposed(&config.gofile.tokens), vec!["tok-1", "tok-2", "tok-3"]);
    }

    #[test]
    fn duplicate_tokens_keep_first_occurrence() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, minimal_toml());

        unsafe { set_env("GOFILE_TOKENS", "t2,t1,t2 t1\nt3,t1") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("GOFILE_TOKENS") };

        assert_eq!(exposed(&config.gofile.tokens), vec!["t2", "t1", "t3"]);
    }

    #[test]
    fn duplicate_tokens_in_file_are_dropped() {
        let tokens = parse_tokens("# main\nt1\nt1\n# again\nt1, t2\n", true);
        assert_eq!(exposed(&tokens), vec!["t1", "t2"]);
    }

    #[test]
    fn tokens_from_file_skip_comments_and_blanks() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let tokens_path = dir.path().join("tokens");
        std::fs::write(&tokens_path, "# primary\ntok-file-1\n\n  tok-file-2  \n# spare\n").unwrap();
        let path = write_config(
            &dir,
            &format!(
                "[server]\nlisten_addr = \"127.0.0.1:8080\"\n\n[gofile]\ntokens_file = \"{}\"\n",
                tokens_path.display()
            ),
        );

        unsafe { remove_env("GOFILE_TOKENS") };
        let config = Config::load(&path).unwrap();
        assert_eq!(exposed(&config.gofile.tokens), vec!["tok-file-1", "tok-file-2"]);
    }

    #[test]
    fn env_tokens_override_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let tokens_path = dir.path().join("tokens");
        std::fs::write(&tokens_path, "from-file\n").unwrap();
        let path = write_config(
            &dir,
            &format!(
                "[server]\nlisten_addr = \"127.0.0.1:8080\"\n\n[gofile]\ntokens_file = \"{}\"\n",
                tokens_path.display()
            ),
        );

        unsafe { set_env("GOFILE_TOKENS", "from-env") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("GOFILE_TOKENS") };

        assert_eq!(exposed(&config.gofile.tokens), vec!["from-env"]);
    }

    #[test]
    fn missing_tokens_is_an_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, minimal_toml());

        unsafe { remove_env("GOFILE_TOKENS") };
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, common::Error::Credentials(_)), "got {err:?}");
    }

    #[test]
    fn unreadable_tokens_file_is_an_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[server]\nlisten_addr = \"127.0.0.1:8080\"\n\n[gofile]\ntokens_file = \"/nonexistent/tokens\"\n",
        );

        unsafe { remove_env("GOFILE_TOKENS") };
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tokens"), "got {err}");
    }

    #[test]
    fn rejects_non_http_urls() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[server]\nlisten_addr = \"127.0.0.1:8080\"\n\n[gofile]\nupload_url = \"ftp://upload.gofile.io\"\n",
        );

        unsafe { set_env("GOFILE_TOKENS", "tok") };
        let err = Config::load(&path).unwrap_err();
        unsafe { remove_env("GOFILE_TOKENS") };
        assert!(err.to_string().contains("upload_url"), "got {err}");
    }

    #[test]
    fn rejects_zero_limits() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        unsafe { set_env("GOFILE_TOKENS", "tok") };

        for (section, key) in [
            ("server", "max_connections"),
            ("server", "max_concurrent_transfers"),
            ("server", "max_upload_mb"),
            ("gofile", "timeout_secs"),
        ] {
            let body = if section == "server" {
                format!("[server]\nlisten_addr = \"127.0.0.1:8080\"\n{key} = 0\n")
            } else {
                format!("[server]\nlisten_addr = \"127.0.0.1:8080\"\n\n[{section}]\n{key} = 0\n")
            };
            let path = write_config(&dir, &body);
            let err = Config::load(&path).unwrap_err();
            assert!(err.to_string().contains(key), "{key}: {err}");
        }

        unsafe { remove_env("GOFILE_TOKENS") };
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        unsafe { set_env("GOFILE_TOKENS", "tok") };

        for value in ["0.0", "1.5", "-0.2"] {
            let path = write_config(
                &dir,
                &format!(
                    "[server]\nlisten_addr = \"127.0.0.1:8080\"\n\n[pool]\nexhaustion_threshold = {value}\n"
                ),
            );
            let err = Config::load(&path).unwrap_err();
            assert!(err.to_string().contains("exhaustion_threshold"), "{value}: {err}");
        }

        unsafe { remove_env("GOFILE_TOKENS") };
    }

    #[test]
    fn missing_file_and_bad_toml_fail() {
        assert!(Config::load(Path::new("/nonexistent/gofile-relay.toml")).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(matches!(Config::load(&path), Err(common::Error::Toml(_))));
    }

    #[test]
    fn resolve_path_prefers_cli_then_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/etc/gofile-relay/env.toml") };
        assert_eq!(
            Config::resolve_path(Some("/cli.toml")),
            PathBuf::from("/cli.toml")
        );
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("/etc/gofile-relay/env.toml")
        );
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("gofile-relay.toml"));
    }
}
