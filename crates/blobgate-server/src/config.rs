use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::Path;

use blobgate_store::S3Settings;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

const MIB: u64 = 1024 * 1024;

/// Environment variables consulted by [`GatewayConfig::apply_env`].
pub const ENV_ACCOUNT_ID: &str = "R2_ACCOUNT_ID";
pub const ENV_ACCESS_KEY: &str = "R2_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "R2_SECRET_KEY";
pub const ENV_BUCKET: &str = "R2_BUCKET";
pub const ENV_BIND: &str = "BLOBGATE_BIND";

/// Local `KEY=value` file consulted for variables the process environment
/// does not set.
pub const DOTENV_FILE: &str = ".env";

const REDACTED: &str = "***";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    /// Keys requested per listing page.
    pub list_page_size: usize,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            list_page_size: 1000,
            storage: StorageConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Any S3-compatible service; Cloudflare R2 by default.
    #[default]
    S3,
    /// Process-local store, for development and tests.
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: String,
    /// Explicit endpoint URL. Derived from `account_id` when unset.
    pub endpoint: Option<String>,
    pub account_id: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            bucket: String::new(),
            endpoint: None,
            account_id: None,
            access_key: None,
            secret_key: None,
            region: "auto".into(),
        }
    }
}

impl StorageConfig {
    /// Endpoint URL to connect to, if one is configured or derivable.
    pub fn resolved_endpoint(&self) -> Option<String> {
        self.endpoint.clone().or_else(|| {
            self.account_id
                .as_deref()
                .map(|id| format!("https://{id}.r2.cloudflarestorage.com"))
        })
    }

    /// Connection settings for the S3 backend.
    pub fn s3_settings(&self) -> ServerResult<S3Settings> {
        let endpoint = self
            .resolved_endpoint()
            .ok_or_else(|| missing("storage.endpoint or storage.account_id", ENV_ACCOUNT_ID))?;
        let access_key = self
            .access_key
            .clone()
            .ok_or_else(|| missing("storage.access_key", ENV_ACCESS_KEY))?;
        let secret_key = self
            .secret_key
            .clone()
            .ok_or_else(|| missing("storage.secret_key", ENV_SECRET_KEY))?;
        Ok(S3Settings {
            endpoint,
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            access_key,
            secret_key,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest file accepted by `/push`.
    pub max_push_bytes: u64,
    /// Largest archive accepted by `/push-dir`.
    pub max_push_dir_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_push_bytes: 100 * MIB,
            max_push_dir_bytes: 500 * MIB,
        }
    }
}

impl GatewayConfig {
    pub fn from_toml_str(raw: &str) -> ServerResult<Self> {
        toml::from_str(raw).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Load the file at `path` (or defaults), apply environment overrides
    /// (process environment, then `./.env`), then validate.
    pub fn load(path: Option<&Path>) -> ServerResult<Self> {
        Self::load_with(path, Path::new(DOTENV_FILE), |name| std::env::var(name).ok())
    }

    /// [`GatewayConfig::load`] with an explicit dotenv file and environment
    /// lookup. A missing dotenv file is not an error.
    pub fn load_with(
        path: Option<&Path>,
        dotenv: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> ServerResult<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    ServerError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        let local = read_dotenv(dotenv)?;
        config.apply_env(|name| env(name).or_else(|| local.get(name).cloned()))?;
        config.validate()?;
        Ok(config)
    }

    /// Override settings from environment variables, looked up through
    /// `lookup`. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ServerResult<()> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(id) = get(ENV_ACCOUNT_ID) {
            self.storage.account_id = Some(id);
        }
        if let Some(key) = get(ENV_ACCESS_KEY) {
            self.storage.access_key = Some(key);
        }
        if let Some(secret) = get(ENV_SECRET_KEY) {
            self.storage.secret_key = Some(secret);
        }
        if let Some(bucket) = get(ENV_BUCKET) {
            self.storage.bucket = bucket;
        }
        if let Some(bind) = get(ENV_BIND) {
            self.bind_addr = bind
                .parse()
                .map_err(|e| ServerError::Config(format!("{ENV_BIND}={bind}: {e}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.storage.bucket.trim().is_empty() {
            return Err(missing("storage.bucket", ENV_BUCKET));
        }
        if self.list_page_size == 0 {
            return Err(ServerError::Config("list_page_size must be positive".into()));
        }
        if self.limits.max_push_bytes == 0 || self.limits.max_push_dir_bytes == 0 {
            return Err(ServerError::Config("upload limits must be positive".into()));
        }
        if self.storage.backend == StorageBackend::S3 {
            self.storage.s3_settings()?;
        }
        Ok(())
    }

    /// Copy with credentials masked, suitable for printing.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let mask = |v: &mut Option<String>| {
            if v.is_some() {
                *v = Some(REDACTED.into());
            }
        };
        mask(&mut copy.storage.access_key);
        mask(&mut copy.storage.secret_key);
        copy
    }
}

fn read_dotenv(path: &Path) -> ServerResult<HashMap<String, String>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            tracing::debug!(path = %path.display(), "loaded dotenv file");
            Ok(parse_dotenv(&raw))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(ServerError::Config(format!(
            "cannot read {}: {e}",
            path.display()
        ))),
    }
}

/// Parse `KEY=value` lines. Blank lines, `#` comments and an `export `
/// prefix are allowed; one pair of matching quotes around a value is
/// removed.
pub fn parse_dotenv(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_owned(), unquote(value.trim()).to_owned()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn missing(setting: &str, env: &str) -> ServerError {
    ServerError::Config(format!("{setting} is required (or set {env})"))
}
