use thiserror::Error;

/// Largest accepted `MAX_UPLOAD_SIZE` (5 GiB).
pub const UPLOAD_SIZE_CEILING: u64 = 5 * 1024 * 1024 * 1024;

/// Longest accepted `SESSION_MAX_AGE_SECONDS` (one year).
pub const SESSION_MAX_AGE_CEILING: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cluster: ClusterConfig,
    pub node: NodeConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    /// Enables dangerous operations like purge and direct session creation.
    /// Must never be true in production.
    pub test_mode: bool,
    /// Maximum upload size in bytes. Files of exactly this size are rejected.
    pub max_upload_size: u64,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// TCP port for inter-node cluster communication
    pub cluster_port: u16,
    pub discovery: DiscoveryConfig,
    pub election_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub peers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// DNS name to resolve for peer discovery (e.g., a Kubernetes headless service).
    pub dns_name: Option<String>,
    /// How often to poll for peer changes (seconds)
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session lifetime in seconds
    pub max_age_seconds: i64,
    /// Identity provider id of the user granted the owner role
    pub owner_id: Option<String>,
    /// How long a session lookup may take before the session counts as loading
    pub resolve_timeout_ms: u64,
    /// How often the leader drops expired sessions (seconds)
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    Supabase,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Supabase => "supabase",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Bucket holding uploaded files (supabase backend)
    pub bucket: String,
    /// Cache lifetime in seconds attached to stored objects
    pub cache_control_seconds: u64,
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// Project URL (required when backend is supabase)
    pub supabase_url: Option<String>,
    /// Service role key (required when backend is supabase)
    pub supabase_key: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            dns_name: None,
            poll_interval_seconds: 5,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_port: 9993,
            discovery: DiscoveryConfig::default(),
            election_timeout_ms: 3000,
            heartbeat_interval_ms: 300,
            peers: Vec::new(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: 24 * 60 * 60,
            owner_id: None,
            resolve_timeout_ms: 2000,
            sweep_interval_seconds: 300,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            bucket: "files".to_string(),
            cache_control_seconds: crate::upload::DEFAULT_CACHE_CONTROL,
            local_storage_path: "./files".to_string(),
            supabase_url: None,
            supabase_key: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let node_id = std::env::var("NODE_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let peers: Vec<String> = std::env::var("PEERS")
            .map(|p| {
                p.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .filter(|s| !s.starts_with(&format!("{node_id}:")) && s != &node_id)
                    .collect()
            })
            .unwrap_or_default();

        let dns_name = std::env::var("DISCOVERY_DNS_NAME").ok();
        let poll_interval = std::env::var("DISCOVERY_POLL_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let cluster_port = std::env::var("CLUSTER_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(9993);

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(crate::upload::DEFAULT_MAX_UPLOAD_SIZE);

        let storage_backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "supabase" => StorageBackend::Supabase,
            _ => StorageBackend::Local,
        };

        let local_storage_path =
            std::env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| "./files".to_string());
        let bucket = std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "files".to_string());
        let cache_control_seconds = std::env::var("CACHE_CONTROL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(crate::upload::DEFAULT_CACHE_CONTROL);

        let supabase_url = std::env::var("SUPABASE_URL").ok();
        let supabase_key = std::env::var("SUPABASE_KEY").ok();

        let session_defaults = SessionConfig::default();
        let session = SessionConfig {
            max_age_seconds: std::env::var("SESSION_MAX_AGE_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(session_defaults.max_age_seconds),
            owner_id: std::env::var("OWNER_ID").ok().filter(|s| !s.is_empty()),
            resolve_timeout_ms: std::env::var("SESSION_RESOLVE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(session_defaults.resolve_timeout_ms),
            sweep_interval_seconds: std::env::var("SESSION_SWEEP_INTERVAL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(session_defaults.sweep_interval_seconds),
        };

        let config = Config {
            node: NodeConfig {
                id: node_id,
                bind_address,
                data_dir,
            },
            cluster: ClusterConfig {
                cluster_port,
                peers,
                discovery: DiscoveryConfig {
                    dns_name,
                    poll_interval_seconds: poll_interval,
                },
                ..Default::default()
            },
            session,
            storage: StorageConfig {
                backend: storage_backend,
                bucket,
                cache_control_seconds,
                local_storage_path,
                supabase_url,
                supabase_key,
            },
            test_mode,
            max_upload_size,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.node.id.is_empty() {
            return Err(ConfigError::ValidationError(
                "NODE_ID cannot be empty".to_string(),
            ));
        }

        if matches!(self.storage.backend, StorageBackend::Supabase)
            && (self.storage.supabase_url.is_none() || self.storage.supabase_key.is_none())
        {
            return Err(ConfigError::ValidationError(
                "SUPABASE_URL and SUPABASE_KEY are required when STORAGE_BACKEND=supabase"
                    .to_string(),
            ));
        }

        if self.max_upload_size == 0 || self.max_upload_size > UPLOAD_SIZE_CEILING {
            return Err(ConfigError::ValidationError(format!(
                "MAX_UPLOAD_SIZE must be between 1 and {UPLOAD_SIZE_CEILING}"
            )));
        }

        if self.session.max_age_seconds <= 0
            || self.session.max_age_seconds > SESSION_MAX_AGE_CEILING
        {
            return Err(ConfigError::ValidationError(format!(
                "SESSION_MAX_AGE_SECONDS must be between 1 and {SESSION_MAX_AGE_CEILING}"
            )));
        }

        if self.session.sweep_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "SESSION_SWEEP_INTERVAL_SECONDS must be greater than 0".to_string(),
            ));
        }

        let cluster_size = self.cluster.peers.len() + 1;
        if cluster_size > 1 && cluster_size.is_multiple_of(2) {
            tracing::warn!(
                "Cluster size {} is even. This may lead to split-brain scenarios. \
                 Consider using an odd number of nodes.",
                cluster_size
            );
        }

        Ok(())
    }

    /// Check if running in single-node mode.
    pub fn is_single_node(&self) -> bool {
        self.cluster.peers.is_empty() && self.cluster.discovery.dns_name.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            cluster: ClusterConfig::default(),
            node: NodeConfig {
                bind_address: "127.0.0.1:0".to_string(),
                data_dir: "./data".to_string(),
                id: "node-1".to_string(),
            },
            session: SessionConfig::default(),
            storage: StorageConfig::default(),
            test_mode: false,
            max_upload_size: crate::upload::DEFAULT_MAX_UPLOAD_SIZE,
        }
    }

    #[test]
    fn test_defaults_validate() {
        let config = base_config();
        assert!(config.validate().is_ok());
        assert!(config.is_single_node());
        assert_eq!(config.session.max_age_seconds, 86_400);
        assert_eq!(config.storage.cache_control_seconds, 3600);
    }

    #[test]
    fn test_supabase_requires_credentials() {
        let mut config = base_config();
        config.storage.backend = StorageBackend::Supabase;
        config.storage.supabase_url = Some("https://proj.supabase.co".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        config.storage.supabase_key = Some("service-key".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_limits() {
        let mut config = base_config();
        config.max_upload_size = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.session.max_age_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.session.sweep_interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_limits_above_ceiling() {
        let mut config = base_config();
        config.max_upload_size = UPLOAD_SIZE_CEILING;
        assert!(config.validate().is_ok());
        config.max_upload_size = UPLOAD_SIZE_CEILING + 1;
        assert!(config.validate().is_err());
        config.max_upload_size = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.session.max_age_seconds = SESSION_MAX_AGE_CEILING;
        assert!(config.validate().is_ok());
        config.session.max_age_seconds = i64::MAX;
        assert!(config.validate().is_err());
    }
}
