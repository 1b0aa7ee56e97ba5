use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Default config file location, overridable by the first CLI argument.
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

/// Env
///
/// Defines the runtime context, used to switch between development utilities
/// (pretty logs, auth bypass header) and production-grade behavior (JSON
/// logs, mandatory secrets).
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// StoreConfig
///
/// Document-store connection parameters. The in-process engine only logs
/// them, but they are the contract a networked client would be built from,
/// so they load and validate either way.
#[derive(Clone, Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_host")]
    pub host: String,
    #[serde(default = "default_store_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub db_name: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Never carried in the development fallback; comes from the config
    /// file or the STORE_PASSWORD environment variable.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub auth_source: Option<String>,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: u32,
}

fn default_store_host() -> String {
    "localhost".to_string()
}
fn default_store_port() -> u16 {
    27017
}
fn default_db_name() -> String {
    "docgate".to_string()
}
fn default_max_pool_size() -> u32 {
    50
}
fn default_min_pool_size() -> u32 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_store_host(),
            port: default_store_port(),
            db_name: default_db_name(),
            username: None,
            password: None,
            auth_source: None,
            max_pool_size: default_max_pool_size(),
            min_pool_size: default_min_pool_size(),
        }
    }
}

/// EntityConfig
///
/// One exposed entity: the bus address / collection name and the endpoint
/// path its route group mounts under.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct EntityConfig {
    pub name: String,
    pub endpoint: String,
}

/// On-disk shape of the config file. Everything is optional so a partial
/// file still loads; the HTTP port is deliberately *not* defaulted when a
/// file is present, so an explicit config that forgets it fails fast at
/// startup.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    http_server_port: Option<u16>,
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    entities: Vec<EntityConfig>,
    jwt_secret: Option<String>,
}

/// AppConfig
///
/// The application's entire configuration state, immutable once loaded and
/// shared through the application state.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// HTTP listen port. `None` means the loaded config file did not specify
    /// one, which is a fail-fast startup error.
    pub http_port: Option<u16>,
    pub store: StoreConfig,
    pub entities: Vec<EntityConfig>,
    /// Secret key used to validate incoming bearer JWTs.
    pub jwt_secret: String,
    pub env: Env,
}

impl Default for AppConfig {
    /// Provides safe, non-panicking values for test setup without touching
    /// the filesystem or environment.
    fn default() -> Self {
        Self {
            http_port: Some(8480),
            store: StoreConfig::default(),
            entities: vec![EntityConfig {
                name: "items".to_string(),
                endpoint: "/items".to_string(),
            }],
            jwt_secret: "super-secure-test-secret-value-local".to_string(),
            env: Env::Local,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// The canonical startup initialization: reads the JSON config file at
    /// `path` (or the default location), falling back to credential-free
    /// development defaults when the file is absent. Environment variables
    /// override secrets: `GATEWAY_JWT_SECRET` and `STORE_PASSWORD`.
    ///
    /// # Panics
    /// Panics on an unreadable or malformed config file, and in production
    /// when `GATEWAY_JWT_SECRET` is unset with no secret in the file. This
    /// prevents the application from starting with an incomplete or
    /// insecure configuration.
    pub fn load(path: Option<&str>) -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let runtime_env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);
        let file = if Path::new(path).exists() {
            let raw = fs::read_to_string(path)
                .unwrap_or_else(|e| panic!("FATAL: cannot read config file {path}: {e}"));
            let parsed: ConfigFile = serde_json::from_str(&raw)
                .unwrap_or_else(|e| panic!("FATAL: malformed config file {path}: {e}"));
            tracing::info!(path, "configuration loaded from file");
            parsed
        } else {
            tracing::warn!(path, "config file not found, using development defaults");
            ConfigFile {
                http_server_port: Some(8480),
                store: StoreConfig::default(),
                entities: AppConfig::default().entities,
                jwt_secret: None,
            }
        };

        let jwt_secret = match env::var("GATEWAY_JWT_SECRET") {
            Ok(secret) => secret,
            Err(_) => match (file.jwt_secret, &runtime_env) {
                (Some(secret), _) => secret,
                (None, Env::Production) => {
                    panic!("FATAL: GATEWAY_JWT_SECRET must be set in production")
                }
                (None, Env::Local) => "super-secure-test-secret-value-local".to_string(),
            },
        };

        let mut store = file.store;
        if let Ok(password) = env::var("STORE_PASSWORD") {
            store.password = Some(password);
        }

        Self {
            http_port: file.http_server_port,
            store,
            entities: file
                .entities
                .into_iter()
                .map(|entity| EntityConfig {
                    endpoint: normalize_endpoint(&entity.name, &entity.endpoint),
                    ..entity
                })
                .collect(),
            jwt_secret,
            env: runtime_env,
        }
    }
}

/// Mount paths must be non-root and start with a slash for router nesting.
/// Tolerates configs that omit the slash; an empty or bare-root path is a
/// fail-fast configuration error rather than a router panic later.
fn normalize_endpoint(name: &str, endpoint: &str) -> String {
    if endpoint.is_empty() || endpoint == "/" {
        panic!("FATAL: entity `{name}` has no usable endpoint path");
    }
    if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{endpoint}")
    }
}
