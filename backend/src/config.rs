use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub connect_timeout: Duration,
}

impl BrokerConfig {
    pub fn url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }

    /// Same as `url` with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        format!(
            "amqp://{}:***@{}:{}/{}",
            urlencoding::encode(&self.user),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            user: "guest".into(),
            password: "guest".into(),
            host: "localhost".into(),
            port: 5672,
            vhost: "/".into(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub preview_size: (u32, u32),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("storage/images"),
            preview_size: (300, 300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn for_file(name: &str) -> Self {
        Self {
            url: format!("sqlite://{}?mode=rwc", name),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenv::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let broker_defaults = BrokerConfig::default();
        let storage_defaults = StorageConfig::default();

        let server = ServerConfig {
            host: lookup("BACKEND_SERVER__HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "BACKEND_SERVER__PORT", 8081)?,
            workers: parse_opt(&lookup, "BACKEND_SERVER__WORKERS")?,
        };

        let broker = BrokerConfig {
            user: lookup("RABBITMQ_USER").unwrap_or(broker_defaults.user),
            password: lookup("RABBITMQ_PASSWORD").unwrap_or(broker_defaults.password),
            host: lookup("RABBITMQ_HOST").unwrap_or(broker_defaults.host),
            port: parse_or(&lookup, "RABBITMQ_PORT", broker_defaults.port)?,
            vhost: lookup("RABBITMQ_VHOST").unwrap_or(broker_defaults.vhost),
            connect_timeout: Duration::from_secs(parse_or(
                &lookup,
                "RABBITMQ_CONNECT_TIMEOUT_SECS",
                broker_defaults.connect_timeout.as_secs(),
            )?),
        };

        let storage = StorageConfig {
            path: lookup("RABBITMQ_STORAGE_PATH")
                .or_else(|| lookup("STORAGE_PATH"))
                .map(PathBuf::from)
                .unwrap_or(storage_defaults.path),
            preview_size: (
                parse_dimension(&lookup, "PREVIEW_WIDTH", storage_defaults.preview_size.0)?,
                parse_dimension(&lookup, "PREVIEW_HEIGHT", storage_defaults.preview_size.1)?,
            ),
        };

        let fetch = FetchConfig {
            timeout: Duration::from_secs(parse_or(&lookup, "FETCH_TIMEOUT_SECS", 30)?),
        };

        let mut database = match lookup("DATABASE_URL") {
            Some(url) => DatabaseConfig {
                url,
                max_connections: 5,
            },
            None => DatabaseConfig::for_file(
                &lookup("DB_NAME").unwrap_or_else(|| "database.db".to_string()),
            ),
        };
        database.max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", database.max_connections)?;

        Ok(Self {
            server,
            broker,
            storage,
            fetch,
            database,
        })
    }
}

fn parse_opt<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

/// Image sides must be at least one pixel or every encode fails later.
fn parse_dimension<F>(lookup: &F, key: &str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, key, default)? {
        0 => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: "0".to_string(),
        }),
        side => Ok(side),
    }
}
