//! Well-known config variable names.
//!
//! Manifests refer to these as `{KEY}` placeholders, and the lifecycle reads
//! several of them directly (directories, PID file location, database names).

pub const REDIS_SOCKET: &str = "REDIS_SOCKET";

pub const POSTGRES_SOCKET: &str = "POSTGRES_SOCKET";
pub const POSTGRES_SOCKET_DIR: &str = "POSTGRES_SOCKET_DIR";
pub const POSTGRES_PORT: &str = "POSTGRES_PORT";
pub const POSTGRES_DATABASE: &str = "POSTGRES_DATABASE";
pub const POSTGRES_USER: &str = "POSTGRES_USER";
pub const POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";

pub const SERVICE_ARTIFACT: &str = "SERVICE_ARTIFACT";
pub const SERVICE_SOCKET: &str = "SERVICE_SOCKET";
pub const SERVICE_VENV: &str = "SERVICE_VENV";
pub const SERVICE_URL_BASE_PATH: &str = "SERVICE_URL_BASE_PATH";
pub const SERVICE_DATA: &str = "SERVICE_DATA";
pub const SERVICE_LOGS: &str = "SERVICE_LOGS";
pub const SERVICE_TEMP: &str = "SERVICE_TEMP";
pub const SERVICE_ENVIRONMENT: &str = "SERVICE_ENVIRONMENT";
pub const SERVICE_SECRET_KEY: &str = "SERVICE_SECRET_KEY";
pub const SERVICE_ID: &str = "SERVICE_ID";

pub const OIDC_DISCOVERY_URI: &str = "OIDC_DISCOVERY_URI";

/// Keys held in the secret store rather than the static store.
pub const SECRET_KEYS: [&str; 3] = [POSTGRES_PASSWORD, SERVICE_SECRET_KEY, SERVICE_ID];

pub fn is_secret(key: &str) -> bool {
    SECRET_KEYS.contains(&key)
}
