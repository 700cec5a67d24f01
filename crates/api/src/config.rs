use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the database URL and JWT secret have defaults suitable
/// for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub database_url: String,
    /// Pool size (default: [`oa_db::DEFAULT_MAX_CONNECTIONS`]).
    pub db_max_connections: u32,
    /// JWT token configuration (secret, expiry durations).
    pub jwt: JwtConfig,
    pub meeting: MeetingConfig,
    /// Admin account ensured at startup, if configured.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Meeting reservation behaviour.
#[derive(Debug, Clone)]
pub struct MeetingConfig {
    /// Approve reservations on create, running the overlap check immediately.
    pub auto_approve: bool,
    /// Minutes before `start_at` at which check-in opens.
    pub checkin_early_mins: i64,
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            auto_approve: false,
            checkin_early_mins: oa_core::meeting::DEFAULT_CHECKIN_EARLY_MINS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                    |
    /// |------------------------------|----------------------------|
    /// | `HOST`                       | `0.0.0.0`                  |
    /// | `PORT`                       | `3000`                     |
    /// | `CORS_ORIGINS`               | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `30`                       |
    /// | `DATABASE_URL`               | required                   |
    /// | `DB_MAX_CONNECTIONS`         | `20`                       |
    /// | `MEETING_AUTO_APPROVE`       | `false`                    |
    /// | `MEETING_CHECKIN_EARLY_MINS` | `15`                       |
    /// | `ADMIN_USERNAME`             | unset (no bootstrap)       |
    /// | `ADMIN_PASSWORD`             | unset (no bootstrap)       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let db_max_connections: u32 = std::env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| oa_db::DEFAULT_MAX_CONNECTIONS.to_string())
            .parse()
            .expect("DB_MAX_CONNECTIONS must be a valid u32");

        let auto_approve: bool = std::env::var("MEETING_AUTO_APPROVE")
            .unwrap_or_else(|_| "false".into())
            .parse()
            .expect("MEETING_AUTO_APPROVE must be true or false");

        let checkin_early_mins: i64 = std::env::var("MEETING_CHECKIN_EARLY_MINS")
            .unwrap_or_else(|_| oa_core::meeting::DEFAULT_CHECKIN_EARLY_MINS.to_string())
            .parse()
            .expect("MEETING_CHECKIN_EARLY_MINS must be a valid i64");

        let bootstrap_admin = match (
            std::env::var("ADMIN_USERNAME").ok().filter(|s| !s.is_empty()),
            std::env::var("ADMIN_PASSWORD").ok().filter(|s| !s.is_empty()),
        ) {
            (Some(username), Some(password)) => Some(BootstrapAdmin { username, password }),
            _ => None,
        };

        let jwt = JwtConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url,
            db_max_connections,
            jwt,
            meeting: MeetingConfig {
                auto_approve,
                checkin_early_mins,
            },
            bootstrap_admin,
        }
    }
}
