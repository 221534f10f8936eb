use hms_auth::CsrfStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub store_backend: StoreBackend,
    pub csrf_strategy: CsrfStrategy,
    /// JSON file with the role -> permission table, maintained by the
    /// ERP's role administration. Empty table when unset.
    pub role_permissions_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            store_backend: match std::env::var("STORE_BACKEND").as_deref() {
                Ok("redis") => StoreBackend::Redis,
                _ => StoreBackend::Memory,
            },
            csrf_strategy: match std::env::var("CSRF_STRATEGY").as_deref() {
                Ok("double_submit") => CsrfStrategy::DoubleSubmit,
                _ => CsrfStrategy::Stored,
            },
            role_permissions_path: std::env::var("ROLE_PERMISSIONS_PATH").ok(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
