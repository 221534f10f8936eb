// HMS security core API server
// Credential, session, CSRF and second-factor surface for the ERP

mod config;
mod handlers;
mod middleware;
mod routes;

use config::{Config, StoreBackend};
use dotenvy::dotenv;
use hms_auth::{
    AuthConfig, CredentialVerifier, CsrfStrategy, HttpSmsSender, InMemoryDirectory, JwtService,
    NoopSmsSender, SmsSender, StoredTokenGuard, TokenService, TwoFactorService,
};
use hms_authz::PermissionGuard;
use hms_models::{AuditSink, RolePermissionTable, TracingAuditSink};
use hms_store::{
    CsrfTokenStore, InMemoryCsrfStore, InMemorySecondFactorStore, InMemorySessionStore,
    RedisConfig, RedisCsrfStore, RedisSecondFactorStore, RedisSessionStore, SecondFactorStore,
    SessionStore,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub tokens: TokenService,
    pub two_factor: TwoFactorService,
    pub csrf_guard: Arc<StoredTokenGuard>,
    pub csrf_strategy: CsrfStrategy,
    pub secure_cookies: bool,
    pub guard: PermissionGuard,
    pub directory: Arc<dyn CredentialVerifier>,
    pub audit: Arc<dyn AuditSink>,
}

fn load_permission_table(path: Option<&str>) -> RolePermissionTable {
    let Some(path) = path else {
        tracing::warn!("ROLE_PERMISSIONS_PATH not set, permission table is empty");
        return RolePermissionTable::new();
    };
    let contents = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read role permissions from {}: {}", path, e));
    serde_json::from_str(&contents)
        .unwrap_or_else(|e| panic!("invalid role permission table in {}: {}", path, e))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,hms_api=debug,tower_http=debug".to_string()),
        )
        .init();

    tracing::info!("🚀 Starting HMS security core");
    tracing::info!("📦 Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    let auth_config = AuthConfig::from_env().expect("invalid auth configuration");
    tracing::info!("🌍 Environment: {}", config.environment);
    tracing::info!("🔌 Server: {}:{}", config.server_host, config.server_port);

    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

    // Pick store backends
    let (sessions, csrf_store, second_factors): (
        Arc<dyn SessionStore>,
        Arc<dyn CsrfTokenStore>,
        Arc<dyn SecondFactorStore>,
    ) = match config.store_backend {
        StoreBackend::Redis => {
            tracing::info!("⚡ Connecting to Redis...");
            let conn = RedisConfig::from_env()
                .connect()
                .await
                .expect("Failed to connect to Redis");
            tracing::info!("✅ Redis connected");
            let session_ttl = (auth_config.refresh_token_ttl_days * 86_400) as u64;
            (
                Arc::new(RedisSessionStore::new(conn.clone(), session_ttl)),
                Arc::new(RedisCsrfStore::new(
                    conn.clone(),
                    (auth_config.csrf_token_ttl_minutes * 60) as u64,
                )),
                Arc::new(RedisSecondFactorStore::new(conn)),
            )
        }
        StoreBackend::Memory => {
            tracing::info!("🗄️  Using in-memory stores (single instance)");
            (
                Arc::new(InMemorySessionStore::new()),
                Arc::new(InMemoryCsrfStore::new()),
                Arc::new(InMemorySecondFactorStore::new()),
            )
        }
    };

    // Token service
    let jwt = JwtService::with_ttls(
        &auth_config.jwt_secret,
        auth_config.access_token_ttl_minutes,
        auth_config.refresh_token_ttl_days,
        auth_config.pending_token_ttl_minutes,
    );
    let tokens = TokenService::new(
        jwt,
        sessions.clone(),
        audit.clone(),
        auth_config.max_concurrent_sessions,
        auth_config.inactivity_timeout_minutes,
    );
    tracing::info!("🔐 Token service initialized");

    // SMS gateway: real HTTP sender when configured, noop otherwise
    let sms: Arc<dyn SmsSender> = match HttpSmsSender::from_env() {
        Ok(sender) => {
            tracing::info!("📱 SMS gateway configured");
            Arc::new(sender)
        }
        Err(_) => {
            tracing::warn!("📱 SMS gateway not configured, using noop sender");
            Arc::new(NoopSmsSender)
        }
    };

    let two_factor = TwoFactorService::new(
        second_factors,
        sms,
        audit.clone(),
        auth_config.totp_issuer.clone(),
        auth_config.sms_enrollment_requires_confirmation,
        auth_config.sms_otp_ttl_minutes,
    );
    tracing::info!("🔑 Second-factor service initialized");

    // CSRF guard and sweeps
    let csrf_guard = Arc::new(StoredTokenGuard::new(
        csrf_store,
        auth_config.csrf_token_ttl_minutes,
    ));
    hms_auth::start_csrf_sweep(csrf_guard.clone(), auth_config.csrf_sweep_interval_secs);
    hms_auth::start_inactivity_sweep(
        sessions,
        audit.clone(),
        auth_config.inactivity_timeout_minutes,
        auth_config.session_sweep_interval_secs,
    );
    tracing::info!("🧹 Background sweeps started");

    // Authorization guard
    let table = load_permission_table(config.role_permissions_path.as_deref());
    let guard = PermissionGuard::new(table, audit.clone());
    tracing::info!("🛡️  Permission guard initialized");

    // Credential directory. The ERP's user CRUD owns accounts; outside a
    // real deployment an in-memory directory backs development logins.
    let directory: Arc<dyn CredentialVerifier> =
        Arc::new(InMemoryDirectory::new().expect("failed to initialize directory"));
    tracing::info!("📖 Credential directory initialized");

    let state = Arc::new(AppState {
        tokens,
        two_factor,
        csrf_guard,
        csrf_strategy: config.csrf_strategy,
        secure_cookies: config.is_production(),
        guard,
        directory,
        audit,
    });

    let app = routes::create_router(state).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("✅ Server ready at http://{}", addr);

    axum::serve(listener, app).await.expect("Server error");

    Ok(())
}
