mod agent_hub;
mod config;
mod dispatch;
mod error;
mod middleware;
mod models;
mod routes;
mod store;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use agent_hub::AgentHub;
use config::StoreBackend;
use dispatch::{
    CommandDispatcher, CommandHistoryView, DeviceResolver, ExecutorService, SecurityEventView,
};
use store::{CommandStore, DeviceStore, MemoryStore, PgStore, ProfileStore, SecurityEventLog};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<CommandDispatcher>,
    pub executor: Arc<ExecutorService>,
    pub history: Arc<CommandHistoryView>,
    pub events: Arc<SecurityEventView>,
    pub resolver: Arc<DeviceResolver>,
    pub devices: Arc<dyn DeviceStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub jwt_secret: String,
    /// Per-device channels for connected agents.
    pub hub: Arc<AgentHub>,
}

impl AppState {
    pub fn from_stores(
        commands: Arc<dyn CommandStore>,
        devices: Arc<dyn DeviceStore>,
        profiles: Arc<dyn ProfileStore>,
        events: Arc<dyn SecurityEventLog>,
        jwt_secret: String,
    ) -> Self {
        let resolver = Arc::new(DeviceResolver::standard(devices.clone(), profiles.clone()));
        let hub = Arc::new(AgentHub::new());
        Self {
            dispatcher: Arc::new(CommandDispatcher::new(
                commands.clone(),
                events.clone(),
                resolver.clone(),
                hub.clone(),
            )),
            executor: Arc::new(ExecutorService::new(
                commands.clone(),
                events.clone(),
                resolver.clone(),
            )),
            history: Arc::new(CommandHistoryView::new(commands, resolver.clone())),
            events: Arc::new(SecurityEventView::new(events, resolver.clone())),
            resolver,
            devices,
            profiles,
            jwt_secret,
            hub,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::devices::list_devices,
        routes::devices::get_device,
        routes::devices::dispatch_command,
        routes::devices::command_history,
        routes::devices::device_events,
        routes::events::recent_events,
        routes::agent::pending_commands,
        routes::agent::report_status,
        routes::agent::heartbeat,
        routes::agent::report_event,
    ),
    components(schemas(
        routes::error::ApiError,
        models::device::Device,
        models::device::DeviceInfo,
        models::device::LockState,
        models::device::DeviceOrigin,
        models::command::Command,
        models::command::CommandType,
        models::command::CommandStatus,
        models::command::CommandParams,
        models::command::CommandResult,
        models::event::SecurityEvent,
        models::event::EventType,
        models::event::Severity,
        models::agent::StatusReport,
        models::agent::AgentEventReport,
        models::console::DispatchCommandRequest,
        models::console::DispatchResponse,
        models::console::HistoryQuery,
        models::console::RecentEventsQuery,
        models::console::RecentEventsResponse,
        dispatch::history::CommandHistoryEntry,
        dispatch::history::StatusPhase,
        dispatch::history::HistoryScope,
        dispatch::history::SecurityEventEntry,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Devices", description = "Device state, remote commands and history"),
        (name = "Events", description = "Security event feed"),
        (name = "Agent", description = "Endpoints used by the on-device agent")
    ),
    security(("bearer" = []))
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lockwatch_server=debug,tower_http=debug")),
        )
        .init();

    let config = config::Config::from_env();

    let state = match &config.backend {
        StoreBackend::Postgres {
            database_url,
            max_connections,
        } => {
            let pool = PgPoolOptions::new()
                .max_connections(*max_connections)
                .connect(database_url)
                .await
                .expect("Failed to connect to database");

            sqlx::migrate!("./src/db/migrations")
                .run(&pool)
                .await
                .expect("Failed to run migrations");

            let store = Arc::new(PgStore::new(pool));
            AppState::from_stores(
                store.clone(),
                store.clone(),
                store.clone(),
                store,
                config.jwt_secret.clone(),
            )
        }
        StoreBackend::Memory { seed } => {
            let store = match seed {
                Some(path) => {
                    MemoryStore::from_seed_file(path).expect("Failed to load memory seed")
                }
                None => MemoryStore::new(),
            };
            tracing::warn!("Using in-memory store, nothing will be persisted");
            let store = Arc::new(store);
            AppState::from_stores(
                store.clone(),
                store.clone(),
                store.clone(),
                store,
                config.jwt_secret.clone(),
            )
        }
    };

    let cors = if config.cors_origins == "*" {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
    };

    let app = routes::api_router(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("Failed to bind listen address");
    tracing::info!("Listening on {}", config.listen_addr);
    tracing::info!("Swagger UI at http://{}/docs/", config.listen_addr);
    axum::serve(listener, app).await.expect("Server error");
}
