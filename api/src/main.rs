use std::net::SocketAddr;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod error;
mod middleware;
mod routes;
mod state;
mod store;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Alumline Voice API",
        version = "0.1.0",
        description = "Phone-line intent engine for the Alumline alumni network. \
                       Carrier webhooks and browser voice clients post conversation \
                       turns; the engine authenticates callers and performs network \
                       actions on their behalf."
    ),
    paths(
        routes::health::health_check,
        routes::voice::voice_turn,
        routes::voice::voice_ended,
        routes::sessions::get_session,
        routes::sessions::list_actions,
        routes::access_codes::mint_access_code,
    ),
    components(schemas(
        HealthResponse,
        alumline_core::error::ApiError,
        alumline_core::machine::TurnRequest,
        alumline_core::machine::TurnResponse,
        alumline_core::session::CallSession,
        alumline_core::session::CallStatus,
        alumline_core::session::CallType,
        alumline_core::session::SessionContext,
        alumline_core::session::ConversationMemory,
        alumline_core::session::SubFlow,
        alumline_core::session::ScheduleTarget,
        alumline_core::session::MentorRef,
        alumline_core::session::EventRef,
        alumline_core::session::OpportunityRef,
        alumline_core::classifier::Intent,
        alumline_core::audit::ActionAuditEntry,
        routes::voice::CallEndedRequest,
        routes::access_codes::MintAccessCodeRequest,
        routes::access_codes::MintAccessCodeResponse,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alumline_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Database connection
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let admin_token = std::env::var("ALUMLINE_ADMIN_TOKEN")
        .ok()
        .filter(|t| !t.is_empty());
    if admin_token.is_none() {
        tracing::warn!("ALUMLINE_ADMIN_TOKEN not set; access-code minting is disabled");
    }

    let app_state = state::AppState::new(pool, admin_token);

    // CORS
    let cors_layer = middleware::cors::build_cors_layer();

    // Router with per-surface rate limiting
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::voice::router().layer(middleware::rate_limit::voice_layer()))
        .merge(routes::sessions::router().layer(middleware::rate_limit::inspect_layer()))
        .merge(routes::access_codes::router().layer(middleware::rate_limit::access_codes_layer()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Alumline Voice API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
