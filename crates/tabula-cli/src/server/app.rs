//! Axum application setup.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use super::state::AppState;

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Sources
        .route("/sources/file", post(handlers::connect_file))
        .route("/sources/relational", post(handlers::connect_relational))
        .route("/sources/document", post(handlers::connect_document))
        .route("/containers/:container", get(handlers::list_sub_containers))
        .route("/select", post(handlers::select_container))
        // Spec building
        .route("/column", post(handlers::select_column))
        .route("/examples", post(handlers::set_examples))
        .route("/classify", post(handlers::classify))
        .route("/generate", post(handlers::generate))
        // Preview and commit
        .route("/apply", post(handlers::apply))
        .route("/revert", post(handlers::revert))
        .route("/commit", post(handlers::commit))
        // Session and exports
        .route(
            "/session",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/export", get(handlers::export_csv))
        .route("/download", get(handlers::download))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the web server.
pub async fn run_server(state: AppState, host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    let addr = listener.local_addr()?;

    info!(%addr, "Server listening");
    println!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
