// src/main.rs
// FUSION CORE - RESEARCH API SERVER
// Serves the React Frontend via REST API (Actix-Web)

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;

// Modules
mod api; // Request validation + the research handler
mod brain; // Anthropic Messages API bridge (the agent loop)
mod parser; // Output normalizer + staged response decoder
mod tools; // Search / Wikipedia / file-save toolbelt

use brain::{AgentBrain, ResearchEngine};
use tools::ToolRegistry;

// Shared State for the Server
// Built once at startup and read-only afterwards; no locking needed.
pub struct AppState {
    pub engine: Arc<dyn ResearchEngine>, // The tool-calling agent
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    println!("🚀 FusionAI API Server Starting...");

    // 1. Initialize the agent ONCE at startup
    let engine: Arc<dyn ResearchEngine> = Arc::new(AgentBrain::new(ToolRegistry::for_service()));

    // 2. Create Shared State
    let app_state = web::Data::new(AppState { engine });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000);

    println!("🌍 Server running at http://0.0.0.0:{}", port);
    println!("📍 Test health check: http://localhost:{}/api/health", port);

    // 3. Start HTTP Server
    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .app_data(app_state.clone())
            .route("/api/health", web::get().to(api::health_check))
            .route("/api/research", web::post().to(api::research))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
