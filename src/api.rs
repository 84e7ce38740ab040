// src/api.rs
// REST SURFACE
// Validation, the research pipeline handler, and the degraded-response
// policy: agent and decode failures become well-formed 200s, never 5xxs.

use actix_web::{web, HttpResponse};
use serde_json::{json, Value};
use std::time::Instant;

use crate::parser::{self, DecodeStage, ResearchResult};
use crate::AppState;

// GET /api/health
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "message": "FusionAI API is running",
    }))
}

// POST /api/research
pub async fn research(data: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    // The body must at least be JSON; anything else is an unclassified error.
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => return server_error(&e.to_string()),
    };

    let query = match validate_query(&payload) {
        Ok(query) => query,
        Err(message) => {
            return HttpResponse::BadRequest().json(json!({ "error": message }));
        }
    };

    println!("\n{}", "=".repeat(60));
    println!("🔍 RESEARCH: Request '{}'", query);
    println!("{}", "=".repeat(60));

    let started = Instant::now();
    let engine = data.engine.clone();
    let invoke_query = query.clone();
    let outcome = web::block(move || engine.invoke(&invoke_query, &[])).await;

    let raw = match outcome {
        Ok(Ok(raw)) => raw,
        Ok(Err(agent_error)) => {
            eprintln!("⚠️  RESEARCH: Agent execution error: {}", agent_error);
            return HttpResponse::Ok().json(degraded_result(&query, &agent_error));
        }
        Err(e) => return server_error(&e.to_string()),
    };

    let normalized = parser::normalize_output(&raw);
    println!(
        "📊 RESEARCH: Output length: {} chars",
        normalized.chars().count()
    );

    let (result, stage) = parser::decode_response(&normalized, &query);
    match stage {
        DecodeStage::Direct => println!("✅ RESEARCH: Parsed structured response"),
        DecodeStage::Extracted => println!("✅ RESEARCH: Recovered embedded JSON"),
        DecodeStage::Fallback => println!("⚠️  RESEARCH: Fell back to raw output"),
    }

    println!(
        "✅ RESEARCH: Completed in {:.2}s\n",
        started.elapsed().as_secs_f32()
    );
    HttpResponse::Ok().json(result)
}

/// The query must be a string whose trimmed length is at least 3 characters.
/// The engine is never invoked when validation fails.
fn validate_query(payload: &Value) -> Result<String, &'static str> {
    let query = match payload.get("query").and_then(Value::as_str) {
        Some(query) => query.trim(),
        None => return Err("No query provided"),
    };

    if query.chars().count() < 3 {
        return Err("Query too short");
    }

    Ok(query.to_string())
}

/// Agent failures degrade to a complete result rather than an error.
fn degraded_result(query: &str, error: &str) -> ResearchResult {
    ResearchResult {
        topic: parser::title_case(query),
        summary: format!("Research completed with limited information: {}", error),
        sources: vec!["Research attempted".to_string()],
        tools_used: vec!["error".to_string()],
    }
}

fn server_error(description: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({
        "error": format!("An error occurred: {}", description)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::ResearchEngine;
    use actix_web::{test, App};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubEngine {
        output: Result<Value, String>,
        calls: AtomicUsize,
    }

    impl StubEngine {
        fn returning(output: Result<Value, String>) -> Arc<Self> {
            Arc::new(Self {
                output,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl ResearchEngine for StubEngine {
        fn invoke(&self, _query: &str, _history: &[Value]) -> Result<Value, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.output.clone()
        }
    }

    async fn post_research(stub: Arc<StubEngine>, body: &[u8]) -> (u16, Value) {
        let engine: Arc<dyn ResearchEngine> = stub;
        let state = web::Data::new(AppState { engine });
        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/api/health", web::get().to(health_check))
                .route("/api/research", web::post().to(research)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/research")
            .insert_header(("content-type", "application/json"))
            .set_payload(body.to_vec())
            .to_request();
        let res = test::call_service(&app, req).await;
        let status = res.status().as_u16();
        let parsed: Value = test::read_body_json(res).await;
        (status, parsed)
    }

    #[actix_web::test]
    async fn health_reports_healthy() {
        let engine: Arc<dyn ResearchEngine> = StubEngine::returning(Ok(json!("unused")));
        let state = web::Data::new(AppState { engine });
        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/api/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status().as_u16(), 200);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["status"], "healthy");
    }

    #[actix_web::test]
    async fn valid_query_yields_the_four_fields() {
        let stub = StubEngine::returning(Ok(json!(
            "{\"topic\":\"Rust\",\"summary\":\"A language.\",\"sources\":[\"wikipedia\"],\"tools_used\":[\"wikipedia\"]}"
        )));
        let (status, body) = post_research(stub.clone(), br#"{"query": "rust"}"#).await;

        assert_eq!(status, 200);
        assert_eq!(body["topic"], "Rust");
        assert_eq!(body["summary"], "A language.");
        assert!(body["sources"].is_array());
        assert!(body["tools_used"].is_array());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn structured_chunk_list_is_unwrapped_before_decoding() {
        let stub = StubEngine::returning(Ok(json!([{
            "type": "text",
            "text": "```json\n{\"topic\":\"X\",\"summary\":\"Y\",\"sources\":[],\"tools_used\":[]}\n```"
        }])));
        let (status, body) = post_research(stub, br#"{"query": "anything"}"#).await;

        assert_eq!(status, 200);
        assert_eq!(body["topic"], "X");
        assert_eq!(body["summary"], "Y");
    }

    #[actix_web::test]
    async fn missing_query_is_rejected_without_invocation() {
        let stub = StubEngine::returning(Ok(json!("unused")));
        let (status, body) = post_research(stub.clone(), br#"{"topic": "no query here"}"#).await;

        assert_eq!(status, 400);
        assert_eq!(body["error"], "No query provided");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn short_query_is_rejected_without_invocation() {
        let stub = StubEngine::returning(Ok(json!("unused")));
        let (status, body) = post_research(stub.clone(), br#"{"query": "ab"}"#).await;

        assert_eq!(status, 400);
        assert_eq!(body["error"], "Query too short");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn empty_query_is_rejected() {
        let stub = StubEngine::returning(Ok(json!("unused")));
        let (status, body) = post_research(stub.clone(), br#"{"query": ""}"#).await;

        assert_eq!(status, 400);
        assert!(body["error"].is_string());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn agent_failure_degrades_to_a_complete_result() {
        let stub = StubEngine::returning(Err("model unavailable".to_string()));
        let (status, body) = post_research(stub, br#"{"query": "rust async"}"#).await;

        assert_eq!(status, 200);
        assert_eq!(body["topic"], "Rust Async");
        assert!(body["summary"]
            .as_str()
            .unwrap()
            .contains("model unavailable"));
        assert_eq!(body["sources"], json!(["Research attempted"]));
        assert_eq!(body["tools_used"], json!(["error"]));
    }

    #[actix_web::test]
    async fn prose_output_lands_in_the_terminal_fallback() {
        let stub = StubEngine::returning(Ok(json!("just plain prose")));
        let (status, body) = post_research(stub, br#"{"query": "rust async runtimes"}"#).await;

        assert_eq!(status, 200);
        assert_eq!(body["topic"], "Rust Async Runtimes");
        assert_eq!(body["summary"], "just plain prose");
        assert_eq!(body["sources"], json!(["Research completed"]));
        assert_eq!(body["tools_used"], json!(["langchain", "claude-ai"]));
    }

    #[actix_web::test]
    async fn unparseable_body_is_an_unclassified_error() {
        let stub = StubEngine::returning(Ok(json!("unused")));
        let (status, body) = post_research(stub.clone(), b"not json at all").await;

        assert_eq!(status, 500);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("An error occurred:"));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }
}
