use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

// ============================================================================
// Scrape endpoint - /metrics and /health for one process
// ============================================================================
//
// Both binaries run this server: the producer exposes the produced counter,
// the consumer the pipeline outcome counters and the ledger gauge. The
// service name distinguishes the two processes on /health.
//
// ============================================================================

#[derive(Clone)]
struct ScrapeState {
    registry: Arc<Registry>,
    service: &'static str,
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(scrape))
        .route("/health", web::get().to(health));
}

/// Serve the scrape endpoints until the process exits. Runs on its own
/// runtime in a background thread, failures here never touch the pipeline.
pub async fn start_metrics_server(
    registry: Arc<Registry>,
    service: &'static str,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!(service, port, "📊 Starting metrics server");

    let state = ScrapeState { registry, service };
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn scrape(state: web::Data<ScrapeState>) -> impl Responder {
    let families = state.registry.gather();

    let mut buffer = Vec::new();
    match TextEncoder::new().encode(&families, &mut buffer) {
        Ok(()) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(error) => {
            tracing::error!(error = %error, "Failed to encode metrics");
            HttpResponse::InternalServerError().body(error.to_string())
        }
    }
}

async fn health(state: web::Data<ScrapeState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": state.service,
    }))
}

// ============================================================================
// Unit Tests
// ============================================================================
