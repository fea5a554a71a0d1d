use axum::{
    Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod config;
use config::Config;

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Stats endpoint - returns basic server information
async fn stats() -> impl IntoResponse {
    let stats = serde_json::json!({
        "status": "running",
        "service": "pkgwatch-server",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(stats))
}

/// Routes: rendered pages at `/`, producer data at `/data`.
fn app(config: &Config) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats));

    if let Some(data_directory) = &config.data_directory {
        app = app.nest_service("/data", ServeDir::new(data_directory));
    }

    let mut app = app
        .fallback_service(ServeDir::new(&config.output_directory))
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }
    app
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    // Load configuration
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path)?;
    info!("Loaded configuration: {:?}", config);

    // Validate served directories exist
    let output_path = PathBuf::from(&config.output_directory);
    if !output_path.exists() {
        error!("Output directory does not exist: {}", config.output_directory);
        anyhow::bail!("Output directory not found: {}", config.output_directory);
    }
    if let Some(data_directory) = &config.data_directory {
        if !PathBuf::from(data_directory).exists() {
            error!("Data directory does not exist: {}", data_directory);
            anyhow::bail!("Data directory not found: {}", data_directory);
        }
        info!("Serving build data from: {}", data_directory);
    }

    info!("Serving pages from: {}", output_path.display());

    let addr = config.bind_address();
    info!("Starting pkgwatch server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(&config)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn config(output: &std::path::Path, data: Option<&std::path::Path>) -> Config {
        Config {
            output_directory: output.display().to_string(),
            data_directory: data.map(|d| d.display().to_string()),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_health_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&config(dir.path(), None));

        let (status, body) = get_body(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");

        let (status, body) = get_body(app, "/stats").await;
        assert_eq!(status, StatusCode::OK);
        let stats: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(stats["service"], "pkgwatch-server");
    }

    #[tokio::test]
    async fn test_serves_pages_and_data() {
        let output = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        std::fs::write(output.path().join("index.html"), "<html>page</html>").unwrap();
        std::fs::create_dir_all(data.path().join("m/b")).unwrap();
        std::fs::write(data.path().join("m/b/.data.json"), r#"{"buildname": "b"}"#).unwrap();

        let app = app(&config(output.path(), Some(data.path())));

        let (status, body) = get_body(app.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<html>page</html>");

        let (status, body) = get_body(app.clone(), "/data/m/b/.data.json").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("buildname"));

        let (status, _) = get_body(app, "/missing.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
