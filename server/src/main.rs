use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json,
};
use scaffold_server::{init_server, send_error, telemetry, Response, ServerConfig};

fn main() {
    telemetry::init_tracing();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let mut server = init_server();
    server.config = config;
    server.routes(|router| {
        router
            .route("/health", get(health))
            .route("/echo", post(echo))
    });
    server.run();
}

async fn health() -> Response<&'static str> {
    Response::ok("ok")
}

async fn echo(
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> axum::response::Response {
    match payload {
        Ok(Json(value)) => Response::ok(value).into_response(),
        Err(rejection) => send_error(rejection.body_text(), StatusCode::BAD_REQUEST),
    }
}
