//! Stand-in telemetry backend that echoes the identity the gateway attached.

use axum::{
    Json, Router,
    extract::Path,
    http::{HeaderMap, StatusCode},
    routing,
};
use clap::Parser;
use serde::Serialize;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "upstream", long_about = None)]
struct Args {
    #[arg(short, long)]
    port: u16,

    #[arg(short, long, default_value = "127.0.0.1")]
    ip: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    println!("{:?}", args);

    let listener = TcpListener::bind(format!("{}:{}", args.ip, args.port))
        .await
        .unwrap();
    let app = Router::new().route("/{*path}", routing::any(handler));
    axum::serve(listener, app).await.unwrap();
}

#[derive(Serialize)]
struct Response {
    path: String,
    account_id: Option<String>,
    account_username: Option<String>,
    saw_api_key: bool,
}

async fn handler(Path(path): Path<String>, headers: HeaderMap) -> (StatusCode, Json<Response>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let status = if header("x-account-username").is_some() {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    (
        status,
        Json(Response {
            path,
            account_id: header("x-account-id"),
            account_username: header("x-account-username"),
            saw_api_key: headers.contains_key("x-api-key") || headers.contains_key("authorization"),
        }),
    )
}
