use axum::http::{HeaderValue, Method};
use ingestd::{api, config, logging, processors, worker};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();
    worker::init_job_queue();

    let app = api::create_router().layer(cors_layer());

    let (listener, port) = bind_listener().await.expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    processors::clean::shutdown_dedup_model();
}

fn cors_layer() -> CorsLayer {
    let config = config::get_config();
    let origins = match config.allowed_origins.as_deref() {
        None | Some("*") => AllowOrigin::any(),
        Some(list) => AllowOrigin::list(
            list.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        ),
    };
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}

/// Bind the listener: an explicit `SERVER_PORT` is taken as-is, otherwise the
/// configured port range is scanned for the first free slot.
async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::io::ErrorKind;
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        return Ok((listener, port));
    }

    let (first, last) = config.server_port_range;
    for port in first..=last {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(err) if err.kind() == ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port taken, scanning on");
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        ErrorKind::AddrNotAvailable,
        format!("no free port in {first}-{last}"),
    ))
}
