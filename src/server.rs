use anyhow::{Context, Result};
use axum::body::Body;
use axum::routing::any;
use axum::{Router, Server};
use std::net::SocketAddr;
use tracing::{debug, info};
use url::Url;

mod proxy;

pub(crate) async fn start_web_server(
    listen_address: &SocketAddr,
    upstream_base: Url,
) -> Result<()> {
    let server = Server::try_bind(listen_address)
        .with_context(|| format!("failed to bind to {}", listen_address))?
        .serve(app(upstream_base).into_make_service());

    debug!("Web server listening on {}", server.local_addr());

    info!("Relay endpoint: http://{}", server.local_addr());

    server.await?;

    Ok(())
}

/// Build the router: one forwarding handler, bound to every method on the
/// root and on every path below it.
fn app(upstream_base: Url) -> Router {
    let handler = move |req: http::Request<Body>| {
        let upstream_base = upstream_base.clone();
        async move { proxy::handler(req, upstream_base).await }
    };

    Router::new()
        .route("/", any(handler.clone()))
        .route("/*path", any(handler))
}
