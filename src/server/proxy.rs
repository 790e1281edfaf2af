use crate::commands::serve::CLIENT;
use axum::body;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::header::HOST;
use http::uri::InvalidUri;
use http::{HeaderValue, StatusCode, Uri};
use thiserror::Error;
use tracing::{debug, error, trace, warn};
use url::Url;

/// The two ways relaying a request can fail locally. Whatever the upstream
/// itself returns, including 4xx and 5xx statuses, is relayed as a success.
#[derive(Debug, Error)]
pub(crate) enum ProxyError {
    /// The outbound request could not be built from the inbound one.
    #[error("unable to construct upstream request: {0}")]
    Construction(String),

    /// The call to the upstream failed at the transport layer.
    #[error("unable to reach upstream: {0}")]
    Transport(reqwest::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::Construction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Transport(_) => StatusCode::BAD_GATEWAY,
        };

        (status, self.to_string()).into_response()
    }
}

/// Forward an inbound request to the upstream and relay the response back.
///
/// The inbound method, headers and body are carried over untouched; the only
/// header that gets rewritten is Host, which is pinned to the upstream
/// authority. The inbound body is handed to the client as a stream, so it is
/// never buffered here, and neither is the upstream response body.
pub(crate) async fn handler(
    mut req: http::Request<Body>,
    upstream_base: Url,
) -> Result<Response, ProxyError> {
    let req_uri = req.uri().to_string();
    let method = req.method().to_string();

    trace!(req_uri=%req_uri, method=%method, "Relaying request");

    let target = build_target_uri(&upstream_base, req.uri().path(), req.uri().query())
        .map_err(|err| ProxyError::Construction(err.to_string()))?;
    *req.uri_mut() = target;

    let host = upstream_authority(&upstream_base).ok_or_else(|| {
        ProxyError::Construction(format!("upstream URL {upstream_base} has no usable host"))
    })?;
    req.headers_mut().insert(HOST, host);

    let outbound: reqwest::Request = req
        .try_into()
        .map_err(|err: reqwest::Error| ProxyError::Construction(err.to_string()))?;

    let res = CLIENT
        .execute(outbound)
        .await
        .map_err(ProxyError::Transport)?;

    if res.status().is_server_error() {
        warn!(
            method=%method,
            req_uri=%req_uri,
            upstream_uri=%res.url(),
            status_code=%res.status(),
            "Upstream returned a server error status code",
        );
    } else if res.status().is_client_error() {
        debug!(
            method=%method,
            req_uri=%req_uri,
            upstream_uri=%res.url(),
            status_code=%res.status(),
            "Upstream returned a client error status code",
        );
    } else {
        trace!(
            method=%method,
            req_uri=%req_uri,
            upstream_uri=%res.url(),
            status_code=%res.status(),
            "Response from the upstream",
        );
    }

    Ok(convert_response(res))
}

/// Build the upstream URI for an inbound request: the upstream base with the
/// inbound path appended, plus the inbound query string when there is one. The
/// query is carried over byte for byte, it is not parsed or re-encoded.
fn build_target_uri(
    upstream_base: &Url,
    path: &str,
    query: Option<&str>,
) -> Result<Uri, InvalidUri> {
    let mut target = format!(
        "{}{}",
        upstream_base.as_str().trim_end_matches('/'),
        path
    );

    if let Some(query) = query.filter(|query| !query.is_empty()) {
        target.push('?');
        target.push_str(query);
    }

    Uri::try_from(target)
}

/// The value the outbound Host header is pinned to: the upstream host, with
/// the port attached when the URL carries a non-default one.
fn upstream_authority(upstream_base: &Url) -> Option<HeaderValue> {
    let host = upstream_base.host_str()?;

    let authority = match upstream_base.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    HeaderValue::from_str(&authority).ok()
}

/// Convert a reqwest::Response into an axum Response.
///
/// The upstream status is carried over unchanged and every upstream header is
/// appended, so repeated headers such as Set-Cookie keep all of their values.
/// The body is relayed as a stream, chunks are written through as they arrive
/// from the upstream.
///
/// We cannot implement this as an Into or From trait since both types are
/// foreign to this code.
fn convert_response(res: reqwest::Response) -> Response {
    let mut builder = http::Response::builder().status(res.status());

    // `headers_mut` only returns `None` when the builder is in an error
    // state, which a fresh builder with a valid status cannot be.
    let headers = builder.headers_mut().unwrap();
    for (name, value) in res.headers() {
        headers.append(name, value.clone());
    }

    match builder.body(body::StreamBody::from(res.bytes_stream())) {
        Ok(res) => res.into_response(),
        Err(err) => {
            error!("Error converting response: {:?}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
