//! Reverse proxy to the supervised application.
//!
//! Installed as the router fallback: anything the gateway does not handle
//! itself is forwarded verbatim to `127.0.0.1:<internal_port>` over
//! HTTP/1.1. Upgrade requests (WebSockets) are tunneled byte-for-byte after
//! the upstream answers 101. A connection failure renders the styled 502
//! page; it never takes the gateway down.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::uri::Uri;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tracing::{debug, warn};

use crate::pages;
use crate::state::GatewayState;

/// HTTP/1.1 client pointed at the application's loopback port.
#[derive(Clone)]
pub struct ProxyClient {
    client: Client<HttpConnector, Body>,
    authority: String,
}

impl ProxyClient {
    #[must_use]
    pub fn new(internal_port: u16) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            client,
            authority: format!("127.0.0.1:{internal_port}"),
        }
    }

    /// Forward one request upstream and return the upstream response.
    pub async fn forward(&self, mut req: Request) -> Response {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str())
            .to_owned();
        let Ok(uri) = Uri::try_from(format!("http://{}{path_and_query}", self.authority)) else {
            warn!(uri = %req.uri(), "request URI cannot be rewritten for the upstream");
            return StatusCode::BAD_REQUEST.into_response();
        };

        // Grab the downstream upgrade handle before the request is consumed;
        // it only completes if we answer 101 below.
        let wants_upgrade = req.headers().contains_key(header::UPGRADE);
        let downstream = wants_upgrade.then(|| hyper::upgrade::on(&mut req));

        *req.uri_mut() = uri;
        if let Ok(host) = HeaderValue::from_str(&self.authority) {
            req.headers_mut().insert(header::HOST, host);
        }

        match self.client.request(req).await {
            Ok(mut response) => {
                if response.status() == StatusCode::SWITCHING_PROTOCOLS {
                    if let Some(downstream) = downstream {
                        let upstream = hyper::upgrade::on(&mut response);
                        tokio::spawn(async move {
                            tunnel(downstream, upstream).await;
                        });
                    }
                }
                response.map(Body::new)
            }
            Err(e) => {
                warn!(error = %e, upstream = %self.authority, "upstream request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Html(pages::render_proxy_error()),
                )
                    .into_response()
            }
        }
    }
}

impl std::fmt::Debug for ProxyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyClient")
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}

/// Copy bytes both ways between the two upgraded connections until either
/// side closes.
async fn tunnel(downstream: hyper::upgrade::OnUpgrade, upstream: hyper::upgrade::OnUpgrade) {
    let (downstream, upstream) = match tokio::join!(downstream, upstream) {
        (Ok(d), Ok(u)) => (d, u),
        (d, u) => {
            warn!(
                downstream_ok = d.is_ok(),
                upstream_ok = u.is_ok(),
                "upgrade handshake did not complete on both sides"
            );
            return;
        }
    };

    let mut downstream = TokioIo::new(downstream);
    let mut upstream = TokioIo::new(upstream);
    match tokio::io::copy_bidirectional(&mut downstream, &mut upstream).await {
        Ok((from_client, from_upstream)) => {
            debug!(from_client, from_upstream, "tunnel closed");
        }
        Err(e) => debug!(error = %e, "tunnel ended with an error"),
    }
}

/// Router fallback handler.
pub async fn proxy_handler(State(state): State<Arc<GatewayState>>, req: Request) -> Response {
    state.proxy.forward(req).await
}
