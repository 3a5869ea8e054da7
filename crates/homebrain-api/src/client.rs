// Bridge HTTP client
//
// Wraps `reqwest::Client` with bridge URL construction, the
// `{ success, ... }` envelope and the bearer-token header. The client is a
// value object: no retries, no cached state beyond the connection pool.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{BridgeStatus, CommandRequest, Discovery, Envelope};
use crate::transport::TransportConfig;

/// Path segment of the bridge's event WebSocket.
const WS_PATH: &str = "ws";

/// Typed access to the bridge's HTTP API.
///
/// Cheap to clone (the inner `reqwest::Client` is reference counted).
/// Every call is bound by the transport timeout, so callers never block
/// indefinitely.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: Url,
    transport: TransportConfig,
}

impl BridgeClient {
    /// Create a client for the bridge rooted at `base_url`
    /// (e.g. `http://insteon-bridge.local:8765`).
    pub fn new(base_url: Url, transport: TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            transport,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    ///
    /// The bearer header is still attached per request when the transport
    /// carries a token.
    pub fn with_client(http: reqwest::Client, base_url: Url, transport: TransportConfig) -> Self {
        Self {
            http,
            base_url,
            transport,
        }
    }

    /// The bridge base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/{path}`, keeping any path prefix on the base URL.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// The event stream endpoint: base URL with `http→ws` / `https→wss`
    /// and a trailing `/ws` segment.
    pub fn websocket_url(&self) -> Result<Url, Error> {
        websocket_url(&self.base_url)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /status`: current bridge health.
    pub async fn status(&self) -> Result<BridgeStatus, Error> {
        let url = self.url("status")?;
        let mut body = self.get_envelope(url).await?;

        // Current bridges nest the report under `status`; older ones
        // return it flat.
        let report = match body.remove("status") {
            Some(Value::Object(inner)) => inner,
            Some(other) => {
                return Err(Error::Protocol {
                    message: format!("unexpected status payload: {other}"),
                    status: None,
                });
            }
            None => body,
        };
        decode(Value::Object(report))
    }

    /// `GET /discovery?refresh=<bool>`: device list plus the bridge mode.
    ///
    /// `refresh = true` asks the bridge to re-scan the modem database
    /// instead of answering from its cache.
    pub async fn discovery(&self, refresh: bool) -> Result<Discovery, Error> {
        let mut url = self.url("discovery")?;
        url.query_pairs_mut()
            .append_pair("refresh", if refresh { "true" } else { "false" });
        let body = self.get_envelope(url).await?;
        decode(Value::Object(body))
    }

    /// `POST /devices/{id}/commands`: dispatch a device command.
    ///
    /// Returns the bridge's opaque result object (`result` when the bridge
    /// wraps it, otherwise the whole body).
    pub async fn send_command(
        &self,
        device_id: &str,
        request: &CommandRequest,
    ) -> Result<Value, Error> {
        let mut url = self.url("devices")?;
        url.path_segments_mut()
            .map_err(|()| Error::Protocol {
                message: format!("bridge URL cannot be a base: {}", self.base_url),
                status: None,
            })?
            .pop_if_empty()
            .push(device_id)
            .push("commands");

        debug!(%url, command = %request.command, "POST");
        let builder = self.authorize(self.http.post(url).json(request))?;
        let resp = builder
            .send()
            .await
            .map_err(|e| Error::from_reqwest(&e, self.transport.timeout_ms()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication {
                status: status.as_u16(),
            });
        }

        let text = resp
            .text()
            .await
            .map_err(|e| Error::from_reqwest(&e, self.transport.timeout_ms()))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<Envelope>(&text)
                .ok()
                .and_then(|env| env.error.or(env.message))
                .unwrap_or_else(|| preview(&text));
            return Err(Error::CommandRejected {
                message: format!("HTTP {status}: {reason}"),
                status: Some(status.as_u16()),
            });
        }

        let mut envelope: Envelope = parse_json(&text)?;
        if let Some(message) = envelope.failure() {
            return Err(Error::CommandRejected {
                message,
                status: Some(status.as_u16()),
            });
        }
        Ok(envelope
            .body
            .remove("result")
            .unwrap_or(Value::Object(envelope.body)))
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Attach the bearer header explicitly.
    ///
    /// Clients built through [`TransportConfig::build_client`] already send
    /// it as a default header; this covers [`with_client`](Self::with_client).
    fn authorize(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, Error> {
        let builder = builder.timeout(self.transport.timeout);
        Ok(match self.transport.bearer_header()? {
            Some(value) => builder.header(reqwest::header::AUTHORIZATION, value),
            None => builder,
        })
    }

    /// Send a GET and unwrap the `{ success, ... }` envelope.
    async fn get_envelope(&self, url: Url) -> Result<Map<String, Value>, Error> {
        debug!(%url, "GET");

        let resp = self
            .authorize(self.http.get(url))?
            .send()
            .await
            .map_err(|e| Error::from_reqwest(&e, self.transport.timeout_ms()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication {
                status: status.as_u16(),
            });
        }

        let text = resp
            .text()
            .await
            .map_err(|e| Error::from_reqwest(&e, self.transport.timeout_ms()))?;

        if !status.is_success() {
            return Err(Error::Protocol {
                message: format!("HTTP {status}: {}", preview(&text)),
                status: Some(status.as_u16()),
            });
        }

        let envelope: Envelope = parse_json(&text)?;
        if let Some(message) = envelope.failure() {
            return Err(Error::Protocol {
                message,
                status: Some(status.as_u16()),
            });
        }
        Ok(envelope.body)
    }
}

/// Rewrite an HTTP bridge URL into its event-stream URL.
pub fn websocket_url(base_url: &Url) -> Result<Url, Error> {
    let scheme = match base_url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    let rest = &base_url.as_str()[base_url.scheme().len()..];
    let rest = rest.split(['?', '#']).next().unwrap_or(rest);
    let rest = rest.trim_end_matches('/');
    Ok(Url::parse(&format!("{scheme}{rest}/{WS_PATH}"))?)
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, Error> {
    serde_json::from_str(text).map_err(|e| Error::Protocol {
        message: format!("{e} (body preview: {:?})", preview(text)),
        status: None,
    })
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value).map_err(|e| Error::Protocol {
        message: format!("unexpected body shape: {e}"),
        status: None,
    })
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
