use crate::error::FeedError;
use crate::market::types::{DEFAULT_PATH, DEFAULT_PORT};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use url::Url;

const MAX_FRAME_BYTES_CEILING: usize = 16 << 20;

pub type FeedWsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn default_endpoint(secure: bool, host: &str) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{host}:{DEFAULT_PORT}{DEFAULT_PATH}")
}

fn validate_endpoint(endpoint: &str) -> Result<(), FeedError> {
    let parsed = Url::parse(endpoint)?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(FeedError::InvalidArgument(format!(
            "endpoint scheme must be ws or wss, got '{other}'"
        ))),
    }
}

/// An explicit override wins; otherwise the execution context decides between
/// the encrypted and plain gateway endpoint on the well-known port and path.
pub fn resolve_endpoint(
    override_endpoint: Option<&str>,
    secure: bool,
    host: &str,
) -> Result<String, FeedError> {
    let endpoint = match override_endpoint
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        Some(explicit) => explicit.to_string(),
        None => default_endpoint(secure, host),
    };
    validate_endpoint(&endpoint)?;
    Ok(endpoint)
}

pub async fn connect_feed_stream(
    endpoint: &str,
    max_message_bytes: usize,
) -> Result<FeedWsStream, FeedError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(max_message_bytes),
        max_frame_size: Some(max_message_bytes.min(MAX_FRAME_BYTES_CEILING)),
        ..Default::default()
    };

    let (stream, _) = connect_async_with_config(endpoint, Some(ws_config), true).await?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_uses_plain_scheme_outside_secure_context() {
        let endpoint = resolve_endpoint(None, false, "localhost").expect("default is valid");
        assert_eq!(endpoint, "ws://localhost:9080/stream");
    }

    #[test]
    fn default_endpoint_uses_encrypted_scheme_in_secure_context() {
        let endpoint = resolve_endpoint(None, true, "desk.example.com").expect("default is valid");
        assert!(endpoint.starts_with("wss://"));
        assert!(endpoint.ends_with(":9080/stream"));
    }

    #[test]
    fn blank_override_falls_back_to_default() {
        let endpoint = resolve_endpoint(Some("  "), false, "localhost").expect("default is valid");
        assert_eq!(endpoint, "ws://localhost:9080/stream");
    }

    #[test]
    fn rejects_non_websocket_override() {
        let result = resolve_endpoint(Some("http://localhost:9080/stream"), false, "localhost");
        assert!(matches!(result, Err(FeedError::InvalidArgument(_))));
    }

    #[test]
    fn rejects_unparsable_override() {
        let result = resolve_endpoint(Some("not a url"), false, "localhost");
        assert!(matches!(result, Err(FeedError::Url(_))));
    }
}
