use std::sync::OnceLock;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};
use url::Url;

use crate::config::DownloadConfig;
use crate::error::TransportError;

/// reqwest is built without a bundled crypto provider; install aws-lc-rs once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the HTTP client used for media, cover and danmaku downloads.
pub fn build_client(config: &DownloadConfig) -> Result<reqwest::Client, TransportError> {
    install_rustls_provider();

    let mut headers = HeaderMap::new();
    for (name, value) in config.headers() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid request header"),
        }
    }

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(config.connect_timeout())
        .build()?)
}

/// Apply the protocol downgrade and mirror host override to a media URL.
///
/// URLs that do not parse are returned unchanged so the request itself
/// reports the problem.
pub fn rewrite_url(raw: &str, config: &DownloadConfig) -> String {
    if !config.force_http && config.host_override.is_none() {
        return raw.to_string();
    }
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if config.force_http && url.scheme() == "https" && url.set_scheme("http").is_err() {
        warn!(url = %raw, "Could not downgrade URL scheme");
    }
    if let Some(host) = config.host_override.as_deref().filter(|h| !h.is_empty())
        && url.set_host(Some(host)).is_err()
    {
        warn!(url = %raw, host, "Could not apply host override");
    }
    url.to_string()
}
