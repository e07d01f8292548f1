//! APNs VoIP push dispatch.
//!
//! One push is one POST over HTTP/2 to `{host}/3/device/{token}`,
//! authenticated with the configured client certificate:
//!
//! ```text
//! apns-topic:      {bundleId}.voip
//! apns-push-type:  voip
//! apns-priority:   10
//! apns-expiration: 0
//! content-type:    application/json
//!
//! {"aps":{"content-available":1},"caller":"Room {alias}","roomAlias":"{alias}"}
//! ```
//!
//! There are no retries. Every failure is returned to the caller once.

use crate::form::FormConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound for connecting, sending and reading the response.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Certificate file and private key file must be set")]
    MissingCredentials,
    #[error("Certificate file not found: {}", .0.display())]
    CertificateNotFound(PathBuf),
    #[error("Private key file not found: {}", .0.display())]
    KeyNotFound(PathBuf),
    /// The files exist but do not form a usable client identity.
    #[error("Invalid certificate or private key: {0}")]
    InvalidCredentials(String),
    /// The form holds something that cannot go into a request line or header.
    #[error("Invalid push request: {0}")]
    InvalidRequest(String),
    /// Connection, TLS or timeout failure.
    #[error("Failed to send push notification: {0}")]
    TransportFailure(String),
    /// APNs answered with a non-2xx status.
    #[error("Failed to send push notification:\n{status} {body}")]
    ApplicationError { status: u16, body: String },
}

impl From<reqwest::Error> for PushError {
    fn from(e: reqwest::Error) -> Self {
        let is_builder = e.is_builder();
        let message = format!("{:#}", anyhow::Error::from(e));
        if is_builder {
            PushError::InvalidRequest(message)
        } else {
            PushError::TransportFailure(message)
        }
    }
}

/// Check certificate and key paths, in order, before any network activity.
pub fn check_credentials(config: &FormConfig) -> Result<(), PushError> {
    let (cert, key) = (config.cert_file(), config.key_file());
    if cert.as_os_str().is_empty() || key.as_os_str().is_empty() {
        return Err(PushError::MissingCredentials);
    }
    if !cert.is_file() {
        return Err(PushError::CertificateNotFound(cert.to_path_buf()));
    }
    if !key.is_file() {
        return Err(PushError::KeyNotFound(key.to_path_buf()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Aps {
    #[serde(rename = "content-available")]
    pub content_available: u8,
}

/// The JSON body of a VoIP wake push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoipPayload {
    pub aps: Aps,
    pub caller: String,
    #[serde(rename = "roomAlias")]
    pub room_alias: String,
}

impl VoipPayload {
    pub fn for_room(room_alias: &str) -> Self {
        Self {
            aps: Aps {
                content_available: 1,
            },
            caller: format!("Room {room_alias}"),
            room_alias: room_alias.to_string(),
        }
    }
}

/// A single push, built from the form at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Scheme and authority, without a trailing slash.
    pub host: String,
    pub topic: String,
    pub device_token: String,
    pub payload: VoipPayload,
}

impl PushRequest {
    pub fn from_config(config: &FormConfig) -> Self {
        Self {
            host: config.apns_host().as_str().to_string(),
            topic: format!("{}.voip", config.bundle_id()),
            device_token: config.device_token().to_string(),
            payload: VoipPayload::for_room(config.room_alias()),
        }
    }

    pub fn url(&self) -> String {
        format!("{}/3/device/{}", self.host, self.device_token)
    }

    /// The APNs headers, in wire order.
    pub fn headers(&self) -> [(&'static str, String); 5] {
        [
            ("apns-topic", self.topic.clone()),
            ("apns-push-type", "voip".to_string()),
            ("apns-priority", "10".to_string()),
            ("apns-expiration", "0".to_string()),
            ("content-type", "application/json".to_string()),
        ]
    }

    fn header_map(&self) -> Result<HeaderMap, PushError> {
        let mut map = HeaderMap::new();
        for (name, value) in self.headers() {
            let value = HeaderValue::from_str(&value)
                .map_err(|e| PushError::InvalidRequest(format!("{name}: {e}")))?;
            map.insert(HeaderName::from_static(name), value);
        }
        Ok(map)
    }

    pub fn body_json(&self) -> String {
        // Plain structs of strings and integers always serialize.
        serde_json::to_string(&self.payload).unwrap_or_default()
    }
}

/// A push APNs accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReceipt {
    pub status: u16,
    /// The `apns-id` APNs assigned to the notification, if returned.
    pub apns_id: Option<String>,
}

/// HTTP/2 client holding one certificate/key identity.
///
/// Each `send_push` builds its own dispatcher and drops it when done, which
/// closes the connection whatever the outcome.
pub struct Dispatcher {
    client: reqwest::Client,
}

impl Dispatcher {
    /// Load the PEM certificate and key and build a TLS client around them.
    pub fn new(cert_file: &Path, key_file: &Path) -> Result<Self, PushError> {
        let mut pem = read_pem(cert_file)?;
        pem.push(b'\n');
        pem.extend(read_pem(key_file)?);

        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|e| PushError::InvalidCredentials(format!("{:#}", anyhow::Error::from(e))))?;

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .http2_prior_knowledge()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PushError::InvalidCredentials(format!("{:#}", anyhow::Error::from(e))))?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Issue exactly one POST for `request`.
    pub async fn send(&self, request: &PushRequest) -> Result<PushReceipt, PushError> {
        let url = request.url();
        debug!(url = %url, topic = %request.topic, "Sending VoIP push");

        let response = self
            .client
            .post(&url)
            .headers(request.header_map()?)
            .body(request.body_json())
            .send()
            .await?;

        let status = response.status();
        let apns_id = response
            .headers()
            .get("apns-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await?;

        if status.is_success() {
            info!(url = %url, status = %status, body = %body, "APNs accepted push");
            Ok(PushReceipt {
                status: status.as_u16(),
                apns_id,
            })
        } else {
            warn!(url = %url, status = %status, body = %body, "APNs rejected push");
            Err(PushError::ApplicationError {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, PushError> {
    std::fs::read(path)
        .map_err(|e| PushError::InvalidCredentials(format!("{}: {e}", path.display())))
}

/// Validate the credentials, then send one VoIP push for the form.
pub async fn send_push(config: &FormConfig) -> Result<PushReceipt, PushError> {
    check_credentials(config)?;
    let request = PushRequest::from_config(config);
    let dispatcher = Dispatcher::new(config.cert_file(), config.key_file())?;
    dispatcher.send(&request).await
}
