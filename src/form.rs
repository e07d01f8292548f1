//! Call pusher form state.
//!
//! `FormConfig` is the single value object behind the UI form. Fields are
//! private so every mutation goes through a setter, which keeps the derived
//! room link in step with the room alias.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Base URL of the companion web app's rooms.
pub const ROOM_LINK_PREFIX: &str = "https://edu.livedigital.space/room/";

pub const DEFAULT_BUNDLE_ID: &str = "pro.vlprojects.livedigital-sdk-example";
pub const DEFAULT_CERT_FILE: &str = "./apns_cert.pem";
pub const DEFAULT_KEY_FILE: &str = "./apns_key.pem";
pub const DEFAULT_ROOM_ALIAS: &str = "q3_5V3uwik";

/// Room link for an alias. The alias is substituted raw, without escaping.
pub fn room_link_for(alias: &str) -> String {
    format!("{ROOM_LINK_PREFIX}{alias}")
}

/// The two APNs endpoints the form can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ApnsHost {
    #[default]
    #[serde(rename = "https://api.sandbox.push.apple.com")]
    Sandbox,
    #[serde(rename = "https://api.push.apple.com")]
    Production,
}

impl ApnsHost {
    pub const ALL: [ApnsHost; 2] = [ApnsHost::Sandbox, ApnsHost::Production];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApnsHost::Sandbox => "https://api.sandbox.push.apple.com",
            ApnsHost::Production => "https://api.push.apple.com",
        }
    }
}

impl fmt::Display for ApnsHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApnsHost {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match ApnsHost::ALL.into_iter().find(|host| host.as_str() == s) {
            Some(host) => Ok(host),
            None => bail!("Unknown APNs host: {s}"),
        }
    }
}

/// Selects a form field for generic string updates from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    BundleId,
    ApnsHost,
    CertFile,
    KeyFile,
    DeviceToken,
    RoomAlias,
}

/// Everything needed to build one VoIP push.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormConfig {
    bundle_id: String,
    apns_host: ApnsHost,
    cert_file: PathBuf,
    key_file: PathBuf,
    device_token: String,
    room_alias: String,
    /// Derived from `room_alias`; only `set_room_alias` writes it.
    room_link: String,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            bundle_id: DEFAULT_BUNDLE_ID.to_string(),
            apns_host: ApnsHost::default(),
            cert_file: PathBuf::from(DEFAULT_CERT_FILE),
            key_file: PathBuf::from(DEFAULT_KEY_FILE),
            device_token: String::new(),
            room_alias: DEFAULT_ROOM_ALIAS.to_string(),
            room_link: room_link_for(DEFAULT_ROOM_ALIAS),
        }
    }
}

impl FormConfig {
    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    pub fn apns_host(&self) -> ApnsHost {
        self.apns_host
    }

    pub fn cert_file(&self) -> &Path {
        &self.cert_file
    }

    pub fn key_file(&self) -> &Path {
        &self.key_file
    }

    pub fn device_token(&self) -> &str {
        &self.device_token
    }

    pub fn room_alias(&self) -> &str {
        &self.room_alias
    }

    pub fn room_link(&self) -> &str {
        &self.room_link
    }

    pub fn set_bundle_id(&mut self, bundle_id: impl Into<String>) {
        self.bundle_id = bundle_id.into();
    }

    pub fn set_apns_host(&mut self, host: ApnsHost) {
        self.apns_host = host;
    }

    pub fn set_cert_file(&mut self, path: impl Into<PathBuf>) {
        self.cert_file = path.into();
    }

    pub fn set_key_file(&mut self, path: impl Into<PathBuf>) {
        self.key_file = path.into();
    }

    pub fn set_device_token(&mut self, token: impl Into<String>) {
        self.device_token = token.into();
    }

    pub fn set_room_alias(&mut self, alias: impl Into<String>) {
        self.room_alias = alias.into();
        self.room_link = room_link_for(&self.room_alias);
    }

    /// Update a field from its string form, as typed into the UI.
    ///
    /// Only the APNs host can fail: it must be one of [`ApnsHost::ALL`].
    pub fn set_field(&mut self, field: FormField, value: &str) -> Result<()> {
        match field {
            FormField::BundleId => self.set_bundle_id(value),
            FormField::ApnsHost => self.set_apns_host(value.parse()?),
            FormField::CertFile => self.set_cert_file(value),
            FormField::KeyFile => self.set_key_file(value),
            FormField::DeviceToken => self.set_device_token(value),
            FormField::RoomAlias => self.set_room_alias(value),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_example_app() {
        let form = FormConfig::default();
        assert_eq!(form.bundle_id(), "pro.vlprojects.livedigital-sdk-example");
        assert_eq!(form.apns_host(), ApnsHost::Sandbox);
        assert_eq!(form.cert_file(), Path::new("./apns_cert.pem"));
        assert_eq!(form.key_file(), Path::new("./apns_key.pem"));
        assert_eq!(form.device_token(), "");
        assert_eq!(form.room_alias(), "q3_5V3uwik");
        assert_eq!(
            form.room_link(),
            "https://edu.livedigital.space/room/q3_5V3uwik"
        );
    }

    #[test]
    fn room_link_follows_every_alias_write() {
        let mut form = FormConfig::default();
        for alias in ["abc", "", "x-y_z", "abc"] {
            form.set_room_alias(alias);
            assert_eq!(form.room_link(), format!("{ROOM_LINK_PREFIX}{alias}"));
        }

        form.set_field(FormField::RoomAlias, "via_field").unwrap();
        assert_eq!(
            form.room_link(),
            "https://edu.livedigital.space/room/via_field"
        );
    }

    #[test]
    fn room_alias_is_not_escaped() {
        assert_eq!(
            room_link_for("a b/c?d"),
            "https://edu.livedigital.space/room/a b/c?d"
        );
    }

    #[test]
    fn device_token_write_leaves_room_link_alone() {
        let mut form = FormConfig::default();
        let before = form.room_link().to_string();
        form.set_device_token("abc123");
        assert_eq!(form.room_link(), before);
        assert_eq!(form.device_token(), "abc123");
    }

    #[test]
    fn apns_host_parses_only_known_hosts() {
        assert_eq!(
            "https://api.push.apple.com".parse::<ApnsHost>().unwrap(),
            ApnsHost::Production
        );
        assert_eq!(
            " https://api.sandbox.push.apple.com\n"
                .parse::<ApnsHost>()
                .unwrap(),
            ApnsHost::Sandbox
        );
        assert!("https://example.com".parse::<ApnsHost>().is_err());

        let mut form = FormConfig::default();
        assert!(form.set_field(FormField::ApnsHost, "nope").is_err());
        assert_eq!(form.apns_host(), ApnsHost::Sandbox);
    }

    #[test]
    fn set_field_routes_to_the_right_field() {
        let mut form = FormConfig::default();
        form.set_field(FormField::BundleId, "com.example.app").unwrap();
        form.set_field(FormField::ApnsHost, "https://api.push.apple.com")
            .unwrap();
        form.set_field(FormField::CertFile, "/tmp/cert.pem").unwrap();
        form.set_field(FormField::KeyFile, "/tmp/key.pem").unwrap();
        form.set_field(FormField::DeviceToken, "tok").unwrap();

        assert_eq!(form.bundle_id(), "com.example.app");
        assert_eq!(form.apns_host(), ApnsHost::Production);
        assert_eq!(form.cert_file(), Path::new("/tmp/cert.pem"));
        assert_eq!(form.key_file(), Path::new("/tmp/key.pem"));
        assert_eq!(form.device_token(), "tok");
    }

    #[test]
    fn serializes_for_the_ui() {
        let json = serde_json::to_value(FormConfig::default()).unwrap();
        assert_eq!(json["apnsHost"], "https://api.sandbox.push.apple.com");
        assert_eq!(json["roomLink"], "https://edu.livedigital.space/room/q3_5V3uwik");
        assert_eq!(json["deviceToken"], "");

        let field: FormField = serde_json::from_str("\"roomAlias\"").unwrap();
        assert_eq!(field, FormField::RoomAlias);
    }
}
