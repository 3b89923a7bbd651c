//! Router configuration, loaded from TOML.
//!
//! Every field has a default reproducing the AutoMarket worker, so an empty
//! file (or no file at all) yields a working configuration:
//!
//! ```toml
//! version = "automarket-v1.0.1"
//! origin = "https://automarket.example"
//! install_policy = "strict"
//! manifest = ["/", "/index.html", "/app.js"]
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Suffix appended to the version tag to name the dynamic generation.
pub const DYNAMIC_SUFFIX: &str = ":dynamic";

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("origin must be an http(s) URL, got {0}")]
    Origin(Url),

    #[error("version tag must not be empty")]
    EmptyVersion,
}

/// What to do when a manifest asset cannot be fetched during install.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstallPolicy {
    /// Log the failure, skip the asset and keep installing.
    #[default]
    Lenient,
    /// Abort the install and discard the half-built generation.
    Strict,
}

/// Text and artwork for push notifications.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    pub title: String,
    /// Body used when a push arrives without a payload.
    pub default_body: String,
    pub icon: String,
    pub badge: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "AutoMarket".to_owned(),
            default_body: "Nueva notificación de AutoMarket".to_owned(),
            icon: "/icon-192.png".to_owned(),
            badge: "/icon-72.png".to_owned(),
        }
    }
}

/// Everything the router needs to know about the deployment.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RouterConfig {
    /// Version tag; bumped each release. Names the static generation.
    pub version: String,
    /// Origin the app is served from. Relative manifest entries resolve
    /// against it and same-origin responses are typed `basic`.
    pub origin: Url,
    /// Assets pre-populated at install, in order.
    pub manifest: Vec<String>,
    /// Document served when an HTML navigation fails offline.
    pub offline_document: String,
    /// Host substrings identifying the remote backend.
    pub api_hosts: Vec<String>,
    /// Hosts whose responses are always static assets.
    pub static_hosts: Vec<String>,
    /// Path suffixes identifying static assets.
    pub static_extensions: Vec<String>,
    pub install_policy: InstallPolicy,
    /// Sync tag that replays the deferred request queue.
    pub sync_tag: String,
    pub notification: NotificationConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            version: "automarket-v1.0.0".to_owned(),
            origin: Url::parse("http://localhost:5173").expect("static URL is valid"),
            manifest: [
                "/",
                "/index.html",
                "/styles.css",
                "/app.js",
                "/firebase-config.js",
                "/manifest.json",
                "/logo.png",
                "/icon-192.png",
                "/icon-512.png",
                "/placeholder-car.jpg",
                "https://fonts.googleapis.com/css2?family=Roboto:wght@300;400;500;700&display=swap",
            ]
            .map(str::to_owned)
            .to_vec(),
            offline_document: "/index.html".to_owned(),
            api_hosts: ["firebase", "firestore", "firebasestorage", "googleapis.com"]
                .map(str::to_owned)
                .to_vec(),
            static_hosts: ["fonts.googleapis.com", "fonts.gstatic.com"]
                .map(str::to_owned)
                .to_vec(),
            static_extensions: [
                ".html", ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff",
                ".woff2", ".ttf",
            ]
            .map(str::to_owned)
            .to_vec(),
            install_policy: InstallPolicy::Lenient,
            sync_tag: "background-sync".to_owned(),
            notification: NotificationConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Defaults with a different version tag and manifest.
    pub fn new(version: impl Into<String>, manifest: Vec<String>) -> Self {
        Self {
            version: version.into(),
            manifest,
            ..Self::default()
        }
    }

    /// Loads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parses and validates TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::EmptyVersion);
        }
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(ConfigError::Origin(self.origin.clone()));
        }
        Ok(())
    }

    /// Name of the static generation: the version tag itself.
    pub fn static_generation(&self) -> &str {
        &self.version
    }

    /// Name of the generation API responses are written back to.
    pub fn dynamic_generation(&self) -> String {
        format!("{}{DYNAMIC_SUFFIX}", self.version)
    }

    /// `true` if `generation` belongs to the current version.
    pub fn is_current_generation(&self, generation: &str) -> bool {
        generation == self.static_generation() || generation == self.dynamic_generation()
    }

    /// Resolves a manifest entry or other app path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        self.origin.join(path)
    }
}
