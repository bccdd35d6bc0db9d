//! Server configuration

use crate::preview::{NoopLauncher, Previewer, Renderer, SystemLauncher};
use crate::smtp::{Credentials, DEFAULT_TIMEOUT, SmtpServer};

use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to read template {}: {source}", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Settings fixed when the server starts.
///
/// Every field has a default, so a config file only needs the keys it
/// changes:
///
/// ```toml
/// port = 2525
/// dir = "/tmp/peekmail"
/// content_types = ["text/html"]
///
/// [templates]
/// "text/html" = "my-preview.html"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Name used in the greeting and EHLO replies
    pub hostname: String,
    pub username: String,
    pub password: String,
    /// Refuse mail from clients that did not AUTH
    pub require_auth: bool,
    /// Connection read and write timeout in seconds; 0 disables it
    pub timeout: u64,
    /// Where attachments and rendered previews are written
    pub dir: PathBuf,
    /// Body content types to render; empty renders every body
    pub content_types: Vec<String>,
    /// Template file per content type, replacing the built-in one
    pub templates: HashMap<String, PathBuf>,
    /// Open rendered previews in the default viewer
    pub open: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1025,
            hostname: "peekmail.local".to_string(),
            username: "username".to_string(),
            password: "password".to_string(),
            require_auth: false,
            timeout: DEFAULT_TIMEOUT.as_secs(),
            dir: env::temp_dir(),
            content_types: Vec::new(),
            templates: HashMap::new(),
            open: true,
        }
    }
}

impl Config {
    /// Read a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_require_auth(mut self, require_auth: bool) -> Self {
        self.require_auth = require_auth;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn with_content_types(mut self, content_types: Vec<String>) -> Self {
        self.content_types = content_types;
        self
    }

    pub fn with_template(mut self, content_type: &str, path: impl Into<PathBuf>) -> Self {
        self.templates.insert(content_type.to_string(), path.into());
        self
    }

    pub fn with_open(mut self, open: bool) -> Self {
        self.open = open;
        self
    }

    /// `host:port` to listen on
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.password)
    }

    /// Renderer for the configured directory, allow-list and template files
    pub fn renderer(&self) -> Result<Renderer, ConfigError> {
        let mut renderer =
            Renderer::new(&self.dir).with_content_types(self.content_types.clone());

        for (content_type, path) in &self.templates {
            let template = fs::read_to_string(path).map_err(|source| ConfigError::Template {
                path: path.clone(),
                source,
            })?;
            renderer = renderer.with_template(content_type, template);
        }

        Ok(renderer)
    }

    /// Previewer that opens previews only when `open` is set
    pub fn previewer(&self) -> Result<Previewer, ConfigError> {
        let previewer = if self.open {
            Previewer::new(&self.dir, SystemLauncher)
        } else {
            Previewer::new(&self.dir, NoopLauncher)
        };
        Ok(previewer.with_renderer(self.renderer()?))
    }

    /// Server with this configuration's hostname, credentials and previewer
    pub fn server(&self) -> Result<SmtpServer, ConfigError> {
        Ok(SmtpServer::new(&self.hostname, self.previewer()?)
            .with_credentials(self.credentials())
            .with_require_auth(self.require_auth)
            .with_timeout(Some(Duration::from_secs(self.timeout))))
    }
}
