//! Preview materialization: attachments and rendered bodies on disk

pub mod attachments;
pub mod error;
pub mod launcher;
pub mod render;

pub use attachments::{MAX_NAME_CHARS, extension_for, save_attachments};
pub use error::PreviewError;
pub use launcher::{Launcher, NoopLauncher, SystemLauncher};
pub use render::{DEFAULT_HTML_TEMPLATE, DEFAULT_TEXT_TEMPLATE, Renderer, escape_html};

use crate::mime::Email;

use log::{info, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Random component used to keep preview file names unique
pub(crate) fn unique_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Runs a captured email through parsing, attachment saving, rendering and
/// launching
pub struct Previewer {
    renderer: Renderer,
    launcher: Box<dyn Launcher>,
}

impl Previewer {
    /// Previewer writing into `dir` with the built-in templates
    pub fn new(dir: impl Into<PathBuf>, launcher: impl Launcher + 'static) -> Self {
        Self {
            renderer: Renderer::new(dir),
            launcher: Box::new(launcher),
        }
    }

    /// Replace the renderer, and with it the preview directory
    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Directory previews are written to
    pub fn dir(&self) -> &Path {
        self.renderer.dir()
    }

    /// Parse `email`, save its attachments, render its bodies and launch
    /// every rendered file.
    ///
    /// Returns the rendered files. Nothing is written when the email has no
    /// bodies. A viewer that fails to start is logged and otherwise ignored.
    pub fn process(&self, email: &mut Email) -> Result<Vec<PathBuf>, PreviewError> {
        email.parse()?;
        if email.bodies.is_empty() {
            return Err(PreviewError::NoBodies);
        }

        let dir = self.renderer.dir();
        fs::create_dir_all(dir).map_err(|source| PreviewError::Write {
            path: dir.to_path_buf(),
            source,
        })?;

        save_attachments(dir, &mut email.attachments)?;
        let rendered = self.renderer.render(email)?;

        for path in &rendered {
            match self.launcher.launch(path) {
                Ok(()) => info!("Opened preview {}", path.display()),
                Err(e) => warn!("Failed to open preview {}: {e}", path.display()),
            }
        }

        Ok(rendered)
    }
}

impl fmt::Debug for Previewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Previewer")
            .field("renderer", &self.renderer)
            .finish_non_exhaustive()
    }
}
