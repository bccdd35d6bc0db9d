//! Handing rendered previews to a viewer

use std::io;
use std::path::Path;

/// Opens a rendered preview file for the user
pub trait Launcher: Send + Sync {
    fn launch(&self, path: &Path) -> io::Result<()>;
}

/// Opens files with the desktop's default application
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, path: &Path) -> io::Result<()> {
        open::that(path)
    }
}

/// Leaves rendered files where they are
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLauncher;

impl Launcher for NoopLauncher {
    fn launch(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

impl<F> Launcher for F
where
    F: Fn(&Path) -> io::Result<()> + Send + Sync,
{
    fn launch(&self, path: &Path) -> io::Result<()> {
        self(path)
    }
}
