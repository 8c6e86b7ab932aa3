use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::errors::Result;

/// Where and how a format writes an output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTarget {
    /// File actually written, may differ from the requested path.
    pub path: PathBuf,
    pub driver: &'static str,
    /// Files the driver writes next to `path`.
    pub sidecars: Vec<PathBuf>,
}

impl WriteTarget {
    pub fn new(path: impl Into<PathBuf>, driver: &'static str) -> Self {
        Self {
            path: path.into(),
            driver,
            sidecars: Vec::new(),
        }
    }

    pub fn with_sidecars(mut self, extensions: &[&str]) -> Self {
        self.sidecars = extensions
            .iter()
            .map(|extension| self.path.with_extension(extension))
            .collect();
        self
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.path.as_path()).chain(self.sidecars.iter().map(PathBuf::as_path))
    }
}

/// Removes every file of a [WriteTarget] when dropped before
/// [OutputGuard::commit], so failed writes leave nothing behind.
#[derive(Debug)]
pub struct OutputGuard<'a> {
    target: &'a WriteTarget,
    committed: bool,
}

impl<'a> OutputGuard<'a> {
    /// Clears leftovers of a previous output at `target`.
    pub fn prepare(target: &'a WriteTarget) -> Result<Self> {
        for file in target.files().filter(|file| file.exists()) {
            debug!("removing existing {file:?}");
            std::fs::remove_file(file)?;
        }
        Ok(Self {
            target,
            committed: false,
        })
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for OutputGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for file in self.target.files().filter(|file| file.exists()) {
            match std::fs::remove_file(file) {
                Ok(()) => warn!("removed partial output {file:?}"),
                Err(error) => warn!("could not remove partial output {file:?}: {error}"),
            }
        }
    }
}
