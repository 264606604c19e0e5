use crate::error::{HoundError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// An application bundle: raw class bytes by internal name plus any other
/// files by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Application {
    id: String,
    classes: BTreeMap<String, Vec<u8>>,
    files: BTreeMap<String, Vec<u8>>,
}

impl Application {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    #[must_use]
    pub fn with_class<S: Into<String>>(mut self, internal_name: S, bytes: Vec<u8>) -> Self {
        self.add_class(internal_name, bytes);
        self
    }

    /// Returns the previous bytes if a class of that name was already present.
    pub fn add_class<S: Into<String>>(&mut self, internal_name: S, bytes: Vec<u8>) -> Option<Vec<u8>> {
        self.classes.insert(internal_name.into(), bytes)
    }

    pub fn add_file<S: Into<String>>(&mut self, path: S, bytes: Vec<u8>) -> Option<Vec<u8>> {
        self.files.insert(path.into(), bytes)
    }

    /// Identifier of the primary source.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn classes(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.classes
    }

    pub fn files(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.files
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Read an unpacked class tree. `com/example/Main.class` becomes class
    /// `com/example/Main`; every other file is kept under its relative path.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(HoundError::path_not_found(dir));
        }
        let id = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        let mut app = Self::new(id);

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| HoundError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(dir) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let bytes = fs::read(entry.path())?;
            match relative.strip_suffix(".class") {
                Some(internal_name) => {
                    app.add_class(internal_name, bytes);
                }
                None => {
                    app.add_file(relative, bytes);
                }
            }
        }
        debug!(
            "read {} classes and {} files from {}",
            app.classes.len(),
            app.files.len(),
            dir.display()
        );
        Ok(app)
    }
}
