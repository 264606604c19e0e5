//! Signature documents: an archetype plus named instruction variants.
//!
//! Documents are read through [`RawSignature`], the serde mirror of the file
//! layout, and then compiled into [`Signature`] against the loader's regex
//! cache. Loading goes one file at a time so a malformed document only
//! costs that document.

use super::codec::{self, RawEntry};
use super::entry::Entry;
use super::text_match::RegexCache;
use crate::error::{HoundError, Result};
use crate::types::Archetype;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File layout of a signature document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSignature {
    pub archetype: Archetype,
    #[serde(
        rename = "code-patterns",
        default,
        deserialize_with = "unique_keys",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub code_patterns: BTreeMap<String, Vec<RawEntry>>,
    #[serde(
        rename = "code-behaviors",
        default,
        deserialize_with = "unique_keys",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub code_behaviors: BTreeMap<String, serde_json::Value>,
}

/// Reject repeated variant names instead of silently keeping the last one.
fn unique_keys<'de, D, V>(deserializer: D) -> std::result::Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct UniqueKeys<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for UniqueKeys<V> {
        type Value = BTreeMap<String, V>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of variant names")
        }

        fn visit_map<A: MapAccess<'de>>(
            self,
            mut access: A,
        ) -> std::result::Result<Self::Value, A::Error> {
            let mut map = BTreeMap::new();
            while let Some((key, value)) = access.next_entry::<String, V>()? {
                if map.contains_key(&key) {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate variant name '{}'",
                        key
                    )));
                }
                map.insert(key, value);
            }
            Ok(map)
        }
    }

    deserializer.deserialize_map(UniqueKeys(PhantomData))
}

/// A compiled signature: one archetype, any number of alternative variants.
#[derive(Debug, Clone)]
pub struct Signature {
    archetype: Arc<Archetype>,
    variants: BTreeMap<String, Vec<Entry>>,
    behaviors: BTreeMap<String, serde_json::Value>,
}

impl Signature {
    pub fn new(archetype: Archetype) -> Self {
        Self {
            archetype: Arc::new(archetype),
            variants: BTreeMap::new(),
            behaviors: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_variant<S: Into<String>>(mut self, name: S, entries: Vec<Entry>) -> Self {
        self.variants.insert(name.into(), entries);
        self
    }

    #[must_use]
    pub fn with_behavior<S: Into<String>>(mut self, name: S, behavior: serde_json::Value) -> Self {
        self.behaviors.insert(name.into(), behavior);
        self
    }

    /// Shared by every detection this signature produces.
    pub fn archetype(&self) -> &Arc<Archetype> {
        &self.archetype
    }

    pub fn variants(&self) -> &BTreeMap<String, Vec<Entry>> {
        &self.variants
    }

    pub fn variant(&self, name: &str) -> Option<&[Entry]> {
        self.variants.get(name).map(Vec::as_slice)
    }

    /// Behavioral entries, carried but never evaluated.
    pub fn behaviors(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.behaviors
    }

    pub fn from_raw(raw: RawSignature, cache: &RegexCache, origin: &str) -> Result<Self> {
        let mut variants = BTreeMap::new();
        for (name, raw_entries) in raw.code_patterns {
            let entries = raw_entries
                .iter()
                .map(|raw_entry| codec::decode(raw_entry, cache))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| HoundError::format(origin, format!("variant '{}': {}", name, e)))?;

            if entries.is_empty() {
                warn!(
                    "{}: variant '{}' of {} is empty and never matches",
                    origin, name, raw.archetype.identifier
                );
            } else if entries.last().is_some_and(Entry::is_wildcard) {
                warn!(
                    "{}: variant '{}' of {} ends in a wildcard and can never complete",
                    origin, name, raw.archetype.identifier
                );
            }
            variants.insert(name, entries);
        }

        Ok(Self {
            archetype: Arc::new(raw.archetype),
            variants,
            behaviors: raw.code_behaviors,
        })
    }

    pub fn to_raw(&self) -> RawSignature {
        RawSignature {
            archetype: (*self.archetype).clone(),
            code_patterns: self
                .variants
                .iter()
                .map(|(name, entries)| (name.clone(), entries.iter().map(codec::encode).collect()))
                .collect(),
            code_behaviors: self.behaviors.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_raw())?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_raw())?)
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.archetype == other.archetype
            && self.archetype.description == other.archetype.description
            && self.variants == other.variants
            && self.behaviors == other.behaviors
    }
}

/// Signature document syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// `.json` is JSON, `.yml`/`.yaml` is YAML, anything else is not a signature file.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(DocumentFormat::Json),
            "yml" | "yaml" => Some(DocumentFormat::Yaml),
            _ => None,
        }
    }
}

/// A signature file that failed to load.
#[derive(Debug)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: HoundError,
}

/// Outcome of loading many signature files.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub signatures: Vec<Signature>,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, path: &Path, error: HoundError) {
        self.failures.push(LoadFailure { path: path.to_path_buf(), error });
    }

    /// Add a signature unless its identifier is already taken.
    fn push(&mut self, signature: Signature, path: &Path) {
        let identifier = &signature.archetype().identifier;
        if self.signatures.iter().any(|s| &s.archetype().identifier == identifier) {
            warn!("{}: duplicate archetype '{}' ignored", path.display(), identifier);
            let error = HoundError::duplicate_archetype(identifier.clone());
            self.fail(path, error);
            return;
        }
        self.signatures.push(signature);
    }
}

/// Reads signature documents and owns the regex cache their matchers share.
#[derive(Debug, Clone, Default)]
pub struct SignatureLoader {
    cache: Arc<RegexCache>,
}

impl SignatureLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: Arc<RegexCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<RegexCache> {
        &self.cache
    }

    pub fn parse_json(&self, text: &str, origin: &str) -> Result<Signature> {
        let raw: RawSignature = serde_json::from_str(text)?;
        Signature::from_raw(raw, &self.cache, origin)
    }

    pub fn parse_yaml(&self, text: &str, origin: &str) -> Result<Signature> {
        let raw: RawSignature = serde_yaml::from_str(text)?;
        Signature::from_raw(raw, &self.cache, origin)
    }

    pub fn parse(&self, text: &str, format: DocumentFormat, origin: &str) -> Result<Signature> {
        match format {
            DocumentFormat::Json => self.parse_json(text, origin),
            DocumentFormat::Yaml => self.parse_yaml(text, origin),
        }
    }

    /// Load one document; the extension picks the syntax and defaults to YAML.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<Signature> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HoundError::path_not_found(path));
        }
        let text = fs::read_to_string(path)?;
        let format = DocumentFormat::from_path(path).unwrap_or(DocumentFormat::Yaml);
        let signature = self.parse(&text, format, &path.display().to_string())?;
        debug!(
            "loaded {} ({} variants) from {}",
            signature.archetype(),
            signature.variants().len(),
            path.display()
        );
        Ok(signature)
    }

    /// Load every `.json`/`.yml`/`.yaml` file under `dir`, in path order.
    pub fn load_dir<P: AsRef<Path>>(&self, dir: P) -> Result<LoadReport> {
        let dir = dir.as_ref();
        let files = signature_files(dir)?;
        info!("Loading signatures from {}", dir.display());

        let mut report = LoadReport::default();
        self.load_into(&mut report, &files);
        info!(
            "Loaded {} signatures ({} failures) from {}",
            report.signatures.len(),
            report.failures.len(),
            dir.display()
        );
        Ok(report)
    }

    /// Load a mix of files and directories into one report.
    pub fn load_paths<P: AsRef<Path>>(&self, paths: &[P]) -> LoadReport {
        let mut report = LoadReport::default();
        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                match signature_files(path) {
                    Ok(files) => self.load_into(&mut report, &files),
                    Err(error) => report.fail(path, error),
                }
            } else {
                self.load_into(&mut report, std::slice::from_ref(&path.to_path_buf()));
            }
        }
        report
    }

    fn load_into(&self, report: &mut LoadReport, files: &[PathBuf]) {
        for path in files {
            match self.load_file(path) {
                Ok(signature) => report.push(signature, path),
                Err(error) => {
                    warn!("{}: {}", path.display(), error);
                    report.fail(path, error);
                }
            }
        }
    }
}

fn signature_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(HoundError::path_not_found(dir));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping unreadable entry under {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| DocumentFormat::from_path(path).is_some())
        .collect();
    files.sort();
    Ok(files)
}
