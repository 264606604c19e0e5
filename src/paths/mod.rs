//! Addressing model for detections.
//!
//! Locations form a three level tree: a *source* (an application bundle), the
//! *classes* inside it and the *methods* of each class. Every location is
//! interned in a [`PathTable`] and addressed by a copyable [`PathId`] handle.
//! The table guarantees that a given `(parent, local name)` pair is interned
//! exactly once, so two lookups of the same class in the same source yield the
//! same handle. Sinks and aggregates key their maps on that handle instead of
//! hashing display strings.
//!
//! Handles stay valid for the lifetime of the table, which is shared (`Arc`)
//! with every aggregate built from it so consumers can walk back up the
//! hierarchy after the scan is over.

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Stable handle to an interned location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathId(u32);

impl PathId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    Source,
    Class,
    Method,
}

impl PathKind {
    /// Kind of the children this level holds.
    pub fn child(self) -> Option<PathKind> {
        match self {
            PathKind::Source => Some(PathKind::Class),
            PathKind::Class => Some(PathKind::Method),
            PathKind::Method => None,
        }
    }
}

#[derive(Debug)]
struct PathNode {
    kind: PathKind,
    parent: Option<PathId>,
    name: Arc<str>,
    display: Arc<str>,
}

/// Owned snapshot of an interned location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathElement {
    pub id: PathId,
    pub kind: PathKind,
    pub parent: Option<PathId>,
    /// Local name: source identifier, internal class name, or method name + descriptor
    pub name: Arc<str>,
    /// Fully qualified display string, e.g. `app.jar : com/example/Main.run()V`
    pub display: Arc<str>,
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

/// Interning arena for locations. Safe to share across scanning threads.
#[derive(Debug)]
pub struct PathTable {
    nodes: RwLock<Vec<PathNode>>,
    index: DashMap<(Option<PathId>, String), PathId, FxBuildHasher>,
}

impl Default for PathTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PathTable {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            index: DashMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Intern a source (application bundle) by identifier.
    pub fn source(&self, identifier: &str) -> PathId {
        self.intern(None, PathKind::Source, identifier)
    }

    /// Intern a class by internal name (`com/example/Main`) under a source.
    pub fn class(&self, source: PathId, internal_name: &str) -> PathId {
        debug_assert_eq!(self.kind(source), Some(PathKind::Source));
        self.intern(Some(source), PathKind::Class, internal_name)
    }

    /// Intern a method by name and descriptor under a class.
    pub fn method(&self, class: PathId, name: &str, descriptor: &str) -> PathId {
        debug_assert_eq!(self.kind(class), Some(PathKind::Class));
        let local = format!("{}{}", name, descriptor);
        self.intern(Some(class), PathKind::Method, &local)
    }

    /// Look up an already-interned child without creating it.
    pub fn find(&self, parent: Option<PathId>, local_name: &str) -> Option<PathId> {
        self.index
            .get(&(parent, local_name.to_string()))
            .map(|entry| *entry.value())
    }

    pub fn element(&self, id: PathId) -> Option<PathElement> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes.get(id.index()).map(|node| PathElement {
            id,
            kind: node.kind,
            parent: node.parent,
            name: node.name.clone(),
            display: node.display.clone(),
        })
    }

    pub fn display(&self, id: PathId) -> Option<Arc<str>> {
        self.with_node(id, |node| node.display.clone())
    }

    pub fn name(&self, id: PathId) -> Option<Arc<str>> {
        self.with_node(id, |node| node.name.clone())
    }

    pub fn kind(&self, id: PathId) -> Option<PathKind> {
        self.with_node(id, |node| node.kind)
    }

    pub fn parent(&self, id: PathId) -> Option<PathId> {
        self.with_node(id, |node| node.parent).flatten()
    }

    /// Walk up to the source that contains `id` (a source is its own source).
    pub fn source_of(&self, id: PathId) -> Option<PathId> {
        self.ancestor_of_kind(id, PathKind::Source)
    }

    /// Class containing a method, or the class itself. `None` for sources.
    pub fn class_of(&self, id: PathId) -> Option<PathId> {
        self.ancestor_of_kind(id, PathKind::Class)
    }

    /// Lexicographic ordering on fully qualified display strings.
    pub fn compare(&self, a: PathId, b: PathId) -> Ordering {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        let left = nodes.get(a.index()).map(|n| &*n.display);
        let right = nodes.get(b.index()).map(|n| &*n.display);
        left.cmp(&right).then_with(|| a.cmp(&b))
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-intern a location from another table into this one, recreating its
    /// ancestors as needed. Returns `None` if `id` is unknown to `other`.
    pub fn import(&self, other: &PathTable, id: PathId) -> Option<PathId> {
        if std::ptr::eq(self, other) {
            return Some(id);
        }
        let element = other.element(id)?;
        match element.parent {
            None => Some(self.intern(None, element.kind, &element.name)),
            Some(parent) => {
                let parent = self.import(other, parent)?;
                Some(self.intern(Some(parent), element.kind, &element.name))
            }
        }
    }

    fn ancestor_of_kind(&self, id: PathId, kind: PathKind) -> Option<PathId> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        let mut current = Some(id);
        while let Some(cursor) = current {
            let node = nodes.get(cursor.index())?;
            if node.kind == kind {
                return Some(cursor);
            }
            current = node.parent;
        }
        None
    }

    fn with_node<T>(&self, id: PathId, f: impl FnOnce(&PathNode) -> T) -> Option<T> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes.get(id.index()).map(f)
    }

    fn intern(&self, parent: Option<PathId>, kind: PathKind, local_name: &str) -> PathId {
        let key = (parent, local_name.to_string());
        if let Some(existing) = self.index.get(&key) {
            return *existing.value();
        }
        // The shard lock held by `entry` serializes racing interns of the same key.
        *self
            .index
            .entry(key)
            .or_insert_with(|| self.push(parent, kind, local_name))
            .value()
    }

    fn push(&self, parent: Option<PathId>, kind: PathKind, local_name: &str) -> PathId {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let display: Arc<str> = match parent.and_then(|p| nodes.get(p.index())) {
            None => Arc::from(local_name),
            Some(parent_node) => {
                debug_assert_eq!(parent_node.kind.child(), Some(kind));
                let separator = match kind {
                    PathKind::Method => ".",
                    _ => " : ",
                };
                Arc::from(format!("{}{}{}", parent_node.display, separator, local_name))
            }
        };
        let id = PathId(nodes.len() as u32);
        nodes.push(PathNode { kind, parent, name: Arc::from(local_name), display });
        id
    }
}
