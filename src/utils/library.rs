//! Insertion-ordered named resource storage.
//!
//! Every named collection in the engine (shaders, materials, lights, models,
//! framebuffers, render passes) is a [`Library`]. Iteration follows
//! insertion order, which is what render-pass and light ordering rely on.

use rustc_hash::FxHashMap;

use crate::errors::{LumenError, Result};

/// An ordered map from name to a shared resource handle.
#[derive(Debug)]
pub struct Library<T> {
    kind: &'static str,
    entries: Vec<(String, T)>,
    index: FxHashMap<String, usize>,
}

impl<T> Library<T> {
    /// Creates an empty library. `kind` names the resource in log messages.
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// Registers `value` under `name`.
    ///
    /// Fails with [`LumenError::DuplicateResource`] if the name is taken; the
    /// existing entry is left untouched.
    pub fn add(&mut self, name: impl Into<String>, value: T) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            log::error!("{} '{}' already exists in library", self.kind, name);
            return Err(LumenError::DuplicateResource {
                kind: self.kind,
                name,
            });
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, value));
        Ok(())
    }

    /// Borrows the resource registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    /// Like [`get`](Self::get) but reports a missing entry as an error.
    pub fn require(&self, name: &str) -> Result<&T> {
        self.get(name).ok_or_else(|| LumenError::ResourceNotFound {
            kind: self.kind,
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.index.get(name).map(|&i| &mut self.entries[i].1)
    }

    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Removes and returns the entry, preserving the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<T> {
        let position = self.index.remove(name)?;
        let (_, value) = self.entries.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(value)
    }

    /// Iterates `(name, resource)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.entries
            .iter_mut()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut lib = Library::new("model");
        lib.add("c", 3).unwrap();
        lib.add("a", 1).unwrap();
        lib.add("b", 2).unwrap();
        let names: Vec<_> = lib.names().collect();
        assert_eq!(names, ["c", "a", "b"]);
    }

    #[test]
    fn duplicate_is_rejected_and_original_kept() {
        let mut lib = Library::new("shader");
        lib.add("phong", 1).unwrap();
        let err = lib.add("phong", 2).unwrap_err();
        assert!(matches!(err, LumenError::DuplicateResource { kind: "shader", .. }));
        assert_eq!(lib.get("phong"), Some(&1));
    }

    #[test]
    fn remove_reindexes_tail() {
        let mut lib = Library::new("light");
        lib.add("a", 1).unwrap();
        lib.add("b", 2).unwrap();
        lib.add("c", 3).unwrap();
        assert_eq!(lib.remove("a"), Some(1));
        assert_eq!(lib.get("c"), Some(&3));
        assert_eq!(lib.len(), 2);
        assert!(lib.require("a").is_err());
    }
}
