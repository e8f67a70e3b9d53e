//! Per-stream type and member name tables.

use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::vec::Vec;

use lm_utils::hash::HashMap;

use crate::error::GraphError;
use crate::info::TypeKey;
use crate::registry::TypeRegistry;
use crate::settings::Prewarm;
use crate::storage::PREWARM_BASE;

// -----------------------------------------------------------------------------
// InternTable

/// Dense ids in first-use order.
#[derive(Debug, Default)]
pub(crate) struct InternTable {
    ids: HashMap<String, u16>,
    entries: Vec<String>,
}

impl InternTable {
    /// Ids must stay below this bound.
    const LIMIT: usize = PREWARM_BASE as usize;

    #[inline]
    pub fn get(&self, entry: &str) -> Option<u16> {
        self.ids.get(entry).copied()
    }

    pub fn intern(&mut self, entry: &str) -> Result<u16, GraphError> {
        if let Some(id) = self.get(entry) {
            return Ok(id);
        }
        if self.entries.len() >= Self::LIMIT {
            return Err(GraphError::unsupported("too many distinct types or names in one stream"));
        }
        let id = self.entries.len() as u16;
        self.ids.insert(entry.to_owned(), id);
        self.entries.push(entry.to_owned());
        Ok(id)
    }

    #[inline]
    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }
}

// -----------------------------------------------------------------------------
// PrewarmIndex

/// The prewarm lists of a [`Prewarm`] with reverse lookups.
#[derive(Debug, Default)]
pub(crate) struct PrewarmIndex {
    types: InternTable,
    names: InternTable,
}

impl PrewarmIndex {
    /// Prewarm ids occupy `PREWARM_BASE..0xFFFE`; the top two values are
    /// type token sentinels.
    const CAPACITY: usize = 0xFFFE - PREWARM_BASE as usize;

    pub fn new(prewarm: &Prewarm) -> Result<Self, GraphError> {
        if prewarm.types.len() > Self::CAPACITY || prewarm.names.len() > Self::CAPACITY {
            return Err(GraphError::unsupported("prewarm table exceeds its id range"));
        }
        let mut index = Self::default();
        for path in &prewarm.types {
            index.types.intern(path)?;
        }
        for name in &prewarm.names {
            index.names.intern(name)?;
        }
        Ok(index)
    }

    #[inline]
    fn type_id(&self, path: &str) -> Option<u16> {
        self.types.get(path).map(|i| i + PREWARM_BASE)
    }

    #[inline]
    fn name_id(&self, name: &str) -> Option<u16> {
        self.names.get(name).map(|i| i + PREWARM_BASE)
    }

    #[inline]
    fn type_path(&self, id: u16) -> Option<&str> {
        let i = id.checked_sub(PREWARM_BASE)?;
        self.types.entries.get(i as usize).map(String::as_str)
    }

    #[inline]
    fn name(&self, id: u16) -> Option<&str> {
        let i = id.checked_sub(PREWARM_BASE)?;
        self.names.entries.get(i as usize).map(String::as_str)
    }
}

// -----------------------------------------------------------------------------
// WriteTables

/// Assigns ids while a stream is written.
pub(crate) struct WriteTables<'a> {
    prewarm: &'a PrewarmIndex,
    types: InternTable,
    names: InternTable,
}

impl<'a> WriteTables<'a> {
    pub fn new(prewarm: &'a PrewarmIndex) -> Self {
        Self {
            prewarm,
            types: InternTable::default(),
            names: InternTable::default(),
        }
    }

    pub fn type_id(&mut self, path: &str) -> Result<u16, GraphError> {
        match self.prewarm.type_id(path) {
            Some(id) => Ok(id),
            None => self.types.intern(path),
        }
    }

    pub fn name_id(&mut self, name: &str) -> Result<u16, GraphError> {
        match self.prewarm.name_id(name) {
            Some(id) => Ok(id),
            None => self.names.intern(name),
        }
    }

    /// The per-stream type and name lists, in id order.
    pub fn into_entries(self) -> (Vec<String>, Vec<String>) {
        (self.types.into_entries(), self.names.into_entries())
    }
}

// -----------------------------------------------------------------------------
// ReadTables

/// Resolves ids while a stream is read.
pub(crate) struct ReadTables<'a> {
    prewarm: &'a PrewarmIndex,
    types: Vec<String>,
    names: Vec<String>,
    resolved: HashMap<u16, TypeKey>,
}

impl<'a> ReadTables<'a> {
    pub fn new(prewarm: &'a PrewarmIndex, types: Vec<String>, names: Vec<String>) -> Self {
        Self {
            prewarm,
            types,
            names,
            resolved: HashMap::default(),
        }
    }

    pub fn type_path(&self, id: u16) -> Result<&str, GraphError> {
        if id >= PREWARM_BASE {
            return self
                .prewarm
                .type_path(id)
                .ok_or_else(|| GraphError::corrupt(alloc::format!("prewarm type id {id} out of range")));
        }
        self.types
            .get(id as usize)
            .map(String::as_str)
            .ok_or_else(|| GraphError::corrupt(alloc::format!("type id {id} out of range")))
    }

    pub fn name(&self, id: u16) -> Result<&str, GraphError> {
        if id >= PREWARM_BASE {
            return self
                .prewarm
                .name(id)
                .ok_or_else(|| GraphError::corrupt(alloc::format!("prewarm name id {id} out of range")));
        }
        self.names
            .get(id as usize)
            .map(String::as_str)
            .ok_or_else(|| GraphError::corrupt(alloc::format!("name id {id} out of range")))
    }

    /// Maps a stream type id to a registered type, running the registry's
    /// mapping hooks for unknown paths.
    pub fn resolve_type(&mut self, id: u16, registry: &TypeRegistry) -> Result<TypeKey, GraphError> {
        if let Some(&key) = self.resolved.get(&id) {
            return Ok(key);
        }
        let path = self.type_path(id)?;
        let key = registry
            .resolve_stream_path(path)
            .ok_or_else(|| GraphError::MissingType(path.to_owned()))?;
        self.resolved.insert(id, key);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::vec;

    use super::{PrewarmIndex, ReadTables, WriteTables};
    use crate::registry::TypeRegistry;
    use crate::settings::Prewarm;
    use crate::storage::PREWARM_BASE;

    #[test]
    fn prewarm_ids_are_checked_first() {
        let prewarm = PrewarmIndex::new(&Prewarm {
            types: vec![String::from("i32")],
            names: vec![String::from("id")],
        })
        .unwrap();

        let mut write = WriteTables::new(&prewarm);
        assert_eq!(write.type_id("string").unwrap(), 0);
        assert_eq!(write.type_id("i32").unwrap(), PREWARM_BASE);
        assert_eq!(write.type_id("string").unwrap(), 0);
        assert_eq!(write.name_id("id").unwrap(), PREWARM_BASE);
        assert_eq!(write.name_id("label").unwrap(), 0);
        let (types, names) = write.into_entries();
        assert_eq!(types, ["string"]);
        assert_eq!(names, ["label"]);

        let registry = TypeRegistry::new();
        let mut read = ReadTables::new(&prewarm, types, names);
        assert_eq!(read.name(PREWARM_BASE).unwrap(), "id");
        assert_eq!(read.name(0).unwrap(), "label");
        assert!(read.name(1).unwrap_err().is_corrupt());
        assert!(read.name(PREWARM_BASE + 1).unwrap_err().is_corrupt());
        assert_eq!(
            read.resolve_type(PREWARM_BASE, &registry).unwrap(),
            registry.resolve_path("i32").unwrap()
        );
    }
}
