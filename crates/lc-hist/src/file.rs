//! Named-object container.
//!
//! The on-disk form is a single JSON document: a format tag, free-form
//! attributes, and a map from object name to `{class_name, payload}`.
//! Names may contain `/` to mimic directories (`group_3/summary`).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use lc_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::key::{KeyInfo, StoredObject};

const FORMAT_V0: &str = "larcal_objects_v0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry {
    class_name: String,
    payload: serde_json::Value,
}

/// An in-memory named-object container that reads from and writes to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectFile {
    format: String,
    #[serde(default)]
    attributes: BTreeMap<String, serde_json::Value>,
    objects: BTreeMap<String, Entry>,
}

impl Default for ObjectFile {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectFile {
    /// Empty container.
    pub fn new() -> Self {
        Self { format: FORMAT_V0.to_string(), attributes: BTreeMap::new(), objects: BTreeMap::new() }
    }

    /// Read a container from `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            Error::MissingInput(format!("cannot open {}: {e}", path.display()))
        })?;
        let file: ObjectFile = serde_json::from_reader(BufReader::new(f))?;
        file.check_format()?;
        Ok(file)
    }

    /// Parse a container from bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let file: ObjectFile = serde_json::from_slice(bytes)?;
        file.check_format()?;
        Ok(file)
    }

    fn check_format(&self) -> Result<()> {
        if self.format != FORMAT_V0 {
            return Err(Error::Validation(format!(
                "unsupported object file format '{}' (expected '{FORMAT_V0}')",
                self.format
            )));
        }
        Ok(())
    }

    /// Write the container to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut w = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(&mut w, self)?;
        w.flush()?;
        Ok(())
    }

    /// Keys in name order.
    pub fn list_keys(&self) -> Vec<KeyInfo> {
        self.objects
            .iter()
            .map(|(name, e)| KeyInfo { name: name.clone(), class_name: e.class_name.clone() })
            .collect()
    }

    /// Whether `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// No stored objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Store `obj` under `name`, replacing any previous object.
    pub fn put<T: StoredObject>(&mut self, name: impl Into<String>, obj: &T) -> Result<()> {
        let payload = serde_json::to_value(obj)?;
        self.objects.insert(name.into(), Entry { class_name: T::CLASS_NAME.to_string(), payload });
        Ok(())
    }

    /// Read the object stored under `name`.
    pub fn get<T: StoredObject>(&self, name: &str) -> Result<T> {
        let e = self
            .objects
            .get(name)
            .ok_or_else(|| Error::MissingInput(format!("no object named '{name}'")))?;
        if e.class_name != T::CLASS_NAME {
            return Err(Error::Validation(format!(
                "object '{name}' is a {}, not a {}",
                e.class_name,
                T::CLASS_NAME
            )));
        }
        Ok(T::deserialize(&e.payload)?)
    }

    /// Remove `name`, reporting whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.objects.remove(name).is_some()
    }

    /// Set a free-form attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
    }

    /// Free-form attribute, if set.
    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    /// All attributes.
    pub fn attributes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.attributes
    }
}
