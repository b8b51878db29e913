//! On-disk face database: one JSON object mapping identity to embedding.
//!
//! The whole file is read at startup and rewritten after every change.
//! Entries are kept in lexicographic order of identity, which is the
//! order used for listing, saving and for breaking distance ties.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use faceguard_vision::Embedding;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing database: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("identity must not be empty")]
    EmptyIdentity,
    #[error("embedding for {identity:?} is empty")]
    EmptyEmbedding { identity: String },
    #[error("embedding for {identity:?} contains NaN or infinite values")]
    NonFinite { identity: String },
    #[error("embedding for {identity:?} has {found} dimensions, database uses {expected}")]
    Dimension {
        identity: String,
        expected: usize,
        found: usize,
    },
}

/// What `insert_or_replace` did.
#[derive(Debug, Clone, PartialEq)]
pub enum Inserted {
    New,
    Replaced(Embedding),
}

/// Every stored vector must be non-empty and finite; JSON has no way to
/// write NaN or infinity back out.
fn check_values(identity: &str, embedding: &Embedding) -> Result<(), StoreError> {
    if embedding.is_empty() {
        return Err(StoreError::EmptyEmbedding {
            identity: identity.to_string(),
        });
    }
    if embedding.as_slice().iter().any(|v| !v.is_finite()) {
        return Err(StoreError::NonFinite {
            identity: identity.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FaceStore {
    path: PathBuf,
    entries: BTreeMap<String, Embedding>,
}

impl FaceStore {
    /// An empty store that will persist to `path`. Nothing is written yet.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Read the database at `path`. A missing file is an empty database.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no database at {}, starting fresh", path.display());
                return Ok(Self::empty(path));
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        let entries: BTreeMap<String, Embedding> = match serde_json::from_slice(&raw) {
            Ok(entries) => entries,
            Err(source) => return Err(StoreError::Parse { path, source }),
        };
        let store = Self { path, entries };
        store.check_entries()?;

        log::info!("loaded database with {} identities", store.len());
        Ok(store)
    }

    fn check_entries(&self) -> Result<(), StoreError> {
        let expected = self.dimension();
        for (identity, embedding) in &self.entries {
            check_values(identity, embedding)?;
            if let Some(expected) = expected.filter(|&d| d != embedding.len()) {
                return Err(StoreError::Dimension {
                    identity: identity.clone(),
                    expected,
                    found: embedding.len(),
                });
            }
        }
        Ok(())
    }

    /// Rewrite the whole file. The new content goes to a sibling temp file
    /// first and is renamed into place.
    pub fn save(&self) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut data = serde_json::to_vec_pretty(&self.entries)?;
        data.push(b'\n');

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = std::fs::File::create(&tmp).map_err(write_err)?;
        file.write_all(&data).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;

        log::info!("database saved ({} identities)", self.len());
        Ok(())
    }

    /// Add or overwrite one identity and persist immediately. On any error
    /// neither memory nor disk change.
    pub fn insert_or_replace(
        &mut self,
        identity: &str,
        embedding: Embedding,
    ) -> Result<Inserted, StoreError> {
        if identity.is_empty() {
            return Err(StoreError::EmptyIdentity);
        }
        check_values(identity, &embedding)?;

        // an overwritten sole entry may change dimensionality
        let expected = match self.entries.len() {
            1 if self.entries.contains_key(identity) => None,
            _ => self.dimension(),
        };
        if let Some(expected) = expected.filter(|&d| d != embedding.len()) {
            return Err(StoreError::Dimension {
                identity: identity.to_string(),
                expected,
                found: embedding.len(),
            });
        }

        let previous = self.entries.insert(identity.to_string(), embedding);
        if let Err(e) = self.save() {
            match previous {
                Some(old) => self.entries.insert(identity.to_string(), old),
                None => self.entries.remove(identity),
            };
            return Err(e);
        }

        Ok(match previous {
            Some(old) => Inserted::Replaced(old),
            None => Inserted::New,
        })
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Embedding)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, identity: &str) -> Option<&Embedding> {
        self.entries.get(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimensionality shared by every stored embedding.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.values().next().map(Embedding::len)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
