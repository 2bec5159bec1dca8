//! Content-addressed block storage
//!
//! Blocks are stored as their canonical encoding, keyed by identity hash.
//! Keys are write-once: inserting an existing key fails rather than
//! replacing the stored bytes.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::StoreError;
use crate::types::Hash;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Key-value store for encoded blocks
pub trait BlockStore {
    /// Store `bytes` under `hash`; fails with [`StoreError::DuplicateKey`] if present
    fn insert(&mut self, hash: &Hash, bytes: &[u8]) -> StoreResult<()>;

    /// Fetch the bytes stored under `hash`
    fn get(&self, hash: &Hash) -> StoreResult<Vec<u8>>;

    /// Delete `hash`; fails with [`StoreError::NotFound`] if absent
    fn remove(&mut self, hash: &Hash) -> StoreResult<()>;

    fn contains(&self, hash: &Hash) -> StoreResult<bool>;
}

/// In-memory store, for tests and ephemeral chains
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: HashMap<Hash, Vec<u8>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl BlockStore for MemoryBlockStore {
    fn insert(&mut self, hash: &Hash, bytes: &[u8]) -> StoreResult<()> {
        if self.blocks.contains_key(hash) {
            return Err(StoreError::DuplicateKey(*hash));
        }
        self.blocks.insert(*hash, bytes.to_vec());
        debug!(hash = %hex::encode(hash), size = bytes.len(), "stored block");
        Ok(())
    }

    fn get(&self, hash: &Hash) -> StoreResult<Vec<u8>> {
        self.blocks.get(hash).cloned().ok_or(StoreError::NotFound(*hash))
    }

    fn remove(&mut self, hash: &Hash) -> StoreResult<()> {
        self.blocks.remove(hash).ok_or(StoreError::NotFound(*hash))?;
        debug!(hash = %hex::encode(hash), "removed block");
        Ok(())
    }

    fn contains(&self, hash: &Hash) -> StoreResult<bool> {
        Ok(self.blocks.contains_key(hash))
    }
}

/// One file per block under a directory, named by the hex identity hash
#[derive(Debug, Clone)]
pub struct FileBlockStore {
    root: PathBuf,
}

impl FileBlockStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, hash: &Hash) -> PathBuf {
        self.root.join(hex::encode(hash))
    }
}

fn not_found_as(hash: &Hash, error: io::Error) -> StoreError {
    if error.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(*hash)
    } else {
        StoreError::Io(error)
    }
}

impl BlockStore for FileBlockStore {
    fn insert(&mut self, hash: &Hash, bytes: &[u8]) -> StoreResult<()> {
        let path = self.path_for(hash);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::DuplicateKey(*hash));
            }
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
            // Leave no partial block behind
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }
        debug!(path = %path.display(), size = bytes.len(), "stored block");
        Ok(())
    }

    fn get(&self, hash: &Hash) -> StoreResult<Vec<u8>> {
        fs::read(self.path_for(hash)).map_err(|e| not_found_as(hash, e))
    }

    fn remove(&mut self, hash: &Hash) -> StoreResult<()> {
        let path = self.path_for(hash);
        fs::remove_file(&path).map_err(|e| not_found_as(hash, e))?;
        debug!(path = %path.display(), "removed block");
        Ok(())
    }

    fn contains(&self, hash: &Hash) -> StoreResult<bool> {
        Ok(self.path_for(hash).try_exists()?)
    }
}
