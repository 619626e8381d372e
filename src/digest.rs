//! Content addressing for file sets.
//!
//! A [`Snapshot`] is an immutable mapping from relative path to byte content,
//! identified by a single blake3 [`Digest`] over its (path, content) pairs.
//! Snapshots are shared through a [`ContentStore`], an append-only map keyed
//! by digest that is safe to read and write from many formatting runs at once.

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A blake3 content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Digest of a single byte string.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hex form.
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl From<blake3::Hash> for Digest {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Immutable set of files with an aggregate digest.
///
/// Paths are relative and `/`-separated. Iteration order is byte-wise sorted
/// by path, which is also the order the digest is computed in.
#[derive(Clone, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<String, Arc<[u8]>>,
    digest: Digest,
}

impl Snapshot {
    /// Build a snapshot, copying each file's content.
    ///
    /// Later duplicates of the same path replace earlier ones.
    pub fn new<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: AsRef<[u8]>,
    {
        Self::from_shared(
            files
                .into_iter()
                .map(|(path, content)| (path.into(), Arc::from(content.as_ref()))),
        )
    }

    /// Build a snapshot from already shared content without copying.
    pub fn from_shared<I>(files: I) -> Self
    where
        I: IntoIterator<Item = (String, Arc<[u8]>)>,
    {
        let files: BTreeMap<String, Arc<[u8]>> = files.into_iter().collect();
        let digest = Self::compute_digest(&files);
        Self { files, digest }
    }

    pub fn empty() -> Self {
        Self::from_shared(std::iter::empty())
    }

    // Each path and body is length-prefixed so that no two distinct file sets
    // can feed the hasher the same byte stream.
    fn compute_digest(files: &BTreeMap<String, Arc<[u8]>>) -> Digest {
        let mut hasher = blake3::Hasher::new();
        for (path, content) in files {
            hasher.update(&(path.len() as u64).to_le_bytes());
            hasher.update(path.as_bytes());
            hasher.update(&(content.len() as u64).to_le_bytes());
            hasher.update(content);
        }
        hasher.finalize().into()
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(|content| content.as_ref())
    }

    /// Shared handle to a file's content.
    pub fn get_shared(&self, path: &str) -> Option<Arc<[u8]>> {
        self.files.get(path).cloned()
    }

    /// Paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(path, content)| (path.as_str(), content.as_ref()))
    }

    /// Paths whose content differs between `self` and `other`, including
    /// paths present on only one side.
    pub fn changed_paths(&self, other: &Snapshot) -> Vec<String> {
        if self.digest == other.digest {
            return Vec::new();
        }
        let all: BTreeSet<&String> = self.files.keys().chain(other.files.keys()).collect();
        all.into_iter()
            .filter(|path| self.files.get(*path) != other.files.get(*path))
            .cloned()
            .collect()
    }

    /// Overlay `other` on top of `self`; files in `other` win.
    pub fn merge(&self, other: &Snapshot) -> Snapshot {
        let mut files = self.files.clone();
        files.extend(other.files.iter().map(|(path, content)| (path.clone(), content.clone())));
        Self::from_shared(files)
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("digest", &self.digest)
            .field("paths", &self.files.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Shared, append-only snapshot store keyed by digest.
///
/// Cloning is cheap and every clone sees the same entries. Existing entries
/// are never replaced: storing a snapshot whose digest is already present is
/// a no-op.
#[derive(Clone, Default)]
pub struct ContentStore {
    snapshots: Arc<RwLock<HashMap<Digest, Snapshot>>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot and return its digest.
    pub fn put(&self, snapshot: Snapshot) -> Digest {
        let digest = snapshot.digest();
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        snapshots.entry(digest).or_insert(snapshot);
        digest
    }

    pub fn get(&self, digest: &Digest) -> Option<Snapshot> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        snapshots.get(digest).cloned()
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        snapshots.contains_key(digest)
    }

    pub fn len(&self) -> usize {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStore").field("entries", &self.len()).finish()
    }
}
