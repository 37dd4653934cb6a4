/*!
The merchant's record of revoked wallets.

Every revocation secret the merchant accepts is kept here, keyed by its lock. The record is a
write-once set: a lock can be inserted once and never removed or replaced. It is consulted before
a pay token is issued and when disputing a close.
*/
use crate::{revlock::*, Error};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{Cursor, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

/// Storage for accepted revocation secrets.
pub trait RevocationRecord {
    /// Whether the lock has been revoked.
    fn contains(&self, lock: &RevocationLock) -> bool;

    /// Add a revocation secret to the record.
    ///
    /// Fails with [`Error::RevocationConflict`] if its lock is already present. The secret is
    /// durable once this returns `Ok`.
    fn insert(&mut self, secret: RevocationSecret) -> Result<(), Error>;

    /// Look up the secret for a revoked lock.
    fn get(&self, lock: &RevocationLock) -> Option<&RevocationSecret>;
}

/// A revocation record held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<RevocationSecret>", into = "Vec<RevocationSecret>")]
pub struct MemoryRevocationRecord {
    revoked: HashMap<RevocationLock, RevocationSecret>,
}

impl From<Vec<RevocationSecret>> for MemoryRevocationRecord {
    fn from(secrets: Vec<RevocationSecret>) -> Self {
        Self {
            revoked: secrets
                .into_iter()
                .map(|secret| (secret.revocation_lock(), secret))
                .collect(),
        }
    }
}

impl From<MemoryRevocationRecord> for Vec<RevocationSecret> {
    fn from(record: MemoryRevocationRecord) -> Self {
        record.revoked.into_iter().map(|(_, secret)| secret).collect()
    }
}

impl MemoryRevocationRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of revoked locks.
    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    /// Whether nothing has been revoked yet.
    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

impl RevocationRecord for MemoryRevocationRecord {
    fn contains(&self, lock: &RevocationLock) -> bool {
        self.revoked.contains_key(lock)
    }

    fn insert(&mut self, secret: RevocationSecret) -> Result<(), Error> {
        let lock = secret.revocation_lock();
        if self.contains(&lock) {
            return Err(Error::RevocationConflict("revocation lock already recorded"));
        }
        let _ = self.revoked.insert(lock, secret);
        Ok(())
    }

    fn get(&self, lock: &RevocationLock) -> Option<&RevocationSecret> {
        self.revoked.get(lock)
    }
}

/// A revocation record backed by an append-only file.
///
/// Each secret is appended as one bincode entry and synced to disk before
/// [`RevocationRecord::insert`] returns. Opening the file replays every entry.
#[derive(Debug)]
pub struct FileRevocationRecord {
    path: PathBuf,
    file: File,
    revoked: MemoryRevocationRecord,
}

impl FileRevocationRecord {
    /// Open the record at `path`, creating it if it does not exist.
    ///
    /// A partially written entry at the end of the file, left by an interrupted insert, is
    /// truncated away so that later entries are appended on an entry boundary.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let mut revoked = MemoryRevocationRecord::new();
        let mut reader = Cursor::new(&contents[..]);
        let mut valid_len = 0;
        while valid_len < contents.len() as u64 {
            match bincode::deserialize_from::<_, RevocationSecret>(&mut reader) {
                Ok(secret) => {
                    // A lock appearing twice means the file was written by something else.
                    revoked.insert(secret)?;
                    valid_len = reader.position();
                }
                Err(e) => match *e {
                    bincode::ErrorKind::Io(ref io) if io.kind() == ErrorKind::UnexpectedEof => {
                        tracing::warn!(
                            path = %path.display(),
                            kept = valid_len,
                            dropped = contents.len() as u64 - valid_len,
                            "truncating partial revocation entry"
                        );
                        file.set_len(valid_len)?;
                        file.sync_data()?;
                        break;
                    }
                    _ => return Err(Error::Storage(e)),
                },
            }
        }

        tracing::debug!(
            path = %path.display(),
            entries = revoked.len(),
            "opened revocation record"
        );
        Ok(Self {
            path,
            file,
            revoked,
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of revoked locks.
    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    /// Whether nothing has been revoked yet.
    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

impl RevocationRecord for FileRevocationRecord {
    fn contains(&self, lock: &RevocationLock) -> bool {
        self.revoked.contains(lock)
    }

    fn insert(&mut self, secret: RevocationSecret) -> Result<(), Error> {
        if self.contains(&secret.revocation_lock()) {
            return Err(Error::RevocationConflict("revocation lock already recorded"));
        }
        let entry = bincode::serialize(&secret)?;
        self.file.write_all(&entry)?;
        self.file.sync_data()?;
        self.revoked.insert(secret)
    }

    fn get(&self, lock: &RevocationLock) -> Option<&RevocationSecret> {
        self.revoked.get(lock)
    }
}
