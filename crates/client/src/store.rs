// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session persistence: a small key/value store plus the typed view over it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::credential::{Credential, Identity};

pub const TOKEN_KEY: &str = "token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

/// Durable string key/value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Apply several writes at once. `None` deletes the key.
    ///
    /// Implementations that can do so apply the whole batch atomically.
    fn set_many(&self, entries: &[(&str, Option<&str>)]) -> anyhow::Result<()> {
        for (key, value) in entries {
            match value {
                Some(v) => self.set(key, v)?,
                None => self.delete(key)?,
            }
        }
        Ok(())
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, Option<&str>)]) -> anyhow::Result<()> {
        let mut map = self.entries.write();
        for (key, value) in entries {
            match value {
                Some(v) => map.insert((*key).to_owned(), (*v).to_owned()),
                None => map.remove(*key),
            };
        }
        Ok(())
    }
}

/// JSON-object store on disk, rewritten atomically on every change.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> anyhow::Result<HashMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> anyhow::Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.load()?;
        f(&mut map);
        save_atomic(&self.path, &map)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.update(|map| {
            map.insert(key.to_owned(), value.to_owned());
        })
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update(|map| {
            map.remove(key);
        })
    }

    fn set_many(&self, entries: &[(&str, Option<&str>)]) -> anyhow::Result<()> {
        self.update(|map| {
            for (key, value) in entries {
                match value {
                    Some(v) => map.insert((*key).to_owned(), (*v).to_owned()),
                    None => map.remove(*key),
                };
            }
        })
    }
}

/// Write `map` as JSON to `path` via a unique temp file and a rename.
///
/// The temp name carries the PID and a counter so concurrent writers never
/// share a `.tmp` file.
fn save_atomic(path: &Path, map: &HashMap<String, String>) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(map)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Typed access to the credential, refresh token and identity.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn KeyValueStore>,
}

impl Session {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn credential(&self) -> anyhow::Result<Option<Credential>> {
        match self.store.get(TOKEN_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn identity(&self) -> anyhow::Result<Option<Identity>> {
        match self.store.get(USER_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn refresh_token(&self) -> anyhow::Result<Option<String>> {
        self.store.get(REFRESH_TOKEN_KEY)
    }

    /// Replace the credential and identity in one write.
    ///
    /// A `None` refresh token keeps whatever refresh token is already stored.
    pub(crate) fn establish(
        &self,
        credential: &Credential,
        identity: &Identity,
        refresh_token: Option<&str>,
    ) -> anyhow::Result<()> {
        let token = serde_json::to_string(credential)?;
        let user = serde_json::to_string(identity)?;
        let mut entries = vec![(TOKEN_KEY, Some(token.as_str())), (USER_KEY, Some(user.as_str()))];
        if let Some(refresh) = refresh_token {
            entries.push((REFRESH_TOKEN_KEY, Some(refresh)));
        }
        self.store.set_many(&entries)
    }

    /// Remove every session key. Clearing an empty session is a no-op.
    pub fn clear(&self) -> anyhow::Result<()> {
        self.store.set_many(&[(TOKEN_KEY, None), (REFRESH_TOKEN_KEY, None), (USER_KEY, None)])
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
