//! Persistent saves store
//!
//! A small JSON file holds everything that must survive a restart: the
//! whitelist of users whose messages are read aloud, per-user voice
//! overrides, and the guild -> bound-text-channel map. The silenced set is
//! session-only state and is never written to disk.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{HablaError, Result};

/// On-disk shape of the saves file
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SavesData {
    /// Display names whose messages are spoken
    #[serde(default)]
    pub target_users: BTreeSet<String>,
    /// Per-user voice short-name overrides
    #[serde(default)]
    pub user_voices: HashMap<String, String>,
    /// Guild id -> text channel id the bot listens on
    #[serde(default)]
    pub voice_text_channels: HashMap<u64, u64>,
}

/// Thread-safe store over the saves file plus session-only silencing state
#[derive(Debug)]
pub struct SavesStore {
    path: PathBuf,
    data: Mutex<SavesData>,
    silenced: Mutex<HashSet<String>>,
}

impl SavesStore {
    /// Load the store from `path`. A missing file yields an empty store
    /// seeded with `seed_targets`; a corrupt file is an error.
    pub fn load(path: impl Into<PathBuf>, seed_targets: &[String]) -> Result<Self> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let data: SavesData = serde_json::from_str(&raw)?;
                info!(
                    path = %path.display(),
                    targets = data.target_users.len(),
                    bindings = data.voice_text_channels.len(),
                    "Loaded saves file"
                );
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No saves file yet, starting fresh");
                SavesData {
                    target_users: seed_targets.iter().cloned().collect(),
                    ..SavesData::default()
                }
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
            silenced: Mutex::new(HashSet::new()),
        })
    }

    /// Write the current state back to disk
    pub fn save(&self) -> Result<()> {
        let json = {
            let data = self.lock_data()?;
            serde_json::to_string_pretty(&*data)?
        };
        std::fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), "Saved state");
        Ok(())
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    // -- whitelist -----------------------------------------------------

    pub fn is_target(&self, user: &str) -> bool {
        self.lock_data()
            .map(|d| d.target_users.contains(user))
            .unwrap_or(false)
    }

    /// Add `user` to the whitelist. Returns false if already present.
    pub fn add_target(&self, user: &str) -> Result<bool> {
        Ok(self.lock_data()?.target_users.insert(user.to_string()))
    }

    /// Remove `user` from the whitelist. Returns false if absent.
    pub fn remove_target(&self, user: &str) -> Result<bool> {
        Ok(self.lock_data()?.target_users.remove(user))
    }

    pub fn target_users(&self) -> Vec<String> {
        self.lock_data()
            .map(|d| d.target_users.iter().cloned().collect())
            .unwrap_or_default()
    }

    // -- voice overrides -----------------------------------------------

    pub fn voice_for(&self, user: &str) -> Option<String> {
        self.lock_data().ok()?.user_voices.get(user).cloned()
    }

    pub fn set_voice(&self, user: &str, voice: &str) -> Result<()> {
        self.lock_data()?
            .user_voices
            .insert(user.to_string(), voice.to_string());
        Ok(())
    }

    pub fn user_voices(&self) -> Vec<(String, String)> {
        self.lock_data()
            .map(|d| {
                let mut pairs: Vec<_> = d
                    .user_voices
                    .iter()
                    .map(|(u, v)| (u.clone(), v.clone()))
                    .collect();
                pairs.sort();
                pairs
            })
            .unwrap_or_default()
    }

    // -- text channel bindings -----------------------------------------

    pub fn binding(&self, guild_id: u64) -> Option<u64> {
        self.lock_data()
            .ok()?
            .voice_text_channels
            .get(&guild_id)
            .copied()
    }

    pub fn set_binding(&self, guild_id: u64, channel_id: u64) -> Result<()> {
        self.lock_data()?
            .voice_text_channels
            .insert(guild_id, channel_id);
        Ok(())
    }

    pub fn clear_binding(&self, guild_id: u64) -> Result<()> {
        self.lock_data()?.voice_text_channels.remove(&guild_id);
        Ok(())
    }

    pub fn bindings(&self) -> Vec<(u64, u64)> {
        self.lock_data()
            .map(|d| d.voice_text_channels.iter().map(|(g, c)| (*g, *c)).collect())
            .unwrap_or_default()
    }

    // -- silenced set (session-only) -----------------------------------

    pub fn is_silenced(&self, user: &str) -> bool {
        self.silenced
            .lock()
            .map(|s| s.contains(user))
            .unwrap_or(false)
    }

    /// Returns false if the user was already silenced.
    pub fn silence(&self, user: &str) -> bool {
        match self.silenced.lock() {
            Ok(mut s) => s.insert(user.to_string()),
            Err(_) => {
                warn!("silenced set lock poisoned");
                false
            }
        }
    }

    /// Returns false if the user was not silenced.
    pub fn unsilence(&self, user: &str) -> bool {
        match self.silenced.lock() {
            Ok(mut s) => s.remove(user),
            Err(_) => {
                warn!("silenced set lock poisoned");
                false
            }
        }
    }

    fn lock_data(&self) -> Result<std::sync::MutexGuard<'_, SavesData>> {
        self.data
            .lock()
            .map_err(|_| HablaError::storage("saves store lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_starts_fresh_with_seeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saves.json");
        let seeds = vec!["Alice".to_string(), "Bob".to_string()];
        let store = SavesStore::load(&path, &seeds).unwrap();
        assert!(store.is_target("Alice"));
        assert!(store.is_target("Bob"));
        assert!(!store.is_target("Mallory"));
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saves.json");

        let store = SavesStore::load(&path, &[]).unwrap();
        store.add_target("Alice").unwrap();
        store.set_voice("Alice", "es-MX-DaliaNeural").unwrap();
        store.set_binding(1001, 2002).unwrap();
        store.save().unwrap();

        let reloaded = SavesStore::load(&path, &[]).unwrap();
        assert!(reloaded.is_target("Alice"));
        assert_eq!(
            reloaded.voice_for("Alice").as_deref(),
            Some("es-MX-DaliaNeural")
        );
        assert_eq!(reloaded.binding(1001), Some(2002));
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = tempdir().unwrap();
        let store = SavesStore::load(dir.path().join("saves.json"), &[]).unwrap();

        assert!(store.add_target("Alice").unwrap());
        assert!(!store.add_target("Alice").unwrap());
        assert!(store.remove_target("Alice").unwrap());
        assert!(!store.remove_target("Alice").unwrap());

        store.set_binding(1, 2).unwrap();
        store.clear_binding(1).unwrap();
        assert_eq!(store.binding(1), None);
    }

    #[test]
    fn test_silenced_set_not_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saves.json");

        let store = SavesStore::load(&path, &[]).unwrap();
        assert!(store.silence("Alice"));
        assert!(store.is_silenced("Alice"));
        store.save().unwrap();

        let reloaded = SavesStore::load(&path, &[]).unwrap();
        assert!(!reloaded.is_silenced("Alice"));

        assert!(store.unsilence("Alice"));
        assert!(!store.is_silenced("Alice"));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saves.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(SavesStore::load(&path, &[]).is_err());
    }
}
