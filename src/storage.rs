use crate::config::atomic_rename;
use crate::model::PetState;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

const SAVE_FILE: &str = "save.json";
const BACKUP_FILE: &str = "save.json.bak";
const TMP_FILE: &str = "save.json.tmp";

/// Durable home of the pet. One primary file plus a single-slot backup
/// holding the version before the last save.
pub(crate) struct StateStore {
    save_path: PathBuf,
    backup_path: PathBuf,
    tmp_path: PathBuf,
    // Generation of the newest state on disk. Holding it also means only one
    // save shuffles files at a time.
    written: Mutex<u64>,
}

/// The pet as it was at one moment. Generations only grow, so a save that
/// was queued earlier can be recognised when it lands late.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Snapshot {
    pub(crate) generation: u64,
    pub(crate) state: PetState,
}

#[derive(Clone, Debug)]
pub(crate) struct SaveInfo {
    pub(crate) file_size: u64,
    pub(crate) last_modified: Option<DateTime<Local>>,
    pub(crate) created_at: DateTime<Local>,
    pub(crate) total_play_time_s: f64,
    pub(crate) events_count: usize,
    pub(crate) chat_count: usize,
}

impl StateStore {
    pub(crate) fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create save directory {}", dir.display()))?;
        Ok(Self {
            save_path: dir.join(SAVE_FILE),
            backup_path: dir.join(BACKUP_FILE),
            tmp_path: dir.join(TMP_FILE),
            written: Mutex::new(0),
        })
    }

    pub(crate) fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub(crate) fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Rotate the current primary into the backup slot, then write the new
    /// primary through a temp file. On failure the backup is moved back.
    /// A snapshot no newer than what is already on disk is dropped.
    pub(crate) fn save(&self, snapshot: &Snapshot) -> bool {
        let mut written = self.written.lock().unwrap_or_else(|p| p.into_inner());
        if snapshot.generation <= *written {
            log::debug!(
                "skipping stale save (generation {} <= {})",
                snapshot.generation,
                *written
            );
            return true;
        }
        let state = &snapshot.state;

        let rotated = if self.save_path.exists() {
            if let Err(e) = atomic_rename(&self.save_path, &self.backup_path) {
                log::warn!("failed to save game state: {e:#}");
                return false;
            }
            true
        } else {
            false
        };

        match self.write_primary(state) {
            Ok(()) => {
                *written = snapshot.generation;
                log::debug!("game saved to {}", self.save_path.display());
                true
            }
            Err(e) => {
                log::warn!("failed to save game state: {e:#}");
                let _ = fs::remove_file(&self.tmp_path);
                if rotated {
                    if let Err(e) = atomic_rename(&self.backup_path, &self.save_path) {
                        log::error!("could not restore backup after failed save: {e:#}");
                    }
                }
                false
            }
        }
    }

    fn write_primary(&self, state: &PetState) -> Result<()> {
        let data = serde_json::to_vec_pretty(state).context("serialize state")?;
        fs::write(&self.tmp_path, data)
            .with_context(|| format!("writing {}", self.tmp_path.display()))?;
        atomic_rename(&self.tmp_path, &self.save_path)
    }

    /// Primary first, then the backup. A good backup is promoted to primary.
    /// `None` means start fresh.
    pub(crate) fn load(&self) -> Option<PetState> {
        if self.save_path.exists() {
            match read_state(&self.save_path) {
                Ok(state) => return Some(state),
                Err(e) => log::warn!("failed to load {}: {e:#}", self.save_path.display()),
            }
        }

        if self.backup_path.exists() {
            log::warn!("main save unusable, loading from backup");
            match read_state(&self.backup_path) {
                Ok(state) => {
                    if let Err(e) = atomic_rename(&self.backup_path, &self.save_path) {
                        log::warn!("could not promote backup: {e:#}");
                    }
                    return Some(state);
                }
                Err(e) => log::warn!("failed to load {}: {e:#}", self.backup_path.display()),
            }
        }

        log::info!("no save file found, starting new game");
        None
    }

    pub(crate) fn info(&self) -> Option<SaveInfo> {
        let meta = fs::metadata(&self.save_path).ok()?;
        let state = read_state(&self.save_path).ok()?;
        Some(SaveInfo {
            file_size: meta.len(),
            last_modified: meta.modified().ok().map(DateTime::<Local>::from),
            created_at: state.created_at.with_timezone(&Local),
            total_play_time_s: state.total_play_time_s,
            events_count: state.events.len(),
            chat_count: state.chat_history.len(),
        })
    }

    /// Delete primary and backup. Returns the files that were removed.
    pub(crate) fn reset(&self) -> Result<Vec<PathBuf>> {
        let _guard = self.written.lock().unwrap_or_else(|p| p.into_inner());
        let mut removed = Vec::new();
        for path in [&self.save_path, &self.backup_path] {
            if path.exists() {
                fs::remove_file(path).with_context(|| format!("removing {}", path.display()))?;
                removed.push(path.clone());
            }
        }
        Ok(removed)
    }
}

fn read_state(path: &Path) -> Result<PetState> {
    let text = fs::read_to_string(path).context("read failed")?;
    serde_json::from_str(&text).context("parse failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventKind, Sender, Stat};
    use crate::testutil::scratch_dir;
    use chrono::{TimeZone, Utc};

    fn snap(generation: u64, state: PetState) -> Snapshot {
        Snapshot { generation, state }
    }

    fn sample_state(hunger: f64) -> PetState {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let mut st = PetState::new(t);
        st.stats.set(Stat::Hunger, hunger);
        st.stats.sleeping = true;
        st.add_event(
            EventKind::Command,
            "Fed Kibble",
            Some(serde_json::json!({"item": "kibble"})),
            t,
        );
        st.add_chat_message(Sender::User, "hello", t);
        st.add_notification("Fed Kibble");
        st.mark_used("food_kibble".into(), t);
        st.total_play_time_s = 42.5;
        st
    }

    #[test]
    fn fresh_directory_loads_nothing() {
        let store = StateStore::new(&scratch_dir("store-fresh")).unwrap();
        assert!(store.load().is_none());
        assert!(store.info().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = StateStore::new(&scratch_dir("store-roundtrip")).unwrap();
        let st = sample_state(33.0);
        assert!(store.save(&snap(1, st.clone())));
        let loaded = store.load().unwrap();
        assert_eq!(loaded, st);
        assert_eq!(loaded.chat_history[0].timestamp, st.chat_history[0].timestamp);
    }

    #[test]
    fn timestamps_are_canonical_strings_on_disk() {
        let store = StateStore::new(&scratch_dir("store-format")).unwrap();
        assert!(store.save(&snap(2, sample_state(10.0))));
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.save_path()).unwrap()).unwrap();
        assert_eq!(raw["last_tick"], "2024-05-01T08:30:00.123456789Z");
        assert_eq!(
            raw["item_cooldowns"]["food_kibble"],
            "2024-05-01T08:30:00.123456789Z"
        );
    }

    #[test]
    fn second_save_keeps_previous_as_backup() {
        let store = StateStore::new(&scratch_dir("store-backup")).unwrap();
        assert!(store.save(&snap(3, sample_state(10.0))));
        assert!(!store.backup_path().exists());
        assert!(store.save(&snap(4, sample_state(20.0))));
        let backup = read_state(store.backup_path()).unwrap();
        assert_eq!(backup.stats.hunger(), 10.0);
        assert_eq!(store.load().unwrap().stats.hunger(), 20.0);
    }

    #[test]
    fn corrupt_primary_recovers_from_backup_and_promotes_it() {
        let store = StateStore::new(&scratch_dir("store-corrupt")).unwrap();
        let older = sample_state(10.0);
        assert!(store.save(&snap(5, older.clone())));
        assert!(store.save(&snap(6, sample_state(20.0))));
        fs::write(store.save_path(), "{ truncated").unwrap();

        let first = store.load().unwrap();
        assert_eq!(first, older);
        assert!(!store.backup_path().exists());

        let second = store.load().unwrap();
        assert_eq!(second, older);
    }

    #[test]
    fn both_unreadable_means_fresh_start() {
        let store = StateStore::new(&scratch_dir("store-both-bad")).unwrap();
        fs::write(store.save_path(), "garbage").unwrap();
        fs::write(store.backup_path(), "").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn failed_write_restores_the_backup() {
        let dir = scratch_dir("store-rollback");
        let store = StateStore::new(&dir).unwrap();
        let st = sample_state(10.0);
        assert!(store.save(&snap(7, st.clone())));
        // A directory squatting on the temp path makes the write fail.
        fs::create_dir_all(dir.join(TMP_FILE)).unwrap();
        assert!(!store.save(&snap(8, sample_state(99.0))));
        assert_eq!(store.load().unwrap(), st);
    }

    #[test]
    fn late_older_snapshot_does_not_overwrite_newer_one() {
        let store = StateStore::new(&scratch_dir("store-stale")).unwrap();
        assert!(store.save(&snap(1, sample_state(10.0))));
        assert!(store.save(&snap(3, sample_state(30.0))));
        // generation 2 was taken before 3 but reaches the store after it
        assert!(store.save(&snap(2, sample_state(20.0))));
        assert_eq!(store.load().unwrap().stats.hunger(), 30.0);
        let backup = read_state(store.backup_path()).unwrap();
        assert_eq!(backup.stats.hunger(), 10.0);
    }

    #[test]
    fn failed_save_does_not_advance_the_generation() {
        let dir = scratch_dir("store-retry");
        let store = StateStore::new(&dir).unwrap();
        fs::create_dir_all(dir.join(TMP_FILE)).unwrap();
        assert!(!store.save(&snap(5, sample_state(50.0))));
        fs::remove_dir_all(dir.join(TMP_FILE)).unwrap();
        assert!(store.save(&snap(4, sample_state(40.0))));
        assert_eq!(store.load().unwrap().stats.hunger(), 40.0);
    }

    #[test]
    fn reset_removes_both_files() {
        let store = StateStore::new(&scratch_dir("store-reset")).unwrap();
        assert!(store.save(&snap(9, sample_state(10.0))));
        assert!(store.save(&snap(10, sample_state(20.0))));
        assert_eq!(store.reset().unwrap().len(), 2);
        assert!(store.load().is_none());
    }

    #[test]
    fn info_summarises_the_primary() {
        let store = StateStore::new(&scratch_dir("store-info")).unwrap();
        assert!(store.save(&snap(11, sample_state(10.0))));
        let info = store.info().unwrap();
        assert!(info.file_size > 0);
        assert_eq!(info.events_count, 1);
        assert_eq!(info.chat_count, 1);
        assert_eq!(info.total_play_time_s, 42.5);
    }
}
