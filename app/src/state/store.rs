//! Match store: one JSON document per match under a directory.
//!
//! `MatchStore` is the read handle shared by everyone; `MatchStoreWriter`
//! is held only by the `SystemActor`, so every mutation is serialized
//! through storage commands on the bus.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{TimeDelta, Utc};
use uuid::Uuid;

use sayg::{DeleteResult, ScoreAsYouGo, UpsertResult};

struct StoreInner {
    dir: PathBuf,
    matches: RwLock<HashMap<Uuid, ScoreAsYouGo>>,
}

/// Read-only view of stored matches.
#[derive(Clone)]
pub struct MatchStore {
    inner: Arc<StoreInner>,
}

/// Write handle for the match store.
pub struct MatchStoreWriter {
    inner: Arc<StoreInner>,
}

fn document_path(dir: &Path, id: Uuid) -> PathBuf {
    dir.join(format!("{id}.json"))
}

/// Read every `*.json` document in `dir`. Unreadable files are skipped.
fn load_dir(dir: &Path) -> io::Result<HashMap<Uuid, ScoreAsYouGo>> {
    let mut matches = HashMap::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| {
                serde_json::from_str::<ScoreAsYouGo>(&text).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(sayg) => match sayg.id {
                Some(id) => {
                    matches.insert(id, sayg);
                }
                None => tracing::warn!("store: {} has no id, skipping", path.display()),
            },
            Err(e) => tracing::warn!("store: failed to read {}: {e}", path.display()),
        }
    }
    Ok(matches)
}

impl MatchStore {
    /// Open (creating if needed) the store at `dir`.
    pub fn open(dir: PathBuf) -> io::Result<(Self, MatchStoreWriter)> {
        std::fs::create_dir_all(&dir)?;
        let matches = load_dir(&dir)?;
        tracing::info!("store: {} matches in {}", matches.len(), dir.display());
        let inner = Arc::new(StoreInner {
            dir,
            matches: RwLock::new(matches),
        });
        Ok((
            Self {
                inner: Arc::clone(&inner),
            },
            MatchStoreWriter { inner },
        ))
    }

    pub fn get(&self, id: Uuid) -> Option<ScoreAsYouGo> {
        self.inner
            .matches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.inner
            .matches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl MatchStoreWriter {
    /// Insert or replace a match. Invalid documents are refused without
    /// touching disk. A document without an id is given a fresh one.
    ///
    /// Replacing a stored match requires the `last_updated` it was read
    /// with; a write from an older copy is refused as a conflict.
    pub fn upsert(&self, data: &ScoreAsYouGo) -> io::Result<UpsertResult> {
        let errors = data.validation_errors();
        if !errors.is_empty() {
            tracing::debug!("store: refused upsert: {}", errors.join("; "));
            return Ok(UpsertResult::failed(errors));
        }

        let mut matches = self
            .inner
            .matches
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(id) = data.id
            && let Some(current) = matches.get(&id)
            && current.last_updated != data.last_updated
        {
            let seen = data
                .last_updated
                .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
            let latest = current
                .last_updated
                .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
            tracing::debug!("store: stale write for {id} (seen {seen}, stored {latest})");
            return Ok(UpsertResult::failed(vec![format!(
                "match {id} was updated at {latest}; this copy was last saved at {seen}"
            )]));
        }

        let mut stored = data.clone();
        let id = *stored.id.get_or_insert_with(Uuid::new_v4);
        let now = Utc::now();
        stored.last_updated = Some(match data.last_updated {
            Some(previous) if previous >= now => previous + TimeDelta::microseconds(1),
            _ => now,
        });

        let json = serde_json::to_string_pretty(&stored).map_err(io::Error::other)?;
        let path = document_path(&self.inner.dir, id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;

        matches.insert(id, stored.clone());
        tracing::debug!("store: saved {id}");
        Ok(UpsertResult::ok(stored))
    }

    pub fn delete(&self, id: Uuid) -> io::Result<DeleteResult> {
        let mut matches = self
            .inner
            .matches
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if !matches.contains_key(&id) {
            return Ok(DeleteResult::failed(vec![format!("no match with id {id}")]));
        }
        match std::fs::remove_file(document_path(&self.inner.dir, id)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        matches.remove(&id);
        tracing::debug!("store: deleted {id}");
        Ok(DeleteResult::ok(()))
    }
}

#[cfg(test)]
mod tests {
    use sayg::Side;

    use super::*;

    fn sample() -> ScoreAsYouGo {
        let mut sayg = ScoreAsYouGo::new("Alice", Some("Bob".into()), 3, 501);
        sayg.ensure_current_leg();
        sayg
    }

    #[test]
    fn upsert_allocates_an_id_and_stamps_the_time() {
        let dir = tempfile::tempdir().unwrap();
        let (store, writer) = MatchStore::open(dir.path().to_path_buf()).unwrap();

        let result = writer.upsert(&sample()).unwrap();
        assert!(result.success);
        let stored = result.result.unwrap();
        let id = stored.id.unwrap();
        assert!(stored.last_updated.is_some());
        assert_eq!(store.get(id), Some(stored));
        assert!(dir.path().join(format!("{id}.json")).exists());
    }

    #[test]
    fn upsert_keeps_an_existing_id() {
        let dir = tempfile::tempdir().unwrap();
        let (store, writer) = MatchStore::open(dir.path().to_path_buf()).unwrap();
        let mut sayg = sample();
        let id = Uuid::new_v4();
        sayg.id = Some(id);
        let mut sayg = writer.upsert(&sayg).unwrap().result.unwrap();
        sayg.your_name = "Alicia".into();
        assert!(writer.upsert(&sayg).unwrap().success);
        assert_eq!(store.count(), 1);
        assert_eq!(store.get(id).unwrap().your_name, "Alicia");
    }

    #[test]
    fn write_from_a_stale_copy_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (store, writer) = MatchStore::open(dir.path().to_path_buf()).unwrap();
        let first = writer.upsert(&sample()).unwrap().result.unwrap();
        let id = first.id.unwrap();

        let mut board_a = first.clone();
        board_a.your_name = "Alicia".into();
        let newer = writer.upsert(&board_a).unwrap().result.unwrap();

        let mut board_b = first;
        board_b.opponent_name = Some("Robert".into());
        let result = writer.upsert(&board_b).unwrap();
        assert!(!result.success);
        assert!(result.errors[0].contains(&id.to_string()));
        assert_eq!(store.get(id), Some(newer.clone()));

        // A copy that never saw the stored match cannot overwrite it either.
        let mut fresh = sample();
        fresh.id = Some(id);
        assert!(!writer.upsert(&fresh).unwrap().success);

        let mut board_b = newer;
        board_b.opponent_name = Some("Robert".into());
        assert!(writer.upsert(&board_b).unwrap().success);
        assert_eq!(store.get(id).unwrap().your_name, "Alicia");
    }

    #[test]
    fn invalid_documents_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (store, writer) = MatchStore::open(dir.path().to_path_buf()).unwrap();
        let mut sayg = sample();
        sayg.number_of_legs = 0;
        let result = writer.upsert(&sayg).unwrap();
        assert!(!result.success);
        assert!(!result.errors.is_empty());

        let mut sayg = sample();
        sayg.legs.get_mut(&0).unwrap().away = None;
        assert!(!writer.upsert(&sayg).unwrap().success);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn reopening_reads_saved_matches() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let (_, writer) = MatchStore::open(dir.path().to_path_buf()).unwrap();
            let mut sayg = sample();
            sayg.legs
                .get_mut(&0)
                .unwrap()
                .choose_player_sequence(Side::Home, "Alice", "Bob")
                .unwrap();
            writer.upsert(&sayg).unwrap().result.unwrap().id.unwrap()
        };
        std::fs::write(dir.path().join("junk.json"), "{").unwrap();

        let (store, _) = MatchStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.count(), 1);
        let leg = &store.get(id).unwrap().legs[&0];
        assert_eq!(leg.current_throw, Some(Side::Home));
    }

    #[test]
    fn delete_unknown_id_fails_softly() {
        let dir = tempfile::tempdir().unwrap();
        let (store, writer) = MatchStore::open(dir.path().to_path_buf()).unwrap();
        assert!(!writer.delete(Uuid::new_v4()).unwrap().success);

        let id = writer.upsert(&sample()).unwrap().result.unwrap().id.unwrap();
        assert!(writer.delete(id).unwrap().success);
        assert_eq!(store.get(id), None);
        assert!(!dir.path().join(format!("{id}.json")).exists());
    }
}
