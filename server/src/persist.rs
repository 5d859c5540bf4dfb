//! Character snapshot persistence.
//!
//! Records are bincode-encoded [`CharacterRecord`]s, one file per account,
//! written temp-file-then-rename so a crash mid-write never corrupts a
//! save. Periodic save failures are logged and swallowed; only shutdown
//! treats them as worth surfacing.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use dusk_core::error::EngineError;
use dusk_core::records::{CharacterRecord, CHARACTER_RECORD_VERSION};

use crate::world::{CharacterId, World};

fn record_path(dir: &Path, username: &str) -> PathBuf {
    dir.join(format!("{}.char", username.to_lowercase()))
}

/// Write one character's record. Atomic per file.
pub fn save_character(world: &World, id: CharacterId) -> Result<(), EngineError> {
    let record = world
        .snapshot_character(id)
        .ok_or_else(|| EngineError::Internal(format!("no character {:?} to save", id)))?;
    let dir = PathBuf::from(&world.config.save_dir);
    write_record(&dir, &record)
}

pub fn write_record(dir: &Path, record: &CharacterRecord) -> Result<(), EngineError> {
    fs::create_dir_all(dir)
        .map_err(|e| EngineError::Internal(format!("create save dir: {}", e)))?;

    let bytes = bincode::encode_to_vec(record, bincode::config::standard())
        .map_err(|e| EngineError::Internal(format!("encode record: {}", e)))?;

    let path = record_path(dir, &record.credentials.username);
    let tmp = path.with_extension("char.tmp");
    {
        let mut file = fs::File::create(&tmp)
            .map_err(|e| EngineError::Internal(format!("create {}: {}", tmp.display(), e)))?;
        file.write_all(&bytes)
            .map_err(|e| EngineError::Internal(format!("write {}: {}", tmp.display(), e)))?;
        file.sync_all()
            .map_err(|e| EngineError::Internal(format!("sync {}: {}", tmp.display(), e)))?;
    }
    fs::rename(&tmp, &path)
        .map_err(|e| EngineError::Internal(format!("rename into {}: {}", path.display(), e)))?;
    Ok(())
}

/// Load a record by username, if one is on disk. Records from older schema
/// versions are left for the migration pass and reported as absent.
pub fn load_record(dir: &Path, username: &str) -> Option<CharacterRecord> {
    let path = record_path(dir, username);
    let bytes = fs::read(&path).ok()?;
    let (record, _): (CharacterRecord, usize) =
        match bincode::decode_from_slice(&bytes, bincode::config::standard()) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::error!("unreadable record {}: {}", path.display(), err);
                return None;
            }
        };
    if record.version != CHARACTER_RECORD_VERSION {
        log::warn!(
            "record {} is schema v{}, current is v{}; migration required",
            path.display(),
            record.version,
            CHARACTER_RECORD_VERSION
        );
        return None;
    }
    Some(record)
}

/// Periodic save of every active character. Failures are logged and never
/// interrupt the tick loop.
pub fn autosave(world: &World) {
    let mut saved = 0;
    for id in world.active_characters.iter().copied().collect::<Vec<_>>() {
        match save_character(world, id) {
            Ok(()) => saved += 1,
            Err(err) => log::error!("autosave of {:?} failed: {}", id, err),
        }
    }
    if saved > 0 {
        log::debug!("autosaved {} character(s)", saved);
    }
}

/// Best-effort save of every known character, for shutdown.
pub fn save_all(world: &World) -> usize {
    let mut failures = 0;
    for id in world.characters.keys().copied().collect::<Vec<_>>() {
        if let Err(err) = save_character(world, id) {
            failures += 1;
            log::error!("shutdown save of {:?} failed: {}", id, err);
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::content;
    use crate::world::World;

    fn world_in(dir: &Path) -> World {
        let mut config = ServerConfig::default();
        config.save_dir = dir.to_string_lossy().to_string();
        let (world, _registry) = content::build_world(config).unwrap();
        world
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut world = world_in(dir.path());
        let mob = content::spawn_player_mob(&mut world, "Resa", false);
        let start = world.resolve_room_ref("@duskhaven{0,0,0}").unwrap();
        world.add_to(mob, start).unwrap();
        let id = world.object(mob).unwrap().mob().unwrap().character.unwrap();

        save_character(&world, id).unwrap();

        let loaded = load_record(dir.path(), "resa").expect("record loads");
        assert_eq!(loaded, world.snapshot_character(id).unwrap());
        // No temp files left behind.
        let stray: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |x| x == "tmp"))
            .collect();
        assert!(stray.is_empty());
    }

    #[test]
    fn missing_and_stale_records_load_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut world = world_in(dir.path());
        assert!(load_record(dir.path(), "nobody").is_none());

        let mob = content::spawn_player_mob(&mut world, "Old", false);
        let id = world.object(mob).unwrap().mob().unwrap().character.unwrap();
        let mut record = world.snapshot_character(id).unwrap();
        record.version = 1;
        write_record(dir.path(), &record).unwrap();
        assert!(load_record(dir.path(), "old").is_none(), "stale schema defers to migration");
    }

    #[test]
    fn autosave_covers_active_characters() {
        let dir = tempfile::tempdir().unwrap();
        let mut world = world_in(dir.path());
        content::spawn_player_mob(&mut world, "Ada", false);
        content::spawn_player_mob(&mut world, "Bel", false);

        autosave(&world);

        assert!(load_record(dir.path(), "ada").is_some());
        assert!(load_record(dir.path(), "bel").is_some());
    }
}
