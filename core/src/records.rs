//! Persisted record types.
//!
//! Everything in this module is detached data: no arena handles, no session
//! state. The server converts between these records and its live world when
//! loading or saving, and the on-disk snapshot files are bincode-encoded
//! records with a `version` field up front. Older versions are migrated
//! before they reach this module.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::damage::DamageType;
use crate::message::MessageGroup;

/// Schema version written into every character record.
pub const CHARACTER_RECORD_VERSION: u32 = 3;

bitflags::bitflags! {
    /// NPC behavior switches. Stored raw in snapshots like any other flags
    /// word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BehaviorFlags: u32 {
        /// Drifts through random exits when idle.
        const WANDER = 1 << 0;
        /// Never initiates combat, even when provoked by proximity.
        const PEACEFUL = 1 << 1;
        /// Restocked by resets; a shopkeeper.
        const SHOPKEEPER = 1 << 2;
    }
}

/// Equipment slots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub enum EquipSlot {
    Head,
    Neck,
    Chest,
    Shoulders,
    Hands,
    Finger,
    Waist,
    Legs,
    Feet,
    MainHand,
    OffHand,
}

impl EquipSlot {
    pub const ALL: [EquipSlot; 11] = [
        EquipSlot::Head,
        EquipSlot::Neck,
        EquipSlot::Chest,
        EquipSlot::Shoulders,
        EquipSlot::Hands,
        EquipSlot::Finger,
        EquipSlot::Waist,
        EquipSlot::Legs,
        EquipSlot::Feet,
        EquipSlot::MainHand,
        EquipSlot::OffHand,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EquipSlot::Head => "head",
            EquipSlot::Neck => "neck",
            EquipSlot::Chest => "chest",
            EquipSlot::Shoulders => "shoulders",
            EquipSlot::Hands => "hands",
            EquipSlot::Finger => "finger",
            EquipSlot::Waist => "waist",
            EquipSlot::Legs => "legs",
            EquipSlot::Feet => "feet",
            EquipSlot::MainHand => "main hand",
            EquipSlot::OffHand => "off hand",
        }
    }
}

/// The verb pair and damage kind of a weapon (or of unarmed strikes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct HitType {
    /// Second person: "you *slash*".
    pub verb: String,
    /// Third person: "slashes".
    pub verb_third: String,
    pub damage_type: DamageType,
}

impl HitType {
    pub fn unarmed() -> HitType {
        HitType {
            verb: "punch".into(),
            verb_third: "punches".into(),
            damage_type: DamageType::Blunt,
        }
    }
}

/// Weapon- or armor-specific equipment payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum EquipKind {
    Weapon { attack_power: f64, hit_type: HitType },
    Armor { defense: f64 },
    /// Bonus-only equipment (rings, amulets).
    Trinket,
}

/// Equipment payload carried by an equippable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct EquipmentData {
    pub slot: EquipSlot,
    pub kind: EquipKind,
    pub attribute_bonus: BTreeMap<crate::attributes::Attribute, f64>,
    pub secondary_bonus: BTreeMap<crate::attributes::SecondaryAttribute, f64>,
    pub resource_bonus: BTreeMap<crate::attributes::Resource, f64>,
}

impl EquipmentData {
    pub fn bare(slot: EquipSlot, kind: EquipKind) -> Self {
        EquipmentData {
            slot,
            kind,
            attribute_bonus: BTreeMap::new(),
            secondary_bonus: BTreeMap::new(),
            resource_bonus: BTreeMap::new(),
        }
    }
}

/// Item payload. Shared verbatim between the live world and snapshots.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct ItemData {
    pub value: u32,
    pub weight: Option<u32>,
    pub container: bool,
    /// Gold. Currency can never be equipped or sacrificed.
    pub currency: bool,
    pub equipment: Option<EquipmentData>,
}

/// A detached effect instance, deadlines in world-clock milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct EffectSnapshot {
    pub template_id: String,
    pub caster_oid: Option<u64>,
    pub applied_at_ms: u64,
    /// `None` never expires.
    pub expires_at_ms: Option<u64>,
    pub ticks_remaining: u32,
    pub next_tick_at_ms: Option<u64>,
    pub tick_amount: Option<f64>,
    pub remaining_absorption: Option<f64>,
}

/// Per-ability learning progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct AbilityProgress {
    pub uses: u32,
    pub proficiency: u8,
}

/// Detached mob payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct MobSnapshot {
    pub race_id: String,
    pub job_id: String,
    pub level: u32,
    pub experience: u64,
    pub health: f64,
    pub mana: f64,
    pub exhaustion: f64,
    pub equipped: BTreeMap<EquipSlot, ObjectSnapshot>,
    pub abilities: BTreeMap<String, AbilityProgress>,
    pub effects: Vec<EffectSnapshot>,
    pub behavior: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum SnapshotBody {
    Item(ItemData),
    Mob(MobSnapshot),
}

/// A detached object tree: the object, its contents, and (for mobs) its
/// equipped set, recursively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct ObjectSnapshot {
    pub oid: u64,
    pub keywords: Vec<String>,
    pub display_name: String,
    pub description: Option<String>,
    pub room_description: Option<String>,
    pub contents: Vec<ObjectSnapshot>,
    pub body: SnapshotBody,
}

/// Account credentials. Passwords are stored as Argon2 PHC strings; the
/// salt rides inside the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Credentials {
    pub username: String,
    pub password_hash: String,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds; zero before the first login.
    pub last_login: u64,
    pub is_active: bool,
    pub is_banned: bool,
    pub is_admin: bool,
}

impl Credentials {
    pub fn new(username: &str, password: &str, created_at: u64) -> Credentials {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .expect("argon2 with default params accepts any password")
            .to_string();
        Credentials {
            username: username.to_string(),
            password_hash,
            created_at,
            last_login: 0,
            is_active: true,
            is_banned: false,
            is_admin: false,
        }
    }

    /// A record whose stored hash no longer parses denies every password.
    pub fn verify_password(&self, password: &str) -> bool {
        match PasswordHash::new(&self.password_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// Per-character presentation and routing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Settings {
    pub verbose: bool,
    pub color: bool,
    /// Brief mode suppresses the per-line prompt.
    pub brief: bool,
    /// Channel groups the character has muted.
    pub muted_groups: BTreeSet<MessageGroup>,
    /// Busy mode queues forwarded groups for later batch delivery.
    pub busy: bool,
    /// Queue forwarded groups only while in combat.
    pub combat_busy: bool,
    pub busy_forwarded: BTreeSet<MessageGroup>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            verbose: true,
            color: true,
            brief: false,
            muted_groups: BTreeSet::new(),
            busy: false,
            combat_busy: false,
            busy_forwarded: BTreeSet::new(),
        }
    }
}

/// Lifetime play statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct PlayStats {
    pub playtime_secs: u64,
    pub deaths: u32,
    pub kills: u32,
}

/// The full persisted form of a player account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct CharacterRecord {
    pub version: u32,
    pub credentials: Credentials,
    pub settings: Settings,
    pub stats: PlayStats,
    pub blocked: BTreeSet<String>,
    pub mob: ObjectSnapshot,
    /// Room reference the mob was last saved in, e.g. `@tower{0,0,0}`.
    pub saved_room: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mob() -> ObjectSnapshot {
        let sword = ObjectSnapshot {
            oid: 11,
            keywords: vec!["rusty".into(), "sword".into()],
            display_name: "a rusty sword".into(),
            description: None,
            room_description: Some("A rusty sword lies here.".into()),
            contents: vec![],
            body: SnapshotBody::Item(ItemData {
                value: 5,
                weight: Some(4),
                container: false,
                currency: false,
                equipment: Some(EquipmentData::bare(
                    EquipSlot::MainHand,
                    EquipKind::Weapon {
                        attack_power: 3.0,
                        hit_type: HitType {
                            verb: "slash".into(),
                            verb_third: "slashes".into(),
                            damage_type: DamageType::Slash,
                        },
                    },
                )),
            }),
        };

        let mut equipped = BTreeMap::new();
        equipped.insert(EquipSlot::MainHand, sword);

        let mut abilities = BTreeMap::new();
        abilities.insert("bash".into(), AbilityProgress { uses: 12, proficiency: 25 });

        ObjectSnapshot {
            oid: 10,
            keywords: vec!["brak".into()],
            display_name: "Brak".into(),
            description: None,
            room_description: None,
            contents: vec![],
            body: SnapshotBody::Mob(MobSnapshot {
                race_id: "orc".into(),
                job_id: "warrior".into(),
                level: 3,
                experience: 4200,
                health: 55.0,
                mana: 12.0,
                exhaustion: 80.0,
                equipped,
                abilities,
                effects: vec![EffectSnapshot {
                    template_id: "poison".into(),
                    caster_oid: Some(99),
                    applied_at_ms: 1000,
                    expires_at_ms: Some(4000),
                    ticks_remaining: 3,
                    next_tick_at_ms: Some(2000),
                    tick_amount: Some(5.0),
                    remaining_absorption: None,
                }],
                behavior: BehaviorFlags::WANDER.bits(),
            }),
        }
    }

    fn sample_record() -> CharacterRecord {
        let mut settings = Settings::default();
        settings.busy = true;
        settings.busy_forwarded.insert(MessageGroup::Channels);
        settings.busy_forwarded.insert(MessageGroup::Action);

        let mut blocked = BTreeSet::new();
        blocked.insert("miscreant".into());

        CharacterRecord {
            version: CHARACTER_RECORD_VERSION,
            credentials: Credentials::new("brak", "hunter2", 1_700_000_000),
            settings,
            stats: PlayStats { playtime_secs: 3600, deaths: 2, kills: 41 },
            blocked,
            mob: sample_mob(),
            saved_room: Some("@tower{0,0,0}".into()),
        }
    }

    #[test]
    fn password_verification_accepts_correct_rejects_wrong() {
        let creds = Credentials::new("brak", "hunter2", 0);
        assert!(creds.verify_password("hunter2"));
        assert!(!creds.verify_password("hunter3"));
        assert!(!creds.verify_password(""));
    }

    #[test]
    fn salts_differ_between_accounts() {
        // Same password, fresh random salt each time: the PHC strings differ.
        let a = Credentials::new("a", "same", 0);
        let b = Credentials::new("b", "same", 0);
        assert_ne!(a.password_hash, b.password_hash);
        assert!(a.password_hash.starts_with("$argon2"));
    }

    #[test]
    fn corrupted_hash_denies_every_password() {
        let mut creds = Credentials::new("brak", "hunter2", 0);
        creds.password_hash = "not a phc string".into();
        assert!(!creds.verify_password("hunter2"));
        assert!(!creds.verify_password(""));
    }

    #[test]
    fn record_round_trips_through_bincode() {
        let record = sample_record();
        let bytes = bincode::encode_to_vec(&record, bincode::config::standard()).unwrap();
        let (back, _): (CharacterRecord, usize) =
            bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn record_round_trips_through_serde() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let back: CharacterRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        // Forwarded groups survive as a set.
        assert!(back.settings.busy_forwarded.contains(&MessageGroup::Channels));
        assert_eq!(back.settings.busy_forwarded.len(), 2);
    }

    #[test]
    fn mob_snapshot_preserves_effect_deadlines() {
        let record = sample_record();
        let bytes = bincode::encode_to_vec(&record, bincode::config::standard()).unwrap();
        let (back, _): (CharacterRecord, usize) =
            bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        let SnapshotBody::Mob(mob) = &back.mob.body else {
            panic!("expected mob body");
        };
        assert_eq!(mob.effects[0].applied_at_ms, 1000);
        assert_eq!(mob.effects[0].expires_at_ms, Some(4000));
    }
}
