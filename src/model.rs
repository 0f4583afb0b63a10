use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub(crate) const STATE_VERSION: u32 = 1;

// Logs are pruned in bulk: once a log grows past its limit it is cut back to
// the most recent `*_KEEP` entries.
const EVENTS_PRUNE_AT: usize = 100;
const EVENTS_KEEP: usize = 50;
const CHAT_PRUNE_AT: usize = 200;
const CHAT_KEEP: usize = 100;
const NOTIFICATIONS_PRUNE_AT: usize = 10;
const NOTIFICATIONS_KEEP: usize = 5;

pub(crate) const STAT_MIN: f64 = 0.0;
pub(crate) const STAT_MAX: f64 = 100.0;

/// Clamp a stat value into `[0, 100]`. NaN collapses to the floor.
pub(crate) fn clamp_stat(v: f64) -> f64 {
    if v.is_nan() {
        STAT_MIN
    } else {
        v.clamp(STAT_MIN, STAT_MAX)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Stat {
    Hunger,
    Hygiene,
    Happiness,
    Energy,
    Affection,
    Health,
}

impl Stat {
    pub(crate) const ALL: [Stat; 6] = [
        Stat::Hunger,
        Stat::Hygiene,
        Stat::Happiness,
        Stat::Energy,
        Stat::Affection,
        Stat::Health,
    ];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Stat::Hunger => "hunger",
            Stat::Hygiene => "hygiene",
            Stat::Happiness => "happiness",
            Stat::Energy => "energy",
            Stat::Affection => "affection",
            Stat::Health => "health",
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Stat::Hunger => "Hunger",
            Stat::Hygiene => "Hygiene",
            Stat::Happiness => "Happiness",
            Stat::Energy => "Energy",
            Stat::Affection => "Affection",
            Stat::Health => "Health",
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Stat::ALL
            .into_iter()
            .find(|st| st.as_str() == lower)
            .ok_or_else(|| anyhow!("unknown stat '{s}'"))
    }
}

fn de_stat<'de, D>(d: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    f64::deserialize(d).map(clamp_stat)
}

fn mid_stat() -> f64 {
    50.0
}

fn full_stat() -> f64 {
    STAT_MAX
}

/// The six needs plus the sleep flag. Fields are private so every write goes
/// through `set`/`adjust`, which clamp.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct PetStats {
    #[serde(default = "mid_stat", deserialize_with = "de_stat")]
    hunger: f64,
    #[serde(default = "mid_stat", deserialize_with = "de_stat")]
    hygiene: f64,
    #[serde(default = "mid_stat", deserialize_with = "de_stat")]
    happiness: f64,
    #[serde(default = "mid_stat", deserialize_with = "de_stat")]
    energy: f64,
    #[serde(default = "mid_stat", deserialize_with = "de_stat")]
    affection: f64,
    #[serde(default = "full_stat", deserialize_with = "de_stat")]
    health: f64,
    #[serde(default)]
    pub(crate) sleeping: bool,
}

impl Default for PetStats {
    fn default() -> Self {
        Self {
            hunger: 50.0,
            hygiene: 50.0,
            happiness: 50.0,
            energy: 50.0,
            affection: 50.0,
            health: 100.0,
            sleeping: false,
        }
    }
}

impl PetStats {
    pub(crate) fn get(&self, stat: Stat) -> f64 {
        match stat {
            Stat::Hunger => self.hunger,
            Stat::Hygiene => self.hygiene,
            Stat::Happiness => self.happiness,
            Stat::Energy => self.energy,
            Stat::Affection => self.affection,
            Stat::Health => self.health,
        }
    }

    fn slot(&mut self, stat: Stat) -> &mut f64 {
        match stat {
            Stat::Hunger => &mut self.hunger,
            Stat::Hygiene => &mut self.hygiene,
            Stat::Happiness => &mut self.happiness,
            Stat::Energy => &mut self.energy,
            Stat::Affection => &mut self.affection,
            Stat::Health => &mut self.health,
        }
    }

    pub(crate) fn set(&mut self, stat: Stat, value: f64) {
        *self.slot(stat) = clamp_stat(value);
    }

    /// Adds `delta` and clamps. Returns the change actually applied.
    pub(crate) fn adjust(&mut self, stat: Stat, delta: f64) -> f64 {
        let before = self.get(stat);
        self.set(stat, before + delta);
        self.get(stat) - before
    }

    pub(crate) fn apply_effects<I>(&mut self, effects: I)
    where
        I: IntoIterator<Item = (Stat, f64)>,
    {
        for (stat, delta) in effects {
            self.adjust(stat, delta);
        }
    }

    pub(crate) fn hunger(&self) -> f64 {
        self.hunger
    }
    pub(crate) fn hygiene(&self) -> f64 {
        self.hygiene
    }
    pub(crate) fn happiness(&self) -> f64 {
        self.happiness
    }
    pub(crate) fn energy(&self) -> f64 {
        self.energy
    }
    pub(crate) fn affection(&self) -> f64 {
        self.affection
    }
    pub(crate) fn health(&self) -> f64 {
        self.health
    }

    /// Mean of the four basic needs, used to bucket overall wellbeing.
    pub(crate) fn wellbeing(&self) -> f64 {
        (self.hunger + self.hygiene + self.happiness + self.energy) / 4.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum EventKind {
    Decay,
    Sickness,
    Command,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct GameEvent {
    #[serde(with = "canonical_time")]
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) event_type: EventKind,
    pub(crate) description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) data: Option<serde_json::Value>,
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.timestamp.with_timezone(&Local);
        write!(f, "[{}] {}", local.format("%H:%M"), self.description)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Sender {
    User,
    Pet,
    System,
}

/// One transcript line. The timestamp is display text only and is never
/// parsed back into a time value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ChatEntry {
    pub(crate) sender: Sender,
    pub(crate) message: String,
    pub(crate) timestamp: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct PetState {
    #[serde(default = "state_version")]
    pub(crate) version: u32,
    #[serde(default)]
    pub(crate) stats: PetStats,
    #[serde(default)]
    pub(crate) events: Vec<GameEvent>,
    #[serde(default)]
    pub(crate) chat_history: Vec<ChatEntry>,
    #[serde(default)]
    pub(crate) notifications: Vec<String>,
    #[serde(default, with = "canonical_time::map")]
    pub(crate) item_cooldowns: BTreeMap<String, DateTime<Utc>>,
    #[serde(with = "canonical_time")]
    pub(crate) last_tick: DateTime<Utc>,
    #[serde(with = "canonical_time")]
    pub(crate) created_at: DateTime<Utc>,
    #[serde(default)]
    pub(crate) total_play_time_s: f64,
}

fn state_version() -> u32 {
    STATE_VERSION
}

impl PetState {
    pub(crate) fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: STATE_VERSION,
            stats: PetStats::default(),
            events: Vec::new(),
            chat_history: Vec::new(),
            notifications: Vec::new(),
            item_cooldowns: BTreeMap::new(),
            last_tick: now,
            created_at: now,
            total_play_time_s: 0.0,
        }
    }

    pub(crate) fn add_event(
        &mut self,
        kind: EventKind,
        description: impl Into<String>,
        data: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) {
        self.events.push(GameEvent {
            timestamp: now,
            event_type: kind,
            description: description.into(),
            data,
        });
        prune_front(&mut self.events, EVENTS_PRUNE_AT, EVENTS_KEEP);
    }

    pub(crate) fn add_chat_message(
        &mut self,
        sender: Sender,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.chat_history.push(ChatEntry {
            sender,
            message: message.into(),
            timestamp: now.with_timezone(&Local).format("%Y-%m-%dT%H:%M:%S").to_string(),
        });
        prune_front(&mut self.chat_history, CHAT_PRUNE_AT, CHAT_KEEP);
    }

    pub(crate) fn add_notification(&mut self, message: impl Into<String>) {
        self.notifications.push(message.into());
        prune_front(
            &mut self.notifications,
            NOTIFICATIONS_PRUNE_AT,
            NOTIFICATIONS_KEEP,
        );
    }

    /// Time left on an item's cooldown, or `None` once it may be used again.
    /// Stale entries are left in the table.
    pub(crate) fn cooldown_remaining(
        &self,
        key: &str,
        cooldown_s: i64,
        now: DateTime<Utc>,
    ) -> Option<chrono::Duration> {
        let last_use = self.item_cooldowns.get(key)?;
        if cooldown_s <= 0 {
            return None;
        }
        // beyond chrono's range means "longer than anyone will wait"
        let cooldown = chrono::Duration::try_seconds(cooldown_s).unwrap_or(chrono::Duration::MAX);
        let since = now.signed_duration_since(*last_use);
        if since < cooldown {
            Some(cooldown.checked_sub(&since).unwrap_or(cooldown))
        } else {
            None
        }
    }

    pub(crate) fn mark_used(&mut self, key: String, now: DateTime<Utc>) {
        self.item_cooldowns.insert(key, now);
    }

    /// The last `count` events, oldest first.
    pub(crate) fn recent_events(&self, count: usize) -> Vec<String> {
        let start = self.events.len().saturating_sub(count);
        self.events[start..].iter().map(|e| e.to_string()).collect()
    }
}

fn prune_front<T>(items: &mut Vec<T>, prune_at: usize, keep: usize) {
    if items.len() > prune_at {
        let cut = items.len() - keep;
        items.drain(..cut);
    }
}

/// Timestamps are written as fixed-width RFC 3339 UTC strings
/// (`2024-05-01T08:30:00.000000000Z`) so they sort lexically and round-trip
/// without loss. Naive ISO strings from older saves are read as UTC.
pub(crate) mod canonical_time {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub(crate) fn format(t: &DateTime<Utc>) -> String {
        t.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    pub(crate) fn parse(s: &str) -> Option<DateTime<Utc>> {
        if let Ok(t) = DateTime::parse_from_rfc3339(s) {
            return Some(t.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub(crate) fn serialize<S>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&format(t))
    }

    pub(crate) fn deserialize<'de, D>(d: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("bad timestamp '{raw}'")))
    }

    pub(crate) mod map {
        use chrono::{DateTime, Utc};
        use serde::{de, ser::SerializeMap, Deserialize, Deserializer, Serializer};
        use std::collections::BTreeMap;

        pub(crate) fn serialize<S>(
            m: &BTreeMap<String, DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut out = s.serialize_map(Some(m.len()))?;
            for (k, v) in m {
                out.serialize_entry(k, &super::format(v))?;
            }
            out.end()
        }

        pub(crate) fn deserialize<'de, D>(
            d: D,
        ) -> Result<BTreeMap<String, DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = BTreeMap::<String, String>::deserialize(d)?;
            raw.into_iter()
                .map(|(k, v)| match super::parse(&v) {
                    Some(t) => Ok((k, t)),
                    None => Err(de::Error::custom(format!("bad timestamp '{v}' for '{k}'"))),
                })
                .collect()
        }
    }
}
