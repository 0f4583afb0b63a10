use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Simulation knobs. Decay amounts are per tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct GameConfig {
    pub(crate) hunger_decay: f64,
    pub(crate) hygiene_decay: f64,
    pub(crate) energy_decay_awake: f64,
    pub(crate) energy_recovery_sleeping: f64,

    pub(crate) low_hunger_threshold: f64,
    pub(crate) low_hygiene_threshold: f64,
    pub(crate) critical_hunger_threshold: f64,
    pub(crate) critical_hygiene_threshold: f64,
    pub(crate) critical_energy_threshold: f64,

    pub(crate) mood_decay_rate: f64,
    pub(crate) sickness_chance: f64,
    pub(crate) health_loss_sick: f64,
    pub(crate) pet_affection_boost: f64,
    pub(crate) pet_happiness_boost: f64,

    pub(crate) autosave_interval_s: u64,
    pub(crate) tick_interval_s: u64,
    pub(crate) max_notifications: usize,

    /// Scale decay by real elapsed time / tick interval instead of applying
    /// the fixed per-tick amounts. Off unless explicitly enabled.
    pub(crate) scale_decay_by_elapsed: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            hunger_decay: 1.0,
            hygiene_decay: 0.5,
            energy_decay_awake: 0.5,
            energy_recovery_sleeping: 1.0,
            low_hunger_threshold: 40.0,
            low_hygiene_threshold: 40.0,
            critical_hunger_threshold: 20.0,
            critical_hygiene_threshold: 20.0,
            critical_energy_threshold: 10.0,
            mood_decay_rate: 0.2,
            sickness_chance: 0.05,
            health_loss_sick: 3.0,
            pet_affection_boost: 5.0,
            pet_happiness_boost: 3.0,
            autosave_interval_s: 30,
            tick_interval_s: 60,
            max_notifications: 5,
            scale_decay_by_elapsed: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct LlmConfig {
    pub(crate) provider: String,
    pub(crate) model: String,
    pub(crate) timeout_s: u64,
    pub(crate) max_retries: u32,
    pub(crate) temperature: f32,
    pub(crate) max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) api_base: Option<String>,
    // Keys come from the environment and are never written back to disk.
    #[serde(skip_serializing)]
    pub(crate) api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "deterministic".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_s: 4,
            max_retries: 2,
            temperature: 0.7,
            max_tokens: 64,
            api_base: None,
            api_key: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) pet_name: String,
    /// RNG seed for sickness rolls and reply variety; 0 draws from entropy.
    pub(crate) seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) items_path: Option<PathBuf>,
    pub(crate) game: GameConfig,
    pub(crate) llm: LlmConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pet_name: "Termagatchi".to_string(),
            seed: 0,
            items_path: None,
            game: GameConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

/// Environment variables consulted once at startup.
pub(crate) const ENV_VARS: [&str; 8] = [
    "LLM_PROVIDER",
    "LLM_MODEL",
    "LLM_TIMEOUT",
    "LLM_MAX_RETRIES",
    "LLM_TEMPERATURE",
    "LLM_MAX_TOKENS",
    "OPENAI_API_KEY",
    "OPENAI_API_BASE",
];

impl Settings {
    /// Layer environment overrides on top of the file values. Unparsable
    /// numbers are ignored with a warning.
    pub(crate) fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let llm = &mut self.llm;
        if let Some(v) = lookup("LLM_PROVIDER") {
            llm.provider = v;
        }
        if let Some(v) = lookup("LLM_MODEL") {
            llm.model = v;
        }
        parse_into(&lookup, "LLM_TIMEOUT", &mut llm.timeout_s);
        parse_into(&lookup, "LLM_MAX_RETRIES", &mut llm.max_retries);
        parse_into(&lookup, "LLM_TEMPERATURE", &mut llm.temperature);
        parse_into(&lookup, "LLM_MAX_TOKENS", &mut llm.max_tokens);
        if let Some(v) = lookup("OPENAI_API_KEY").filter(|v| !v.is_empty()) {
            llm.api_key = Some(v);
        }
        if let Some(v) = lookup("OPENAI_API_BASE").filter(|v| !v.is_empty()) {
            llm.api_base = Some(v);
        }
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => log::warn!("ignoring {key}={raw:?}: not a valid number"),
        }
    }
}

pub(crate) struct Paths {
    pub(crate) data_dir: PathBuf,
    pub(crate) settings_path: PathBuf,
    pub(crate) items_path: PathBuf,
    pub(crate) log_path: PathBuf,
}

impl Paths {
    pub(crate) fn in_dir(dir: &Path) -> Self {
        Self {
            data_dir: dir.to_path_buf(),
            settings_path: dir.join("settings.json"),
            items_path: dir.join("items.json"),
            log_path: dir.join("termagatchi.log"),
        }
    }
}

pub(crate) fn project_paths(save_dir: Option<&Path>) -> Result<Paths> {
    let dir = match save_dir {
        Some(d) => d.to_path_buf(),
        None => ProjectDirs::from("com", "termagatchi", "Termagatchi")
            .context("could not resolve project directories")?
            .data_local_dir()
            .to_path_buf(),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("could not create data directory {}", dir.display()))?;
    Ok(Paths::in_dir(&dir))
}

pub(crate) fn load_settings(path: &Path) -> Settings {
    match fs::read_to_string(path) {
        Ok(s) => match serde_json::from_str::<Settings>(&s) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("settings at {} unreadable ({e}), using defaults", path.display());
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    }
}

/// Settings file plus the process environment, read exactly once.
pub(crate) fn load(paths: &Paths) -> Settings {
    let mut settings = load_settings(&paths.settings_path);
    settings.apply_overrides(|k| std::env::var(k).ok());
    settings
}

pub(crate) fn save_settings_atomic(path: &Path, s: &Settings) -> Result<()> {
    write_json_atomic(path, s)
}

pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, data).with_context(|| format!("writing {}", tmp.display()))?;
    atomic_rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn atomic_rename(from: &Path, to: &Path) -> Result<()> {
    // rename() replaces the target atomically on POSIX; Windows refuses to
    // rename over an existing file, so clear it there first.
    if cfg!(windows) && to.exists() {
        let _ = fs::remove_file(to);
    }
    fs::rename(from, to)
        .with_context(|| format!("renaming {} -> {}", from.display(), to.display()))?;
    Ok(())
}
