use crate::config::{save_settings_atomic, Paths, Settings, ENV_VARS};
use crate::items::{Category, ItemCatalog, ItemDefinition};
use crate::model::{PetState, Stat};
use crate::storage::{SaveInfo, StateStore};
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "termagatchi")]
#[command(about = "A tiny pet that lives in your terminal")]
pub(crate) struct Cli {
    /// Directory holding the save, settings and item files
    #[arg(long, global = true)]
    pub(crate) save_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true, default_value_t = false)]
    pub(crate) debug: bool,

    #[command(subcommand)]
    pub(crate) command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Commands {
    /// Start the interactive pet (default)
    Run,
    /// Print the saved pet's stats
    Status,
    /// Delete the save and its backup
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Show or initialise configuration
    Config {
        #[arg(long)]
        show: bool,
        /// Write default settings.json and items.json if missing
        #[arg(long)]
        write_defaults: bool,
    },
    /// Inspect or edit the item catalog
    Items(ItemsArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct ItemsArgs {
    #[arg(long)]
    pub(crate) search: Option<String>,
    #[arg(long)]
    pub(crate) validate: bool,
    /// CATEGORY/ID, e.g. food/kibble
    #[arg(long)]
    pub(crate) info: Option<String>,
    /// Add or replace CATEGORY/ID and write the catalog file
    #[arg(long, requires_all = ["name", "desc"])]
    pub(crate) add: Option<String>,
    #[arg(long)]
    pub(crate) name: Option<String>,
    #[arg(long)]
    pub(crate) desc: Option<String>,
    /// STAT=DELTA, repeatable
    #[arg(long = "effect")]
    pub(crate) effects: Vec<String>,
    #[arg(long, default_value_t = 300)]
    pub(crate) cooldown: i64,
    /// Remove CATEGORY/ID and write the catalog file
    #[arg(long)]
    pub(crate) remove: Option<String>,
}

fn items_path(settings: &Settings, paths: &Paths) -> PathBuf {
    settings
        .items_path
        .clone()
        .unwrap_or_else(|| paths.items_path.clone())
}

pub(crate) fn rating(v: f64) -> &'static str {
    if v >= 80.0 {
        "Excellent"
    } else if v >= 60.0 {
        "Good"
    } else if v >= 40.0 {
        "Okay"
    } else if v >= 20.0 {
        "Poor"
    } else {
        "Critical"
    }
}

pub(crate) fn format_status(name: &str, state: &PetState, info: Option<&SaveInfo>) -> String {
    let mut out = vec![format!("{name} Status"), String::new()];
    out.push(format!("{:<10} {:>6}  {}", "Stat", "Value", "Rating"));
    for stat in Stat::ALL {
        let v = state.stats.get(stat);
        out.push(format!(
            "{:<10} {:>6}  {}",
            stat.label(),
            format!("{v:.0}/100"),
            rating(v)
        ));
    }
    out.push(String::new());
    out.push(format!(
        "Sleeping: {}",
        if state.stats.sleeping { "Yes" } else { "No" }
    ));
    out.push(format!(
        "Play time: {:.1} hours",
        state.total_play_time_s / 3600.0
    ));
    out.push(format!("Chat messages: {}", state.chat_history.len()));
    out.push(format!("Events: {}", state.events.len()));
    if let Some(info) = info {
        out.push(format!("Save size: {} bytes", info.file_size));
        if let Some(m) = info.last_modified {
            out.push(format!("Last saved: {}", m.format("%Y-%m-%d %H:%M:%S")));
        }
        out.push(format!(
            "Created: {}",
            info.created_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    out.join("\n")
}

pub(crate) fn status(settings: &Settings, paths: &Paths) -> Result<()> {
    let store = StateStore::new(&paths.data_dir)?;
    match store.load() {
        Some(state) => {
            let info = store.info();
            println!("{}", format_status(&settings.pet_name, &state, info.as_ref()));
            println!("Save file: {}", store.save_path().display());
            if store.backup_path().exists() {
                println!("Backup: {}", store.backup_path().display());
            }
        }
        None => println!("No saved pet yet. Run `termagatchi run` to hatch one."),
    }
    Ok(())
}

pub(crate) fn confirm<R: BufRead>(prompt: &str, mut input: R) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    input.read_line(&mut line).context("reading confirmation")?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

pub(crate) fn reset(paths: &Paths, force: bool) -> Result<()> {
    let store = StateStore::new(&paths.data_dir)?;
    let prompt = format!("Really delete your pet ({})?", store.save_path().display());
    if !force && !confirm(&prompt, io::stdin().lock())? {
        println!("Reset cancelled.");
        return Ok(());
    }
    let removed = store.reset()?;
    if removed.is_empty() {
        println!("Nothing to reset.");
    }
    for p in removed {
        println!("Removed {}", p.display());
    }
    Ok(())
}

/// Show the head and tail of a secret so it can be recognised, not copied.
pub(crate) fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn show_config(settings: &Settings, paths: &Paths) -> Result<()> {
    println!("Data directory: {}", paths.data_dir.display());
    println!("Settings file:  {}", paths.settings_path.display());
    println!("Items file:     {}", items_path(settings, paths).display());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(settings).context("serialize settings")?
    );
    println!();
    println!("Environment:");
    for var in ENV_VARS {
        match std::env::var(var) {
            Ok(v) if var.ends_with("_KEY") => println!("  {var} = {}", mask_key(&v)),
            Ok(v) => println!("  {var} = {v}"),
            Err(_) => println!("  {var} (not set)"),
        }
    }
    Ok(())
}

fn write_defaults(settings: &Settings, paths: &Paths) -> Result<()> {
    if paths.settings_path.exists() {
        println!("{} already exists, leaving it", paths.settings_path.display());
    } else {
        save_settings_atomic(&paths.settings_path, &Settings::default())?;
        println!("Wrote {}", paths.settings_path.display());
    }
    let items = items_path(settings, paths);
    if items.exists() {
        println!("{} already exists, leaving it", items.display());
    } else {
        ItemCatalog::builtin().save_to_file(&items)?;
        println!("Wrote {}", items.display());
    }
    Ok(())
}

pub(crate) fn configure(settings: &Settings, paths: &Paths, show: bool, defaults: bool) -> Result<()> {
    if defaults {
        write_defaults(settings, paths)?;
    }
    if show || !defaults {
        show_config(settings, paths)?;
    }
    Ok(())
}

fn parse_item_ref(item_ref: &str) -> Result<(Category, &str)> {
    let (cat, id) = item_ref
        .split_once('/')
        .ok_or_else(|| anyhow!("expected CATEGORY/ID, got '{item_ref}'"))?;
    Ok((cat.parse()?, id))
}

pub(crate) fn list_catalog(catalog: &ItemCatalog) -> String {
    let mut out = Vec::new();
    for category in Category::ALL {
        let items: Vec<_> = catalog.category_items(category).collect();
        if items.is_empty() {
            continue;
        }
        out.push(format!("{category}:"));
        for (id, def) in items {
            out.push(format!("  {id:<14} {:<14} {}", def.name, def.description));
        }
    }
    out.join("\n")
}

fn parse_effect(raw: &str) -> Result<(String, f64)> {
    let (stat, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected STAT=DELTA, got '{raw}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("effect '{raw}' needs a number"))?;
    if !value.is_finite() {
        return Err(anyhow!("effect '{raw}' is not a finite number"));
    }
    Ok((stat.trim().to_ascii_lowercase(), value))
}

fn definition_from_args(args: &ItemsArgs) -> Result<ItemDefinition> {
    let effects = args
        .effects
        .iter()
        .map(|e| parse_effect(e))
        .collect::<Result<Vec<_>>>()?;
    let effects: Vec<(&str, f64)> = effects.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    Ok(ItemDefinition::new(
        args.name.as_deref().unwrap_or_default(),
        args.desc.as_deref().unwrap_or_default(),
        &effects,
        args.cooldown,
    ))
}

pub(crate) fn items(settings: &Settings, paths: &Paths, args: &ItemsArgs) -> Result<()> {
    let path = items_path(settings, paths);
    let mut catalog = ItemCatalog::load(&path);

    if args.add.is_some() || args.remove.is_some() {
        if let Some(item_ref) = &args.add {
            let (category, id) = parse_item_ref(item_ref)?;
            catalog.add_item(category, id, definition_from_args(args)?);
            println!("Added {category}/{id}");
        }
        if let Some(item_ref) = &args.remove {
            let (category, id) = parse_item_ref(item_ref)?;
            if catalog.remove_item(category, id) {
                println!("Removed {category}/{id}");
            } else {
                println!("No item '{id}' in {category}");
            }
        }
        catalog.save_to_file(&path)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    if let Some(item_ref) = &args.info {
        let (category, id) = parse_item_ref(item_ref)?;
        match catalog.item_info(category, id) {
            Some(text) => println!("{text}"),
            None => println!(
                "No item '{id}' in {category} (have: {})",
                catalog.item_ids(category).join(", ")
            ),
        }
        return Ok(());
    }

    if args.validate {
        let issues = catalog.validate();
        if issues.is_empty() {
            println!("All {} items look good.", catalog.len());
        } else {
            println!("{} issue(s):", issues.len());
            for issue in issues {
                println!("  - {issue}");
            }
        }
        return Ok(());
    }

    let shown = match &args.search {
        Some(term) => catalog.search(term),
        None => catalog,
    };
    if shown.is_empty() {
        println!("No matching items.");
    } else {
        println!("{}", list_catalog(&shown));
    }
    Ok(())
}
