use crate::config::write_json_atomic;
use crate::model::Stat;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

const DEFAULT_COOLDOWN_S: i64 = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Category {
    Food,
    Cleaning,
    Toys,
}

impl Category {
    pub(crate) const ALL: [Category; 3] = [Category::Food, Category::Cleaning, Category::Toys];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Cleaning => "cleaning",
            Category::Toys => "toys",
        }
    }

    /// Item used when a care command names none.
    pub(crate) fn default_item(self) -> &'static str {
        match self {
            Category::Food => "kibble",
            Category::Cleaning => "soap",
            Category::Toys => "ball",
        }
    }

    /// Key into the cooldown table. Scoped by category so the same item id in
    /// two categories cools down independently.
    pub(crate) fn cooldown_key(self, item_id: &str) -> String {
        let prefix = match self {
            Category::Food => "food",
            Category::Cleaning => "cleaning",
            Category::Toys => "toy",
        };
        format!("{prefix}_{item_id}")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "food" => Ok(Category::Food),
            "cleaning" | "clean" => Ok(Category::Cleaning),
            "toys" | "toy" => Ok(Category::Toys),
            other => Err(anyhow!("unknown item category '{other}'")),
        }
    }
}

fn default_cooldown() -> i64 {
    DEFAULT_COOLDOWN_S
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ItemDefinition {
    pub(crate) name: String,
    pub(crate) description: String,
    /// Additive deltas keyed by stat name. Names that are not stats are kept
    /// for authoring but have no effect.
    #[serde(default)]
    pub(crate) effects: BTreeMap<String, f64>,
    #[serde(default = "default_cooldown")]
    pub(crate) cooldown_s: i64,
}

impl ItemDefinition {
    pub(crate) fn new(name: &str, description: &str, effects: &[(&str, f64)], cooldown_s: i64) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            effects: effects.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            cooldown_s,
        }
    }

    pub(crate) fn stat_effects(&self) -> impl Iterator<Item = (Stat, f64)> + '_ {
        self.effects
            .iter()
            .filter_map(|(k, v)| k.parse::<Stat>().ok().map(|s| (s, *v)))
    }
}

// Looser shape used while loading so a bad effect value costs one effect
// rather than the whole item.
#[derive(Deserialize)]
struct RawItem {
    name: String,
    description: String,
    #[serde(default)]
    effects: BTreeMap<String, Value>,
    #[serde(default = "default_cooldown")]
    cooldown_s: i64,
}

type Items = BTreeMap<Category, BTreeMap<String, ItemDefinition>>;

#[derive(Clone, Debug, Default)]
pub(crate) struct ItemCatalog {
    items: Items,
    load_issues: Vec<String>,
}

impl ItemCatalog {
    /// Load from a JSON file of `category -> item_id -> definition`. Any
    /// failure (missing, unparsable, no usable items) falls back to the
    /// built-in catalog; this never errors.
    pub(crate) fn load(path: &Path) -> Self {
        Self::from_file(path).unwrap_or_else(|e| {
            log::warn!("item catalog {}: {e:#}; using built-in items", path.display());
            Self::builtin()
        })
    }

    fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("file not found");
        }
        let text = fs::read_to_string(path).context("read failed")?;
        let catalog = Self::from_json_str(&text)?;
        log::info!("loaded {} items from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub(crate) fn from_json_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            bail!("empty file");
        }
        let doc: BTreeMap<String, Value> = serde_json::from_str(text).context("parse failed")?;

        let mut items = Items::new();
        let mut issues = Vec::new();
        for (cat_name, cat_items) in doc {
            let category = match cat_name.parse::<Category>() {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("skipping category: {e}");
                    issues.push(format!("{cat_name}: unknown category"));
                    continue;
                }
            };
            let Value::Object(entries) = cat_items else {
                issues.push(format!("{cat_name}: expected an object of items"));
                continue;
            };
            for (item_id, raw) in entries {
                match serde_json::from_value::<RawItem>(raw) {
                    Ok(raw) => {
                        let def = convert_raw(category, &item_id, raw, &mut issues);
                        items.entry(category).or_default().insert(item_id, def);
                    }
                    Err(e) => {
                        log::warn!("error loading item {category}.{item_id}: {e}");
                        issues.push(format!("{category}.{item_id}: {e}"));
                    }
                }
            }
        }

        if items.values().all(|c| c.is_empty()) {
            bail!("no usable items");
        }
        Ok(Self {
            items,
            load_issues: issues,
        })
    }

    pub(crate) fn builtin() -> Self {
        let mut items = Items::new();
        let food = items.entry(Category::Food).or_default();
        food.insert(
            "kibble".into(),
            ItemDefinition::new(
                "Kibble",
                "Basic pet food",
                &[("hunger", 15.0), ("affection", 2.0)],
                300,
            ),
        );
        food.insert(
            "premium_food".into(),
            ItemDefinition::new(
                "Premium Food",
                "High quality pet food",
                &[("hunger", 25.0), ("happiness", 5.0), ("affection", 5.0)],
                600,
            ),
        );
        let cleaning = items.entry(Category::Cleaning).or_default();
        cleaning.insert(
            "soap".into(),
            ItemDefinition::new(
                "Soap",
                "Basic cleaning soap",
                &[("hygiene", 20.0), ("affection", 1.0)],
                600,
            ),
        );
        cleaning.insert(
            "shampoo".into(),
            ItemDefinition::new(
                "Shampoo",
                "Premium pet shampoo",
                &[("hygiene", 35.0), ("happiness", 3.0), ("affection", 3.0)],
                900,
            ),
        );
        let toys = items.entry(Category::Toys).or_default();
        toys.insert(
            "ball".into(),
            ItemDefinition::new(
                "Ball",
                "A simple bouncy ball",
                &[("happiness", 15.0), ("energy", -5.0), ("affection", 3.0)],
                300,
            ),
        );
        toys.insert(
            "puzzle".into(),
            ItemDefinition::new(
                "Puzzle Toy",
                "Mental stimulation toy",
                &[
                    ("happiness", 20.0),
                    ("mood", 10.0),
                    ("energy", -3.0),
                    ("affection", 5.0),
                ],
                900,
            ),
        );
        Self {
            items,
            load_issues: Vec::new(),
        }
    }

    pub(crate) fn get(&self, category: Category, item_id: &str) -> Option<&ItemDefinition> {
        self.items.get(&category)?.get(item_id)
    }

    pub(crate) fn category_items(
        &self,
        category: Category,
    ) -> impl Iterator<Item = (&str, &ItemDefinition)> {
        self.items
            .get(&category)
            .into_iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub(crate) fn item_ids(&self, category: Category) -> Vec<&str> {
        self.category_items(category).map(|(id, _)| id).collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Category, &str, &ItemDefinition)> {
        self.items
            .iter()
            .flat_map(|(c, m)| m.iter().map(move |(id, def)| (*c, id.as_str(), def)))
    }

    pub(crate) fn len(&self) -> usize {
        self.items.values().map(|m| m.len()).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Case-insensitive substring match on name, description or id.
    pub(crate) fn search(&self, term: &str) -> ItemCatalog {
        let needle = term.to_lowercase();
        let mut items = Items::new();
        for (category, id, def) in self.iter() {
            let hit = def.name.to_lowercase().contains(&needle)
                || def.description.to_lowercase().contains(&needle)
                || id.to_lowercase().contains(&needle);
            if hit {
                items
                    .entry(category)
                    .or_default()
                    .insert(id.to_string(), def.clone());
            }
        }
        ItemCatalog {
            items,
            load_issues: Vec::new(),
        }
    }

    pub(crate) fn item_info(&self, category: Category, item_id: &str) -> Option<String> {
        let item = self.get(category, item_id)?;
        let mut lines = vec![
            item.name.clone(),
            format!("Description: {}", item.description),
            format!("Cooldown: {}s", item.cooldown_s),
        ];
        if !item.effects.is_empty() {
            let effects: Vec<String> = item
                .effects
                .iter()
                .map(|(stat, v)| {
                    let sign = if *v > 0.0 { "+" } else { "" };
                    format!("{stat} {sign}{v}")
                })
                .collect();
            lines.push(format!("Effects: {}", effects.join(", ")));
        }
        Some(lines.join("\n"))
    }

    /// Authoring checks. Not used by the simulation itself.
    pub(crate) fn validate(&self) -> Vec<String> {
        let mut issues = self.load_issues.clone();
        for (category, id, item) in self.iter() {
            if item.name.trim().is_empty() {
                issues.push(format!("{category}.{id}: Empty name"));
            }
            if item.description.trim().is_empty() {
                issues.push(format!("{category}.{id}: Empty description"));
            }
            if item.cooldown_s < 0 {
                issues.push(format!("{category}.{id}: Negative cooldown"));
            } else if chrono::Duration::try_seconds(item.cooldown_s).is_none() {
                issues.push(format!("{category}.{id}: Cooldown out of range"));
            }
            for (stat, value) in &item.effects {
                if !value.is_finite() {
                    issues.push(format!("{category}.{id}: Invalid effect value for {stat}"));
                } else if stat.parse::<Stat>().is_err() {
                    issues.push(format!("{category}.{id}: Unknown stat '{stat}' has no effect"));
                }
            }
        }
        issues
    }

    pub(crate) fn add_item(&mut self, category: Category, item_id: &str, item: ItemDefinition) {
        self.items
            .entry(category)
            .or_default()
            .insert(item_id.to_string(), item);
    }

    pub(crate) fn remove_item(&mut self, category: Category, item_id: &str) -> bool {
        let Some(cat) = self.items.get_mut(&category) else {
            return false;
        };
        let removed = cat.remove(item_id).is_some();
        if cat.is_empty() {
            self.items.remove(&category);
        }
        removed
    }

    pub(crate) fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_json_atomic(path, &self.items)
    }
}

fn convert_raw(
    category: Category,
    item_id: &str,
    raw: RawItem,
    issues: &mut Vec<String>,
) -> ItemDefinition {
    let mut effects = BTreeMap::new();
    for (stat, value) in raw.effects {
        match value.as_f64() {
            Some(v) => {
                effects.insert(stat, v);
            }
            None => {
                log::warn!("{category}.{item_id}: dropping non-numeric effect {stat}={value}");
                issues.push(format!("{category}.{item_id}: Invalid effect value for {stat}"));
            }
        }
    }
    ItemDefinition {
        name: raw.name,
        description: raw.description,
        effects,
        cooldown_s: raw.cooldown_s,
    }
}
