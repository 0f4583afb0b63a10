use crate::model::PetStats;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_WORDS: usize = 12;

/// What the pet does while it talks. Each tag has a face in the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) enum PetAction {
    #[default]
    Smile,
    Laugh,
    Blush,
    Heart,
    Wave,
    Wiggle,
    Jump,
    Eat,
    Clean,
    Play,
    Nap,
    Sleeping,
    Sad,
    Cry,
    Sick,
    Heal,
    Confused,
    Think,
    Surprised,
    Thanks,
}

impl PetAction {
    pub(crate) const ALL: [PetAction; 20] = [
        PetAction::Smile,
        PetAction::Laugh,
        PetAction::Blush,
        PetAction::Heart,
        PetAction::Wave,
        PetAction::Wiggle,
        PetAction::Jump,
        PetAction::Eat,
        PetAction::Clean,
        PetAction::Play,
        PetAction::Nap,
        PetAction::Sleeping,
        PetAction::Sad,
        PetAction::Cry,
        PetAction::Sick,
        PetAction::Heal,
        PetAction::Confused,
        PetAction::Think,
        PetAction::Surprised,
        PetAction::Thanks,
    ];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            PetAction::Smile => "SMILE",
            PetAction::Laugh => "LAUGH",
            PetAction::Blush => "BLUSH",
            PetAction::Heart => "HEART",
            PetAction::Wave => "WAVE",
            PetAction::Wiggle => "WIGGLE",
            PetAction::Jump => "JUMP",
            PetAction::Eat => "EAT",
            PetAction::Clean => "CLEAN",
            PetAction::Play => "PLAY",
            PetAction::Nap => "NAP",
            PetAction::Sleeping => "SLEEPING",
            PetAction::Sad => "SAD",
            PetAction::Cry => "CRY",
            PetAction::Sick => "SICK",
            PetAction::Heal => "HEAL",
            PetAction::Confused => "CONFUSED",
            PetAction::Think => "THINK",
            PetAction::Surprised => "SURPRISED",
            PetAction::Thanks => "THANKS",
        }
    }

    /// Tags from a model are not trusted; anything unrecognised smiles.
    pub(crate) fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl fmt::Display for PetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PetAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        PetAction::ALL
            .into_iter()
            .find(|a| a.as_str() == upper)
            .ok_or_else(|| anyhow!("unknown pet action '{s}'"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PetReply {
    pub(crate) say: String,
    pub(crate) action: PetAction,
}

impl PetReply {
    /// Trims the text, substitutes "hi!" for nothing, and keeps at most
    /// twelve words.
    pub(crate) fn new(say: &str, action: PetAction) -> Self {
        let trimmed = say.trim();
        let say = if trimmed.is_empty() {
            "hi!".to_string()
        } else if trimmed.split_whitespace().count() > MAX_WORDS {
            trimmed
                .split_whitespace()
                .take(MAX_WORDS)
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            trimmed.to_string()
        };
        Self { say, action }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TimeOfDay {
    Morning,
    Day,
    Evening,
    Night,
}

impl TimeOfDay {
    pub(crate) fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Day,
            17..=20 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Day => "day",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

/// Everything a reply is allowed to look at.
#[derive(Clone, Debug)]
pub(crate) struct GameContext {
    pub(crate) stats: PetStats,
    /// Most recent last.
    pub(crate) recent_events: Vec<String>,
    pub(crate) last_user_input: String,
    pub(crate) time_of_day: TimeOfDay,
    pub(crate) pet_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_replies_are_cut_to_twelve_words() {
        let r = PetReply::new(
            "  one two three four five six seven eight nine ten eleven twelve thirteen  ",
            PetAction::Wave,
        );
        assert_eq!(r.say.split_whitespace().count(), 12);
        assert!(r.say.ends_with("twelve"));
    }

    #[test]
    fn blank_reply_becomes_hi() {
        assert_eq!(PetReply::new("   ", PetAction::Smile).say, "hi!");
        assert_eq!(PetReply::new(" yum ", PetAction::Eat).say, "yum");
    }

    #[test]
    fn unknown_actions_fall_back_to_smile() {
        assert_eq!(PetAction::parse_lenient("dance"), PetAction::Smile);
        assert_eq!(PetAction::parse_lenient("sleeping"), PetAction::Sleeping);
        assert_eq!(PetAction::ALL.len(), 20);
        let json = serde_json::to_string(&PetAction::Thanks).unwrap();
        assert_eq!(json, "\"THANKS\"");
    }

    #[test]
    fn hours_bucket_into_times_of_day() {
        assert_eq!(TimeOfDay::from_hour(4), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Day);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(21), TimeOfDay::Night);
    }
}
