//! Rule-based replies used whenever no model answers. Every choice inside a
//! list is taken from the caller's `variety` number, so the same inputs
//! always give the same reply.

use crate::model::PetStats;
use crate::reply::{GameContext, PetAction, PetReply, TimeOfDay};
use PetAction::*;

type Line = (&'static str, PetAction);

const SLEEPING_LINES: &[Line] = &[
    ("zzz...", Sleeping),
    ("sleeping...", Sleeping),
    ("dreams...", Nap),
];

const CRITICAL_HEALTH: &[Line] = &[
    ("feel sick...", Sick),
    ("not well", Cry),
    ("need help", Sick),
    ("ouch...", Sad),
];
const CRITICAL_HUNGER: &[Line] = &[
    ("so hungry...", Sad),
    ("need food!", Cry),
    ("tummy empty", Sad),
    ("starving!", Sick),
];
const CRITICAL_ENERGY: &[Line] = &[
    ("so tired...", Nap),
    ("need sleep", Sleeping),
    ("zzz...", Nap),
    ("sleepy time", Sleeping),
];
const CRITICAL_HYGIENE: &[Line] = &[
    ("need wash!", Sad),
    ("dirty pet", Cry),
    ("soap please", Confused),
    ("clean me?", Sad),
];

const LOW: &[Line] = &[
    ("need care", Sad),
    ("feeling down", Cry),
    ("help me?", Confused),
    ("not happy", Sad),
];
const OKAY: &[Line] = &[
    ("doing okay", Smile),
    ("hi there!", Wave),
    ("pet me?", Blush),
    ("how are you?", Think),
];
const GOOD: &[Line] = &[
    ("feeling good!", Smile),
    ("happy pet!", Heart),
    ("wiggle time!", Wiggle),
    ("play with me!", Play),
];
const EXCELLENT: &[Line] = &[
    ("amazing day!", Laugh),
    ("super happy!", Jump),
    ("best pet ever!", Heart),
    ("love you!", Blush),
];

// Checked in this order against the lowercased input.
const KEYWORDS: &[(&str, &[Line])] = &[
    (
        "feed",
        &[
            ("yummy food!", Eat),
            ("thank you!", Thanks),
            ("nom nom nom", Eat),
            ("delicious!", Smile),
        ],
    ),
    (
        "clean",
        &[
            ("much better!", Clean),
            ("sparkling!", Smile),
            ("thank you!", Thanks),
            ("so fresh!", Wiggle),
        ],
    ),
    (
        "play",
        &[
            ("fun time!", Play),
            ("yay play!", Jump),
            ("catch me!", Wiggle),
            ("more play!", Heart),
        ],
    ),
    (
        "pet",
        &[
            ("nice pets!", Blush),
            ("love pets!", Heart),
            ("more please!", Smile),
            ("purr purr", Wiggle),
        ],
    ),
    (
        "sleep",
        &[
            ("night night!", Nap),
            ("sweet dreams", Sleeping),
            ("zzz time", Nap),
            ("good night!", Smile),
        ],
    ),
    (
        "wake",
        &[
            ("morning!", Wave),
            ("good morning!", Smile),
            ("wake up!", Jump),
            ("new day!", Wiggle),
        ],
    ),
];

fn time_lines(t: TimeOfDay) -> &'static [Line] {
    match t {
        TimeOfDay::Morning => &[
            ("good morning!", Wave),
            ("new day!", Smile),
            ("morning time!", Wiggle),
        ],
        TimeOfDay::Day => &[
            ("nice day!", Smile),
            ("sunny day!", Jump),
            ("day time fun!", Play),
        ],
        TimeOfDay::Evening => &[
            ("evening time!", Wave),
            ("getting dark", Think),
            ("sunset nice", Smile),
        ],
        TimeOfDay::Night => &[
            ("night time", Nap),
            ("sleepy time", Sleeping),
            ("dark outside", Confused),
        ],
    }
}

fn pick(lines: &[Line], variety: u64) -> PetReply {
    let (say, action) = lines[(variety % lines.len() as u64) as usize];
    PetReply::new(say, action)
}

/// The most pressing need, if any stat is critical.
fn critical_lines(stats: &PetStats) -> Option<&'static [Line]> {
    if stats.health() < 30.0 {
        Some(CRITICAL_HEALTH)
    } else if stats.hunger() < 20.0 {
        Some(CRITICAL_HUNGER)
    } else if stats.energy() < 15.0 {
        Some(CRITICAL_ENERGY)
    } else if stats.hygiene() < 25.0 {
        Some(CRITICAL_HYGIENE)
    } else {
        None
    }
}

fn wellbeing_lines(stats: &PetStats) -> &'static [Line] {
    let avg = stats.wellbeing();
    if avg >= 80.0 {
        EXCELLENT
    } else if avg >= 60.0 {
        GOOD
    } else if avg >= 40.0 {
        OKAY
    } else {
        LOW
    }
}

pub(crate) fn reply(ctx: &GameContext, variety: u64) -> PetReply {
    let stats = &ctx.stats;
    if stats.sleeping {
        return pick(SLEEPING_LINES, variety);
    }
    if let Some(lines) = critical_lines(stats) {
        return pick(lines, variety);
    }

    let input = ctx.last_user_input.to_lowercase();
    if let Some((_, lines)) = KEYWORDS.iter().find(|(word, _)| input.contains(word)) {
        return pick(lines, variety);
    }

    // Three times in ten the time of day wins over the mood bucket.
    if variety % 10 < 3 {
        return pick(time_lines(ctx.time_of_day), variety / 10);
    }
    pick(wellbeing_lines(stats), variety / 10)
}

pub(crate) fn greeting(variety: u64) -> PetReply {
    pick(
        &[
            ("hello human!", Wave),
            ("hi there!", Smile),
            ("new friend!", Heart),
            ("wanna play?", Wiggle),
            ("pet me!", Blush),
        ],
        variety,
    )
}

pub(crate) fn error_response(variety: u64) -> PetReply {
    pick(
        &[
            ("confused...", Confused),
            ("don't understand", Think),
            ("what happened?", Surprised),
            ("oops!", Confused),
        ],
        variety,
    )
}

/// An idle musing shaped by whichever stats stand out.
pub(crate) fn random_thought(stats: &PetStats, variety: u64) -> PetReply {
    let mut thoughts: Vec<Line> = Vec::new();
    if stats.affection() > 70.0 {
        thoughts.extend([
            ("love my human!", Heart),
            ("best friend ever!", Blush),
            ("so much love!", Heart),
        ]);
    }
    if stats.happiness() > 70.0 {
        thoughts.extend([
            ("life is good!", Smile),
            ("feeling great!", Jump),
            ("happy happy!", Wiggle),
        ]);
    }
    if stats.energy() > 70.0 {
        thoughts.extend([
            ("full of energy!", Jump),
            ("ready to play!", Play),
            ("zoomies time!", Wiggle),
        ]);
    }
    if stats.hunger() < 40.0 {
        thoughts.extend([
            ("getting hungry...", Sad),
            ("need a snack", Think),
            ("tummy rumbling", Confused),
        ]);
    }
    if stats.energy() < 30.0 {
        thoughts.extend([
            ("feeling sleepy...", Nap),
            ("need a nap", Sleeping),
            ("tired pet", Sad),
        ]);
    }
    if thoughts.is_empty() {
        thoughts.extend([
            ("wondering...", Think),
            ("what's next?", Confused),
            ("thinking...", Think),
            ("nice day!", Smile),
        ]);
    }
    pick(&thoughts, variety)
}
