use crate::boss::model::{Board, BossCategory, BossDefinition};

const GUILD_FLOORS: std::ops::RangeInclusive<u8> = 1..=5;
const GUILD_CLASSES: [&str; 4] = ["Warlord", "Berserker", "Skald", "Volva"];
const INTER_RESPAWN_HOURS: u32 = 8;
const NORMAL_RESPAWN_HOURS: u32 = 2;
const SERVER_RESPAWN_HOURS: u32 = 12;

const SERVER_BOSSES: [(&str, &str); 4] = [
    ("server-chaos-3f", "Temple of Chaos 3F Normal"),
    ("server-crossroads", "Crossroads of Ragnarok"),
    ("server-vale", "Vale of Ragnarok"),
    ("server-canyon-4f", "Canyon of the World Tree 4F"),
];

/// Static boss configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Roster {
    bosses: Vec<BossDefinition>,
}

impl Roster {
    pub fn builtin() -> Self {
        let mut bosses = Vec::with_capacity(GUILD_FLOORS.len() * GUILD_CLASSES.len() * 2 + 4);
        for (category, hours) in [
            (BossCategory::Inter, INTER_RESPAWN_HOURS),
            (BossCategory::Normal, NORMAL_RESPAWN_HOURS),
        ] {
            for floor in GUILD_FLOORS {
                for class in GUILD_CLASSES {
                    bosses.push(BossDefinition {
                        id: format!(
                            "{}-{floor}-{}",
                            category.label().to_ascii_lowercase(),
                            class.to_ascii_lowercase()
                        ),
                        name: class.to_string(),
                        floor: Some(floor),
                        category,
                        respawn_hours: hours,
                    });
                }
            }
        }
        for (id, name) in SERVER_BOSSES {
            bosses.push(BossDefinition {
                id: id.to_string(),
                name: name.to_string(),
                floor: None,
                category: BossCategory::Server,
                respawn_hours: SERVER_RESPAWN_HOURS,
            });
        }
        Self { bosses }
    }

    pub fn get(&self, id: &str) -> Option<&BossDefinition> {
        self.bosses.iter().find(|boss| boss.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BossDefinition> {
        self.bosses.iter()
    }

    /// `None` selects every board.
    pub fn on_board(&self, board: Option<Board>) -> impl Iterator<Item = &BossDefinition> {
        self.bosses
            .iter()
            .filter(move |boss| board.is_none_or(|board| boss.category.board() == board))
    }

    pub fn len(&self) -> usize {
        self.bosses.len()
    }
}
