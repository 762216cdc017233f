use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::TimerRecord;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BossCategory {
    Normal,
    Inter,
    Server,
}

impl BossCategory {
    pub fn label(self) -> &'static str {
        match self {
            BossCategory::Normal => "Normal",
            BossCategory::Inter => "Inter",
            BossCategory::Server => "Server",
        }
    }

    pub fn board(self) -> Board {
        match self {
            BossCategory::Normal | BossCategory::Inter => Board::Guild,
            BossCategory::Server => Board::Server,
        }
    }
}

/// Which timer board a boss is shown on. The guild board sits behind the
/// board password; the server board is public.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    Guild,
    Server,
}

impl Board {
    pub fn is_gated(self) -> bool {
        matches!(self, Board::Guild)
    }

    pub fn slug(self) -> &'static str {
        match self {
            Board::Guild => "guild",
            Board::Server => "server",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct BossDefinition {
    pub id: String,
    pub name: String,
    pub floor: Option<u8>,
    pub category: BossCategory,
    pub respawn_hours: u32,
}

impl BossDefinition {
    pub fn respawn_duration(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.respawn_hours))
    }

    /// Name used in notification titles, e.g. `[Normal] Warlord - 1F`.
    pub fn display_identity(&self) -> String {
        match (self.category, self.floor) {
            (BossCategory::Server, _) | (_, None) => self.name.clone(),
            (category, Some(floor)) => {
                format!("[{}] {} - {floor}F", category.label(), self.name)
            }
        }
    }

    pub fn respawn_instant(&self, record: Option<&TimerRecord>) -> Option<DateTime<Utc>> {
        record?.respawn_instant(self.respawn_duration())
    }
}

impl fmt::Display for BossDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_identity())
    }
}
