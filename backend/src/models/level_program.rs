use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use uuid::Uuid;

use super::{text_enum, UserSummary, Voter};

text_enum! {
    ProgramLevel: "level" {
        State => "State",
        District => "District",
        City => "City",
        Village => "Village",
        Area => "Area",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyStrength {
    #[serde(default)]
    pub bjp: i64,
    #[serde(default)]
    pub congress: i64,
    #[serde(default)]
    pub aap: i64,
    #[serde(default)]
    pub neutral: i64,
}

impl PartyStrength {
    /// Folds `(political_preference, count)` groups into the tracked parties.
    /// A missing preference counts as neutral; untracked parties are dropped.
    pub fn from_groups<'a, I>(groups: I) -> Self
    where
        I: IntoIterator<Item = (Option<&'a str>, i64)>,
    {
        let mut strength = Self::default();
        for (preference, count) in groups {
            let key = preference
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| "neutral".to_string());
            match key.as_str() {
                "bjp" => strength.bjp += count,
                "congress" => strength.congress += count,
                "aap" => strength.aap += count,
                "neutral" => strength.neutral += count,
                _ => {}
            }
        }
        strength
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct LevelProgram {
    pub id: Uuid,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub level: ProgramLevel,
    pub parent_id: Option<Uuid>,
    pub area: Option<String>,
    pub supervisor: Option<Uuid>,
    pub karyakartas: Vec<Uuid>,
    pub supporters: Vec<Uuid>,
    pub party_strength: Json<PartyStrength>,
    pub tasks: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub supervisor_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLevelProgramRequest {
    pub name: String,
    pub level: ProgramLevel,
    pub parent_id: Option<Uuid>,
    pub area: Option<String>,
    pub supervisor: Option<Uuid>,
    #[serde(default)]
    pub karyakartas: Vec<Uuid>,
    #[serde(default)]
    pub supporters: Vec<Uuid>,
    #[serde(default)]
    pub party_strength: PartyStrength,
    #[serde(default)]
    pub tasks: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateLevelProgramRequest {
    pub name: Option<String>,
    pub level: Option<ProgramLevel>,
    pub parent_id: Option<Uuid>,
    pub area: Option<String>,
    pub supervisor: Option<Uuid>,
    pub karyakartas: Option<Vec<Uuid>>,
    pub supporters: Option<Vec<Uuid>>,
    pub party_strength: Option<PartyStrength>,
    pub tasks: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct AreaSummary {
    pub area: String,
    pub supervisors: Vec<UserSummary>,
    pub karyakartas: Vec<UserSummary>,
    pub supporters: Vec<Voter>,
    pub party_strength: PartyStrength,
}
