//! Input metrics: EntityType, EntityKey, CharacterRole, ReleaseStatus, EntityMetrics

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Entity Identity
// ============================================================================

/// Kind of tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Character,
    Media,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Character => "character",
            EntityType::Media => "media",
        }
    }

    /// Single-byte tag used as the leading byte of storage keys.
    pub fn tag(&self) -> u8 {
        match self {
            EntityType::Character => b'c',
            EntityType::Media => b'm',
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identity of a scored entity (`character:42`, `media:7`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub entity_id: u64,
}

impl EntityKey {
    pub fn new(entity_type: EntityType, entity_id: u64) -> Self {
        Self { entity_type, entity_id }
    }

    pub fn character(entity_id: u64) -> Self {
        Self::new(EntityType::Character, entity_id)
    }

    pub fn media(entity_id: u64) -> Self {
        Self::new(EntityType::Media, entity_id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

// ============================================================================
// Categorical Inputs
// ============================================================================

/// Character role within its series. Anything unrecognised maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CharacterRole {
    Main,
    Supporting,
    Background,
    #[default]
    #[serde(other)]
    Unknown,
}

impl CharacterRole {
    /// Config table key for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            CharacterRole::Main => "MAIN",
            CharacterRole::Supporting => "SUPPORTING",
            CharacterRole::Background => "BACKGROUND",
            CharacterRole::Unknown => "UNKNOWN",
        }
    }
}

/// Release status of a media entity (or of a character's parent series).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseStatus {
    Releasing,
    Finished,
    NotYetReleased,
    Cancelled,
    Hiatus,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Releasing => "RELEASING",
            ReleaseStatus::Finished => "FINISHED",
            ReleaseStatus::NotYetReleased => "NOT_YET_RELEASED",
            ReleaseStatus::Cancelled => "CANCELLED",
            ReleaseStatus::Hiatus => "HIATUS",
        }
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// EntityMetrics
// ============================================================================

/// Raw popularity metrics for one entity, produced fresh each evaluation cycle.
///
/// Optional fields that are absent must never cause an evaluation failure;
/// every boost has a neutral or configured fallback for a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetrics {
    pub entity_id: u64,
    pub entity_type: EntityType,
    /// External favourites counter, the primary driver of the base score
    #[serde(default)]
    pub favourites: u64,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub role: CharacterRole,
    #[serde(default)]
    pub status: Option<ReleaseStatus>,
    /// Media format (TV, MOVIE, OVA, ...)
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub season_year: Option<i32>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Average user score, 0-100
    #[serde(default)]
    pub average_score: Option<f64>,
    /// Free text, only used for keyword matching
    #[serde(default)]
    pub series_name: Option<String>,
    #[serde(default)]
    pub popularity: u64,
}

impl EntityMetrics {
    /// Bare metrics record with every optional field absent.
    pub fn new(entity_type: EntityType, entity_id: u64, favourites: u64) -> Self {
        Self {
            entity_id,
            entity_type,
            favourites,
            gender: None,
            role: CharacterRole::Unknown,
            status: None,
            format: None,
            season_year: None,
            start_date: None,
            end_date: None,
            average_score: None,
            series_name: None,
            popularity: 0,
        }
    }

    pub fn character(entity_id: u64, favourites: u64) -> Self {
        Self::new(EntityType::Character, entity_id, favourites)
    }

    pub fn media(entity_id: u64, favourites: u64) -> Self {
        Self::new(EntityType::Media, entity_id, favourites)
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_key_display() {
        assert_eq!(EntityKey::character(42).to_string(), "character:42");
        assert_eq!(EntityKey::media(7).to_string(), "media:7");
    }

    #[test]
    fn test_unrecognised_role_maps_to_unknown() {
        let role: CharacterRole = serde_json::from_str("\"EXTRA\"").unwrap();
        assert_eq!(role, CharacterRole::Unknown);
        let role: CharacterRole = serde_json::from_str("\"MAIN\"").unwrap();
        assert_eq!(role, CharacterRole::Main);
    }

    #[test]
    fn test_metrics_deserialize_minimal() {
        let json = r#"{"entity_id": 5, "entity_type": "media"}"#;
        let m: EntityMetrics = serde_json::from_str(json).unwrap();
        assert_eq!(m.favourites, 0);
        assert_eq!(m.role, CharacterRole::Unknown);
        assert!(m.status.is_none());
        assert_eq!(m.key(), EntityKey::media(5));
    }

    #[test]
    fn test_status_wire_names() {
        let s: ReleaseStatus = serde_json::from_str("\"NOT_YET_RELEASED\"").unwrap();
        assert_eq!(s, ReleaseStatus::NotYetReleased);
        assert_eq!(s.as_str(), "NOT_YET_RELEASED");
    }
}
