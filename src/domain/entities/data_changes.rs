use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const FIELD_MEMBERSHIP: &str = "membership";
pub const FIELD_MEMBERSHIP_CHANGE: &str = "membershipChange";
pub const FIELD_CLUB_COUNT: &str = "clubCount";
pub const FIELD_CLUB_STATUS: &str = "clubStatus";
pub const FIELD_DISTINGUISHED: &str = "distinguished";
pub const FIELD_EDUCATION: &str = "education";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipChange {
    pub previous: u32,
    pub current: u32,
    pub percent_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubCountChange {
    pub previous: u32,
    pub current: u32,
    pub absolute_change: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistinguishedChange {
    pub previous: u32,
    pub current: u32,
    pub percent_change: f64,
}

/// Differences between two statistics snapshots. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataChanges {
    pub has_changes: bool,
    pub changed_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub membership_change: Option<MembershipChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club_count_change: Option<ClubCountChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinguished_change: Option<DistinguishedChange>,
    pub timestamp: DateTime<Utc>,
    pub source_data_date: NaiveDate,
}

impl DataChanges {
    pub fn unchanged(timestamp: DateTime<Utc>, source_data_date: NaiveDate) -> Self {
        Self {
            has_changes: false,
            changed_fields: Vec::new(),
            membership_change: None,
            club_count_change: None,
            distinguished_change: None,
            timestamp,
            source_data_date,
        }
    }

    pub fn changed(&self, field: &str) -> bool {
        self.changed_fields.iter().any(|f| f == field)
    }
}
