use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipStats {
    pub total: u32,
    /// Net change since the start of the program year.
    pub change: i64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubStats {
    pub total: u32,
    pub active: u32,
    pub suspended: u32,
    pub ineligible: u32,
    pub low: u32,
    pub distinguished: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationStats {
    pub total_awards: u32,
    #[serde(default)]
    pub by_type: BTreeMap<String, u32>,
}

/// Statistics snapshot for one district as of one date.
///
/// Supplied by the collection pipeline; this crate only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictStatistics {
    pub district_id: String,
    pub as_of_date: NaiveDate,
    pub membership: MembershipStats,
    pub clubs: ClubStats,
    pub education: EducationStats,
}

impl DistrictStatistics {
    pub fn new(district_id: impl Into<String>, as_of_date: NaiveDate) -> Self {
        Self {
            district_id: district_id.into(),
            as_of_date,
            membership: MembershipStats::default(),
            clubs: ClubStats::default(),
            education: EducationStats::default(),
        }
    }

    pub fn with_membership(mut self, total: u32) -> Self {
        self.membership.total = total;
        self
    }

    pub fn with_clubs(mut self, total: u32, distinguished: u32) -> Self {
        self.clubs.total = total;
        self.clubs.active = total;
        self.clubs.distinguished = distinguished;
        self
    }

    pub fn with_awards(mut self, total_awards: u32) -> Self {
        self.education.total_awards = total_awards;
        self
    }
}
