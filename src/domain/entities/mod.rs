pub mod data_changes;
pub mod district_statistics;
pub mod reconciliation_job;
pub mod reconciliation_timeline;

pub use data_changes::{ClubCountChange, DataChanges, DistinguishedChange, MembershipChange};
pub use district_statistics::{ClubStats, DistrictStatistics, EducationStats, MembershipStats};
pub use reconciliation_job::{JobMetadata, JobStatus, ReconciliationJob, TriggeredBy};
pub use reconciliation_timeline::{
    ReconciliationEntry, ReconciliationTimeline, TimelinePhase, TimelineStatus,
};
