//! Usage meter model.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metered counter. Maps one-to-one onto a column of `organization_usage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageField {
    UsersCount,
    ProjectsCount,
    EnvironmentsCount,
    SchemasCount,
    TestRecordsCount,
    ApiRequestsCount,
}

impl UsageField {
    pub const ALL: [UsageField; 6] = [
        UsageField::UsersCount,
        UsageField::ProjectsCount,
        UsageField::EnvironmentsCount,
        UsageField::SchemasCount,
        UsageField::TestRecordsCount,
        UsageField::ApiRequestsCount,
    ];

    /// Column name. Only ever interpolated from this closed set.
    pub fn column(&self) -> &'static str {
        match self {
            UsageField::UsersCount => "users_count",
            UsageField::ProjectsCount => "projects_count",
            UsageField::EnvironmentsCount => "environments_count",
            UsageField::SchemasCount => "schemas_count",
            UsageField::TestRecordsCount => "test_records_count",
            UsageField::ApiRequestsCount => "api_requests_count",
        }
    }
}

/// Half-open usage period `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UsagePeriod {
    /// Calendar month containing `now`, in UTC.
    pub fn containing(now: DateTime<Utc>) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)?
            .and_hms_opt(0, 0, 0)?
            .and_utc();
        let end = start.checked_add_months(Months::new(1))?;
        Some(Self { start, end })
    }
}

/// Usage counters for one organization and one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrganizationUsage {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub users_count: i64,
    pub projects_count: i64,
    pub environments_count: i64,
    pub schemas_count: i64,
    pub test_records_count: i64,
    pub api_requests_count: i64,
    pub recorded_at: DateTime<Utc>,
}

impl OrganizationUsage {
    pub fn get(&self, field: UsageField) -> i64 {
        match field {
            UsageField::UsersCount => self.users_count,
            UsageField::ProjectsCount => self.projects_count,
            UsageField::EnvironmentsCount => self.environments_count,
            UsageField::SchemasCount => self.schemas_count,
            UsageField::TestRecordsCount => self.test_records_count,
            UsageField::ApiRequestsCount => self.api_requests_count,
        }
    }

    pub fn metrics(&self) -> UsageMetrics {
        UsageMetrics {
            users_count: self.users_count,
            projects_count: self.projects_count,
            environments_count: self.environments_count,
            schemas_count: self.schemas_count,
            test_records_count: self.test_records_count,
            api_requests_count: self.api_requests_count,
        }
    }
}

/// Counter values without row identity; zero when nothing was recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub users_count: i64,
    pub projects_count: i64,
    pub environments_count: i64,
    pub schemas_count: i64,
    pub test_records_count: i64,
    pub api_requests_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_is_the_calendar_month() {
        let now = Utc.with_ymd_and_hms(2025, 3, 17, 22, 45, 10).unwrap();
        let period = UsagePeriod::containing(now).unwrap();
        assert_eq!(period.start, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(period.end, Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn december_period_rolls_into_next_year() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        let period = UsagePeriod::containing(now).unwrap();
        assert_eq!(period.end, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn first_instant_belongs_to_new_period() {
        let boundary = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        let period = UsagePeriod::containing(boundary).unwrap();
        assert_eq!(period.start, boundary);
    }

    #[test]
    fn every_field_has_a_distinct_column() {
        let mut columns: Vec<_> = UsageField::ALL.iter().map(|f| f.column()).collect();
        columns.sort();
        columns.dedup();
        assert_eq!(columns.len(), UsageField::ALL.len());
    }
}
