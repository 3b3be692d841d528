//! Subscription model.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Cancelled,
    Suspended,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "active" => SubscriptionStatus::Active,
            "cancelled" => SubscriptionStatus::Cancelled,
            "suspended" => SubscriptionStatus::Suspended,
            "expired" => SubscriptionStatus::Expired,
            _ => SubscriptionStatus::Pending,
        }
    }
}

/// Billing cycle. Determines period length and which plan price applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "yearly" => BillingCycle::Yearly,
            _ => BillingCycle::Monthly,
        }
    }

    fn months(&self) -> u32 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Yearly => 12,
        }
    }

    /// End of a period that starts at `start`. Clamps to the last day of the
    /// target month (Jan 31 + 1 month = Feb 28/29).
    pub fn period_end(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        start.checked_add_months(Months::new(self.months()))
    }
}

/// Subscription record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub plan_id: Uuid,
    pub external_subscription_id: String,
    pub status: String,
    pub billing_cycle: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_string(&self.status)
    }

    pub fn billing_cycle(&self) -> BillingCycle {
        BillingCycle::from_string(&self.billing_cycle)
    }

    /// Whether `reactivate` may bring this subscription back to `active`.
    pub fn reactivation_check(&self, now: DateTime<Utc>) -> Result<(), &'static str> {
        match self.status() {
            SubscriptionStatus::Active if self.cancel_at_period_end => Ok(()),
            SubscriptionStatus::Active => Err("Subscription is not scheduled for cancellation"),
            SubscriptionStatus::Cancelled if self.current_period_end > now => Ok(()),
            SubscriptionStatus::Cancelled => {
                Err("Subscription period has ended; create a new subscription")
            }
            SubscriptionStatus::Pending => Err("Subscription is pending activation"),
            SubscriptionStatus::Suspended | SubscriptionStatus::Expired => {
                Err("Subscription cannot be reactivated")
            }
        }
    }
}

/// Input for creating a subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub organization_id: Uuid,
    pub plan_id: Uuid,
    pub billing_cycle: BillingCycle,
    pub external_subscription_id: Option<String>,
    pub created_by: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn subscription(status: SubscriptionStatus, flagged: bool, end: DateTime<Utc>) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            external_subscription_id: "sub_123".to_string(),
            status: status.as_str().to_string(),
            billing_cycle: "monthly".to_string(),
            current_period_start: end - Duration::days(30),
            current_period_end: end,
            trial_end: None,
            cancel_at_period_end: flagged,
            cancelled_at: None,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn monthly_period_end_clamps_to_month_length() {
        let start = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();
        let end = BillingCycle::Monthly.period_end(start).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 2, 28, 12, 0, 0).unwrap());
    }

    #[test]
    fn yearly_period_end_adds_twelve_months() {
        let start = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        let end = BillingCycle::Yearly.period_end(start).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 2, 28, 0, 0, 0).unwrap());
    }

    #[test]
    fn flagged_active_subscription_can_be_reactivated() {
        let now = Utc::now();
        let sub = subscription(SubscriptionStatus::Active, true, now + Duration::days(10));
        assert!(sub.reactivation_check(now).is_ok());
    }

    #[test]
    fn unflagged_active_subscription_is_rejected() {
        let now = Utc::now();
        let sub = subscription(SubscriptionStatus::Active, false, now + Duration::days(10));
        assert!(sub.reactivation_check(now).is_err());
    }

    #[test]
    fn cancelled_subscription_reactivates_only_inside_paid_period() {
        let now = Utc::now();
        let inside = subscription(SubscriptionStatus::Cancelled, false, now + Duration::days(1));
        let elapsed = subscription(SubscriptionStatus::Cancelled, false, now - Duration::days(1));
        assert!(inside.reactivation_check(now).is_ok());
        assert!(elapsed.reactivation_check(now).is_err());
    }

    #[test]
    fn pending_and_terminal_statuses_are_rejected() {
        let now = Utc::now();
        for status in [
            SubscriptionStatus::Pending,
            SubscriptionStatus::Suspended,
            SubscriptionStatus::Expired,
        ] {
            let sub = subscription(status, true, now + Duration::days(5));
            assert!(sub.reactivation_check(now).is_err(), "{:?}", status);
        }
    }
}
