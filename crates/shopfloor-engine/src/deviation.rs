use chrono::{DateTime, Duration, Utc};

use shopfloor_core::ids::DeviationId;
use shopfloor_core::{DeviationEntry, DeviationKind, Operation, Transition, User};

const SECONDS_PER_DAY: i64 = 86_400;

/// Signed offset of `now` from the plan for this transition: positive when
/// late. A missing plan counts as on time.
pub fn offset_from_plan(op: &Operation, transition: Transition, now: DateTime<Utc>) -> Duration {
    let planned = match transition {
        Transition::Start => op.planned_start,
        Transition::End => op.planned_end,
    };
    planned.map(|p| now - p).unwrap_or_else(Duration::zero)
}

/// "N d H.HH h" for a non-negative magnitude.
pub fn format_magnitude(magnitude: Duration) -> String {
    let secs = magnitude.num_seconds().abs();
    let days = secs / SECONDS_PER_DAY;
    let hours = (secs % SECONDS_PER_DAY) as f64 / 3600.0;
    format!("{days} d {hours:.2} h")
}

/// Build the log entry for a transition made by `actor` at `now`.
pub fn describe(
    op: &Operation,
    order_name: &str,
    actor: &User,
    transition: Transition,
    now: DateTime<Utc>,
) -> DeviationEntry {
    let offset = offset_from_plan(op, transition, now);
    let kind = DeviationKind::classify(transition, offset > Duration::zero());
    let verb = match transition {
        Transition::Start => "started",
        Transition::End => "finished",
    };
    let direction = if kind.is_late() { "late" } else { "ahead of plan" };
    let description = format!(
        "Operation \"{}\" of order \"{}\" {verb} {direction} by {} (master: {})",
        op.name,
        order_name,
        format_magnitude(offset),
        actor.username,
    );

    DeviationEntry {
        id: DeviationId::new(),
        logged_at: now,
        actor: actor.id.clone(),
        description,
        kind,
        operation_id: op.id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::{at, planned};
    use shopfloor_core::ids::UserId;
    use shopfloor_core::Role;

    fn master() -> User {
        User {
            id: UserId::from_raw("usr_m"),
            username: "kuznetsov".into(),
            role: Role::Master,
        }
    }

    #[test]
    fn late_start_by_two_hours() {
        let op = planned("Milling", at(9, 0), 2);
        let entry = describe(&op, "Frame", &master(), Transition::Start, at(11, 0));
        assert_eq!(entry.kind, DeviationKind::LateStart);
        assert_eq!(
            entry.description,
            "Operation \"Milling\" of order \"Frame\" started late by 0 d 2.00 h (master: kuznetsov)"
        );
        assert_eq!(entry.logged_at, at(11, 0));
        assert_eq!(entry.actor.as_str(), "usr_m");
    }

    #[test]
    fn ahead_start_by_one_hour() {
        let op = planned("Milling", at(9, 0), 2);
        let entry = describe(&op, "Frame", &master(), Transition::Start, at(8, 0));
        assert_eq!(entry.kind, DeviationKind::AheadStart);
        assert!(entry.description.contains("ahead of plan by 0 d 1.00 h"));
    }

    #[test]
    fn end_compares_against_planned_end() {
        let op = planned("Milling", at(9, 0), 2);
        let late = describe(&op, "Frame", &master(), Transition::End, at(11, 30));
        assert_eq!(late.kind, DeviationKind::LateStop);
        assert!(late.description.contains("finished late by 0 d 0.50 h"));
        let early = describe(&op, "Frame", &master(), Transition::End, at(10, 0));
        assert_eq!(early.kind, DeviationKind::AheadStop);
    }

    #[test]
    fn exact_time_is_ahead_with_zero_magnitude() {
        let op = planned("Milling", at(9, 0), 2);
        let entry = describe(&op, "Frame", &master(), Transition::Start, at(9, 0));
        assert_eq!(entry.kind, DeviationKind::AheadStart);
        assert!(entry.description.contains("by 0 d 0.00 h"));
    }

    #[test]
    fn missing_plan_never_raises() {
        let mut op = planned("Milling", at(9, 0), 2);
        op.planned_start = None;
        let entry = describe(&op, "Frame", &master(), Transition::Start, at(23, 0));
        assert_eq!(entry.kind, DeviationKind::AheadStart);
    }

    #[test]
    fn multi_day_magnitude() {
        assert_eq!(format_magnitude(Duration::hours(51) + Duration::minutes(15)), "2 d 3.25 h");
        assert_eq!(format_magnitude(Duration::hours(-3)), "0 d 3.00 h");
    }
}
