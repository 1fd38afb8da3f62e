//! Shift eligibility, flexible time selection and volunteer scoring.
//!
//! Everything here is pure: callers load the shift, the volunteer's profile and their same-day
//! confirmed assignments, then ask [`assess`] for the ordered list of failed checks. Signup stops
//! at the first one; the validation endpoint reports all of them.
//!
//! Checks run in this order:
//!
//! 1. the shift is open,
//! 2. lead time (`TOO_LATE`),
//! 3. fixed seat still free (`SHIFT_TAKEN`),
//! 4. no overlap with the volunteer's confirmed assignments on the same UTC day, flexible
//!    bookings padded by a buffer on both sides (`TIME_CONFLICT`),
//! 5. flexible capacity (`CAPACITY_FULL`),
//! 6. flexible time selection (`INVALID_TIME_RANGE`),
//! 7. required job role (`REQUIREMENTS_NOT_MET`).

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};

use crate::{
    api::models::{
        assignments::AssignmentStatus,
        profiles::TimeOfDay,
        shifts::{Priority, RequirementMatch, ShiftStatus, SignupRequest, VolunteerStats},
    },
    config::SchedulingConfig,
    db::models::{assignments::AssignmentDBResponse, profiles::ProfileDBResponse, shifts::ShiftDBResponse},
    errors::{Error, RejectionBody, RejectionCode},
};

pub const DURATION_MISMATCH: &str = "duration doesn't match selected time range";

/// Booking thresholds taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct BookingRules {
    pub min_lead_time: Duration,
    pub flexible_buffer: Duration,
    pub duration_tolerance_hours: f64,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self::from(&SchedulingConfig::default())
    }
}

impl From<&SchedulingConfig> for BookingRules {
    fn from(config: &SchedulingConfig) -> Self {
        Self {
            min_lead_time: Duration::from_std(config.min_lead_time).unwrap_or(Duration::hours(2)),
            flexible_buffer: Duration::from_std(config.flexible_buffer).unwrap_or(Duration::minutes(15)),
            duration_tolerance_hours: config.duration_tolerance_hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub code: RejectionCode,
    pub reason: String,
}

impl Rejection {
    fn new(code: RejectionCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        Error::rejected(rejection.code, rejection.reason)
    }
}

impl From<Rejection> for RejectionBody {
    fn from(rejection: Rejection) -> Self {
        RejectionBody {
            reason: rejection.reason,
            code: rejection.code,
        }
    }
}

/// The concrete range a signup would book.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookedRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BookedRange {
    pub fn hours(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 3600.0
    }

    fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

#[derive(Debug, Clone)]
pub struct Assessment {
    pub range: BookedRange,
    pub rejections: Vec<Rejection>,
}

impl Assessment {
    pub fn is_eligible(&self) -> bool {
        self.rejections.is_empty()
    }

    /// The booking range, or the first failed check.
    pub fn into_result(self) -> Result<BookedRange, Rejection> {
        match self.rejections.into_iter().next() {
            Some(rejection) => Err(rejection),
            None => Ok(self.range),
        }
    }
}

/// Run every check and collect failures in order.
///
/// `same_day` is the volunteer's confirmed assignments starting on the booked range's UTC day;
/// anything else in the slice is ignored.
pub fn assess(
    shift: &ShiftDBResponse,
    profile: Option<&ProfileDBResponse>,
    request: &SignupRequest,
    same_day: &[AssignmentDBResponse],
    now: DateTime<Utc>,
    rules: &BookingRules,
) -> Assessment {
    let mut rejections = Vec::new();
    let selection = resolve_selection(shift, request);
    let range = match selection {
        Ok(Some(range)) if range.end > range.start => range,
        _ => BookedRange {
            start: shift.start_time,
            end: shift.end_time,
        },
    };

    if shift.status != ShiftStatus::Open {
        rejections.push(Rejection::new(RejectionCode::InvalidState, "shift is not open for signup"));
    }

    if shift.start_time - now < rules.min_lead_time {
        rejections.push(Rejection::new(
            RejectionCode::TooLate,
            format!(
                "shifts must be booked at least {} hours before they start",
                rules.min_lead_time.num_minutes() as f64 / 60.0
            ),
        ));
    }

    if !shift.is_flexible && shift.assigned_volunteer_id.is_some() {
        rejections.push(Rejection::new(RejectionCode::ShiftTaken, "shift already has a volunteer"));
    }

    let padded = if shift.is_flexible {
        BookedRange {
            start: range.start - rules.flexible_buffer,
            end: range.end + rules.flexible_buffer,
        }
    } else {
        range
    };
    let day = range.start.date_naive();
    if let Some(conflict) = same_day
        .iter()
        .filter(|a| a.status == AssignmentStatus::Confirmed && a.start_time.date_naive() == day)
        .find(|a| padded.overlaps(a.start_time, a.end_time))
    {
        rejections.push(Rejection::new(
            RejectionCode::TimeConflict,
            format!(
                "overlaps your assignment for '{}' ({} - {})",
                conflict.shift_title,
                conflict.start_time.format("%H:%M"),
                conflict.end_time.format("%H:%M")
            ),
        ));
    }

    if shift.is_flexible && shift.flexible_slots_used >= shift.flexible_slots {
        rejections.push(Rejection::new(RejectionCode::CapacityFull, "all flexible slots are taken"));
    }

    if shift.is_flexible {
        match selection {
            Err(rejection) => rejections.push(rejection),
            Ok(selected) => {
                if let Some(rejection) = check_selection(shift, selected.unwrap_or(range), request.duration, rules) {
                    rejections.push(rejection);
                }
            }
        }
    }

    if let Some(required) = shift.required_role.as_deref()
        && !holds_role(profile, required)
    {
        rejections.push(Rejection::new(
            RejectionCode::RequirementsNotMet,
            format!("shift requires the '{required}' role"),
        ));
    }

    Assessment { range, rejections }
}

/// First failed check, or the range to book.
pub fn evaluate(
    shift: &ShiftDBResponse,
    profile: Option<&ProfileDBResponse>,
    request: &SignupRequest,
    same_day: &[AssignmentDBResponse],
    now: DateTime<Utc>,
    rules: &BookingRules,
) -> Result<BookedRange, Rejection> {
    assess(shift, profile, request, same_day, now, rules).into_result()
}

/// Place the requested times of day on the shift's date. A window running past midnight puts
/// times earlier than its start on the following day. Fixed shifts ignore any selection.
fn resolve_selection(shift: &ShiftDBResponse, request: &SignupRequest) -> Result<Option<BookedRange>, Rejection> {
    if !shift.is_flexible {
        return Ok(None);
    }
    let (start, end) = match (request.start_time, request.end_time) {
        (None, None) => return Ok(None),
        (Some(start), Some(end)) => (start, end),
        _ => {
            return Err(Rejection::new(
                RejectionCode::InvalidTimeRange,
                "both start_time and end_time are required for a custom selection",
            ));
        }
    };

    Ok(Some(BookedRange {
        start: on_shift_date(shift, start),
        end: on_shift_date(shift, end),
    }))
}

fn on_shift_date(shift: &ShiftDBResponse, time: NaiveTime) -> DateTime<Utc> {
    let candidate = shift.start_time.date_naive().and_time(time).and_utc();
    let spans_midnight = shift.end_time.date_naive() > shift.start_time.date_naive();
    if spans_midnight && candidate < shift.start_time {
        candidate + Duration::days(1)
    } else {
        candidate
    }
}

fn check_selection(shift: &ShiftDBResponse, range: BookedRange, stated: Option<f64>, rules: &BookingRules) -> Option<Rejection> {
    let invalid = |reason: String| Some(Rejection::new(RejectionCode::InvalidTimeRange, reason));

    if range.start < shift.start_time || range.end > shift.end_time {
        return invalid(format!(
            "selected time must be within the shift window {} - {}",
            shift.start_time.format("%H:%M"),
            shift.end_time.format("%H:%M")
        ));
    }
    if range.end <= range.start {
        return invalid("end time must be after start time".to_string());
    }

    let hours = range.hours();
    if let Some(min) = shift.minimum_hours
        && hours < min
    {
        return invalid(format!("selection must be at least {min} hours"));
    }
    if let Some(max) = shift.maximum_hours
        && hours > max
    {
        return invalid(format!("selection must be at most {max} hours"));
    }
    if let Some(stated) = stated
        && (stated - hours).abs() > rules.duration_tolerance_hours
    {
        return invalid(DURATION_MISMATCH.to_string());
    }
    None
}

fn holds_role(profile: Option<&ProfileDBResponse>, required: &str) -> bool {
    profile.is_some_and(|p| p.roles.iter().any(|r| r.eq_ignore_ascii_case(required)))
}

/// Recompute a volunteer's running statistics from their full assignment history.
pub fn volunteer_stats(history: &[AssignmentDBResponse], now: DateTime<Utc>) -> VolunteerStats {
    let mut stats = VolunteerStats {
        total_shifts: history.len() as i64,
        ..Default::default()
    };

    for assignment in history {
        match assignment.status {
            AssignmentStatus::Confirmed if assignment.start_time > now => stats.open_shifts += 1,
            AssignmentStatus::Confirmed => {}
            AssignmentStatus::Completed => {
                stats.completed_shifts += 1;
                stats.lifetime_hours += assignment.hours_worked.unwrap_or(assignment.duration_hours);
            }
            AssignmentStatus::Cancelled => stats.cancelled_shifts += 1,
            AssignmentStatus::NoShow => stats.no_shows += 1,
        }
    }

    if stats.total_shifts > 0 {
        stats.reliability_score = stats.completed_shifts as f64 / stats.total_shifts as f64 * 100.0;
    }
    stats
}

/// Advisory notes shown alongside an eligibility report.
pub fn warnings(stats: &VolunteerStats, open_shift_threshold: i64) -> Vec<String> {
    let mut warnings = Vec::new();
    if stats.total_shifts >= 3 && stats.reliability_score < 70.0 {
        warnings.push(format!(
            "reliability score of {:.1}% is below 70%",
            stats.reliability_score
        ));
    }
    if stats.open_shifts >= open_shift_threshold {
        warnings.push(format!("volunteer already has {} upcoming shifts", stats.open_shifts));
    }
    warnings
}

pub fn requirement_match(shift: &ShiftDBResponse, profile: Option<&ProfileDBResponse>) -> RequirementMatch {
    let skills: &[String] = profile.map(|p| p.skills.as_slice()).unwrap_or_default();
    let (matched_skills, missing_skills) = shift
        .required_skills
        .iter()
        .cloned()
        .partition(|required| skills.iter().any(|s| s.eq_ignore_ascii_case(required)));

    RequirementMatch {
        required_role: shift.required_role.clone(),
        has_required_role: shift.required_role.as_deref().is_none_or(|r| holds_role(profile, r)),
        required_skills: shift.required_skills.clone(),
        matched_skills,
        missing_skills,
    }
}

/// How well a shift suits a volunteer. Starts at 50.
pub fn recommendation_score(shift: &ShiftDBResponse, profile: Option<&ProfileDBResponse>, now: DateTime<Utc>) -> i32 {
    let requirements = requirement_match(shift, profile);
    let mut score = 50;

    score += (requirements.matched_skills.len() as i32 * 10).min(30);
    if shift.required_role.is_some() && requirements.has_required_role {
        score += 10;
    }

    let until_start = shift.start_time - now;
    if until_start >= Duration::zero() {
        if until_start <= Duration::hours(48) {
            score += 20;
        } else if until_start <= Duration::days(7) {
            score += 10;
        }
    }
    if shift.priority == Priority::Urgent {
        score += 10;
    }

    let preferred = profile.and_then(|p| p.preferred_time_of_day);
    if preferred.is_some() && preferred == TimeOfDay::from_hour(shift.start_time.hour()) {
        score += 10;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::profiles::VolunteerStatus;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, day, hour, minute, 0).unwrap()
    }

    fn shift(start: DateTime<Utc>, end: DateTime<Utc>) -> ShiftDBResponse {
        ShiftDBResponse {
            id: Uuid::new_v4(),
            title: "Food bank".to_string(),
            description: None,
            location: None,
            required_role: None,
            required_skills: vec![],
            start_time: start,
            end_time: end,
            is_flexible: false,
            flexible_slots: 0,
            flexible_slots_used: 0,
            minimum_hours: None,
            maximum_hours: None,
            assigned_volunteer_id: None,
            priority: Priority::Normal,
            status: ShiftStatus::Open,
            created_by: None,
            created_at: start,
            updated_at: start,
        }
    }

    fn flexible(start: DateTime<Utc>, end: DateTime<Utc>, slots: i32) -> ShiftDBResponse {
        ShiftDBResponse {
            is_flexible: true,
            flexible_slots: slots,
            minimum_hours: Some(1.0),
            maximum_hours: Some(4.0),
            ..shift(start, end)
        }
    }

    fn assignment(start: DateTime<Utc>, end: DateTime<Utc>, status: AssignmentStatus) -> AssignmentDBResponse {
        AssignmentDBResponse {
            id: Uuid::new_v4(),
            shift_id: Uuid::new_v4(),
            shift_title: "Warehouse".to_string(),
            volunteer_id: Uuid::new_v4(),
            status,
            start_time: start,
            end_time: end,
            duration_hours: (end - start).num_minutes() as f64 / 60.0,
            is_flexible: false,
            hours_worked: None,
            cancelled_at: None,
            hours_notice: None,
            cancellation_reason: None,
            completed_at: None,
            created_at: start,
            updated_at: start,
        }
    }

    fn profile(roles: &[&str], skills: &[&str], preferred: Option<TimeOfDay>) -> ProfileDBResponse {
        ProfileDBResponse {
            user_id: Uuid::new_v4(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            roles: roles.iter().map(|s| s.to_string()).collect(),
            preferred_time_of_day: preferred,
            bio: None,
            emergency_contact: None,
            status: VolunteerStatus::Active,
            created_at: at(1, 0, 0),
            updated_at: at(1, 0, 0),
        }
    }

    fn select(start: &str, end: &str, duration: f64) -> SignupRequest {
        SignupRequest {
            start_time: NaiveTime::parse_from_str(start, "%H:%M").ok(),
            end_time: NaiveTime::parse_from_str(end, "%H:%M").ok(),
            duration: Some(duration),
        }
    }

    fn now() -> DateTime<Utc> {
        at(1, 8, 0)
    }

    #[test]
    fn test_flexible_selection_inside_window_is_booked() {
        let shift = flexible(at(10, 8, 0), at(10, 12, 0), 3);
        let range = evaluate(&shift, None, &select("09:00", "10:30", 1.5), &[], now(), &BookingRules::default()).unwrap();
        assert_eq!(range.start, at(10, 9, 0));
        assert_eq!(range.end, at(10, 10, 30));
        assert_eq!(range.hours(), 1.5);
    }

    #[test]
    fn test_stated_duration_must_match_selection() {
        let shift = flexible(at(10, 8, 0), at(10, 12, 0), 3);
        let rejection = evaluate(&shift, None, &select("09:00", "10:30", 1.0), &[], now(), &BookingRules::default()).unwrap_err();
        assert_eq!(rejection.code, RejectionCode::InvalidTimeRange);
        assert_eq!(rejection.reason, DURATION_MISMATCH);

        // within tolerance
        assert!(evaluate(&shift, None, &select("09:00", "10:30", 1.55), &[], now(), &BookingRules::default()).is_ok());
    }

    #[test]
    fn test_selection_bounds() {
        let shift = flexible(at(10, 8, 0), at(10, 12, 0), 3);
        let rules = BookingRules::default();
        let outside = evaluate(&shift, None, &select("07:30", "09:00", 1.5), &[], now(), &rules).unwrap_err();
        assert_eq!(outside.code, RejectionCode::InvalidTimeRange);

        let reversed = evaluate(&shift, None, &select("10:00", "09:00", 1.0), &[], now(), &rules).unwrap_err();
        assert_eq!(reversed.reason, "end time must be after start time");

        let too_short = evaluate(&shift, None, &select("09:00", "09:30", 0.5), &[], now(), &rules).unwrap_err();
        assert!(too_short.reason.contains("at least"));

        let half = SignupRequest {
            start_time: NaiveTime::from_hms_opt(9, 0, 0),
            ..Default::default()
        };
        assert_eq!(evaluate(&shift, None, &half, &[], now(), &rules).unwrap_err().code, RejectionCode::InvalidTimeRange);
    }

    #[test]
    fn test_flexible_without_selection_books_full_window_within_max() {
        let shift = flexible(at(10, 8, 0), at(10, 12, 0), 1);
        let range = evaluate(&shift, None, &SignupRequest::default(), &[], now(), &BookingRules::default()).unwrap();
        assert_eq!(range.hours(), 4.0);

        let long = flexible(at(10, 8, 0), at(10, 14, 0), 1);
        let rejection = evaluate(&long, None, &SignupRequest::default(), &[], now(), &BookingRules::default()).unwrap_err();
        assert!(rejection.reason.contains("at most"));
    }

    #[test]
    fn test_selection_across_midnight() {
        let shift = ShiftDBResponse {
            maximum_hours: Some(6.0),
            ..flexible(at(10, 20, 0), at(11, 2, 0), 2)
        };
        let range = evaluate(&shift, None, &select("23:00", "01:00", 2.0), &[], now(), &BookingRules::default()).unwrap();
        assert_eq!(range.start, at(10, 23, 0));
        assert_eq!(range.end, at(11, 1, 0));
    }

    #[test]
    fn test_too_late_inside_lead_time() {
        let shift = shift(at(1, 9, 30), at(1, 12, 0));
        let rejection = evaluate(&shift, None, &SignupRequest::default(), &[], now(), &BookingRules::default()).unwrap_err();
        assert_eq!(rejection.code, RejectionCode::TooLate);

        let later = shift_at_lead_boundary();
        assert!(evaluate(&later, None, &SignupRequest::default(), &[], now(), &BookingRules::default()).is_ok());
    }

    fn shift_at_lead_boundary() -> ShiftDBResponse {
        shift(at(1, 10, 0), at(1, 12, 0))
    }

    #[test]
    fn test_fixed_shift_taken() {
        let mut taken = shift(at(10, 8, 0), at(10, 12, 0));
        taken.assigned_volunteer_id = Some(Uuid::new_v4());
        let rejection = evaluate(&taken, None, &SignupRequest::default(), &[], now(), &BookingRules::default()).unwrap_err();
        assert_eq!(rejection.code, RejectionCode::ShiftTaken);
    }

    #[test]
    fn test_conflicts_use_buffer_for_flexible_bookings() {
        let existing = [assignment(at(10, 11, 0), at(10, 13, 0), AssignmentStatus::Confirmed)];
        let rules = BookingRules::default();

        // fixed 08:00-11:00 touches but does not overlap
        let fixed = shift(at(10, 8, 0), at(10, 11, 0));
        assert!(evaluate(&fixed, None, &SignupRequest::default(), &existing, now(), &rules).is_ok());

        // flexible 09:00-10:50 is pulled into the existing booking by the 15 minute buffer
        let flex = flexible(at(10, 8, 0), at(10, 12, 0), 2);
        let rejection = evaluate(&flex, None, &select("09:00", "10:50", 1.83), &existing, now(), &rules).unwrap_err();
        assert_eq!(rejection.code, RejectionCode::TimeConflict);
        assert!(rejection.reason.contains("Warehouse"));

        // cancelled and other-day assignments never conflict
        let ignored = [
            assignment(at(10, 9, 0), at(10, 10, 0), AssignmentStatus::Cancelled),
            assignment(at(11, 9, 0), at(11, 10, 0), AssignmentStatus::Confirmed),
        ];
        assert!(evaluate(&fixed, None, &SignupRequest::default(), &ignored, now(), &rules).is_ok());
    }

    #[test]
    fn test_capacity_full_after_last_slot() {
        let mut shift = flexible(at(10, 8, 0), at(10, 12, 0), 2);
        shift.flexible_slots_used = 2;
        let rejection = evaluate(&shift, None, &select("09:00", "10:00", 1.0), &[], now(), &BookingRules::default()).unwrap_err();
        assert_eq!(rejection.code, RejectionCode::CapacityFull);
    }

    #[test]
    fn test_required_role_checked_last_and_all_failures_reported() {
        let mut shift = flexible(at(1, 9, 0), at(1, 12, 0), 1);
        shift.flexible_slots_used = 1;
        shift.required_role = Some("driver".to_string());

        let assessment = assess(&shift, None, &select("09:00", "10:00", 3.0), &[], now(), &BookingRules::default());
        let codes: Vec<_> = assessment.rejections.iter().map(|r| r.code).collect();
        assert_eq!(
            codes,
            vec![
                RejectionCode::TooLate,
                RejectionCode::CapacityFull,
                RejectionCode::InvalidTimeRange,
                RejectionCode::RequirementsNotMet
            ]
        );

        let driver = profile(&["Driver"], &[], None);
        let ok_shift = ShiftDBResponse {
            required_role: Some("driver".to_string()),
            ..shift_at_lead_boundary()
        };
        assert!(evaluate(&ok_shift, Some(&driver), &SignupRequest::default(), &[], now(), &BookingRules::default()).is_ok());
    }

    #[test]
    fn test_cancelled_shift_is_not_bookable() {
        let mut closed = shift(at(10, 8, 0), at(10, 12, 0));
        closed.status = ShiftStatus::Cancelled;
        let rejection = evaluate(&closed, None, &SignupRequest::default(), &[], now(), &BookingRules::default()).unwrap_err();
        assert_eq!(rejection.code, RejectionCode::InvalidState);
    }

    #[test]
    fn test_volunteer_stats_from_history() {
        let mut done = assignment(at(1, 1, 0), at(1, 4, 0), AssignmentStatus::Completed);
        done.hours_worked = Some(2.5);
        let history = vec![
            done,
            assignment(at(1, 1, 0), at(1, 3, 0), AssignmentStatus::Completed),
            assignment(at(1, 1, 0), at(1, 3, 0), AssignmentStatus::Cancelled),
            assignment(at(1, 1, 0), at(1, 3, 0), AssignmentStatus::NoShow),
            assignment(at(5, 9, 0), at(5, 12, 0), AssignmentStatus::Confirmed),
        ];

        let stats = volunteer_stats(&history, now());
        assert_eq!(stats.total_shifts, 5);
        assert_eq!(stats.completed_shifts, 2);
        assert_eq!(stats.open_shifts, 1);
        assert_eq!(stats.lifetime_hours, 4.5);
        assert_eq!(stats.reliability_score, 40.0);

        let warnings = warnings(&stats, 1);
        assert_eq!(warnings.len(), 2);

        assert_eq!(volunteer_stats(&[], now()), VolunteerStats::default());
    }

    #[test]
    fn test_recommendation_score_components() {
        let mut target = shift(at(2, 9, 0), at(2, 12, 0));
        target.required_role = Some("driver".to_string());
        target.required_skills = vec!["first aid".to_string(), "lifting".to_string()];
        target.priority = Priority::Urgent;

        let volunteer = profile(&["driver"], &["first aid", "lifting", "cooking"], Some(TimeOfDay::Morning));
        // 50 + 20 skills + 10 role + 20 within 48h + 10 urgent + 10 morning
        assert_eq!(recommendation_score(&target, Some(&volunteer), now()), 120);

        let next_week = ShiftDBResponse {
            priority: Priority::Normal,
            required_role: None,
            required_skills: vec![],
            ..shift(at(6, 18, 0), at(6, 20, 0))
        };
        assert_eq!(recommendation_score(&next_week, Some(&volunteer), now()), 60);
        assert_eq!(recommendation_score(&next_week, None, at(1, 8, 0) - Duration::days(30)), 50);

        let requirements = requirement_match(&target, None);
        assert!(!requirements.has_required_role);
        assert_eq!(requirements.missing_skills.len(), 2);
    }

    #[test]
    fn test_skill_bonus_is_capped() {
        let mut target = shift(at(20, 3, 0), at(20, 4, 0));
        target.required_skills = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        let volunteer = profile(&[], &["a", "b", "c", "d", "e"], None);
        assert_eq!(recommendation_score(&target, Some(&volunteer), now()), 80);
    }
}
