use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::core::config::SchedulingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingType {
    R1,
    R2,
}

impl MeetingType {
    pub fn next_stage(self) -> Option<Self> {
        match self {
            Self::R1 => Some(Self::R2),
            Self::R2 => None,
        }
    }
}

impl std::fmt::Display for MeetingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::R1 => write!(f, "r1"),
            Self::R2 => write!(f, "r2"),
        }
    }
}

impl FromStr for MeetingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "r1" => Ok(Self::R1),
            "r2" => Ok(Self::R2),
            other => Err(format!("unknown meeting type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closer {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    pub active: bool,
    pub meeting_type: MeetingType,
    #[serde(default)]
    pub max_leads_per_slot: Option<u32>,
    #[serde(default)]
    pub daily_lead_quota: u32,
}

impl Closer {
    pub fn new(name: &str, meeting_type: MeetingType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: None,
            active: true,
            meeting_type,
            max_leads_per_slot: None,
            daily_lead_quota: 0,
        }
    }

    /// Seats per slot, falling back to the configured default when the record carries none.
    pub fn capacity(&self, config: &SchedulingConfig) -> u32 {
        self.max_leads_per_slot
            .unwrap_or(config.default_max_leads_per_slot)
    }
}

/// Weekday index used by availability records: 0 = Sunday .. 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Drops seconds and sub-second precision; slots have minute granularity.
pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub closer_id: Uuid,
    pub weekday: u8,
    pub time_of_day: NaiveTime,
}

impl AvailabilitySlot {
    pub fn new(closer_id: Uuid, weekday: u8, time_of_day: NaiveTime) -> Self {
        Self {
            closer_id,
            weekday,
            time_of_day: truncate_to_minute(time_of_day),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedDate {
    pub id: Uuid,
    pub closer_id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl BlockedDate {
    pub fn whole_day(closer_id: Uuid, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            closer_id,
            date,
            start_time: None,
            end_time: None,
            reason: None,
        }
    }

    pub fn range(closer_id: Uuid, date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start_time: Some(start),
            end_time: Some(end),
            ..Self::whole_day(closer_id, date)
        }
    }

    /// Whether this block removes the given time of day. A missing bound is open-ended.
    pub fn covers(&self, time: NaiveTime) -> bool {
        match (self.start_time, self.end_time) {
            (None, None) => true,
            (Some(start), Some(end)) => start <= time && time < end,
            (Some(start), None) => start <= time,
            (None, Some(end)) => time < end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Scheduled,
    Rescheduled,
    Completed,
    NoShow,
    Canceled,
    ContractPaid,
}

impl std::fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Rescheduled => write!(f, "rescheduled"),
            Self::Completed => write!(f, "completed"),
            Self::NoShow => write!(f, "no_show"),
            Self::Canceled => write!(f, "canceled"),
            Self::ContractPaid => write!(f, "contract_paid"),
        }
    }
}

impl FromStr for MeetingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "rescheduled" => Ok(Self::Rescheduled),
            "completed" => Ok(Self::Completed),
            "no_show" => Ok(Self::NoShow),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "contract_paid" => Ok(Self::ContractPaid),
            other => Err(format!("unknown meeting status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendeeStatus {
    Invited,
    Completed,
    NoShow,
    ContractPaid,
    Rescheduled,
    Canceled,
    Approved,
    Rejected,
    Refunded,
}

impl AttendeeStatus {
    pub const ALL: [Self; 9] = [
        Self::Invited,
        Self::Completed,
        Self::NoShow,
        Self::ContractPaid,
        Self::Rescheduled,
        Self::Canceled,
        Self::Approved,
        Self::Rejected,
        Self::Refunded,
    ];

    /// Statuses a sync process may never overwrite.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::ContractPaid | Self::NoShow | Self::Canceled
        )
    }

    /// Attendees in these statuses no longer occupy their slot.
    pub fn releases_seat(self) -> bool {
        matches!(self, Self::Canceled | Self::Rescheduled)
    }
}

impl std::fmt::Display for AttendeeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invited => write!(f, "invited"),
            Self::Completed => write!(f, "completed"),
            Self::NoShow => write!(f, "no_show"),
            Self::ContractPaid => write!(f, "contract_paid"),
            Self::Rescheduled => write!(f, "rescheduled"),
            Self::Canceled => write!(f, "canceled"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

impl FromStr for AttendeeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.to_string() == s)
            .or_else(|| (s == "cancelled").then_some(Self::Canceled))
            .ok_or_else(|| format!("unknown attendee status: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub deal_id: Option<Uuid>,
    pub name: String,
    pub phone: Option<String>,
    pub status: AttendeeStatus,
    pub parent_attendee_id: Option<Uuid>,
    pub is_partner: bool,
    pub contract_paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Attendee {
    pub fn invited(meeting_id: Uuid, input: &NewAttendee) -> Self {
        Self {
            id: Uuid::new_v4(),
            meeting_id,
            deal_id: input.deal_id,
            name: input.name.clone(),
            phone: input.phone.clone(),
            status: AttendeeStatus::Invited,
            parent_attendee_id: None,
            is_partner: input.is_partner,
            contract_paid_at: None,
            created_at: Utc::now(),
        }
    }

    /// Fresh placement of this person in another meeting, linked back to this record.
    pub fn reassigned_to(&self, meeting_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            meeting_id,
            status: AttendeeStatus::Invited,
            parent_attendee_id: Some(self.id),
            contract_paid_at: None,
            created_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn holds_seat(&self) -> bool {
        !self.status.releases_seat()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAttendee {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub deal_id: Option<Uuid>,
    #[serde(default)]
    pub is_partner: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    pub closer_id: Uuid,
    pub meeting_type: MeetingType,
    pub scheduled_at: NaiveDateTime,
    pub duration_minutes: u32,
    pub status: MeetingStatus,
    pub deal_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    /// Originator of the booking, checked against the authorized source list in metrics.
    pub booked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

impl Meeting {
    pub fn cell(&self) -> CellKey {
        CellKey::new(self.closer_id, self.scheduled_at)
    }

    pub fn seats_taken(&self) -> u32 {
        self.attendees.iter().filter(|a| a.holds_seat()).count() as u32
    }

    pub fn is_withdrawn(&self) -> bool {
        matches!(
            self.status,
            MeetingStatus::Canceled | MeetingStatus::Rescheduled
        )
    }

    /// Withdrawn and empty: kept for audit, invisible to capacity and the default grid.
    pub fn is_orphan(&self) -> bool {
        self.is_withdrawn() && self.seats_taken() == 0
    }
}

/// One (closer, date, time-of-day) unit of bookable capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub closer_id: Uuid,
    pub scheduled_at: NaiveDateTime,
}

impl CellKey {
    pub fn new(closer_id: Uuid, scheduled_at: NaiveDateTime) -> Self {
        Self {
            closer_id,
            scheduled_at: NaiveDateTime::new(
                scheduled_at.date(),
                truncate_to_minute(scheduled_at.time()),
            ),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.scheduled_at.date()
    }

    pub fn time_of_day(&self) -> NaiveTime {
        self.scheduled_at.time()
    }

    pub fn lock_key(&self) -> String {
        format!(
            "slot:{}:{}",
            self.closer_id,
            self.scheduled_at.format("%Y-%m-%dT%H:%M")
        )
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if end < start {
            return Err(format!("range end {end} is before start {start}"));
        }
        Ok(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> u32 {
        (self.end - self.start).num_days() as u32 + 1
    }
}

/// Opaque caller role supplied by the identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    Admin,
    #[default]
    Operator,
    Sync,
}

impl FromStr for CallerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" | "administrator" => Ok(Self::Admin),
            "operator" | "closer" | "sdr" => Ok(Self::Operator),
            "sync" | "system" => Ok(Self::Sync),
            other => Err(format!("unknown caller role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    InconsistentState,
    MissingLinkage,
}

/// Anomaly surfaced as data alongside a read result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub closer_id: Option<Uuid>,
    pub record_id: Option<Uuid>,
    pub message: String,
}

impl Warning {
    pub fn inconsistent(closer_id: Uuid, message: String) -> Self {
        Self {
            kind: WarningKind::InconsistentState,
            closer_id: Some(closer_id),
            record_id: None,
            message,
        }
    }

    pub fn missing_linkage(record_id: Uuid, message: String) -> Self {
        Self {
            kind: WarningKind::MissingLinkage,
            closer_id: None,
            record_id: Some(record_id),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_weekday_index_starts_on_sunday() {
        let sunday = NaiveDate::from_ymd_opt(2025, 6, 8).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        assert_eq!(weekday_index(sunday), 0);
        assert_eq!(weekday_index(tuesday), 2);
    }

    #[test]
    fn test_blocked_range_is_half_open() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let block = BlockedDate::range(Uuid::new_v4(), date, t(9, 0), t(12, 0));
        assert!(block.covers(t(9, 0)));
        assert!(block.covers(t(11, 59)));
        assert!(!block.covers(t(12, 0)));
        assert!(!block.covers(t(8, 59)));
        assert!(BlockedDate::whole_day(Uuid::new_v4(), date).covers(t(23, 30)));
    }

    #[test]
    fn test_attendee_status_roundtrips_through_display() {
        for status in AttendeeStatus::ALL {
            assert_eq!(status.to_string().parse::<AttendeeStatus>(), Ok(status));
        }
        assert_eq!("cancelled".parse(), Ok(AttendeeStatus::Canceled));
        assert!("paid".parse::<AttendeeStatus>().is_err());
    }

    #[test]
    fn test_cell_key_truncates_seconds() {
        let at = NaiveDate::from_ymd_opt(2025, 6, 10)
            .unwrap()
            .and_hms_opt(14, 0, 42)
            .unwrap();
        let cell = CellKey::new(Uuid::nil(), at);
        assert_eq!(cell.time_of_day(), t(14, 0));
        assert!(cell.lock_key().ends_with("2025-06-10T14:00"));
    }

    #[test]
    fn test_orphan_requires_withdrawn_and_empty() {
        let mut meeting = Meeting {
            id: Uuid::new_v4(),
            closer_id: Uuid::new_v4(),
            meeting_type: MeetingType::R1,
            scheduled_at: NaiveDate::from_ymd_opt(2025, 6, 10)
                .unwrap()
                .and_hms_opt(14, 0, 0)
                .unwrap(),
            duration_minutes: 30,
            status: MeetingStatus::Canceled,
            deal_id: None,
            contact_id: None,
            booked_by: None,
            created_at: Utc::now(),
            attendees: Vec::new(),
        };
        assert!(meeting.is_orphan());

        let mut attendee = Attendee::invited(meeting.id, &NewAttendee::default());
        meeting.attendees.push(attendee.clone());
        assert!(!meeting.is_orphan());

        attendee.status = AttendeeStatus::Canceled;
        meeting.attendees = vec![attendee];
        assert!(meeting.is_orphan());

        meeting.status = MeetingStatus::Scheduled;
        assert!(!meeting.is_orphan());
    }

    #[test]
    fn test_date_range_rejects_inverted_bounds() {
        let a = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();
        assert_eq!(DateRange::new(a, b).map(|r| r.days()), Ok(7));
        assert!(DateRange::new(b, a).is_err());
    }
}
