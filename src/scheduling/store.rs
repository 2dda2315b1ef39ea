//! Storage contract consumed by the scheduling engine.
//!
//! Reads return owned snapshots and may lag behind concurrent writes. Every
//! mutation of bookings goes through [`SchedulingStore::transaction`]; inside
//! it, [`SchedulingTx::lock_cell`] serializes writers of the same
//! (closer, time) cell so the capacity check and the write commit together.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::SchedulingError;
use super::types::{
    Attendee, AttendeeStatus, AvailabilitySlot, BlockedDate, CellKey, Closer,
    DateRange, Meeting, MeetingStatus, MeetingType,
};

/// Everything needed to evaluate one cell, read inside the transaction.
#[derive(Debug, Clone)]
pub struct CellSnapshot {
    pub closer: Closer,
    pub slots: Vec<AvailabilitySlot>,
    pub blocks: Vec<BlockedDate>,
    pub meetings: Vec<Meeting>,
}

pub trait SchedulingTx {
    /// Holds the cell exclusively until the transaction ends.
    fn lock_cell(&mut self, cell: &CellKey) -> Result<(), SchedulingError>;

    /// Closer, availability, blocks and meetings (with attendees) for the cell.
    fn cell_snapshot(&mut self, cell: &CellKey) -> Result<CellSnapshot, SchedulingError>;

    fn closer(&mut self, id: Uuid) -> Result<Option<Closer>, SchedulingError>;
    fn meeting(&mut self, id: Uuid) -> Result<Option<Meeting>, SchedulingError>;
    fn attendee(&mut self, id: Uuid) -> Result<Option<Attendee>, SchedulingError>;

    /// Inserts the meeting row only; attendees are inserted one by one.
    fn insert_meeting(&mut self, meeting: &Meeting) -> Result<(), SchedulingError>;
    fn insert_attendee(&mut self, attendee: &Attendee) -> Result<(), SchedulingError>;
    fn set_meeting_status(&mut self, id: Uuid, status: MeetingStatus)
        -> Result<(), SchedulingError>;
    fn set_attendee_status(
        &mut self,
        id: Uuid,
        status: AttendeeStatus,
    ) -> Result<(), SchedulingError>;
    fn set_contract_paid_at(
        &mut self,
        id: Uuid,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<(), SchedulingError>;
}

pub trait SchedulingStore: Send + Sync {
    /// All closers ordered by name, then id.
    fn closers(&self) -> Result<Vec<Closer>, SchedulingError>;
    fn closer(&self, id: Uuid) -> Result<Option<Closer>, SchedulingError>;
    fn availability(&self, closer_ids: &[Uuid]) -> Result<Vec<AvailabilitySlot>, SchedulingError>;
    fn blocked_dates(
        &self,
        closer_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<BlockedDate>, SchedulingError>;

    /// Meetings scheduled inside the range, orphans included, ordered by
    /// scheduled time then creation.
    fn meetings_between(
        &self,
        range: DateRange,
        meeting_type: Option<MeetingType>,
    ) -> Result<Vec<Meeting>, SchedulingError>;

    /// Meetings of one type linked to any of the deals, through the meeting or
    /// one of its attendees, regardless of date.
    fn meetings_for_deals(
        &self,
        deal_ids: &[Uuid],
        meeting_type: MeetingType,
    ) -> Result<Vec<Meeting>, SchedulingError>;

    fn meeting(&self, id: Uuid) -> Result<Option<Meeting>, SchedulingError>;
    fn attendee(&self, id: Uuid) -> Result<Option<Attendee>, SchedulingError>;
    fn attendees_with_parent(&self, parent_id: Uuid) -> Result<Vec<Attendee>, SchedulingError>;

    fn save_closer(&self, closer: &Closer) -> Result<(), SchedulingError>;
    /// Returns false when the slot already existed.
    fn add_availability(&self, slot: &AvailabilitySlot) -> Result<bool, SchedulingError>;
    fn remove_availability(&self, slot: &AvailabilitySlot) -> Result<bool, SchedulingError>;
    fn add_blocked_date(&self, block: &BlockedDate) -> Result<(), SchedulingError>;
    fn remove_blocked_date(&self, id: Uuid) -> Result<bool, SchedulingError>;

    /// Runs `f` as one unit of work: all of its writes commit, or none do.
    fn transaction<T, F>(&self, f: F) -> Result<T, SchedulingError>
    where
        F: FnOnce(&mut dyn SchedulingTx) -> Result<T, SchedulingError>;
}
