//! Process-local store used by tests and by the server when no database is configured.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::error::SchedulingError;
use super::store::{CellSnapshot, SchedulingStore, SchedulingTx};
use super::types::{
    Attendee, AttendeeStatus, AvailabilitySlot, BlockedDate, CellKey, Closer, DateRange, Meeting,
    MeetingStatus, MeetingType,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    closers: HashMap<Uuid, Closer>,
    slots: Vec<AvailabilitySlot>,
    blocks: Vec<BlockedDate>,
    meetings: Vec<Meeting>,
    attendees: Vec<Attendee>,
}

impl Tables {
    fn hydrate(&self, meeting: &Meeting) -> Meeting {
        let mut meeting = meeting.clone();
        meeting.attendees = self
            .attendees
            .iter()
            .filter(|a| a.meeting_id == meeting.id)
            .cloned()
            .collect();
        meeting
    }

    fn meeting(&self, id: Uuid) -> Option<Meeting> {
        self.meetings
            .iter()
            .find(|m| m.id == id)
            .map(|m| self.hydrate(m))
    }

    fn attendee_mut(&mut self, id: Uuid) -> Result<&mut Attendee, SchedulingError> {
        self.attendees
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| SchedulingError::attendee(id))
    }

    fn sorted(&self, mut meetings: Vec<Meeting>) -> Vec<Meeting> {
        meetings.sort_by_key(|m| (m.scheduled_at, m.created_at));
        meetings.iter().map(|m| self.hydrate(m)).collect()
    }
}

/// `RwLock`-guarded tables. A transaction holds the write lock for its whole
/// run and works on a copy, so every cell is serialized and a failed closure
/// leaves the committed tables untouched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, SchedulingError> {
        self.tables
            .read()
            .map_err(|_| SchedulingError::Storage("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, SchedulingError> {
        self.tables
            .write()
            .map_err(|_| SchedulingError::Storage("memory store lock poisoned".to_string()))
    }
}

struct MemoryTx {
    tables: Tables,
}

impl SchedulingTx for MemoryTx {
    fn lock_cell(&mut self, _cell: &CellKey) -> Result<(), SchedulingError> {
        // the store-wide write lock already excludes every other writer
        Ok(())
    }

    fn cell_snapshot(&mut self, cell: &CellKey) -> Result<CellSnapshot, SchedulingError> {
        let closer = self
            .tables
            .closers
            .get(&cell.closer_id)
            .cloned()
            .ok_or_else(|| SchedulingError::closer(cell.closer_id))?;
        let slots = self
            .tables
            .slots
            .iter()
            .filter(|s| s.closer_id == cell.closer_id)
            .cloned()
            .collect();
        let blocks = self
            .tables
            .blocks
            .iter()
            .filter(|b| b.closer_id == cell.closer_id && b.date == cell.date())
            .cloned()
            .collect();
        let meetings = self
            .tables
            .meetings
            .iter()
            .filter(|m| m.cell() == *cell)
            .cloned()
            .collect();
        let meetings = self.tables.sorted(meetings);
        Ok(CellSnapshot {
            closer,
            slots,
            blocks,
            meetings,
        })
    }

    fn closer(&mut self, id: Uuid) -> Result<Option<Closer>, SchedulingError> {
        Ok(self.tables.closers.get(&id).cloned())
    }

    fn meeting(&mut self, id: Uuid) -> Result<Option<Meeting>, SchedulingError> {
        Ok(self.tables.meeting(id))
    }

    fn attendee(&mut self, id: Uuid) -> Result<Option<Attendee>, SchedulingError> {
        Ok(self.tables.attendees.iter().find(|a| a.id == id).cloned())
    }

    fn insert_meeting(&mut self, meeting: &Meeting) -> Result<(), SchedulingError> {
        let mut row = meeting.clone();
        row.attendees.clear();
        self.tables.meetings.push(row);
        Ok(())
    }

    fn insert_attendee(&mut self, attendee: &Attendee) -> Result<(), SchedulingError> {
        if !self.tables.meetings.iter().any(|m| m.id == attendee.meeting_id) {
            return Err(SchedulingError::meeting(attendee.meeting_id));
        }
        self.tables.attendees.push(attendee.clone());
        Ok(())
    }

    fn set_meeting_status(
        &mut self,
        id: Uuid,
        status: MeetingStatus,
    ) -> Result<(), SchedulingError> {
        let meeting = self
            .tables
            .meetings
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| SchedulingError::meeting(id))?;
        meeting.status = status;
        Ok(())
    }

    fn set_attendee_status(
        &mut self,
        id: Uuid,
        status: AttendeeStatus,
    ) -> Result<(), SchedulingError> {
        self.tables.attendee_mut(id)?.status = status;
        Ok(())
    }

    fn set_contract_paid_at(
        &mut self,
        id: Uuid,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<(), SchedulingError> {
        self.tables.attendee_mut(id)?.contract_paid_at = paid_at;
        Ok(())
    }
}

impl SchedulingStore for MemoryStore {
    fn closers(&self) -> Result<Vec<Closer>, SchedulingError> {
        let mut closers: Vec<Closer> = self.read()?.closers.values().cloned().collect();
        closers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(closers)
    }

    fn closer(&self, id: Uuid) -> Result<Option<Closer>, SchedulingError> {
        Ok(self.read()?.closers.get(&id).cloned())
    }

    fn availability(&self, closer_ids: &[Uuid]) -> Result<Vec<AvailabilitySlot>, SchedulingError> {
        Ok(self
            .read()?
            .slots
            .iter()
            .filter(|s| closer_ids.contains(&s.closer_id))
            .cloned()
            .collect())
    }

    fn blocked_dates(
        &self,
        closer_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<BlockedDate>, SchedulingError> {
        Ok(self
            .read()?
            .blocks
            .iter()
            .filter(|b| closer_ids.contains(&b.closer_id) && range.contains(b.date))
            .cloned()
            .collect())
    }

    fn meetings_between(
        &self,
        range: DateRange,
        meeting_type: Option<MeetingType>,
    ) -> Result<Vec<Meeting>, SchedulingError> {
        let tables = self.read()?;
        let meetings = tables
            .meetings
            .iter()
            .filter(|m| range.contains(m.scheduled_at.date()))
            .filter(|m| meeting_type.map_or(true, |t| m.meeting_type == t))
            .cloned()
            .collect();
        Ok(tables.sorted(meetings))
    }

    fn meetings_for_deals(
        &self,
        deal_ids: &[Uuid],
        meeting_type: MeetingType,
    ) -> Result<Vec<Meeting>, SchedulingError> {
        let tables = self.read()?;
        let linked = |m: &Meeting| {
            m.deal_id.is_some_and(|d| deal_ids.contains(&d))
                || tables.attendees.iter().any(|a| {
                    a.meeting_id == m.id && a.deal_id.is_some_and(|d| deal_ids.contains(&d))
                })
        };
        let meetings = tables
            .meetings
            .iter()
            .filter(|m| m.meeting_type == meeting_type && linked(m))
            .cloned()
            .collect();
        Ok(tables.sorted(meetings))
    }

    fn meeting(&self, id: Uuid) -> Result<Option<Meeting>, SchedulingError> {
        Ok(self.read()?.meeting(id))
    }

    fn attendee(&self, id: Uuid) -> Result<Option<Attendee>, SchedulingError> {
        Ok(self.read()?.attendees.iter().find(|a| a.id == id).cloned())
    }

    fn attendees_with_parent(&self, parent_id: Uuid) -> Result<Vec<Attendee>, SchedulingError> {
        Ok(self
            .read()?
            .attendees
            .iter()
            .filter(|a| a.parent_attendee_id == Some(parent_id))
            .cloned()
            .collect())
    }

    fn save_closer(&self, closer: &Closer) -> Result<(), SchedulingError> {
        self.write()?.closers.insert(closer.id, closer.clone());
        Ok(())
    }

    fn add_availability(&self, slot: &AvailabilitySlot) -> Result<bool, SchedulingError> {
        let mut tables = self.write()?;
        if tables.slots.contains(slot) {
            return Ok(false);
        }
        tables.slots.push(slot.clone());
        Ok(true)
    }

    fn remove_availability(&self, slot: &AvailabilitySlot) -> Result<bool, SchedulingError> {
        let mut tables = self.write()?;
        let before = tables.slots.len();
        tables.slots.retain(|s| s != slot);
        Ok(tables.slots.len() < before)
    }

    fn add_blocked_date(&self, block: &BlockedDate) -> Result<(), SchedulingError> {
        self.write()?.blocks.push(block.clone());
        Ok(())
    }

    fn remove_blocked_date(&self, id: Uuid) -> Result<bool, SchedulingError> {
        let mut tables = self.write()?;
        let before = tables.blocks.len();
        tables.blocks.retain(|b| b.id != id);
        Ok(tables.blocks.len() < before)
    }

    fn transaction<T, F>(&self, f: F) -> Result<T, SchedulingError>
    where
        F: FnOnce(&mut dyn SchedulingTx) -> Result<T, SchedulingError>,
    {
        let mut committed = self.write()?;
        let mut tx = MemoryTx {
            tables: committed.clone(),
        };
        let out = f(&mut tx)?;
        *committed = tx.tables;
        Ok(out)
    }
}
