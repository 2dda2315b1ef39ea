use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::allocator::{SlotAllocator, SlotCell};
use super::availability::AvailabilityRegistry;
use super::blocked_dates::BlockedDateRegistry;
use super::error::SchedulingError;
use super::lifecycle::{
    check_reschedule, check_transition, effective_status, rollup_meeting_status, AttendeeView,
};
use super::store::{CellSnapshot, SchedulingStore, SchedulingTx};
use super::types::{
    Attendee, AttendeeStatus, CallerRole, CellKey, Meeting, MeetingStatus, NewAttendee,
};
use crate::core::config::SchedulingConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSlotRequest {
    pub closer_id: Uuid,
    pub scheduled_at: NaiveDateTime,
    pub attendee: NewAttendee,
    #[serde(default)]
    pub deal_id: Option<Uuid>,
    #[serde(default)]
    pub contact_id: Option<Uuid>,
    #[serde(default)]
    pub booked_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingReceipt {
    pub meeting_id: Uuid,
    pub attendee_id: Uuid,
    pub created_meeting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum BookingTarget {
    Meeting(Uuid),
    Attendee(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub target: BookingTarget,
    pub new_closer_id: Uuid,
    pub new_scheduled_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reassignment {
    pub from_attendee_id: Uuid,
    pub to_attendee_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescheduleReceipt {
    pub meeting_id: Uuid,
    pub previous_meeting_id: Uuid,
    pub reassignments: Vec<Reassignment>,
}

struct MeetingMeta {
    deal_id: Option<Uuid>,
    contact_id: Option<Uuid>,
    booked_by: Option<String>,
}

/// Write side of the engine. Every operation runs as one store transaction
/// holding the lock of each cell it touches, and re-evaluates the cell with
/// the [`SlotAllocator`] under that lock before writing.
pub struct MeetingBookingService<S> {
    store: Arc<S>,
    config: SchedulingConfig,
}

impl<S: SchedulingStore> MeetingBookingService<S> {
    pub fn new(store: Arc<S>, config: SchedulingConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn book_slot(&self, request: BookSlotRequest) -> Result<BookingReceipt, SchedulingError> {
        if request.attendee.name.trim().is_empty() {
            return Err(SchedulingError::InvalidInput(
                "attendee name is required".to_string(),
            ));
        }
        let cell = CellKey::new(request.closer_id, request.scheduled_at);

        let receipt = self.store.transaction(|tx| {
            tx.lock_cell(&cell)?;
            let (snapshot, slot) = self.evaluate(tx, &cell)?;
            slot.admit(1, cell.scheduled_at).inspect_err(|e| {
                debug!("Refused booking at {}: {e}", cell.lock_key());
            })?;

            let meta = MeetingMeta {
                deal_id: request.deal_id.or(request.attendee.deal_id),
                contact_id: request.contact_id,
                booked_by: request.booked_by.clone(),
            };
            let (meeting_id, created_meeting) =
                self.open_meeting(tx, &snapshot, &slot, &cell, meta)?;
            let attendee = Attendee::invited(meeting_id, &request.attendee);
            tx.insert_attendee(&attendee)?;

            Ok(BookingReceipt {
                meeting_id,
                attendee_id: attendee.id,
                created_meeting,
            })
        })?;

        info!(
            "Booked attendee {} into meeting {} at {}",
            receipt.attendee_id,
            receipt.meeting_id,
            cell.lock_key()
        );
        Ok(receipt)
    }

    /// Appends to a booked meeting without consulting the slot grid; only
    /// the cell's capacity is re-checked.
    pub fn add_to_existing_meeting(
        &self,
        meeting_id: Uuid,
        attendee: NewAttendee,
    ) -> Result<Uuid, SchedulingError> {
        if attendee.name.trim().is_empty() {
            return Err(SchedulingError::InvalidInput(
                "attendee name is required".to_string(),
            ));
        }

        let attendee_id = self.store.transaction(|tx| {
            let cell = tx
                .meeting(meeting_id)?
                .ok_or_else(|| SchedulingError::meeting(meeting_id))?
                .cell();
            tx.lock_cell(&cell)?;
            let (snapshot, slot) = self.evaluate(tx, &cell)?;

            let meeting = snapshot
                .meetings
                .iter()
                .find(|m| m.id == meeting_id)
                .ok_or_else(|| SchedulingError::meeting(meeting_id))?;
            if meeting.is_withdrawn() {
                return Err(SchedulingError::InvalidInput(format!(
                    "meeting {meeting_id} is {}",
                    meeting.status
                )));
            }
            ensure_capacity(&slot, 1, &cell)?;

            let record = Attendee::invited(meeting_id, &attendee);
            tx.insert_attendee(&record)?;
            Ok(record.id)
        })?;

        info!("Added attendee {attendee_id} to meeting {meeting_id}");
        Ok(attendee_id)
    }

    /// Marks the old placement rescheduled and books the new one, atomically.
    pub fn reschedule(
        &self,
        request: RescheduleRequest,
    ) -> Result<RescheduleReceipt, SchedulingError> {
        let new_cell = CellKey::new(request.new_closer_id, request.new_scheduled_at);

        let receipt = self.store.transaction(|tx| {
            let source_id = self.resolve_meeting(tx, request.target)?;
            let source_cell = tx
                .meeting(source_id)?
                .ok_or_else(|| SchedulingError::meeting(source_id))?
                .cell();
            lock_in_order(tx, &[source_cell, new_cell])?;

            // re-read under the locks
            let source = tx
                .meeting(source_id)?
                .ok_or_else(|| SchedulingError::meeting(source_id))?;
            let movers: Vec<Attendee> = match request.target {
                BookingTarget::Attendee(id) => source
                    .attendees
                    .iter()
                    .filter(|a| a.id == id)
                    .cloned()
                    .collect(),
                BookingTarget::Meeting(_) => source
                    .attendees
                    .iter()
                    .filter(|a| a.holds_seat())
                    .cloned()
                    .collect(),
            };
            if movers.is_empty() {
                return Err(SchedulingError::InvalidInput(format!(
                    "meeting {source_id} has no attendees to reschedule"
                )));
            }

            for attendee in &movers {
                check_reschedule(effective_status(attendee))?;
                tx.set_attendee_status(attendee.id, AttendeeStatus::Rescheduled)?;
            }
            let still_seated = source
                .attendees
                .iter()
                .filter(|a| a.holds_seat() && !movers.iter().any(|m| m.id == a.id))
                .count();
            if still_seated == 0 {
                tx.set_meeting_status(source.id, MeetingStatus::Rescheduled)?;
            }

            // the new cell is evaluated after the old seats were released
            let (snapshot, slot) = self.evaluate(tx, &new_cell)?;
            slot.admit(movers.len() as u32, new_cell.scheduled_at)?;
            let meta = MeetingMeta {
                deal_id: source.deal_id,
                contact_id: source.contact_id,
                booked_by: source.booked_by.clone(),
            };
            let (meeting_id, _) = self.open_meeting(tx, &snapshot, &slot, &new_cell, meta)?;

            let mut reassignments = Vec::with_capacity(movers.len());
            for attendee in &movers {
                let placed = attendee.reassigned_to(meeting_id);
                tx.insert_attendee(&placed)?;
                reassignments.push(Reassignment {
                    from_attendee_id: attendee.id,
                    to_attendee_id: placed.id,
                });
            }

            Ok(RescheduleReceipt {
                meeting_id,
                previous_meeting_id: source.id,
                reassignments,
            })
        })?;

        info!(
            "Rescheduled {} attendee(s) from meeting {} to meeting {} at {}",
            receipt.reassignments.len(),
            receipt.previous_meeting_id,
            receipt.meeting_id,
            new_cell.lock_key()
        );
        Ok(receipt)
    }

    /// Soft-cancels an attendee or a whole meeting. Rows are never removed.
    pub fn cancel(&self, target: BookingTarget) -> Result<(), SchedulingError> {
        self.store.transaction(|tx| {
            let meeting_id = self.resolve_meeting(tx, target)?;
            let cell = tx
                .meeting(meeting_id)?
                .ok_or_else(|| SchedulingError::meeting(meeting_id))?
                .cell();
            tx.lock_cell(&cell)?;
            let meeting = tx
                .meeting(meeting_id)?
                .ok_or_else(|| SchedulingError::meeting(meeting_id))?;

            let leaving: Vec<&Attendee> = match target {
                BookingTarget::Attendee(id) => {
                    meeting.attendees.iter().filter(|a| a.id == id).collect()
                }
                BookingTarget::Meeting(_) => {
                    meeting.attendees.iter().filter(|a| a.holds_seat()).collect()
                }
            };
            for attendee in &leaving {
                check_transition(
                    effective_status(attendee),
                    AttendeeStatus::Canceled,
                    CallerRole::Operator,
                )?;
                tx.set_attendee_status(attendee.id, AttendeeStatus::Canceled)?;
            }

            let still_seated = meeting
                .attendees
                .iter()
                .filter(|a| a.holds_seat() && !leaving.iter().any(|l| l.id == a.id))
                .count();
            if still_seated == 0 {
                tx.set_meeting_status(meeting.id, MeetingStatus::Canceled)?;
            }
            Ok(())
        })?;

        info!("Canceled {target:?}");
        Ok(())
    }

    /// Explicit status change through the transition table for `role`.
    pub fn update_attendee_status(
        &self,
        attendee_id: Uuid,
        status: AttendeeStatus,
        role: CallerRole,
    ) -> Result<AttendeeView, SchedulingError> {
        let view = self.store.transaction(|tx| {
            let meeting_id = self.resolve_meeting(tx, BookingTarget::Attendee(attendee_id))?;
            let cell = tx
                .meeting(meeting_id)?
                .ok_or_else(|| SchedulingError::meeting(meeting_id))?
                .cell();
            tx.lock_cell(&cell)?;

            let current = tx
                .attendee(attendee_id)?
                .ok_or_else(|| SchedulingError::attendee(attendee_id))?;
            check_transition(effective_status(&current), status, role)?;

            if current.status.releases_seat() && !status.releases_seat() {
                let (_, slot) = self.evaluate(tx, &cell)?;
                ensure_capacity(&slot, 1, &cell)?;
            }
            tx.set_attendee_status(attendee_id, status)?;

            let meeting = tx
                .meeting(meeting_id)?
                .ok_or_else(|| SchedulingError::meeting(meeting_id))?;
            if meeting.seats_taken() == 0 {
                let withdrawn = if status == AttendeeStatus::Rescheduled {
                    MeetingStatus::Rescheduled
                } else {
                    MeetingStatus::Canceled
                };
                tx.set_meeting_status(meeting_id, withdrawn)?;
            } else if let Some(rollup) = rollup_meeting_status(&meeting) {
                tx.set_meeting_status(meeting_id, rollup)?;
            } else if meeting.is_withdrawn() {
                tx.set_meeting_status(meeting_id, MeetingStatus::Scheduled)?;
            }

            let updated = tx
                .attendee(attendee_id)?
                .ok_or_else(|| SchedulingError::attendee(attendee_id))?;
            Ok(AttendeeView::from(&updated))
        })?;

        info!(
            "Attendee {attendee_id} status set to {status} by {role:?} (effective {})",
            view.effective_status
        );
        Ok(view)
    }

    /// Stores an external payment signal; the stored status is left as is.
    pub fn record_payment(
        &self,
        attendee_id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> Result<AttendeeView, SchedulingError> {
        let view = self.store.transaction(|tx| {
            tx.attendee(attendee_id)?
                .ok_or_else(|| SchedulingError::attendee(attendee_id))?;
            tx.set_contract_paid_at(attendee_id, Some(paid_at))?;
            let updated = tx
                .attendee(attendee_id)?
                .ok_or_else(|| SchedulingError::attendee(attendee_id))?;
            Ok(AttendeeView::from(&updated))
        })?;
        info!("Recorded payment for attendee {attendee_id} at {paid_at}");
        Ok(view)
    }

    fn resolve_meeting(
        &self,
        tx: &mut dyn SchedulingTx,
        target: BookingTarget,
    ) -> Result<Uuid, SchedulingError> {
        match target {
            BookingTarget::Meeting(id) => Ok(id),
            BookingTarget::Attendee(id) => tx
                .attendee(id)?
                .map(|a| a.meeting_id)
                .ok_or_else(|| SchedulingError::attendee(id)),
        }
    }

    fn evaluate(
        &self,
        tx: &mut dyn SchedulingTx,
        cell: &CellKey,
    ) -> Result<(CellSnapshot, SlotCell), SchedulingError> {
        let snapshot = tx.cell_snapshot(cell)?;
        let availability =
            AvailabilityRegistry::new(std::slice::from_ref(&snapshot.closer), &snapshot.slots);
        let blocks = BlockedDateRegistry::new(&snapshot.blocks);
        let slot = SlotAllocator::new(&self.config).evaluate_target(
            &snapshot.closer,
            cell,
            &availability,
            &blocks,
            &snapshot.meetings,
        );
        Ok((snapshot, slot))
    }

    /// The cell's live primary meeting, or a fresh one when there is none.
    fn open_meeting(
        &self,
        tx: &mut dyn SchedulingTx,
        snapshot: &CellSnapshot,
        slot: &SlotCell,
        cell: &CellKey,
        meta: MeetingMeta,
    ) -> Result<(Uuid, bool), SchedulingError> {
        let live = slot
            .primary_meeting_id
            .and_then(|id| snapshot.meetings.iter().find(|m| m.id == id))
            .filter(|m| !m.is_withdrawn());
        if let Some(meeting) = live {
            return Ok((meeting.id, false));
        }

        let meeting = Meeting {
            id: Uuid::new_v4(),
            closer_id: cell.closer_id,
            meeting_type: snapshot.closer.meeting_type,
            scheduled_at: cell.scheduled_at,
            duration_minutes: self.config.default_meeting_minutes,
            status: MeetingStatus::Scheduled,
            deal_id: meta.deal_id,
            contact_id: meta.contact_id,
            booked_by: meta.booked_by,
            created_at: Utc::now(),
            attendees: Vec::new(),
        };
        tx.insert_meeting(&meeting)?;
        Ok((meeting.id, true))
    }
}

fn ensure_capacity(slot: &SlotCell, seats: u32, cell: &CellKey) -> Result<(), SchedulingError> {
    if slot.occupancy + seats > slot.capacity {
        return Err(SchedulingError::CapacityExceeded {
            closer_id: cell.closer_id,
            scheduled_at: cell.scheduled_at,
            occupancy: slot.occupancy,
            capacity: slot.capacity,
        });
    }
    Ok(())
}

/// Cell locks are always taken in key order so two transactions touching the
/// same pair of cells cannot deadlock.
fn lock_in_order(tx: &mut dyn SchedulingTx, cells: &[CellKey]) -> Result<(), SchedulingError> {
    let mut ordered: Vec<&CellKey> = cells.iter().collect();
    ordered.sort_by_key(|c| c.lock_key());
    ordered.dedup();
    for cell in ordered {
        tx.lock_cell(cell)?;
    }
    Ok(())
}
