//! Slot grid computation.
//!
//! The allocator is a deterministic fold over availability, blocks and the
//! meetings already booked for a date. It never fails: anomalies such as a
//! meeting sitting at a de-configured time or a slot holding more attendees
//! than its capacity are reported as data on the grid.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use super::availability::AvailabilityRegistry;
use super::blocked_dates::BlockedDateRegistry;
use super::error::SchedulingError;
use super::types::{weekday_index, CellKey, Closer, Meeting, MeetingType, Warning};
use crate::core::config::SchedulingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CellState {
    Blocked,
    Unconfigured,
    Full,
    Free { remaining: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotCell {
    pub closer_id: Uuid,
    pub time_of_day: NaiveTime,
    pub state: CellState,
    pub occupancy: u32,
    pub capacity: u32,
    /// At least one live meeting sits here; takes priority for selection.
    pub occupied: bool,
    pub primary_meeting_id: Option<Uuid>,
    pub meeting_ids: Vec<Uuid>,
}

impl SlotCell {
    /// Decides whether `seats` more attendees may be placed here.
    pub fn admit(&self, seats: u32, scheduled_at: NaiveDateTime) -> Result<(), SchedulingError> {
        let closer_id = self.closer_id;
        match self.state {
            CellState::Blocked => {
                return Err(SchedulingError::BlockedSlot {
                    closer_id,
                    scheduled_at,
                })
            }
            CellState::Unconfigured if self.meeting_ids.is_empty() => {
                return Err(SchedulingError::InvalidSlot {
                    closer_id,
                    scheduled_at,
                })
            }
            _ => {}
        }
        if self.occupancy + seats > self.capacity {
            return Err(SchedulingError::CapacityExceeded {
                closer_id,
                scheduled_at,
                occupancy: self.occupancy,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotGrid {
    pub date: NaiveDate,
    pub meeting_type: MeetingType,
    pub times: Vec<NaiveTime>,
    pub closer_ids: Vec<Uuid>,
    pub cells: Vec<SlotCell>,
    pub warnings: Vec<Warning>,
}

impl SlotGrid {
    pub fn cell(&self, closer_id: Uuid, time: NaiveTime) -> Option<&SlotCell> {
        self.cells
            .iter()
            .find(|c| c.closer_id == closer_id && c.time_of_day == time)
    }
}

pub struct GridInputs<'a> {
    pub date: NaiveDate,
    pub meeting_type: MeetingType,
    pub closers: &'a [Closer],
    pub availability: &'a AvailabilityRegistry,
    pub blocks: &'a BlockedDateRegistry,
    pub meetings: &'a [Meeting],
}

pub struct SlotAllocator<'a> {
    config: &'a SchedulingConfig,
}

impl<'a> SlotAllocator<'a> {
    pub fn new(config: &'a SchedulingConfig) -> Self {
        Self { config }
    }

    pub fn build_grid(&self, inputs: GridInputs<'_>) -> SlotGrid {
        let weekday = weekday_index(inputs.date);

        let mut by_cell: HashMap<(Uuid, NaiveTime), Vec<&Meeting>> = HashMap::new();
        for meeting in inputs.meetings {
            let cell = meeting.cell();
            if cell.date() != inputs.date {
                continue;
            }
            by_cell
                .entry((cell.closer_id, cell.time_of_day()))
                .or_default()
                .push(meeting);
        }

        let mut times: BTreeSet<NaiveTime> = BTreeSet::new();
        for closer in inputs.closers {
            times.extend(
                inputs
                    .availability
                    .slots_for(closer.id, weekday, inputs.meeting_type),
            );
        }
        times.extend(
            by_cell
                .iter()
                .filter(|(_, meetings)| meetings.iter().any(|m| !m.is_orphan()))
                .filter(|((closer_id, _), _)| inputs.closers.iter().any(|c| c.id == *closer_id))
                .map(|((_, time), _)| *time),
        );

        let mut cells = Vec::with_capacity(times.len() * inputs.closers.len());
        let mut warnings = Vec::new();
        for closer in inputs.closers {
            for time in &times {
                let meetings = by_cell
                    .get(&(closer.id, *time))
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let (cell, warning) = self.evaluate_cell(
                    closer,
                    inputs.meeting_type,
                    inputs.date,
                    *time,
                    inputs.availability,
                    inputs.blocks,
                    meetings,
                );
                cells.push(cell);
                warnings.extend(warning);
            }
        }

        SlotGrid {
            date: inputs.date,
            meeting_type: inputs.meeting_type,
            times: times.into_iter().collect(),
            closer_ids: inputs.closers.iter().map(|c| c.id).collect(),
            cells,
            warnings,
        }
    }

    /// Evaluates one (closer, time) cell against everything booked there, orphans included.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_cell(
        &self,
        closer: &Closer,
        meeting_type: MeetingType,
        date: NaiveDate,
        time: NaiveTime,
        availability: &AvailabilityRegistry,
        blocks: &BlockedDateRegistry,
        meetings: &[&Meeting],
    ) -> (SlotCell, Option<Warning>) {
        let capacity = closer.capacity(self.config);

        let mut live: Vec<&Meeting> = meetings.iter().copied().filter(|m| !m.is_orphan()).collect();
        // withdrawn meetings sort last, creation order otherwise
        live.sort_by_key(|m| (m.is_withdrawn(), m.created_at));

        let occupancy: u32 = live.iter().map(|m| m.seats_taken()).sum();

        let state = if blocks.is_blocked(closer.id, date, time) {
            CellState::Blocked
        } else if !availability.has_slot(closer.id, weekday_index(date), meeting_type, time) {
            CellState::Unconfigured
        } else if occupancy >= capacity {
            CellState::Full
        } else {
            CellState::Free {
                remaining: capacity - occupancy,
            }
        };

        let warning = (occupancy > capacity).then(|| {
            let message = format!(
                "slot {} {} for closer {} holds {} attendees over capacity {}",
                date, time, closer.name, occupancy, capacity
            );
            warn!("{message}");
            Warning::inconsistent(closer.id, message)
        });

        let cell = SlotCell {
            closer_id: closer.id,
            time_of_day: time,
            state,
            occupancy,
            capacity,
            occupied: !live.is_empty(),
            primary_meeting_id: live.first().map(|m| m.id),
            meeting_ids: live.iter().map(|m| m.id).collect(),
        };
        (cell, warning)
    }

    /// Cell evaluation for a booking target, used under the cell lock.
    pub fn evaluate_target(
        &self,
        closer: &Closer,
        target: &CellKey,
        availability: &AvailabilityRegistry,
        blocks: &BlockedDateRegistry,
        meetings: &[Meeting],
    ) -> SlotCell {
        let at_cell: Vec<&Meeting> = meetings.iter().filter(|m| m.cell() == *target).collect();
        let (cell, _) = self.evaluate_cell(
            closer,
            closer.meeting_type,
            target.date(),
            target.time_of_day(),
            availability,
            blocks,
            &at_cell,
        );
        cell
    }
}
