use chrono::NaiveDate;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use super::allocator::{GridInputs, SlotAllocator, SlotGrid};
use super::availability::AvailabilityRegistry;
use super::blocked_dates::{validate_block, BlockedDateRegistry};
use super::booking::MeetingBookingService;
use super::error::SchedulingError;
use super::lifecycle::{AttendeeLineage, AttendeeView, MeetingView};
use super::store::SchedulingStore;
use super::types::{AvailabilitySlot, BlockedDate, Closer, DateRange, MeetingType};
use crate::core::config::AppConfig;
use crate::metrics::{CloserMetricsAggregator, CloserMetricsReport, MetricsInput};

/// Entry point used by the HTTP layer: read views, metrics and admin
/// configuration, plus the [`MeetingBookingService`] for booking writes.
pub struct SchedulingService<S> {
    store: Arc<S>,
    config: AppConfig,
    booking: MeetingBookingService<S>,
}

impl<S: SchedulingStore> SchedulingService<S> {
    pub fn new(store: Arc<S>, config: AppConfig) -> Self {
        let booking = MeetingBookingService::new(Arc::clone(&store), config.scheduling.clone());
        Self {
            store,
            config,
            booking,
        }
    }

    pub fn booking(&self) -> &MeetingBookingService<S> {
        &self.booking
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Grid for one date. An empty `closer_ids` selects every active closer of
    /// the meeting type; explicit ids keep their order.
    pub fn slot_grid(
        &self,
        date: NaiveDate,
        meeting_type: MeetingType,
        closer_ids: &[Uuid],
    ) -> Result<SlotGrid, SchedulingError> {
        let all = self.store.closers()?;
        let closers: Vec<Closer> = if closer_ids.is_empty() {
            all.into_iter()
                .filter(|c| c.active && c.meeting_type == meeting_type)
                .collect()
        } else {
            closer_ids
                .iter()
                .map(|id| {
                    all.iter()
                        .find(|c| c.id == *id)
                        .cloned()
                        .ok_or_else(|| SchedulingError::closer(*id))
                })
                .collect::<Result<_, _>>()?
        };

        let ids: Vec<Uuid> = closers.iter().map(|c| c.id).collect();
        let slots = self.store.availability(&ids)?;
        let blocks = self.store.blocked_dates(&ids, DateRange::single(date))?;
        let meetings = self.store.meetings_between(DateRange::single(date), None)?;

        let availability = AvailabilityRegistry::new(&closers, &slots);
        let blocks = BlockedDateRegistry::new(&blocks);
        Ok(SlotAllocator::new(&self.config.scheduling).build_grid(GridInputs {
            date,
            meeting_type,
            closers: &closers,
            availability: &availability,
            blocks: &blocks,
            meetings: &meetings,
        }))
    }

    /// Includes orphaned meetings; they stay readable for audit.
    pub fn meeting(&self, id: Uuid) -> Result<MeetingView, SchedulingError> {
        let meeting = self
            .store
            .meeting(id)?
            .ok_or_else(|| SchedulingError::meeting(id))?;
        Ok(MeetingView::from(&meeting))
    }

    /// Reassignment chain through `attendee_id`, root first.
    pub fn lineage(&self, attendee_id: Uuid) -> Result<Vec<AttendeeView>, SchedulingError> {
        let start = self
            .store
            .attendee(attendee_id)?
            .ok_or_else(|| SchedulingError::attendee(attendee_id))?;

        let mut lineage = AttendeeLineage::new([start.clone()]);
        let mut cursor = start.parent_attendee_id;
        while let Some(parent_id) = cursor {
            if lineage.get(parent_id).is_some() {
                break;
            }
            match self.store.attendee(parent_id)? {
                Some(parent) => {
                    cursor = parent.parent_attendee_id;
                    lineage.insert(parent);
                }
                None => break,
            }
        }

        let mut frontier = vec![start.id];
        while let Some(id) = frontier.pop() {
            for child in self.store.attendees_with_parent(id)? {
                if lineage.get(child.id).is_none() {
                    frontier.push(child.id);
                    lineage.insert(child);
                }
            }
        }

        Ok(lineage
            .chain(attendee_id)
            .into_iter()
            .map(AttendeeView::from)
            .collect())
    }

    pub fn closer_metrics(
        &self,
        range: DateRange,
        meeting_type: MeetingType,
    ) -> Result<CloserMetricsReport, SchedulingError> {
        let closers = self.store.closers()?;
        let ids: Vec<Uuid> = closers.iter().map(|c| c.id).collect();
        let availability = self.store.availability(&ids)?;
        let meetings = self.store.meetings_between(range, Some(meeting_type))?;

        let (follow_ons, prior_stage) = match meeting_type.next_stage() {
            Some(next) => {
                let follow_ons = self.store.meetings_between(range, Some(next))?;
                let mut deals: Vec<Uuid> = follow_ons
                    .iter()
                    .flat_map(|m| m.attendees.iter().filter_map(|a| a.deal_id).chain(m.deal_id))
                    .collect();
                deals.sort();
                deals.dedup();
                let prior = self.store.meetings_for_deals(&deals, meeting_type)?;
                (follow_ons, prior)
            }
            None => (Vec::new(), Vec::new()),
        };

        Ok(
            CloserMetricsAggregator::new(&self.config.metrics).aggregate(MetricsInput {
                range,
                meeting_type,
                closers: &closers,
                availability: &availability,
                meetings: &meetings,
                follow_ons: &follow_ons,
                prior_stage: &prior_stage,
            }),
        )
    }

    pub fn closers(&self) -> Result<Vec<Closer>, SchedulingError> {
        self.store.closers()
    }

    pub fn save_closer(&self, closer: Closer) -> Result<Closer, SchedulingError> {
        if closer.name.trim().is_empty() {
            return Err(SchedulingError::InvalidInput(
                "closer name is required".to_string(),
            ));
        }
        if closer.max_leads_per_slot == Some(0) {
            return Err(SchedulingError::InvalidInput(
                "max_leads_per_slot must be at least 1".to_string(),
            ));
        }
        self.store.save_closer(&closer)?;
        info!("Saved closer {} ({})", closer.id, closer.name);
        Ok(closer)
    }

    pub fn add_availability(&self, slot: AvailabilitySlot) -> Result<bool, SchedulingError> {
        self.validate_slot(&slot)?;
        let added = self.store.add_availability(&slot)?;
        if added {
            info!(
                "Closer {} available on weekday {} at {}",
                slot.closer_id, slot.weekday, slot.time_of_day
            );
        }
        Ok(added)
    }

    pub fn remove_availability(&self, slot: AvailabilitySlot) -> Result<bool, SchedulingError> {
        self.validate_slot(&slot)?;
        self.store.remove_availability(&slot)
    }

    pub fn add_blocked_date(&self, block: BlockedDate) -> Result<BlockedDate, SchedulingError> {
        validate_block(&block)?;
        self.require_closer(block.closer_id)?;
        self.store.add_blocked_date(&block)?;
        info!("Blocked closer {} on {}", block.closer_id, block.date);
        Ok(block)
    }

    pub fn remove_blocked_date(&self, id: Uuid) -> Result<(), SchedulingError> {
        if !self.store.remove_blocked_date(id)? {
            return Err(SchedulingError::NotFound("Blocked date", id));
        }
        Ok(())
    }

    fn validate_slot(&self, slot: &AvailabilitySlot) -> Result<(), SchedulingError> {
        if slot.weekday > 6 {
            return Err(SchedulingError::InvalidInput(format!(
                "weekday {} is outside 0..=6",
                slot.weekday
            )));
        }
        self.require_closer(slot.closer_id)
    }

    fn require_closer(&self, id: Uuid) -> Result<(), SchedulingError> {
        self.store
            .closer(id)?
            .map(|_| ())
            .ok_or_else(|| SchedulingError::closer(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::booking::{BookSlotRequest, BookingTarget, RescheduleRequest};
    use crate::scheduling::memory_store::MemoryStore;
    use crate::scheduling::types::NewAttendee;
    use chrono::NaiveTime;

    fn service() -> (SchedulingService<MemoryStore>, Closer) {
        let service = SchedulingService::new(Arc::new(MemoryStore::new()), AppConfig::default());
        let closer = service
            .save_closer(Closer::new("Ana", MeetingType::R1))
            .unwrap();
        for h in [9, 10] {
            service
                .add_availability(AvailabilitySlot::new(
                    closer.id,
                    2,
                    NaiveTime::from_hms_opt(h, 0, 0).unwrap(),
                ))
                .unwrap();
        }
        (service, closer)
    }

    fn tuesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    #[test]
    fn test_availability_is_idempotent() {
        let (service, closer) = service();
        let slot = AvailabilitySlot::new(closer.id, 2, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert!(!service.add_availability(slot.clone()).unwrap());
        assert!(service.remove_availability(slot.clone()).unwrap());
        assert!(!service.remove_availability(slot).unwrap());
    }

    #[test]
    fn test_invalid_weekday_rejected() {
        let (service, closer) = service();
        let slot = AvailabilitySlot::new(closer.id, 7, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert!(matches!(
            service.add_availability(slot),
            Err(SchedulingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_grid_defaults_to_active_closers_of_type() {
        let (service, closer) = service();
        let mut r2 = Closer::new("Bruno", MeetingType::R2);
        r2.active = true;
        service.save_closer(r2).unwrap();

        let grid = service.slot_grid(tuesday(), MeetingType::R1, &[]).unwrap();
        assert_eq!(grid.closer_ids, vec![closer.id]);
        assert_eq!(grid.times.len(), 2);
    }

    #[test]
    fn test_grid_with_unknown_closer_is_not_found() {
        let (service, _) = service();
        let missing = Uuid::new_v4();
        let err = service
            .slot_grid(tuesday(), MeetingType::R1, &[missing])
            .unwrap_err();
        assert_eq!(err, SchedulingError::closer(missing));
    }

    #[test]
    fn test_lineage_walks_reschedule_chain() {
        let (service, closer) = service();
        let booked = service
            .booking()
            .book_slot(BookSlotRequest {
                closer_id: closer.id,
                scheduled_at: tuesday().and_hms_opt(9, 0, 0).unwrap(),
                attendee: NewAttendee {
                    name: "Lead".to_string(),
                    ..NewAttendee::default()
                },
                deal_id: None,
                contact_id: None,
                booked_by: None,
            })
            .unwrap();
        let moved = service
            .booking()
            .reschedule(RescheduleRequest {
                target: BookingTarget::Attendee(booked.attendee_id),
                new_closer_id: closer.id,
                new_scheduled_at: tuesday().and_hms_opt(10, 0, 0).unwrap(),
            })
            .unwrap();

        let chain = service.lineage(booked.attendee_id).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].attendee.id, booked.attendee_id);
        assert_eq!(chain[1].attendee.id, moved.reassignments[0].to_attendee_id);
        assert!(!chain[0].pending_reassignment);
        assert!(chain[1].pending_reassignment);

        let old = service.meeting(booked.meeting_id).unwrap();
        assert!(old.orphan);
    }

    #[test]
    fn test_remove_missing_block_is_not_found() {
        let (service, _) = service();
        assert!(matches!(
            service.remove_blocked_date(Uuid::new_v4()),
            Err(SchedulingError::NotFound(..))
        ));
    }
}
