//! Per-closer weekly availability lookups.

use chrono::NaiveTime;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use super::types::{AvailabilitySlot, Closer, MeetingType};

#[derive(Debug, Clone)]
struct CloserHours {
    active: bool,
    meeting_type: MeetingType,
    weekdays: [BTreeSet<NaiveTime>; 7],
}

/// Indexed view over closers and their configured slot times.
///
/// Lookups never fail: unknown closers, inactive closers and closers that
/// specialize in another meeting type simply have no slots.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityRegistry {
    hours: HashMap<Uuid, CloserHours>,
}

impl AvailabilityRegistry {
    pub fn new(closers: &[Closer], slots: &[AvailabilitySlot]) -> Self {
        let mut hours: HashMap<Uuid, CloserHours> = closers
            .iter()
            .map(|c| {
                (
                    c.id,
                    CloserHours {
                        active: c.active,
                        meeting_type: c.meeting_type,
                        weekdays: Default::default(),
                    },
                )
            })
            .collect();

        for slot in slots {
            let Some(entry) = hours.get_mut(&slot.closer_id) else {
                continue;
            };
            if let Some(day) = entry.weekdays.get_mut(usize::from(slot.weekday)) {
                day.insert(slot.time_of_day);
            }
        }

        Self { hours }
    }

    fn hours_for(&self, closer_id: Uuid, meeting_type: MeetingType) -> Option<&CloserHours> {
        self.hours
            .get(&closer_id)
            .filter(|h| h.active && h.meeting_type == meeting_type)
    }

    pub fn slots_for(
        &self,
        closer_id: Uuid,
        weekday: u8,
        meeting_type: MeetingType,
    ) -> BTreeSet<NaiveTime> {
        self.hours_for(closer_id, meeting_type)
            .and_then(|h| h.weekdays.get(usize::from(weekday)))
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_slot(
        &self,
        closer_id: Uuid,
        weekday: u8,
        meeting_type: MeetingType,
        time: NaiveTime,
    ) -> bool {
        self.hours_for(closer_id, meeting_type)
            .and_then(|h| h.weekdays.get(usize::from(weekday)))
            .is_some_and(|day| day.contains(&time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_slots_for_filters_weekday_and_type() {
        let closer = Closer::new("Ana", MeetingType::R1);
        let slots = vec![
            AvailabilitySlot::new(closer.id, 2, t(14, 0)),
            AvailabilitySlot::new(closer.id, 2, t(9, 30)),
            AvailabilitySlot::new(closer.id, 3, t(10, 0)),
        ];
        let registry = AvailabilityRegistry::new(&[closer.clone()], &slots);

        let tuesday: Vec<_> = registry
            .slots_for(closer.id, 2, MeetingType::R1)
            .into_iter()
            .collect();
        assert_eq!(tuesday, vec![t(9, 30), t(14, 0)]);
        assert!(registry.slots_for(closer.id, 2, MeetingType::R2).is_empty());
        assert!(registry.has_slot(closer.id, 3, MeetingType::R1, t(10, 0)));
        assert!(!registry.has_slot(closer.id, 3, MeetingType::R1, t(14, 0)));
    }

    #[test]
    fn test_unknown_and_inactive_closers_have_no_slots() {
        let mut closer = Closer::new("Bruno", MeetingType::R1);
        closer.active = false;
        let slots = vec![AvailabilitySlot::new(closer.id, 1, t(9, 0))];
        let registry = AvailabilityRegistry::new(&[closer.clone()], &slots);

        assert!(registry.slots_for(closer.id, 1, MeetingType::R1).is_empty());
        assert!(registry
            .slots_for(Uuid::new_v4(), 1, MeetingType::R1)
            .is_empty());
    }

    #[test]
    fn test_duplicate_slots_collapse() {
        let closer = Closer::new("Carla", MeetingType::R2);
        let slots = vec![
            AvailabilitySlot::new(closer.id, 4, t(16, 0)),
            AvailabilitySlot::new(closer.id, 4, t(16, 0)),
        ];
        let registry = AvailabilityRegistry::new(&[closer.clone()], &slots);
        assert_eq!(registry.slots_for(closer.id, 4, MeetingType::R2).len(), 1);
    }
}
