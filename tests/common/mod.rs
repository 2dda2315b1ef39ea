#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use uuid::Uuid;

use slotserver::core::config::AppConfig;
use slotserver::scheduling::{
    AvailabilitySlot, BookSlotRequest, Closer, MeetingType, MemoryStore, NewAttendee,
    SchedulingService,
};

/// Tuesday, weekday index 2.
pub fn booking_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
}

pub fn at(h: u32, m: u32) -> NaiveDateTime {
    booking_day().and_hms_opt(h, m, 0).unwrap()
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn service() -> SchedulingService<MemoryStore> {
    SchedulingService::new(Arc::new(MemoryStore::new()), AppConfig::default())
}

/// Saves a closer with Tuesday availability at the given hours.
pub fn closer_with_hours(
    service: &SchedulingService<MemoryStore>,
    name: &str,
    meeting_type: MeetingType,
    capacity: u32,
    hours: &[u32],
) -> Closer {
    let mut closer = Closer::new(name, meeting_type);
    closer.max_leads_per_slot = Some(capacity);
    let closer = service.save_closer(closer).unwrap();
    for &h in hours {
        service
            .add_availability(AvailabilitySlot::new(closer.id, 2, time(h, 0)))
            .unwrap();
    }
    closer
}

pub fn lead(name: &str) -> NewAttendee {
    NewAttendee {
        name: name.to_string(),
        ..NewAttendee::default()
    }
}

pub fn booking(closer_id: Uuid, when: NaiveDateTime, name: &str) -> BookSlotRequest {
    BookSlotRequest {
        closer_id,
        scheduled_at: when,
        attendee: lead(name),
        deal_id: None,
        contact_id: None,
        booked_by: Some("sdr".to_string()),
    }
}
