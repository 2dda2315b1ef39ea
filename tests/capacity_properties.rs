//! Random book/cancel/reschedule sequences never push a cell past capacity,
//! and refused operations leave the store untouched.

mod common;

use proptest::prelude::*;
use uuid::Uuid;

use common::{at, booking, booking_day, closer_with_hours, service};
use slotserver::scheduling::{
    BookingTarget, DateRange, Meeting, MeetingType, RescheduleRequest, SchedulingStore,
};

const HOURS: [u32; 3] = [9, 10, 11];

#[derive(Debug, Clone)]
enum Op {
    Book { closer: usize, hour: usize },
    Cancel { pick: usize },
    Reschedule { pick: usize, closer: usize, hour: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..2usize, 0..HOURS.len()).prop_map(|(closer, hour)| Op::Book { closer, hour }),
        1 => (0..64usize).prop_map(|pick| Op::Cancel { pick }),
        1 => (0..64usize, 0..2usize, 0..HOURS.len())
            .prop_map(|(pick, closer, hour)| Op::Reschedule { pick, closer, hour }),
    ]
}

fn snapshot(store: &impl SchedulingStore) -> Vec<Meeting> {
    store
        .meetings_between(DateRange::single(booking_day()), None)
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn occupancy_never_exceeds_capacity(
        capacities in (1u32..4, 1u32..4),
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let service = service();
        let closers = [
            closer_with_hours(&service, "Ana", MeetingType::R1, capacities.0, &HOURS),
            closer_with_hours(&service, "Bia", MeetingType::R1, capacities.1, &HOURS),
        ];
        let capacity_of = |id: Uuid| {
            if id == closers[0].id { capacities.0 } else { capacities.1 }
        };
        let mut booked: Vec<Uuid> = Vec::new();

        for op in ops {
            let before = snapshot(service.store().as_ref());
            let outcome = match op {
                Op::Book { closer, hour } => service
                    .booking()
                    .book_slot(booking(closers[closer].id, at(HOURS[hour], 0), "Lead"))
                    .map(|r| booked.push(r.attendee_id)),
                Op::Cancel { pick } if !booked.is_empty() => service
                    .booking()
                    .cancel(BookingTarget::Attendee(booked[pick % booked.len()])),
                Op::Reschedule { pick, closer, hour } if !booked.is_empty() => service
                    .booking()
                    .reschedule(RescheduleRequest {
                        target: BookingTarget::Attendee(booked[pick % booked.len()]),
                        new_closer_id: closers[closer].id,
                        new_scheduled_at: at(HOURS[hour], 0),
                    })
                    .map(|r| booked.extend(r.reassignments.iter().map(|x| x.to_attendee_id))),
                _ => Ok(()),
            };

            let after = snapshot(service.store().as_ref());
            if outcome.is_err() {
                prop_assert_eq!(&before, &after);
            }

            let mut per_cell = std::collections::HashMap::new();
            for meeting in &after {
                *per_cell.entry(meeting.cell()).or_insert(0u32) += meeting.seats_taken();
            }
            for (cell, seats) in per_cell {
                prop_assert!(
                    seats <= capacity_of(cell.closer_id),
                    "cell {:?} holds {}",
                    cell,
                    seats
                );
            }
        }
    }
}
