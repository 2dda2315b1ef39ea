//! Meeting-slot scheduling engine: availability, blocks, the slot allocator,
//! bookings under per-cell capacity and the attendee status machine.

pub mod allocator;
pub mod availability;
pub mod blocked_dates;
pub mod booking;
mod error;
pub mod handlers;
pub mod lifecycle;
pub mod memory_store;
pub mod migrations;
#[cfg(feature = "postgres")]
pub mod pg_store;
mod service;
pub mod store;
pub mod types;

pub use allocator::{CellState, SlotAllocator, SlotCell, SlotGrid};
pub use availability::AvailabilityRegistry;
pub use blocked_dates::BlockedDateRegistry;
pub use booking::{
    BookSlotRequest, BookingReceipt, BookingTarget, MeetingBookingService, Reassignment,
    RescheduleReceipt, RescheduleRequest,
};
pub use error::SchedulingError;
pub use handlers::scheduling_routes;
pub use lifecycle::{AttendeeLineage, AttendeeView, MeetingView};
pub use memory_store::MemoryStore;
pub use migrations::create_scheduling_tables_migration;
#[cfg(feature = "postgres")]
pub use pg_store::PgStore;
pub use service::SchedulingService;
pub use store::{SchedulingStore, SchedulingTx};
pub use types::{
    Attendee, AttendeeStatus, AvailabilitySlot, BlockedDate, CallerRole, CellKey, Closer,
    DateRange, Meeting, MeetingStatus, MeetingType, NewAttendee, Warning, WarningKind,
};
