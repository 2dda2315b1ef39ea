#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    pub const HEALTH: &'static str = "/api/health";

    // Slot grid and bookings
    pub const SLOT_GRID: &'static str = "/api/scheduling/grid";
    pub const BOOKINGS: &'static str = "/api/scheduling/bookings";
    pub const RESCHEDULE: &'static str = "/api/scheduling/reschedule";
    pub const CANCEL: &'static str = "/api/scheduling/cancel";

    // Meetings and attendees
    pub const MEETING_BY_ID: &'static str = "/api/scheduling/meetings/{id}";
    pub const MEETING_ATTENDEES: &'static str = "/api/scheduling/meetings/{id}/attendees";
    pub const ATTENDEE_STATUS: &'static str = "/api/scheduling/attendees/{id}/status";
    pub const ATTENDEE_PAYMENT: &'static str = "/api/scheduling/attendees/{id}/payment";
    pub const ATTENDEE_LINEAGE: &'static str = "/api/scheduling/attendees/{id}/lineage";

    // Metrics
    pub const CLOSER_METRICS: &'static str = "/api/scheduling/metrics/closers";

    // Administration
    pub const CLOSERS: &'static str = "/api/scheduling/closers";
    pub const CLOSER_AVAILABILITY: &'static str = "/api/scheduling/closers/{id}/availability";
    pub const CLOSER_BLOCKED_DATES: &'static str = "/api/scheduling/closers/{id}/blocked-dates";
    pub const BLOCKED_DATE_BY_ID: &'static str = "/api/scheduling/blocked-dates/{id}";
}

impl ApiUrls {
    /// Replace the `{id}` segment of a route template.
    pub fn with_id(template: &str, id: &str) -> String {
        template.replace("{id}", id)
    }
}
