pub fn create_scheduling_tables_migration() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS scheduling_closers (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        color TEXT,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        meeting_type TEXT NOT NULL DEFAULT 'r1',
        max_leads_per_slot INTEGER,
        daily_lead_quota INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE TABLE IF NOT EXISTS scheduling_availability (
        closer_id UUID NOT NULL REFERENCES scheduling_closers(id) ON DELETE CASCADE,
        weekday SMALLINT NOT NULL CHECK (weekday BETWEEN 0 AND 6),
        time_of_day TIME NOT NULL,
        UNIQUE(closer_id, weekday, time_of_day)
    );

    CREATE TABLE IF NOT EXISTS scheduling_blocked_dates (
        id UUID PRIMARY KEY,
        closer_id UUID NOT NULL REFERENCES scheduling_closers(id) ON DELETE CASCADE,
        blocked_date DATE NOT NULL,
        start_time TIME,
        end_time TIME,
        reason TEXT,
        CHECK ((start_time IS NULL) = (end_time IS NULL)),
        CHECK (start_time IS NULL OR start_time < end_time)
    );

    CREATE TABLE IF NOT EXISTS scheduling_meetings (
        id UUID PRIMARY KEY,
        closer_id UUID NOT NULL REFERENCES scheduling_closers(id),
        meeting_type TEXT NOT NULL,
        scheduled_at TIMESTAMP NOT NULL,
        duration_minutes INTEGER NOT NULL DEFAULT 30,
        status TEXT NOT NULL DEFAULT 'scheduled',
        deal_id UUID,
        contact_id UUID,
        booked_by TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE TABLE IF NOT EXISTS scheduling_attendees (
        id UUID PRIMARY KEY,
        meeting_id UUID NOT NULL REFERENCES scheduling_meetings(id),
        deal_id UUID,
        name TEXT NOT NULL,
        phone TEXT,
        status TEXT NOT NULL DEFAULT 'invited',
        parent_attendee_id UUID REFERENCES scheduling_attendees(id),
        is_partner BOOLEAN NOT NULL DEFAULT FALSE,
        contract_paid_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_scheduling_meetings_cell ON scheduling_meetings(closer_id, scheduled_at);
    CREATE INDEX IF NOT EXISTS idx_scheduling_meetings_type_time ON scheduling_meetings(meeting_type, scheduled_at);
    CREATE INDEX IF NOT EXISTS idx_scheduling_meetings_deal ON scheduling_meetings(deal_id);
    CREATE INDEX IF NOT EXISTS idx_scheduling_attendees_meeting ON scheduling_attendees(meeting_id);
    CREATE INDEX IF NOT EXISTS idx_scheduling_attendees_parent ON scheduling_attendees(parent_attendee_id);
    CREATE INDEX IF NOT EXISTS idx_scheduling_attendees_deal ON scheduling_attendees(deal_id);
    CREATE INDEX IF NOT EXISTS idx_scheduling_blocked_dates_closer ON scheduling_blocked_dates(closer_id, blocked_date);
    "#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_every_table() {
        let sql = create_scheduling_tables_migration();
        for table in [
            "scheduling_closers",
            "scheduling_availability",
            "scheduling_blocked_dates",
            "scheduling_meetings",
            "scheduling_attendees",
        ] {
            assert!(
                sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "missing {table}"
            );
        }
        assert!(sql.contains("UNIQUE(closer_id, weekday, time_of_day)"));
    }
}
