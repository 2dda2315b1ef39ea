//! PostgreSQL store on a diesel r2d2 pool. Queries are raw SQL mapped through
//! `QueryableByName` rows; cell locks are transaction-scoped advisory locks.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::{
    Array, Bool, Date, Integer, Nullable, SmallInt, Text, Time, Timestamp, Timestamptz,
    Uuid as DieselUuid,
};
use log::{error, info};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::error::SchedulingError;
use super::migrations::create_scheduling_tables_migration;
use super::store::{CellSnapshot, SchedulingStore, SchedulingTx};
use super::types::{
    Attendee, AttendeeStatus, AvailabilitySlot, BlockedDate, CellKey, Closer, DateRange, Meeting,
    MeetingStatus, MeetingType,
};
use crate::core::shared::utils::DbPool;

type PooledConn = diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>;

const MEETING_COLUMNS: &str = "id, closer_id, meeting_type, scheduled_at, duration_minutes, \
     status, deal_id, contact_id, booked_by, created_at";
const ATTENDEE_COLUMNS: &str = "id, meeting_id, deal_id, name, phone, status, \
     parent_attendee_id, is_partner, contract_paid_at, created_at";
const CLOSER_COLUMNS: &str =
    "id, name, color, active, meeting_type, max_leads_per_slot, daily_lead_quota";

#[derive(QueryableByName)]
struct CloserRow {
    #[diesel(sql_type = DieselUuid)]
    id: Uuid,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Nullable<Text>)]
    color: Option<String>,
    #[diesel(sql_type = Bool)]
    active: bool,
    #[diesel(sql_type = Text)]
    meeting_type: String,
    #[diesel(sql_type = Nullable<Integer>)]
    max_leads_per_slot: Option<i32>,
    #[diesel(sql_type = Integer)]
    daily_lead_quota: i32,
}

#[derive(QueryableByName)]
struct SlotRow {
    #[diesel(sql_type = DieselUuid)]
    closer_id: Uuid,
    #[diesel(sql_type = SmallInt)]
    weekday: i16,
    #[diesel(sql_type = Time)]
    time_of_day: NaiveTime,
}

#[derive(QueryableByName)]
struct BlockRow {
    #[diesel(sql_type = DieselUuid)]
    id: Uuid,
    #[diesel(sql_type = DieselUuid)]
    closer_id: Uuid,
    #[diesel(sql_type = Date)]
    blocked_date: NaiveDate,
    #[diesel(sql_type = Nullable<Time>)]
    start_time: Option<NaiveTime>,
    #[diesel(sql_type = Nullable<Time>)]
    end_time: Option<NaiveTime>,
    #[diesel(sql_type = Nullable<Text>)]
    reason: Option<String>,
}

#[derive(QueryableByName)]
struct MeetingRow {
    #[diesel(sql_type = DieselUuid)]
    id: Uuid,
    #[diesel(sql_type = DieselUuid)]
    closer_id: Uuid,
    #[diesel(sql_type = Text)]
    meeting_type: String,
    #[diesel(sql_type = Timestamp)]
    scheduled_at: NaiveDateTime,
    #[diesel(sql_type = Integer)]
    duration_minutes: i32,
    #[diesel(sql_type = Text)]
    status: String,
    #[diesel(sql_type = Nullable<DieselUuid>)]
    deal_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<DieselUuid>)]
    contact_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<Text>)]
    booked_by: Option<String>,
    #[diesel(sql_type = Timestamptz)]
    created_at: DateTime<Utc>,
}

#[derive(QueryableByName)]
struct AttendeeRow {
    #[diesel(sql_type = DieselUuid)]
    id: Uuid,
    #[diesel(sql_type = DieselUuid)]
    meeting_id: Uuid,
    #[diesel(sql_type = Nullable<DieselUuid>)]
    deal_id: Option<Uuid>,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Nullable<Text>)]
    phone: Option<String>,
    #[diesel(sql_type = Text)]
    status: String,
    #[diesel(sql_type = Nullable<DieselUuid>)]
    parent_attendee_id: Option<Uuid>,
    #[diesel(sql_type = Bool)]
    is_partner: bool,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    contract_paid_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Timestamptz)]
    created_at: DateTime<Utc>,
}

fn parse<T: FromStr<Err = String>>(value: &str) -> Result<T, SchedulingError> {
    value.parse().map_err(|e: String| {
        error!("Unreadable scheduling row: {e}");
        SchedulingError::Storage(e)
    })
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl CloserRow {
    fn into_closer(self) -> Result<Closer, SchedulingError> {
        Ok(Closer {
            id: self.id,
            name: self.name,
            color: self.color,
            active: self.active,
            meeting_type: parse(&self.meeting_type)?,
            max_leads_per_slot: self.max_leads_per_slot.map(to_u32),
            daily_lead_quota: to_u32(self.daily_lead_quota),
        })
    }
}

impl AttendeeRow {
    fn into_attendee(self) -> Result<Attendee, SchedulingError> {
        Ok(Attendee {
            id: self.id,
            meeting_id: self.meeting_id,
            deal_id: self.deal_id,
            name: self.name,
            phone: self.phone,
            status: parse(&self.status)?,
            parent_attendee_id: self.parent_attendee_id,
            is_partner: self.is_partner,
            contract_paid_at: self.contract_paid_at,
            created_at: self.created_at,
        })
    }
}

impl MeetingRow {
    fn into_meeting(self, attendees: Vec<Attendee>) -> Result<Meeting, SchedulingError> {
        Ok(Meeting {
            id: self.id,
            closer_id: self.closer_id,
            meeting_type: parse(&self.meeting_type)?,
            scheduled_at: self.scheduled_at,
            duration_minutes: to_u32(self.duration_minutes),
            status: parse(&self.status)?,
            deal_id: self.deal_id,
            contact_id: self.contact_id,
            booked_by: self.booked_by,
            created_at: self.created_at,
            attendees,
        })
    }
}

fn load_closers(conn: &mut PgConnection, id: Option<Uuid>) -> Result<Vec<Closer>, SchedulingError> {
    let sql = format!(
        "SELECT {CLOSER_COLUMNS} FROM scheduling_closers \
         WHERE $1::uuid IS NULL OR id = $1 ORDER BY name, id"
    );
    let rows: Vec<CloserRow> = diesel::sql_query(sql)
        .bind::<Nullable<DieselUuid>, _>(id)
        .load(conn)?;
    rows.into_iter().map(CloserRow::into_closer).collect()
}

fn load_slots(
    conn: &mut PgConnection,
    closer_ids: &[Uuid],
) -> Result<Vec<AvailabilitySlot>, SchedulingError> {
    let rows: Vec<SlotRow> = diesel::sql_query(
        "SELECT closer_id, weekday, time_of_day FROM scheduling_availability \
         WHERE closer_id = ANY($1) ORDER BY closer_id, weekday, time_of_day",
    )
    .bind::<Array<DieselUuid>, _>(closer_ids.to_vec())
    .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|r| {
            let weekday = u8::try_from(r.weekday).unwrap_or(u8::MAX);
            AvailabilitySlot::new(r.closer_id, weekday, r.time_of_day)
        })
        .collect())
}

fn load_blocks(
    conn: &mut PgConnection,
    closer_ids: &[Uuid],
    range: DateRange,
) -> Result<Vec<BlockedDate>, SchedulingError> {
    let rows: Vec<BlockRow> = diesel::sql_query(
        "SELECT id, closer_id, blocked_date, start_time, end_time, reason \
         FROM scheduling_blocked_dates \
         WHERE closer_id = ANY($1) AND blocked_date BETWEEN $2 AND $3 \
         ORDER BY blocked_date, start_time NULLS FIRST",
    )
    .bind::<Array<DieselUuid>, _>(closer_ids.to_vec())
    .bind::<Date, _>(range.start)
    .bind::<Date, _>(range.end)
    .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|r| BlockedDate {
            id: r.id,
            closer_id: r.closer_id,
            date: r.blocked_date,
            start_time: r.start_time,
            end_time: r.end_time,
            reason: r.reason,
        })
        .collect())
}

fn load_attendees(
    conn: &mut PgConnection,
    filter: &str,
    ids: Vec<Uuid>,
) -> Result<Vec<Attendee>, SchedulingError> {
    let sql = format!(
        "SELECT {ATTENDEE_COLUMNS} FROM scheduling_attendees WHERE {filter} = ANY($1) \
         ORDER BY created_at, id"
    );
    let rows: Vec<AttendeeRow> = diesel::sql_query(sql)
        .bind::<Array<DieselUuid>, _>(ids)
        .load(conn)?;
    rows.into_iter().map(AttendeeRow::into_attendee).collect()
}

/// Attaches attendees to meeting rows, keeping the row order.
fn hydrate(
    conn: &mut PgConnection,
    rows: Vec<MeetingRow>,
) -> Result<Vec<Meeting>, SchedulingError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids = rows.iter().map(|r| r.id).collect();
    let mut by_meeting: HashMap<Uuid, Vec<Attendee>> = HashMap::new();
    for attendee in load_attendees(conn, "meeting_id", ids)? {
        by_meeting.entry(attendee.meeting_id).or_default().push(attendee);
    }
    rows.into_iter()
        .map(|row| {
            let attendees = by_meeting.remove(&row.id).unwrap_or_default();
            row.into_meeting(attendees)
        })
        .collect()
}

fn meeting_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Meeting>, SchedulingError> {
    let sql = format!("SELECT {MEETING_COLUMNS} FROM scheduling_meetings WHERE id = $1");
    let rows: Vec<MeetingRow> = diesel::sql_query(sql)
        .bind::<DieselUuid, _>(id)
        .load(conn)?;
    Ok(hydrate(conn, rows)?.into_iter().next())
}

fn attendee_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Attendee>, SchedulingError> {
    Ok(load_attendees(conn, "id", vec![id])?.into_iter().next())
}

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn run_migrations(&self) -> Result<(), SchedulingError> {
        let mut conn = self.conn()?;
        conn.batch_execute(create_scheduling_tables_migration())?;
        info!("Scheduling tables ready");
        Ok(())
    }

    fn conn(&self) -> Result<PooledConn, SchedulingError> {
        self.pool.get().map_err(|e| {
            error!("Failed to get scheduling connection: {e}");
            SchedulingError::DatabaseConnection
        })
    }
}

impl SchedulingStore for PgStore {
    fn closers(&self) -> Result<Vec<Closer>, SchedulingError> {
        load_closers(&mut *self.conn()?, None)
    }

    fn closer(&self, id: Uuid) -> Result<Option<Closer>, SchedulingError> {
        Ok(load_closers(&mut *self.conn()?, Some(id))?.into_iter().next())
    }

    fn availability(&self, closer_ids: &[Uuid]) -> Result<Vec<AvailabilitySlot>, SchedulingError> {
        load_slots(&mut *self.conn()?, closer_ids)
    }

    fn blocked_dates(
        &self,
        closer_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<BlockedDate>, SchedulingError> {
        load_blocks(&mut *self.conn()?, closer_ids, range)
    }

    fn meetings_between(
        &self,
        range: DateRange,
        meeting_type: Option<MeetingType>,
    ) -> Result<Vec<Meeting>, SchedulingError> {
        let mut conn = self.conn()?;
        let from = range.start.and_time(NaiveTime::MIN);
        let until = (range.end + Duration::days(1)).and_time(NaiveTime::MIN);
        let sql = format!(
            "SELECT {MEETING_COLUMNS} FROM scheduling_meetings \
             WHERE scheduled_at >= $1 AND scheduled_at < $2 \
             AND ($3::text IS NULL OR meeting_type = $3) \
             ORDER BY scheduled_at, created_at"
        );
        let rows: Vec<MeetingRow> = diesel::sql_query(sql)
            .bind::<Timestamp, _>(from)
            .bind::<Timestamp, _>(until)
            .bind::<Nullable<Text>, _>(meeting_type.map(|t| t.to_string()))
            .load(&mut conn)?;
        hydrate(&mut conn, rows)
    }

    fn meetings_for_deals(
        &self,
        deal_ids: &[Uuid],
        meeting_type: MeetingType,
    ) -> Result<Vec<Meeting>, SchedulingError> {
        if deal_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        let sql = format!(
            "SELECT {MEETING_COLUMNS} FROM scheduling_meetings \
             WHERE meeting_type = $2 AND (deal_id = ANY($1) OR id IN \
             (SELECT meeting_id FROM scheduling_attendees WHERE deal_id = ANY($1))) \
             ORDER BY scheduled_at, created_at"
        );
        let rows: Vec<MeetingRow> = diesel::sql_query(sql)
            .bind::<Array<DieselUuid>, _>(deal_ids.to_vec())
            .bind::<Text, _>(meeting_type.to_string())
            .load(&mut conn)?;
        hydrate(&mut conn, rows)
    }

    fn meeting(&self, id: Uuid) -> Result<Option<Meeting>, SchedulingError> {
        meeting_by_id(&mut *self.conn()?, id)
    }

    fn attendee(&self, id: Uuid) -> Result<Option<Attendee>, SchedulingError> {
        attendee_by_id(&mut *self.conn()?, id)
    }

    fn attendees_with_parent(&self, parent_id: Uuid) -> Result<Vec<Attendee>, SchedulingError> {
        load_attendees(&mut *self.conn()?, "parent_attendee_id", vec![parent_id])
    }

    fn save_closer(&self, closer: &Closer) -> Result<(), SchedulingError> {
        let mut conn = self.conn()?;
        diesel::sql_query(
            "INSERT INTO scheduling_closers \
             (id, name, color, active, meeting_type, max_leads_per_slot, daily_lead_quota) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, color = EXCLUDED.color, \
             active = EXCLUDED.active, meeting_type = EXCLUDED.meeting_type, \
             max_leads_per_slot = EXCLUDED.max_leads_per_slot, \
             daily_lead_quota = EXCLUDED.daily_lead_quota, updated_at = NOW()",
        )
        .bind::<DieselUuid, _>(closer.id)
        .bind::<Text, _>(&closer.name)
        .bind::<Nullable<Text>, _>(closer.color.as_deref())
        .bind::<Bool, _>(closer.active)
        .bind::<Text, _>(closer.meeting_type.to_string())
        .bind::<Nullable<Integer>, _>(closer.max_leads_per_slot.map(to_i32))
        .bind::<Integer, _>(to_i32(closer.daily_lead_quota))
        .execute(&mut conn)?;
        Ok(())
    }

    fn add_availability(&self, slot: &AvailabilitySlot) -> Result<bool, SchedulingError> {
        let mut conn = self.conn()?;
        let inserted = diesel::sql_query(
            "INSERT INTO scheduling_availability (closer_id, weekday, time_of_day) \
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind::<DieselUuid, _>(slot.closer_id)
        .bind::<SmallInt, _>(i16::from(slot.weekday))
        .bind::<Time, _>(slot.time_of_day)
        .execute(&mut conn)?;
        Ok(inserted > 0)
    }

    fn remove_availability(&self, slot: &AvailabilitySlot) -> Result<bool, SchedulingError> {
        let mut conn = self.conn()?;
        let removed = diesel::sql_query(
            "DELETE FROM scheduling_availability \
             WHERE closer_id = $1 AND weekday = $2 AND time_of_day = $3",
        )
        .bind::<DieselUuid, _>(slot.closer_id)
        .bind::<SmallInt, _>(i16::from(slot.weekday))
        .bind::<Time, _>(slot.time_of_day)
        .execute(&mut conn)?;
        Ok(removed > 0)
    }

    fn add_blocked_date(&self, block: &BlockedDate) -> Result<(), SchedulingError> {
        let mut conn = self.conn()?;
        diesel::sql_query(
            "INSERT INTO scheduling_blocked_dates \
             (id, closer_id, blocked_date, start_time, end_time, reason) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind::<DieselUuid, _>(block.id)
        .bind::<DieselUuid, _>(block.closer_id)
        .bind::<Date, _>(block.date)
        .bind::<Nullable<Time>, _>(block.start_time)
        .bind::<Nullable<Time>, _>(block.end_time)
        .bind::<Nullable<Text>, _>(block.reason.as_deref())
        .execute(&mut conn)?;
        Ok(())
    }

    fn remove_blocked_date(&self, id: Uuid) -> Result<bool, SchedulingError> {
        let mut conn = self.conn()?;
        let removed = diesel::sql_query("DELETE FROM scheduling_blocked_dates WHERE id = $1")
            .bind::<DieselUuid, _>(id)
            .execute(&mut conn)?;
        Ok(removed > 0)
    }

    fn transaction<T, F>(&self, f: F) -> Result<T, SchedulingError>
    where
        F: FnOnce(&mut dyn SchedulingTx) -> Result<T, SchedulingError>,
    {
        let mut pooled = self.conn()?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<T, SchedulingError, _>(|conn| {
            let mut tx = PgTx { conn };
            f(&mut tx)
        })
    }
}

struct PgTx<'c> {
    conn: &'c mut PgConnection,
}

impl SchedulingTx for PgTx<'_> {
    fn lock_cell(&mut self, cell: &CellKey) -> Result<(), SchedulingError> {
        diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind::<Text, _>(cell.lock_key())
            .execute(self.conn)?;
        Ok(())
    }

    fn cell_snapshot(&mut self, cell: &CellKey) -> Result<CellSnapshot, SchedulingError> {
        let closer = load_closers(self.conn, Some(cell.closer_id))?
            .into_iter()
            .next()
            .ok_or_else(|| SchedulingError::closer(cell.closer_id))?;
        let slots = load_slots(self.conn, &[cell.closer_id])?;
        let blocks = load_blocks(self.conn, &[cell.closer_id], DateRange::single(cell.date()))?;

        let sql = format!(
            "SELECT {MEETING_COLUMNS} FROM scheduling_meetings \
             WHERE closer_id = $1 AND scheduled_at = $2 ORDER BY created_at, id"
        );
        let rows: Vec<MeetingRow> = diesel::sql_query(sql)
            .bind::<DieselUuid, _>(cell.closer_id)
            .bind::<Timestamp, _>(cell.scheduled_at)
            .load(self.conn)?;
        let meetings = hydrate(self.conn, rows)?;

        Ok(CellSnapshot {
            closer,
            slots,
            blocks,
            meetings,
        })
    }

    fn closer(&mut self, id: Uuid) -> Result<Option<Closer>, SchedulingError> {
        Ok(load_closers(self.conn, Some(id))?.into_iter().next())
    }

    fn meeting(&mut self, id: Uuid) -> Result<Option<Meeting>, SchedulingError> {
        meeting_by_id(self.conn, id)
    }

    fn attendee(&mut self, id: Uuid) -> Result<Option<Attendee>, SchedulingError> {
        attendee_by_id(self.conn, id)
    }

    fn insert_meeting(&mut self, meeting: &Meeting) -> Result<(), SchedulingError> {
        diesel::sql_query(
            "INSERT INTO scheduling_meetings (id, closer_id, meeting_type, scheduled_at, \
             duration_minutes, status, deal_id, contact_id, booked_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind::<DieselUuid, _>(meeting.id)
        .bind::<DieselUuid, _>(meeting.closer_id)
        .bind::<Text, _>(meeting.meeting_type.to_string())
        .bind::<Timestamp, _>(meeting.scheduled_at)
        .bind::<Integer, _>(to_i32(meeting.duration_minutes))
        .bind::<Text, _>(meeting.status.to_string())
        .bind::<Nullable<DieselUuid>, _>(meeting.deal_id)
        .bind::<Nullable<DieselUuid>, _>(meeting.contact_id)
        .bind::<Nullable<Text>, _>(meeting.booked_by.as_deref())
        .bind::<Timestamptz, _>(meeting.created_at)
        .execute(self.conn)?;
        Ok(())
    }

    fn insert_attendee(&mut self, attendee: &Attendee) -> Result<(), SchedulingError> {
        diesel::sql_query(
            "INSERT INTO scheduling_attendees (id, meeting_id, deal_id, name, phone, status, \
             parent_attendee_id, is_partner, contract_paid_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind::<DieselUuid, _>(attendee.id)
        .bind::<DieselUuid, _>(attendee.meeting_id)
        .bind::<Nullable<DieselUuid>, _>(attendee.deal_id)
        .bind::<Text, _>(&attendee.name)
        .bind::<Nullable<Text>, _>(attendee.phone.as_deref())
        .bind::<Text, _>(attendee.status.to_string())
        .bind::<Nullable<DieselUuid>, _>(attendee.parent_attendee_id)
        .bind::<Bool, _>(attendee.is_partner)
        .bind::<Nullable<Timestamptz>, _>(attendee.contract_paid_at)
        .bind::<Timestamptz, _>(attendee.created_at)
        .execute(self.conn)?;
        Ok(())
    }

    fn set_meeting_status(
        &mut self,
        id: Uuid,
        status: MeetingStatus,
    ) -> Result<(), SchedulingError> {
        let updated = diesel::sql_query(
            "UPDATE scheduling_meetings SET status = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind::<Text, _>(status.to_string())
        .bind::<DieselUuid, _>(id)
        .execute(self.conn)?;
        if updated == 0 {
            return Err(SchedulingError::meeting(id));
        }
        Ok(())
    }

    fn set_attendee_status(
        &mut self,
        id: Uuid,
        status: AttendeeStatus,
    ) -> Result<(), SchedulingError> {
        let updated = diesel::sql_query(
            "UPDATE scheduling_attendees SET status = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind::<Text, _>(status.to_string())
        .bind::<DieselUuid, _>(id)
        .execute(self.conn)?;
        if updated == 0 {
            return Err(SchedulingError::attendee(id));
        }
        Ok(())
    }

    fn set_contract_paid_at(
        &mut self,
        id: Uuid,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<(), SchedulingError> {
        let updated = diesel::sql_query(
            "UPDATE scheduling_attendees SET contract_paid_at = $1, updated_at = NOW() \
             WHERE id = $2",
        )
        .bind::<Nullable<Timestamptz>, _>(paid_at)
        .bind::<DieselUuid, _>(id)
        .execute(self.conn)?;
        if updated == 0 {
            return Err(SchedulingError::attendee(id));
        }
        Ok(())
    }
}
