use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::core::shared::state::AppState;
use crate::core::shared::utils::parse_uuid_list;
use crate::core::urls::ApiUrls;
use crate::metrics::CloserMetricsReport;

use super::allocator::SlotGrid;
use super::booking::{
    BookSlotRequest, BookingReceipt, BookingTarget, RescheduleReceipt, RescheduleRequest,
};
use super::error::SchedulingError;
use super::lifecycle::{AttendeeView, MeetingView};
use super::service::SchedulingService;
use super::store::SchedulingStore;
use super::types::{
    AttendeeStatus, AvailabilitySlot, BlockedDate, CallerRole, Closer, DateRange, MeetingType,
    NewAttendee,
};

pub const CALLER_ROLE_HEADER: &str = "x-caller-role";

#[derive(Debug, Deserialize)]
pub struct GridQuery {
    pub date: NaiveDate,
    pub meeting_type: MeetingType,
    #[serde(default)]
    pub closer_ids: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub meeting_type: MeetingType,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: AttendeeStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentRequest {
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SaveCloserRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub meeting_type: MeetingType,
    #[serde(default)]
    pub max_leads_per_slot: Option<u32>,
    #[serde(default)]
    pub daily_lead_quota: u32,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub weekday: u8,
    pub time_of_day: NaiveTime,
}

#[derive(Debug, Deserialize)]
pub struct BlockedDateRequest {
    pub date: NaiveDate,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddedAttendee {
    pub meeting_id: Uuid,
    pub attendee_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityChange {
    pub changed: bool,
}

pub fn scheduling_routes<S: SchedulingStore + 'static>() -> Router<AppState<S>> {
    Router::new()
        .route(ApiUrls::HEALTH, get(health_handler::<S>))
        .route(ApiUrls::SLOT_GRID, get(slot_grid_handler::<S>))
        .route(ApiUrls::BOOKINGS, post(book_slot_handler::<S>))
        .route(ApiUrls::RESCHEDULE, post(reschedule_handler::<S>))
        .route(ApiUrls::CANCEL, post(cancel_handler::<S>))
        .route(ApiUrls::MEETING_BY_ID, get(get_meeting_handler::<S>))
        .route(ApiUrls::MEETING_ATTENDEES, post(add_attendee_handler::<S>))
        .route(ApiUrls::ATTENDEE_STATUS, put(update_status_handler::<S>))
        .route(ApiUrls::ATTENDEE_PAYMENT, post(record_payment_handler::<S>))
        .route(ApiUrls::ATTENDEE_LINEAGE, get(lineage_handler::<S>))
        .route(ApiUrls::CLOSER_METRICS, get(closer_metrics_handler::<S>))
        .route(
            ApiUrls::CLOSERS,
            get(list_closers_handler::<S>).post(save_closer_handler::<S>),
        )
        .route(
            ApiUrls::CLOSER_AVAILABILITY,
            post(add_availability_handler::<S>).delete(remove_availability_handler::<S>),
        )
        .route(
            ApiUrls::CLOSER_BLOCKED_DATES,
            post(add_blocked_date_handler::<S>),
        )
        .route(
            ApiUrls::BLOCKED_DATE_BY_ID,
            delete(remove_blocked_date_handler::<S>),
        )
}

/// Services are synchronous; every call leaves the async runtime.
async fn run_blocking<S, T, F>(state: &AppState<S>, f: F) -> Result<T, SchedulingError>
where
    S: SchedulingStore + 'static,
    T: Send + 'static,
    F: FnOnce(&SchedulingService<S>) -> Result<T, SchedulingError> + Send + 'static,
{
    let service = Arc::clone(&state.scheduling);
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| {
            error!("Scheduling task failed: {e}");
            SchedulingError::Storage(format!("task failed: {e}"))
        })?
}

fn caller_role(headers: &HeaderMap) -> Result<CallerRole, SchedulingError> {
    match headers.get(CALLER_ROLE_HEADER) {
        None => Ok(CallerRole::default()),
        Some(value) => value
            .to_str()
            .map_err(|_| SchedulingError::InvalidInput("unreadable caller role".to_string()))?
            .parse()
            .map_err(|e: String| {
                warn!("Rejected caller role header: {e}");
                SchedulingError::InvalidInput(e)
            }),
    }
}

async fn health_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "started_at": state.started_at.to_rfc3339(),
    }))
}

async fn slot_grid_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<GridQuery>,
) -> Result<Json<SlotGrid>, SchedulingError> {
    let closer_ids = parse_uuid_list(query.closer_ids.as_deref().unwrap_or_default())?;
    let grid = run_blocking(&state, move |service| {
        service.slot_grid(query.date, query.meeting_type, &closer_ids)
    })
    .await?;
    Ok(Json(grid))
}

async fn book_slot_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Json(request): Json<BookSlotRequest>,
) -> Result<(StatusCode, [(header::HeaderName, String); 1], Json<BookingReceipt>), SchedulingError>
{
    let receipt = run_blocking(&state, move |service| service.booking().book_slot(request)).await?;
    let location = ApiUrls::with_id(ApiUrls::MEETING_BY_ID, &receipt.meeting_id.to_string());
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(receipt),
    ))
}

async fn add_attendee_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(meeting_id): Path<Uuid>,
    Json(attendee): Json<NewAttendee>,
) -> Result<(StatusCode, Json<AddedAttendee>), SchedulingError> {
    let attendee_id = run_blocking(&state, move |service| {
        service.booking().add_to_existing_meeting(meeting_id, attendee)
    })
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(AddedAttendee {
            meeting_id,
            attendee_id,
        }),
    ))
}

async fn reschedule_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<RescheduleReceipt>, SchedulingError> {
    let receipt = run_blocking(&state, move |service| service.booking().reschedule(request)).await?;
    Ok(Json(receipt))
}

async fn cancel_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Json(target): Json<BookingTarget>,
) -> Result<StatusCode, SchedulingError> {
    run_blocking(&state, move |service| service.booking().cancel(target)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_meeting_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(meeting_id): Path<Uuid>,
) -> Result<Json<MeetingView>, SchedulingError> {
    let meeting = run_blocking(&state, move |service| service.meeting(meeting_id)).await?;
    Ok(Json(meeting))
}

async fn update_status_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(attendee_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<AttendeeView>, SchedulingError> {
    let role = caller_role(&headers)?;
    let view = run_blocking(&state, move |service| {
        service
            .booking()
            .update_attendee_status(attendee_id, request.status, role)
    })
    .await?;
    Ok(Json(view))
}

async fn record_payment_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(attendee_id): Path<Uuid>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<AttendeeView>, SchedulingError> {
    let paid_at = request.paid_at.unwrap_or_else(Utc::now);
    let view = run_blocking(&state, move |service| {
        service.booking().record_payment(attendee_id, paid_at)
    })
    .await?;
    Ok(Json(view))
}

async fn lineage_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(attendee_id): Path<Uuid>,
) -> Result<Json<Vec<AttendeeView>>, SchedulingError> {
    let chain = run_blocking(&state, move |service| service.lineage(attendee_id)).await?;
    Ok(Json(chain))
}

async fn closer_metrics_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<CloserMetricsReport>, SchedulingError> {
    let range = DateRange::new(query.start, query.end).map_err(SchedulingError::InvalidInput)?;
    let report = run_blocking(&state, move |service| {
        service.closer_metrics(range, query.meeting_type)
    })
    .await?;
    Ok(Json(report))
}

async fn list_closers_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<Closer>>, SchedulingError> {
    let closers = run_blocking(&state, |service| service.closers()).await?;
    Ok(Json(closers))
}

async fn save_closer_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Json(request): Json<SaveCloserRequest>,
) -> Result<Json<Closer>, SchedulingError> {
    let closer = Closer {
        id: request.id.unwrap_or_else(Uuid::new_v4),
        name: request.name,
        color: request.color,
        active: request.active,
        meeting_type: request.meeting_type,
        max_leads_per_slot: request.max_leads_per_slot,
        daily_lead_quota: request.daily_lead_quota,
    };
    let saved = run_blocking(&state, move |service| service.save_closer(closer)).await?;
    Ok(Json(saved))
}

async fn add_availability_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(closer_id): Path<Uuid>,
    Json(request): Json<AvailabilityRequest>,
) -> Result<Json<AvailabilityChange>, SchedulingError> {
    let slot = AvailabilitySlot::new(closer_id, request.weekday, request.time_of_day);
    let changed = run_blocking(&state, move |service| service.add_availability(slot)).await?;
    Ok(Json(AvailabilityChange { changed }))
}

async fn remove_availability_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(closer_id): Path<Uuid>,
    Json(request): Json<AvailabilityRequest>,
) -> Result<Json<AvailabilityChange>, SchedulingError> {
    let slot = AvailabilitySlot::new(closer_id, request.weekday, request.time_of_day);
    let changed = run_blocking(&state, move |service| service.remove_availability(slot)).await?;
    Ok(Json(AvailabilityChange { changed }))
}

async fn add_blocked_date_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(closer_id): Path<Uuid>,
    Json(request): Json<BlockedDateRequest>,
) -> Result<(StatusCode, Json<BlockedDate>), SchedulingError> {
    let block = BlockedDate {
        id: Uuid::new_v4(),
        closer_id,
        date: request.date,
        start_time: request.start_time,
        end_time: request.end_time,
        reason: request.reason,
    };
    let saved = run_blocking(&state, move |service| service.add_blocked_date(block)).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn remove_blocked_date_handler<S: SchedulingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(block_id): Path<Uuid>,
) -> Result<StatusCode, SchedulingError> {
    run_blocking(&state, move |service| service.remove_blocked_date(block_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_caller_role_defaults_to_operator() {
        let headers = HeaderMap::new();
        assert_eq!(caller_role(&headers).unwrap(), CallerRole::Operator);
    }

    #[test]
    fn test_caller_role_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CALLER_ROLE_HEADER, HeaderValue::from_static("Admin"));
        assert_eq!(caller_role(&headers).unwrap(), CallerRole::Admin);

        headers.insert(CALLER_ROLE_HEADER, HeaderValue::from_static("guest"));
        assert!(matches!(
            caller_role(&headers),
            Err(SchedulingError::InvalidInput(_))
        ));
    }
}
