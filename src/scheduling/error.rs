use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::NaiveDateTime;
use uuid::Uuid;

use super::types::AttendeeStatus;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulingError {
    #[error("Slot {scheduled_at} for closer {closer_id} is full ({occupancy}/{capacity})")]
    CapacityExceeded {
        closer_id: Uuid,
        scheduled_at: NaiveDateTime,
        occupancy: u32,
        capacity: u32,
    },
    #[error("No availability configured for closer {closer_id} at {scheduled_at}")]
    InvalidSlot {
        closer_id: Uuid,
        scheduled_at: NaiveDateTime,
    },
    #[error("Closer {closer_id} is blocked at {scheduled_at}")]
    BlockedSlot {
        closer_id: Uuid,
        scheduled_at: NaiveDateTime,
    },
    #[error("{0} {1} not found")]
    NotFound(&'static str, Uuid),
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AttendeeStatus,
        to: AttendeeStatus,
    },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Database connection failed")]
    DatabaseConnection,
}

impl SchedulingError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::InvalidSlot { .. } => "invalid_slot",
            Self::BlockedSlot { .. } => "blocked_slot",
            Self::NotFound(..) => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidInput(_) => "invalid_input",
            Self::Storage(_) => "storage",
            Self::DatabaseConnection => "database_connection",
        }
    }

    pub fn closer(id: Uuid) -> Self {
        Self::NotFound("Closer", id)
    }

    pub fn meeting(id: Uuid) -> Self {
        Self::NotFound("Meeting", id)
    }

    pub fn attendee(id: Uuid) -> Self {
        Self::NotFound("Attendee", id)
    }
}

#[cfg(feature = "postgres")]
impl From<diesel::result::Error> for SchedulingError {
    fn from(e: diesel::result::Error) -> Self {
        log::error!("Scheduling query failed: {e}");
        Self::Storage(e.to_string())
    }
}

impl IntoResponse for SchedulingError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Self::CapacityExceeded { .. } => StatusCode::CONFLICT,
            Self::InvalidSlot { .. }
            | Self::BlockedSlot { .. }
            | Self::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(..) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) | Self::DatabaseConnection => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(serde_json::json!({ "error": self.kind(), "message": self.to_string() })),
        )
            .into_response()
    }
}
