use uuid::Uuid;

use crate::scheduling::SchedulingError;

#[cfg(feature = "postgres")]
use diesel::{
    r2d2::{ConnectionManager, Pool},
    PgConnection,
};

#[cfg(feature = "postgres")]
pub type DbPool = Pool<ConnectionManager<PgConnection>>;

#[cfg(feature = "postgres")]
pub fn create_conn(database_url: &str, pool_size: u32) -> Result<DbPool, diesel::r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().max_size(pool_size.max(1)).build(manager)
}

/// Hides the password part of a connection URL for logging.
pub fn redact_database_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.rsplit_once('@') {
        Some((credentials, host)) => {
            let user = credentials.split(':').next().unwrap_or_default();
            format!("{scheme}://{user}:***@{host}")
        }
        None => url.to_string(),
    }
}

/// Comma separated ids as sent in query strings; blanks are skipped.
pub fn parse_uuid_list(raw: &str) -> Result<Vec<Uuid>, SchedulingError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s)
                .map_err(|_| SchedulingError::InvalidInput(format!("invalid id: {s}")))
        })
        .collect()
}
