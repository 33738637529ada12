use axum::extract::State;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::Json;
use crate::models::LicenseStats;

/// Number of recent licenses listed in the stats response.
const RECENT_LICENSES: i64 = 10;

pub async fn admin_stats(State(state): State<AppState>) -> Result<Json<LicenseStats>> {
    let conn = state.db.get()?;
    let stats = queries::license_stats(&conn, RECENT_LICENSES)?;
    Ok(Json(stats))
}
