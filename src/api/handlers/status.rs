use crate::api::server::AppState;
use crate::api::types::AppStatus;
use crate::db::{Connector, DatabaseConnection};
use crate::utils::error::Result;
use axum::{extract::State, Json};
use tracing::debug;

/// GET /status - database liveness and pool occupancy
///
/// Any failure to get a connection or run the query is returned as an error
/// response; the route never reports a status it could not observe.
pub async fn get_status<C: Connector + Clone>(
    State(state): State<AppState<C>>,
) -> Result<Json<AppStatus>> {
    let pool = state.pools.get_pool().await?;
    let mut conn = pool.acquire().await?;

    let db_version = match conn.server_version().await {
        Ok(version) => version,
        Err(e) => {
            pool.discard(conn).await;
            return Err(e);
        }
    };

    let metrics = pool.metrics();
    pool.release(conn);

    debug!(
        active = metrics.active,
        idle = metrics.idle,
        utilization = metrics.utilization(),
        "Status query succeeded"
    );

    Ok(Json(AppStatus {
        db_version,
        active_db_connections: metrics.active,
        idle_db_connections: metrics.idle,
    }))
}
