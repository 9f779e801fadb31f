use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{
        AllRecordsQuery, ByDateQuery, CreateRecordRequest, DateRangeQuery, NotificationsDisabled,
        PetRecordsQuery, RecordResponse, UpdateRecordRequest,
    },
    repo_types::{ActivityRecord, RecordFilter},
};
use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppResult},
    pets::handlers::RESOURCE as PET,
    state::AppState,
};

const RECORD: &str = "record";

pub fn record_routes() -> Router<AppState> {
    Router::new()
        .route("/records", get(list_for_pet).post(create_record))
        .route("/records/all-user-pets", get(list_all))
        .route("/records/by-date", get(list_by_date))
        .route("/records/by-date-range", get(list_by_date_range))
        .route(
            "/records/disable-all-notifications",
            post(disable_all_notifications),
        )
        .route(
            "/records/:id",
            get(get_record).patch(update_record).delete(delete_record),
        )
}

fn to_response(rows: Vec<ActivityRecord>) -> Json<Vec<RecordResponse>> {
    Json(rows.into_iter().map(RecordResponse::from).collect())
}

async fn list(
    state: &AppState,
    owner: Uuid,
    filter: RecordFilter,
) -> AppResult<Json<Vec<RecordResponse>>> {
    let rows = state.records.list(owner, &filter).await?;
    Ok(to_response(rows))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn create_record(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<CreateRecordRequest>,
) -> AppResult<(StatusCode, Json<RecordResponse>)> {
    let new = payload.validate()?;
    let rec = state
        .records
        .create(user.id, new)
        .await?
        .ok_or(AppError::Denied(PET))?;
    info!(record_id = %rec.id, pet_id = %rec.pet_id, "activity record created");
    Ok((StatusCode::CREATED, Json(RecordResponse::from(rec))))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_for_pet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(q): Query<PetRecordsQuery>,
) -> AppResult<Json<Vec<RecordResponse>>> {
    let pet_id = q.pet_id;
    let filter = q.into_filter()?;
    if !state.records.pet_owned(user.id, pet_id).await? {
        return Err(AppError::Denied(PET));
    }
    list(&state, user.id, filter).await
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_all(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(q): Query<AllRecordsQuery>,
) -> AppResult<Json<Vec<RecordResponse>>> {
    list(&state, user.id, q.into_filter()?).await
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_by_date(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(q): Query<ByDateQuery>,
) -> AppResult<Json<Vec<RecordResponse>>> {
    list(&state, user.id, q.into_filter()?).await
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_by_date_range(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(q): Query<DateRangeQuery>,
) -> AppResult<Json<Vec<RecordResponse>>> {
    list(&state, user.id, q.into_filter()?).await
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_record(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RecordResponse>> {
    let rec = state
        .records
        .get(user.id, id)
        .await?
        .ok_or(AppError::Denied(RECORD))?;
    Ok(Json(RecordResponse::from(rec)))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_record(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRecordRequest>,
) -> AppResult<Json<RecordResponse>> {
    let patch = payload.validate()?;
    let rec = state
        .records
        .update(user.id, id, patch)
        .await?
        .ok_or(AppError::Denied(RECORD))?;
    info!(record_id = %rec.id, "activity record updated");
    Ok(Json(RecordResponse::from(rec)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_record(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !state.records.delete(user.id, id).await? {
        return Err(AppError::Denied(RECORD));
    }
    info!(record_id = %id, "activity record deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn disable_all_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<NotificationsDisabled>> {
    let updated = state.records.disable_notifications(user.id).await?;
    info!(updated, "notifications disabled");
    Ok(Json(NotificationsDisabled { updated }))
}
