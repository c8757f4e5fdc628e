//! Record endpoints, one generic handler set shared by every entity.

use crate::api::AppState;
use crate::error::ApiError;
use crate::storage::{Collection, Record, RecordStore};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

type Store = Arc<dyn RecordStore>;

/// `base` (list, create) and `base/:id` (fetch, update, delete).
pub fn resource<R>(base: &str) -> Router<AppState>
where
    R: Record,
    dyn RecordStore: Collection<R>,
{
    Router::new()
        .route(base, get(list::<R>).post(create::<R>))
        .route(
            &format!("{base}/:id"),
            get(fetch::<R>).put(update::<R>).delete(remove::<R>),
        )
}

fn record_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    let Path(id) = path.map_err(|_| ApiError::BadRequest("Invalid ID".to_string()))?;
    Ok(id)
}

fn record_body<R: Record>(body: Result<Json<R>, JsonRejection>) -> Result<R, ApiError> {
    let Json(record) =
        body.map_err(|err| ApiError::BadRequest(format!("Invalid request body: {}", err.body_text())))?;
    record.validate().map_err(ApiError::BadRequest)?;
    Ok(record)
}

async fn list<R>(
    State(store): State<Store>,
    query: Result<Query<R::Filter>, QueryRejection>,
) -> Result<Json<Vec<R>>, ApiError>
where
    R: Record,
    dyn RecordStore: Collection<R>,
{
    let Query(filter) = query.map_err(|err| {
        ApiError::BadRequest(format!("Invalid query parameters: {}", err.body_text()))
    })?;

    let records = <dyn RecordStore as Collection<R>>::list(&*store, &filter).await?;
    Ok(Json(records))
}

async fn fetch<R>(
    State(store): State<Store>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<R>, ApiError>
where
    R: Record,
    dyn RecordStore: Collection<R>,
{
    let id = record_id(path)?;
    let record = <dyn RecordStore as Collection<R>>::get(&*store, id).await?;
    Ok(Json(record))
}

async fn create<R>(
    State(store): State<Store>,
    body: Result<Json<R>, JsonRejection>,
) -> Result<(StatusCode, Json<R>), ApiError>
where
    R: Record,
    dyn RecordStore: Collection<R>,
{
    let record = record_body(body)?;
    let created = <dyn RecordStore as Collection<R>>::create(&*store, record).await?;

    info!("➕ Created {} {}", R::LABEL, created.id());
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update<R>(
    State(store): State<Store>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<R>, JsonRejection>,
) -> Result<Json<R>, ApiError>
where
    R: Record,
    dyn RecordStore: Collection<R>,
{
    let id = record_id(path)?;
    let record = record_body(body)?;
    let updated = <dyn RecordStore as Collection<R>>::update(&*store, id, record).await?;

    info!("✏️  Updated {} {}", R::LABEL, id);
    Ok(Json(updated))
}

async fn remove<R>(
    State(store): State<Store>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError>
where
    R: Record,
    dyn RecordStore: Collection<R>,
{
    let id = record_id(path)?;
    <dyn RecordStore as Collection<R>>::delete(&*store, id).await?;

    info!("🗑️  Deleted {} {}", R::LABEL, id);
    Ok(Json(json!({ "message": format!("{} deleted", R::LABEL) })))
}
