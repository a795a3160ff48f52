//! Read-only listings and the video soft delete

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use robodigest_common::errors::Result;
use robodigest_common::store::{ListFilter, SortOrder};
use robodigest_ingestion::{ItemKind, Items};
use serde::Deserialize;
use validator::Validate;

use crate::AppState;

/// Query string shared by every listing
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListQuery {
    #[validate(length(min = 1, max = 128))]
    pub category: Option<String>,

    #[validate(range(min = 1))]
    pub uid: Option<i64>,

    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u64>,

    pub offset: Option<u64>,

    pub order: Option<SortOrder>,
}

impl ListQuery {
    fn into_filter(self) -> Result<ListFilter> {
        self.validate()?;
        let defaults = ListFilter::default();
        Ok(ListFilter {
            category: self.category,
            uid: self.uid,
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(0),
            order: self.order.unwrap_or_default(),
        })
    }
}

async fn list(state: &AppState, kind: ItemKind, query: ListQuery) -> Result<Json<Items>> {
    let filter = query.into_filter()?;
    Ok(Json(state.aggregator.list_items(kind, &filter).await?))
}

pub async fn papers(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<Items>> {
    list(&state, ItemKind::Papers, query).await
}

pub async fn news(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<Items>> {
    list(&state, ItemKind::News, query).await
}

pub async fn jobs(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<Items>> {
    list(&state, ItemKind::Jobs, query).await
}

pub async fn channels(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<Items>> {
    list(&state, ItemKind::Channels, query).await
}

pub async fn videos(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<Items>> {
    list(&state, ItemKind::Videos, query).await
}

pub async fn hide_video(State(state): State<AppState>, Path(bvid): Path<String>) -> Result<StatusCode> {
    state.aggregator.hide_video(&bvid).await?;
    Ok(StatusCode::NO_CONTENT)
}
