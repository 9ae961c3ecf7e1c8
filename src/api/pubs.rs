use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::error::Result;
use crate::models::PubView;
use crate::store::Store;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub title: String,
}

/// `GET /pubs?sortBy=asc|desc`
pub async fn list<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PubView>>> {
    let pubs = state.pubs.get_all_pubs(query.sort_by.as_deref()).await?;
    Ok(Json(pubs))
}

/// `GET /pubs/search?title=`
pub async fn search<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<PubView>>> {
    let pubs = state.pubs.search_pubs(&query.title).await?;
    Ok(Json(pubs))
}

/// `GET /pubs/:id`
pub async fn get<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PubView>> {
    let venue = state.pubs.get_pub_by_id(id).await?;
    Ok(Json(venue))
}
