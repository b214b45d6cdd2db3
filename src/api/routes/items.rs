//! Item Routes
//!
//! CRUD over the caller's list. Every successful mutation is announced to
//! the other connected clients through the WebSocket hub.
//!
//! - GET /items/ - List items
//! - GET /items/add?name=&category= - Add an item
//! - GET /items/delete?uid= - Delete an item
//! - GET /items/edit?uid=&name=&category= - Rename / recategorize an item
//! - GET /items/toggle?uid= - Flip the checked state of an item
//!
//! POST is accepted everywhere GET is.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;

use crate::api::context::RequestContext;
use crate::api::dto::ItemParams;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::store::{list_items, load_item, save_item, Item};
use crate::websocket::EventKind;

/// GET /items/
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<Vec<Item>>> {
    let items = list_items(state.store.as_ref(), &ctx.scope).await?;
    Ok(Json(items))
}

/// GET /items/add
pub async fn add(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<ItemParams>,
) -> ApiResult<Json<Item>> {
    require("name", &params.name)?;

    let item = Item::new(params.name, params.category);
    let key = ctx.scope.item_key(&item.uid);
    save_item(state.store.as_ref(), &key, &item).await?;

    tracing::debug!(key = %key, user = %ctx.user.username, "Item added");
    state.hub.submit_mutation(&ctx.client_id, EventKind::Add, &item);

    Ok(Json(item))
}

/// GET /items/delete
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<ItemParams>,
) -> ApiResult<StatusCode> {
    let (key, item) = existing(&state, &ctx, &params).await?;

    state.store.delete(&key).await?;

    tracing::debug!(key = %key, user = %ctx.user.username, "Item deleted");
    state.hub.submit_mutation(&ctx.client_id, EventKind::Delete, &item);

    Ok(StatusCode::OK)
}

/// GET /items/edit
///
/// Only `uid` is required; name and category are stored as given.
pub async fn edit(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<ItemParams>,
) -> ApiResult<Json<Item>> {
    let (key, mut item) = existing(&state, &ctx, &params).await?;

    item.name = params.name;
    item.category = params.category;
    save_item(state.store.as_ref(), &key, &item).await?;

    state.hub.submit_mutation(&ctx.client_id, EventKind::Edit, &item);

    Ok(Json(item))
}

/// GET /items/toggle
pub async fn toggle(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<ItemParams>,
) -> ApiResult<Json<Item>> {
    let (key, mut item) = existing(&state, &ctx, &params).await?;

    item.is_checked = !item.is_checked;
    save_item(state.store.as_ref(), &key, &item).await?;

    state.hub.submit_mutation(&ctx.client_id, EventKind::Toggle, &item);

    Ok(Json(item))
}

fn require(field: &str, value: &str) -> ApiResult<()> {
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Resolve `params.uid` to its key and current item
async fn existing(
    state: &AppState,
    ctx: &RequestContext,
    params: &ItemParams,
) -> ApiResult<(String, Item)> {
    require("uid", &params.uid)?;

    let key = ctx.scope.item_key(&params.uid);
    let item = load_item(state.store.as_ref(), &key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("item {}", params.uid)))?;

    Ok((key, item))
}
