use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tracing::error;

use super::dispatch::{Dispatcher, Event};
use super::domain::{CardId, CardQuery};
use super::notify::Notifier;
use super::repository::{CatalogRepository, CatalogStore};

/// Router builder exposing the transport event hook and the public catalog.
pub fn catalog_router<R, N>(dispatcher: Arc<Dispatcher<R, N>>) -> Router
where
    R: CatalogStore + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/events", post(event_handler::<R, N>))
        .route("/api/v1/cards", get(cards_handler::<R, N>))
        .route("/api/v1/cards/:card_id", get(card_handler::<R, N>))
        .with_state(dispatcher)
}

pub(crate) async fn event_handler<R, N>(
    State(dispatcher): State<Arc<Dispatcher<R, N>>>,
    axum::Json(event): axum::Json<Event>,
) -> Response
where
    R: CatalogStore + 'static,
    N: Notifier + 'static,
{
    let replies = dispatcher.dispatch(event).await;
    (StatusCode::OK, axum::Json(json!({ "replies": replies }))).into_response()
}

pub(crate) async fn cards_handler<R, N>(
    State(dispatcher): State<Arc<Dispatcher<R, N>>>,
    Query(query): Query<CardQuery>,
) -> Response
where
    R: CatalogStore + 'static,
    N: Notifier + 'static,
{
    match dispatcher.store().list_cards(&query).await {
        Ok(cards) => (StatusCode::OK, axum::Json(cards)).into_response(),
        Err(storage) => {
            error!(error = %storage, "catalog listing failed");
            let payload = json!({
                "error": storage.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn card_handler<R, N>(
    State(dispatcher): State<Arc<Dispatcher<R, N>>>,
    Path(card_id): Path<i64>,
) -> Response
where
    R: CatalogStore + 'static,
    N: Notifier + 'static,
{
    let id = CardId(card_id);
    match dispatcher.store().card(id).await {
        Ok(Some(card)) => (StatusCode::OK, axum::Json(card)).into_response(),
        Ok(None) => {
            let payload = json!({
                "error": format!("card {id} not found"),
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(storage) => {
            error!(error = %storage, card_id = %id, "card lookup failed");
            let payload = json!({
                "error": storage.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
