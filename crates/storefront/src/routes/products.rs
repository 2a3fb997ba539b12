//! Product route handlers.

use axum::{
    Form, Json,
    extract::{Path, Query, State},
    response::Redirect,
};
use serde::Deserialize;
use tracing::instrument;

use flowmazon_core::ProductId;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{NewProduct, Product};
use crate::services::ProductError;
use crate::services::catalog::ProductPage;
use crate::state::AppState;

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<u32>,
}

/// Add-product form data. Every field is required; missing ones are
/// reported by validation rather than by the extractor.
#[derive(Debug, Deserialize)]
pub struct AddProductForm {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<String>,
}

/// Product listing, newest first.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ProductPage>> {
    Ok(Json(state.catalog().list_page(query.page).await?))
}

/// Product detail.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog().get(id).await?))
}

/// Create a product and return to the listing.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn add_product(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(form): Form<AddProductForm>,
) -> Result<Redirect> {
    let product = NewProduct::parse(
        form.name.as_deref(),
        form.description.as_deref(),
        form.image_url.as_deref(),
        form.price.as_deref(),
    )
    .map_err(ProductError::from)?;

    state.catalog().add_product(&product).await?;
    Ok(Redirect::to("/"))
}
