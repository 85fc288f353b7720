//! Cart and checkout handlers.

use axum::extract::{Multipart, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::context::{AuthUser, RequestContext};
use super::error::{user_message, with_query, JsonError, OrRedirect, RedirectError};
use super::upload::ProofUpload;
use super::{AppState, Payload};
use crate::domain::value_objects::parse_count;
use crate::domain::{Cart, CartLine, Money, PaymentSubmission, Quantity, ShippingDetails};
use crate::service::PlaceOrder;
use crate::StorefrontError;

const CART_PAGE: &str = "/cart";
const CHECKOUT_PAGE: &str = "/cart/checkout";
const PROOF_FIELD: &str = "transactionScreenshot";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ItemRequest {
    product_id: String,
    quantity: Option<serde_json::Value>,
}

impl ItemRequest {
    /// An id that is not even a UUID cannot name a product.
    fn product_id(&self) -> Result<Uuid, StorefrontError> {
        self.product_id.trim().parse().map_err(|_| StorefrontError::not_found("Product"))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CartChanged {
    success: bool,
    cart_count: i64,
    cart_total: Money,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CartView {
    items: Vec<CartLine>,
    cart_count: i64,
    cart_total: Money,
}

pub(super) async fn view(State(state): State<AppState>, ctx: RequestContext) -> Result<Json<CartView>, JsonError> {
    let cart = state.cart.get_cart(&ctx.cart_owner()).await?;
    Ok(Json(CartView { cart_count: cart.count(), cart_total: cart.total(), items: cart.lines().to_vec() }))
}

/// Header badge; never fails.
pub(super) async fn summary(State(state): State<AppState>, ctx: RequestContext) -> Json<serde_json::Value> {
    let (count, total) = match state.cart.get_cart(&ctx.cart_owner()).await {
        Ok(cart) => (cart.count(), cart.total()),
        Err(e) => {
            tracing::warn!(error = %e, "cart summary unavailable");
            (0, Money::ZERO)
        }
    };
    Json(json!({ "cartCount": count, "cartTotal": total }))
}

pub(super) async fn add(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(req): Payload<ItemRequest>,
) -> Result<Json<CartChanged>, JsonError> {
    let product_id = req.product_id()?;
    let quantity = Quantity::coerce(req.quantity.as_ref())?;
    let cart = state.cart.add_item(&ctx.cart_owner(), product_id, quantity).await?;
    Ok(Json(CartChanged { success: true, cart_count: cart.count(), cart_total: cart.total() }))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(req): Payload<ItemRequest>,
) -> Result<Json<CartChanged>, JsonError> {
    let owner = ctx.cart_owner();
    let cart = match req.product_id() {
        Ok(product_id) => state.cart.remove_item(&owner, product_id).await?,
        Err(_) => state.cart.get_cart(&owner).await?,
    };
    Ok(Json(CartChanged { success: true, cart_count: cart.count(), cart_total: cart.total() }))
}

/// Failures are reported in the body with a 200, as the cart page expects.
pub(super) async fn update_quantity(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(req): Payload<ItemRequest>,
) -> Json<serde_json::Value> {
    match apply_quantity(&state, &ctx, &req).await {
        Ok((item_total, cart)) => Json(json!({ "success": true, "itemTotal": item_total, "cartTotal": cart.total() })),
        Err(e) => Json(json!({ "success": false, "message": user_message(&e) })),
    }
}

async fn apply_quantity(state: &AppState, ctx: &RequestContext, req: &ItemRequest) -> crate::Result<(Money, Cart)> {
    let product_id = req.product_id().map_err(|_| StorefrontError::ItemNotFound)?;
    let raw = req.quantity.as_ref().ok_or_else(|| StorefrontError::validation("Quantity is required"))?;
    state.cart.update_quantity(&ctx.cart_owner(), product_id, parse_count(raw)?).await
}

pub(super) async fn clear(State(state): State<AppState>, ctx: RequestContext) -> Result<Json<serde_json::Value>, JsonError> {
    state.cart.clear(&ctx.cart_owner()).await?;
    Ok(Json(json!({ "success": true, "cartTotal": Money::ZERO })))
}

/// Login hook: the identity provider calls this once right after a
/// successful sign-in, with the browser's session cookie.
pub(super) async fn migrate(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ctx: RequestContext,
) -> Json<serde_json::Value> {
    let merged = state.migration.migrate(&ctx.session_id, user.user_id).await;
    Json(json!({ "success": true, "migrated": merged }))
}

pub(super) async fn checkout(State(state): State<AppState>, AuthUser(user): AuthUser) -> Response {
    match state.checkout.checkout_summary(user.user_id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => RedirectError::new(CART_PAGE, e).into_response(),
    }
}

/// Raw multipart form, before any validation.
#[derive(Debug, Default)]
struct CheckoutForm {
    order: PlaceOrder,
    proof: Option<ProofUpload>,
}

async fn read_checkout_form(mut multipart: Multipart) -> Result<CheckoutForm, StorefrontError> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        tracing::debug!(error = %e, "unreadable checkout form");
        StorefrontError::validation("Please fill in all required fields")
    };
    let mut form = CheckoutForm::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == PROOF_FIELD {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(malformed)?;
            if !bytes.is_empty() {
                form.proof = Some(ProofUpload { file_name, content_type, bytes });
            }
            continue;
        }
        let value = field.text().await.map_err(malformed)?;
        let shipping: &mut ShippingDetails = &mut form.order.shipping;
        let payment: &mut PaymentSubmission = &mut form.order.payment;
        match name.as_str() {
            "fullName" => shipping.full_name = value,
            "email" => shipping.email = value,
            "address" => shipping.address = value,
            "city" => shipping.city = value,
            "state" => shipping.state = value,
            "zipCode" => shipping.zip_code = value,
            "country" => shipping.country = value,
            "paymentMethod" => form.order.payment_method = Some(value),
            "jazzcashNumber" => payment.jazzcash_number = Some(value),
            "accountTitle" => payment.account_title = Some(value),
            "accountNumber" => payment.account_number = Some(value),
            "bankName" => payment.bank_name = Some(value),
            "transactionId" => payment.transaction_id = Some(value),
            _ => {}
        }
    }
    Ok(form)
}

pub(super) async fn place_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> Result<Redirect, RedirectError> {
    let CheckoutForm { mut order, proof } = read_checkout_form(multipart).await.or_redirect(CHECKOUT_PAGE)?;
    if let Some(upload) = proof {
        order.payment.transaction_proof = Some(state.uploads.store_proof(upload).await.or_redirect(CHECKOUT_PAGE)?);
    }

    match state.checkout.place_order(user.user_id, order).await {
        Ok(order) => Ok(Redirect::to(&with_query("/cart/order-confirmation", "orderId", &order.id().to_string()))),
        Err(StorefrontError::EmptyCart) => Err(RedirectError::new(CART_PAGE, StorefrontError::EmptyCart)),
        Err(e) => Err(RedirectError::new(CHECKOUT_PAGE, e)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ConfirmationQuery {
    order_id: Option<String>,
}

pub(super) async fn confirmation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ConfirmationQuery>,
) -> Response {
    let Some(order_id) = query.order_id.and_then(|id| id.trim().parse::<Uuid>().ok()) else {
        return Redirect::to("/my-orders").into_response();
    };
    match state.checkout.confirmation(user.user_id, order_id).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => {
            if !e.is_recoverable() {
                tracing::error!(error = %e, "order confirmation failed");
            }
            Redirect::to("/my-orders").into_response()
        }
    }
}
