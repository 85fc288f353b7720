//! Customer order pages and the back-office order desk.

use axum::extract::{Path, State};
use axum::response::Redirect;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::context::{AdminUser, AuthUser};
use super::error::{with_query, JsonError, RedirectError};
use super::{AppState, Payload};
use crate::domain::{Order, PaymentAction};
use crate::StorefrontError;

const ADMIN_ORDERS: &str = "/admin/orders";

/// Ids come in as text so that a mangled one reads as a missing order
/// instead of a bare extractor rejection.
fn order_id(raw: &str) -> Result<Uuid, StorefrontError> {
    raw.trim().parse().map_err(|_| StorefrontError::not_found("Order"))
}

pub(super) async fn mine(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<Vec<Order>>, JsonError> {
    Ok(Json(state.orders.list_for_user(user.user_id).await?))
}

pub(super) async fn my_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, JsonError> {
    Ok(Json(state.orders.get_for_user(user.user_id, order_id(&id)?).await?))
}

pub(super) async fn cancel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Redirect, RedirectError> {
    let id = order_id(&id).map_err(|e| RedirectError::new("/my-orders", e))?;
    let page = format!("/my-orders/{id}");
    match state.orders.cancel(user.user_id, id).await {
        Ok(_) => Ok(Redirect::to(&with_query(&page, "message", "Order has been successfully cancelled."))),
        Err(e @ StorefrontError::NotFound(_)) => Err(RedirectError::new("/my-orders", e)),
        Err(e) => Err(RedirectError::new(page, e)),
    }
}

pub(super) async fn admin_list(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Order>>, JsonError> {
    Ok(Json(state.orders.list_all().await?))
}

pub(super) async fn admin_detail(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, JsonError> {
    Ok(Json(state.orders.get(order_id(&id)?).await?))
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusForm {
    #[serde(default)]
    status: String,
}

/// A missing order sends the admin back to the list, anything else back to
/// the order page.
fn admin_failure(id: Uuid, err: StorefrontError) -> RedirectError {
    match err {
        StorefrontError::NotFound(_) => RedirectError::new(ADMIN_ORDERS, err),
        _ => RedirectError::new(format!("{ADMIN_ORDERS}/{id}"), err),
    }
}

pub(super) async fn admin_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(form): Payload<StatusForm>,
) -> Result<Redirect, RedirectError> {
    let id = order_id(&id).map_err(|e| RedirectError::new(ADMIN_ORDERS, e))?;
    let order = state
        .orders
        .admin_update_status(admin.user_id, id, &form.status)
        .await
        .map_err(|e| admin_failure(id, e))?;
    let message = format!("Order status updated to {}", order.status());
    Ok(Redirect::to(&with_query(&format!("{ADMIN_ORDERS}/{id}"), "success", &message)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PaymentActionForm {
    #[serde(default)]
    action: String,
    admin_notes: Option<String>,
}

pub(super) async fn admin_payment_action(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(form): Payload<PaymentActionForm>,
) -> Result<Redirect, RedirectError> {
    let id = order_id(&id).map_err(|e| RedirectError::new(ADMIN_ORDERS, e))?;
    let order = state
        .orders
        .payment_action(admin.user_id, id, &form.action, form.admin_notes)
        .await
        .map_err(|e| admin_failure(id, e))?;
    let message = match form.action.trim().parse::<PaymentAction>() {
        Ok(PaymentAction::Approve) => "Payment approved successfully. Order status updated to Processing.",
        _ => "Payment rejected successfully.",
    };
    tracing::debug!(order_number = %order.order_number(), "payment action redirect");
    Ok(Redirect::to(&with_query(&format!("{ADMIN_ORDERS}/{id}"), "success", message)))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{body_json, location, TestApp};
    use crate::domain::aggregates::order::tests::order_with;
    use crate::domain::{Order, PaymentMethod};
    use crate::repository::OrderRepository;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn as_user(req: axum::http::request::Builder, user: Uuid, role: &str) -> axum::http::request::Builder {
        req.header(header::COOKIE, "sid=desk").header("x-user-id", user.to_string()).header("x-user-role", role)
    }

    fn form(uri: &str, user: Uuid, role: &str, body: &str) -> Request<Body> {
        as_user(Request::post(uri), user, role)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str, user: Uuid, role: &str) -> Request<Body> {
        as_user(Request::get(uri), user, role).body(Body::empty()).unwrap()
    }

    async fn seeded(app: &TestApp, method: PaymentMethod) -> Order {
        let order = order_with(method);
        app.orders.insert(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_customer_lists_and_cancels() {
        let app = TestApp::new();
        let order = seeded(&app, PaymentMethod::CashOnDelivery).await;
        let owner = order.user_id();

        let res = app.router.clone().oneshot(get("/my-orders", owner, "user")).await.unwrap();
        assert_eq!(body_json(res).await.as_array().unwrap().len(), 1);

        let res = app.router.clone().oneshot(get(&format!("/my-orders/{}", order.id()), Uuid::now_v7(), "user")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = app.router.clone().oneshot(form(&format!("/my-orders/{}/cancel", order.id()), owner, "user", "")).await.unwrap();
        assert_eq!(
            location(&res),
            format!("/my-orders/{}?message=Order+has+been+successfully+cancelled.", order.id())
        );

        let res = app.router.clone().oneshot(form(&format!("/my-orders/{}/cancel", order.id()), owner, "user", "")).await.unwrap();
        assert_eq!(
            location(&res),
            format!("/my-orders/{}?error=This+order+cannot+be+cancelled+because+it+has+already+been+cancelled.", order.id())
        );
    }

    #[tokio::test]
    async fn test_admin_routes_require_admin() {
        let app = TestApp::new();
        let res = app.router.clone().oneshot(get("/admin/orders", Uuid::now_v7(), "seller")).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = app.router.clone().oneshot(Request::get("/admin/orders").body(Body::empty()).unwrap()).await.unwrap();
        assert!(location(&res).starts_with("/users/login"));
    }

    #[tokio::test]
    async fn test_admin_status_updates() {
        let app = TestApp::new();
        let order = seeded(&app, PaymentMethod::CashOnDelivery).await;
        let admin = Uuid::now_v7();
        let uri = format!("/admin/orders/{}/status", order.id());

        let res = app.router.clone().oneshot(form(&uri, admin, "admin", "status=shipped")).await.unwrap();
        assert_eq!(location(&res), format!("/admin/orders/{}?success=Order+status+updated+to+shipped", order.id()));

        let res = app.router.clone().oneshot(form(&uri, admin, "admin", "status=lost")).await.unwrap();
        assert_eq!(location(&res), format!("/admin/orders/{}?error=Invalid+status", order.id()));

        let res = app.router.clone().oneshot(form(&format!("/admin/orders/{}/status", Uuid::now_v7()), admin, "admin", "status=shipped")).await.unwrap();
        assert_eq!(location(&res), "/admin/orders?error=Order+not+found");

        let res = app.router.clone().oneshot(get(&format!("/admin/orders/{}", order.id()), admin, "admin")).await.unwrap();
        assert_eq!(body_json(res).await["status"], "shipped");
    }

    #[tokio::test]
    async fn test_admin_cannot_revive_cancelled_order() {
        let app = TestApp::new();
        let order = seeded(&app, PaymentMethod::CashOnDelivery).await;
        app.router.clone().oneshot(form(&format!("/my-orders/{}/cancel", order.id()), order.user_id(), "user", "")).await.unwrap();

        let res = app
            .router
            .clone()
            .oneshot(form(&format!("/admin/orders/{}/status", order.id()), Uuid::now_v7(), "admin", "status=processing"))
            .await
            .unwrap();
        assert!(location(&res).contains("Customer+cancellations+are+final"));
    }

    #[tokio::test]
    async fn test_mangled_order_id_redirects() {
        let app = TestApp::new();
        let user = Uuid::now_v7();

        let res = app.router.clone().oneshot(form("/my-orders/not-an-id/cancel", user, "user", "")).await.unwrap();
        assert_eq!(location(&res), "/my-orders?error=Order+not+found");

        let res = app.router.clone().oneshot(form("/admin/orders/42/status", user, "admin", "status=shipped")).await.unwrap();
        assert_eq!(location(&res), "/admin/orders?error=Order+not+found");

        let res = app.router.clone().oneshot(form("/admin/orders/42/payment-action", user, "admin", "action=approve")).await.unwrap();
        assert_eq!(location(&res), "/admin/orders?error=Order+not+found");

        let res = app.router.clone().oneshot(get("/my-orders/42", user, "user")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_payment_actions() {
        let app = TestApp::new();
        let admin = Uuid::now_v7();
        let jazz = seeded(&app, PaymentMethod::JazzCash).await;
        let cod = seeded(&app, PaymentMethod::CashOnDelivery).await;

        let uri = format!("/admin/orders/{}/payment-action", jazz.id());
        let res = app.router.clone().oneshot(form(&uri, admin, "admin", "action=approve&adminNotes=checked")).await.unwrap();
        assert_eq!(
            location(&res),
            format!("/admin/orders/{}?success=Payment+approved+successfully.+Order+status+updated+to+Processing.", jazz.id())
        );
        let stored = app.orders.find_by_id(jazz.id()).await.unwrap().unwrap();
        assert_eq!(stored.status().as_str(), "processing");
        assert_eq!(stored.payment().admin_notes.as_deref(), Some("checked"));

        let uri = format!("/admin/orders/{}/payment-action", cod.id());
        let res = app.router.clone().oneshot(form(&uri, admin, "admin", "action=approve")).await.unwrap();
        assert_eq!(location(&res), format!("/admin/orders/{}?error=This+order+does+not+require+payment+approval", cod.id()));

        let res = app.router.clone().oneshot(form(&uri, admin, "admin", "action=refund")).await.unwrap();
        assert_eq!(location(&res), format!("/admin/orders/{}?error=Invalid+payment+action", cod.id()));
    }
}
