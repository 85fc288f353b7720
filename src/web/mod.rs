//! HTTP surface: axum router, request context and handlers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{DefaultBodyLimit, FromRequest, Request};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::de::DeserializeOwned;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::repository::{CartStores, OrderRepository, ProductRepository};
use crate::service::{CartEngine, CartMigration, EventPublisher, OrderBuilder, OrderWorkflow};

mod cart;
pub mod context;
pub mod error;
mod orders;
pub mod upload;

pub use context::{AdminUser, AuthUser, Identity, RequestContext, Role};
pub use upload::{FileStorage, LocalFileStorage};

/// Headroom above the proof image for the other checkout fields.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub cart: CartEngine,
    pub migration: CartMigration,
    pub checkout: OrderBuilder,
    pub orders: OrderWorkflow,
    pub uploads: Arc<dyn FileStorage>,
    pub upload_max_bytes: usize,
}

impl AppState {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        carts: CartStores,
        orders: Arc<dyn OrderRepository>,
        events: Arc<dyn EventPublisher>,
        uploads: Arc<dyn FileStorage>,
        upload_max_bytes: usize,
    ) -> Self {
        Self {
            cart: CartEngine::new(products.clone(), carts.clone()),
            migration: CartMigration::new(carts.session.clone(), carts.persisted.clone(), events.clone()),
            checkout: OrderBuilder::new(products, carts.persisted, orders.clone(), events.clone()),
            orders: OrderWorkflow::new(orders, events),
            uploads,
            upload_max_bytes,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let checkout_limit = DefaultBodyLimit::max(state.upload_max_bytes + FORM_OVERHEAD_BYTES);
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront"})) }))
        .route("/cart", get(cart::view))
        .route("/cart/summary", get(cart::summary))
        .route("/cart/add", post(cart::add))
        .route("/cart/remove", post(cart::remove))
        .route("/cart/update-quantity", post(cart::update_quantity))
        .route("/cart/clear", post(cart::clear))
        .route("/cart/migrate", post(cart::migrate))
        .route("/cart/checkout", get(cart::checkout))
        .route("/cart/place-order", post(cart::place_order).layer(checkout_limit))
        .route("/cart/order-confirmation", get(cart::confirmation))
        .route("/my-orders", get(orders::mine))
        .route("/my-orders/:id", get(orders::my_order))
        .route("/my-orders/:id/cancel", post(orders::cancel))
        .route("/admin/orders", get(orders::admin_list))
        .route("/admin/orders/:id", get(orders::admin_detail))
        .route("/admin/orders/:id/status", post(orders::admin_status))
        .route("/admin/orders/:id/payment-action", post(orders::admin_payment_action))
        .layer(axum::middleware::from_fn(context::session_cookie))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Request body accepted either as JSON or as an urlencoded form, which is
/// what the storefront pages post.
pub struct Payload<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            let Json(body) = Json::<T>::from_request(req, state).await.map_err(IntoResponse::into_response)?;
            Ok(Self(body))
        } else {
            let Form(body) = Form::<T>::from_request(req, state).await.map_err(IntoResponse::into_response)?;
            Ok(Self(body))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::aggregates::cart::tests::product;
    use crate::domain::Product;
    use crate::repository::{InMemCartRepo, InMemOrderRepo, InMemProductRepo, SessionCartRepo};
    use crate::service::LogPublisher;
    use axum::body::{to_bytes, Body};
    use axum::http::{Response as HttpResponse, StatusCode};
    use std::time::Duration;
    use uuid::Uuid;

    pub(crate) struct TestApp {
        pub(crate) router: Router,
        pub(crate) products: InMemProductRepo,
        pub(crate) orders: InMemOrderRepo,
        pub(crate) upload_dir: std::path::PathBuf,
    }

    impl TestApp {
        pub(crate) fn new() -> Self {
            let products = InMemProductRepo::new();
            let orders = InMemOrderRepo::new();
            let stores = CartStores {
                session: Arc::new(SessionCartRepo::new(100, Duration::from_secs(60))),
                persisted: Arc::new(InMemCartRepo::new(products.clone())),
            };
            let upload_dir = std::env::temp_dir().join(format!("storefront-web-{}", Uuid::new_v4()));
            let state = AppState::new(
                Arc::new(products.clone()),
                stores,
                Arc::new(orders.clone()),
                Arc::new(LogPublisher),
                Arc::new(LocalFileStorage::new(&upload_dir, 1024 * 1024)),
                1024 * 1024,
            );
            Self { router: router(state), products, orders, upload_dir }
        }

        pub(crate) async fn stock(&self, name: &str, cents: i64) -> Product {
            let p = product(name, cents);
            self.products.upsert(p.clone()).await;
            p
        }
    }

    impl Drop for TestApp {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.upload_dir);
        }
    }

    pub(crate) async fn body_json(res: HttpResponse<Body>) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub(crate) fn location(res: &HttpResponse<Body>) -> String {
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        res.headers()[header::LOCATION].to_str().unwrap().to_string()
    }
}
