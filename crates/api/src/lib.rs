//! HTTP API server for the marketplace checkout.
//!
//! Provides REST endpoints for the catalog, carts, checkout, orders and
//! payments, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{
    CardPaymentProvider, CartService, CatalogService, CheckoutService, InMemoryCardProvider,
    InMemoryProfileDirectory, LoggingNotifier, OrderAssembly, PaymentProcessor,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Database;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::{CardProviderKind, Config};
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<D: Database>(state: Arc<AppState<D>>, metrics_handle: PrometheusHandle) -> Router {
    let expose_error_details = state.expose_error_details;

    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    let mut app = Router::new()
        .route("/health", get(routes::ops::health::<D>))
        .route(
            "/products",
            get(routes::products::list::<D>).post(routes::products::create::<D>),
        )
        .route(
            "/products/{id}",
            get(routes::products::get::<D>)
                .patch(routes::products::update::<D>)
                .delete(routes::products::delete::<D>),
        )
        .route("/products/{id}/stock", post(routes::products::adjust_stock::<D>))
        .route(
            "/products/{id}/availability",
            post(routes::products::set_availability::<D>),
        )
        .route("/customers/{user_id}", post(routes::customers::register::<D>))
        .route("/customers/{user_id}/orders", get(routes::customers::orders::<D>))
        .route(
            "/customers/{user_id}/cart",
            get(routes::carts::get::<D>).delete(routes::carts::clear::<D>),
        )
        .route("/customers/{user_id}/cart/items", post(routes::carts::add_item::<D>))
        .route(
            "/cart-items/{id}",
            axum::routing::patch(routes::carts::update_item::<D>)
                .delete(routes::carts::remove_item::<D>),
        )
        .route("/checkout", post(routes::checkout::submit::<D>))
        .route("/checkout/form", post(routes::checkout::submit_form::<D>))
        .route("/orders/custom", post(routes::orders::create_custom::<D>))
        .route("/orders/{id}", get(routes::orders::get::<D>))
        .route(
            "/orders/{id}/status",
            axum::routing::patch(routes::orders::update_status::<D>),
        )
        .route("/orders/{id}/payments", post(routes::orders::create_payment::<D>))
        .route("/payments/webhook", post(routes::payments::webhook::<D>))
        .route("/payments/{id}", get(routes::payments::get::<D>))
        .route("/payments/{id}/complete", post(routes::payments::complete::<D>))
        .route("/payments/{id}/cancel", post(routes::payments::cancel::<D>))
        .route("/payments/{id}/refund", post(routes::payments::refund::<D>))
        .with_state(state)
        .merge(metrics_router);

    if expose_error_details {
        app = app.layer(axum::middleware::from_fn(error::expose_error_details));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(TraceLayer::new_for_http())
}

/// Wires the services over `db` according to `config`.
///
/// Customer profiles live in the in-memory directory held by the state.
pub fn create_default_state<D: Database>(
    db: D,
    config: &Config,
    storage: &'static str,
) -> Arc<AppState<D>> {
    let settings = config.checkout_settings();
    let profiles = InMemoryProfileDirectory::new();
    let card_provider: Option<Arc<dyn CardPaymentProvider>> = match config.card_provider {
        CardProviderKind::None => None,
        CardProviderKind::InMemory => Some(Arc::new(InMemoryCardProvider::new())),
    };

    let checkout = CheckoutService::new(
        db.clone(),
        settings.clone(),
        Arc::new(profiles.clone()),
        card_provider.clone(),
        Arc::new(LoggingNotifier),
    );

    Arc::new(AppState {
        catalog: CatalogService::new(db.clone()),
        carts: CartService::new(db.clone(), settings.cart_ttl),
        orders: OrderAssembly::new(db.clone(), settings.commission_rate),
        payments: PaymentProcessor::new(db, card_provider, settings),
        checkout,
        profiles,
        storage,
        expose_error_details: config.expose_error_details,
    })
}
