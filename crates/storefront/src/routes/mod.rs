//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database ping)
//!
//! # Cart (both identities; guest responses refresh the cart cookie)
//! GET  /cart                   - Full cart with catalog data
//! POST /cart/add               - Add units (add-semantics)
//! PUT  /cart/update            - Replace count + selection (set-semantics)
//! POST /cart/remove            - Remove one line
//! PUT  /cart/select            - Tick/untick one line
//! PUT  /cart/select-all        - Tick/untick every line
//! GET  /cart/summary           - Mini cart for the header badge
//! POST /cart/merge             - Fold anonymous cart into account (auth)
//!
//! # Checkout (requires auth)
//! GET  /checkout               - Settlement: addresses + selected lines
//! POST /orders                 - Commit selected lines as an order
//! GET  /orders/{order_id}      - Order detail
//! ```

pub mod cart;
pub mod checkout;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", put(cart::update))
        .route("/remove", post(cart::remove))
        .route("/select", put(cart::select))
        .route("/select-all", put(cart::select_all))
        .route("/summary", get(cart::summary))
        .route("/merge", post(cart::merge))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Cart routes
        .nest("/cart", cart_routes())
        // Checkout
        .route("/checkout", get(checkout::settlement))
        .route("/orders", post(checkout::commit))
        .route("/orders/{order_id}", get(checkout::detail))
}
