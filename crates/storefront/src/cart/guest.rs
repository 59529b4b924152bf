//! Anonymous cart backend: the whole cart lives in a client-held cookie.
//!
//! Every request decodes the token into a [`CartSnapshot`], mutates it in
//! memory, and re-encodes it into the response cookie. There is no partial
//! update and no server-side state. A token that fails to decode is treated
//! as an empty cart, never as an error the buyer sees.

use clementine_core::{CartSnapshot, SkuId};
use tower_sessions::cookie::{Cookie, SameSite, time::Duration};

use super::{CartError, CartStore};

/// Cookie carrying the anonymous cart token.
pub const CART_COOKIE_NAME: &str = "cart";

/// Anonymous cart lifetime (one year, refreshed on every write).
const CART_COOKIE_MAX_AGE_DAYS: i64 = 365;

/// In-memory cart decoded from (and re-encoded into) the cookie token.
pub struct GuestCart {
    snapshot: CartSnapshot,
}

impl GuestCart {
    /// Decode a cart from the request's cookie token.
    ///
    /// `None`, corrupt, or tampered tokens all start from an empty cart.
    #[must_use]
    pub fn from_token(token: Option<&str>) -> Self {
        let snapshot = match token {
            None => CartSnapshot::new(),
            Some(token) => CartSnapshot::decode_token(token).unwrap_or_else(|err| {
                tracing::debug!(error = %err, "discarding undecodable cart token");
                CartSnapshot::new()
            }),
        };
        Self { snapshot }
    }

    /// Re-encode the current contents into a cookie token.
    #[must_use]
    pub fn token(&self) -> String {
        self.snapshot.encode_token()
    }
}

impl CartStore for GuestCart {
    async fn snapshot(&mut self) -> Result<CartSnapshot, CartError> {
        Ok(self.snapshot.clone())
    }

    async fn apply_delta(
        &mut self,
        sku_id: SkuId,
        delta: u32,
        selected_default: bool,
    ) -> Result<(), CartError> {
        self.snapshot.apply_delta(sku_id, delta, selected_default);
        Ok(())
    }

    async fn set_line(
        &mut self,
        sku_id: SkuId,
        count: u32,
        selected: bool,
    ) -> Result<(), CartError> {
        self.snapshot.set_line(sku_id, count, selected);
        Ok(())
    }

    async fn set_selection(&mut self, sku_id: SkuId, selected: bool) -> Result<(), CartError> {
        self.snapshot.set_selection(sku_id, selected);
        Ok(())
    }

    async fn set_selection_all(&mut self, selected: bool) -> Result<(), CartError> {
        self.snapshot.set_selection_all(selected);
        Ok(())
    }

    async fn remove(&mut self, sku_id: SkuId) -> Result<(), CartError> {
        self.snapshot.remove(sku_id);
        Ok(())
    }

    async fn purge(&mut self, sku_ids: &[SkuId]) -> Result<(), CartError> {
        self.snapshot.purge(sku_ids);
        Ok(())
    }
}

/// Build the `Set-Cookie` value that stores `token` on the client.
#[must_use]
pub fn cart_cookie(token: String) -> String {
    Cookie::build((CART_COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::days(CART_COOKIE_MAX_AGE_DAYS))
        .build()
        .to_string()
}

/// Build the `Set-Cookie` value that removes the cart cookie (post-merge).
#[must_use]
pub fn clear_cart_cookie() -> String {
    Cookie::build((CART_COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::ZERO)
        .build()
        .to_string()
}
