//! Cart snapshot and its reversible wire token.
//!
//! A [`CartSnapshot`] is the full cart contents at a point in time,
//! independent of which backend holds it. Authenticated carts persist the
//! same lines server-side; anonymous carts round-trip the whole snapshot
//! through the client as an opaque cookie token.
//!
//! The token is `base64_urlsafe(serde_json(lines))`. Lines are kept in a
//! `BTreeMap` so encoding is canonical: a decoded token re-encodes to the
//! same bytes, and the cookie stays byte-stable across requests.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::SkuId;

/// Upper bound on an incoming token, before base64 decoding.
///
/// A legitimate cart of a few dozen lines is far below this; anything larger
/// is tampered or garbage and decodes as an empty cart.
const MAX_TOKEN_LEN: usize = 8 * 1024;

/// One line of a cart: how many units of a sku, and whether the line is
/// ticked for checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Unit count, always positive; a line with zero units is removed.
    pub count: u32,
    /// Whether this line participates in settlement and commit.
    pub selected: bool,
}

/// Failure to decode a cart token.
///
/// Decode failures are recovered locally by degrading to an empty snapshot;
/// they are never surfaced to the buyer.
#[derive(Debug, Error)]
pub enum CartTokenError {
    /// Token exceeds [`MAX_TOKEN_LEN`].
    #[error("token too large ({0} bytes)")]
    Oversized(usize),

    /// Token is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded payload is not a valid line mapping.
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// The full cart contents at a point in time.
///
/// All mutation semantics of the cart live here as pure functions; the two
/// storage backends either persist the same operations as SQL or replay them
/// on a decoded token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartSnapshot {
    lines: BTreeMap<SkuId, CartLine>,
}

impl CartSnapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: BTreeMap::new(),
        }
    }

    /// Number of distinct sku lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Look up one line.
    #[must_use]
    pub fn get(&self, sku_id: SkuId) -> Option<&CartLine> {
        self.lines.get(&sku_id)
    }

    /// Iterate over all lines in sku order.
    pub fn iter(&self) -> impl Iterator<Item = (SkuId, &CartLine)> {
        self.lines.iter().map(|(id, line)| (*id, line))
    }

    /// Sum of unit counts across all lines.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.lines.values().map(|line| u64::from(line.count)).sum()
    }

    /// The lines ticked for checkout, in sku order.
    #[must_use]
    pub fn selected_lines(&self) -> Vec<(SkuId, u32)> {
        self.lines
            .iter()
            .filter(|(_, line)| line.selected)
            .map(|(id, line)| (*id, line.count))
            .collect()
    }

    /// Add `delta` units of a sku (add-semantics).
    ///
    /// Creates the line if absent, with `selected_default` as its selection.
    /// For an existing line, `selected_default = true` ticks the line;
    /// `false` leaves its current selection alone.
    pub fn apply_delta(&mut self, sku_id: SkuId, delta: u32, selected_default: bool) {
        if delta == 0 {
            return;
        }
        self.lines
            .entry(sku_id)
            .and_modify(|line| {
                line.count = line.count.saturating_add(delta);
                if selected_default {
                    line.selected = true;
                }
            })
            .or_insert(CartLine {
                count: delta,
                selected: selected_default,
            });
    }

    /// Replace a line outright (set-semantics, used by update requests).
    ///
    /// A count of zero removes the line, keeping the positive-count
    /// invariant.
    pub fn set_line(&mut self, sku_id: SkuId, count: u32, selected: bool) {
        if count == 0 {
            self.lines.remove(&sku_id);
        } else {
            self.lines.insert(sku_id, CartLine { count, selected });
        }
    }

    /// Tick or untick one line. No-op if the line does not exist.
    pub fn set_selection(&mut self, sku_id: SkuId, selected: bool) {
        if let Some(line) = self.lines.get_mut(&sku_id) {
            line.selected = selected;
        }
    }

    /// Tick or untick every line.
    pub fn set_selection_all(&mut self, selected: bool) {
        for line in self.lines.values_mut() {
            line.selected = selected;
        }
    }

    /// Remove one line.
    pub fn remove(&mut self, sku_id: SkuId) {
        self.lines.remove(&sku_id);
    }

    /// Remove exactly the given skus, leaving other lines untouched.
    ///
    /// Applying the same set twice is a no-op the second time.
    pub fn purge(&mut self, sku_ids: &[SkuId]) {
        for sku_id in sku_ids {
            self.lines.remove(sku_id);
        }
    }

    /// Fold another snapshot into this one (used by the login merge).
    ///
    /// Counts merge with add-semantics; selection is overwritten by the
    /// incoming line.
    pub fn merge_from(&mut self, other: &Self) {
        for (sku_id, incoming) in other.iter() {
            self.lines
                .entry(sku_id)
                .and_modify(|line| {
                    line.count = line.count.saturating_add(incoming.count);
                    line.selected = incoming.selected;
                })
                .or_insert(*incoming);
        }
    }

    /// Encode the snapshot into the opaque cookie token.
    ///
    /// The encoding is canonical: decode followed by encode reproduces the
    /// token byte for byte.
    #[must_use]
    pub fn encode_token(&self) -> String {
        // BTreeMap serialization cannot fail: keys and values are plain data.
        let payload = serde_json::to_vec(&self.lines).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(payload)
    }

    /// Decode a cookie token back into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CartTokenError`] on oversized, malformed, or tampered
    /// tokens. Callers degrade to an empty snapshot rather than surfacing
    /// the failure.
    pub fn decode_token(token: &str) -> Result<Self, CartTokenError> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(CartTokenError::Oversized(token.len()));
        }
        let payload = URL_SAFE_NO_PAD.decode(token.trim())?;
        let lines: BTreeMap<SkuId, CartLine> = serde_json::from_slice(&payload)?;
        Ok(Self { lines })
    }
}

impl FromIterator<(SkuId, CartLine)> for CartSnapshot {
    fn from_iter<T: IntoIterator<Item = (SkuId, CartLine)>>(iter: T) -> Self {
        Self {
            lines: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sku(id: i32) -> SkuId {
        SkuId::new(id)
    }

    #[test]
    fn test_apply_delta_creates_and_accumulates() {
        let mut cart = CartSnapshot::new();
        cart.apply_delta(sku(101), 2, true);
        cart.apply_delta(sku(101), 3, true);
        assert_eq!(
            cart.get(sku(101)),
            Some(&CartLine {
                count: 5,
                selected: true
            })
        );
    }

    #[test]
    fn test_apply_delta_unselected_keeps_existing_selection() {
        let mut cart = CartSnapshot::new();
        cart.apply_delta(sku(101), 1, true);
        // Adding more units without ticking must not untick the line.
        cart.apply_delta(sku(101), 1, false);
        assert_eq!(
            cart.get(sku(101)),
            Some(&CartLine {
                count: 2,
                selected: true
            })
        );
    }

    #[test]
    fn test_set_overrides_accumulated_deltas() {
        let mut cart = CartSnapshot::new();
        cart.apply_delta(sku(101), 2, true);
        cart.apply_delta(sku(101), 4, true);
        cart.set_line(sku(101), 3, false);
        cart.apply_delta(sku(101), 1, false);
        // Net effect: most recent absolute set, plus deltas after it.
        assert_eq!(
            cart.get(sku(101)),
            Some(&CartLine {
                count: 4,
                selected: false
            })
        );
    }

    #[test]
    fn test_set_line_zero_removes() {
        let mut cart = CartSnapshot::new();
        cart.apply_delta(sku(101), 2, true);
        cart.set_line(sku(101), 0, true);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_selection_ops() {
        let mut cart = CartSnapshot::new();
        cart.apply_delta(sku(101), 1, true);
        cart.apply_delta(sku(102), 1, false);

        cart.set_selection(sku(101), false);
        assert!(!cart.get(sku(101)).unwrap().selected);

        cart.set_selection_all(true);
        assert!(cart.iter().all(|(_, line)| line.selected));

        cart.set_selection_all(false);
        assert!(cart.selected_lines().is_empty());
    }

    #[test]
    fn test_merge_adds_counts_and_overwrites_selection() {
        // Anonymous {101: 2 selected} into authenticated {101: 1 unselected}.
        let mut account: CartSnapshot = [(
            sku(101),
            CartLine {
                count: 1,
                selected: false,
            },
        )]
        .into_iter()
        .collect();
        let guest: CartSnapshot = [(
            sku(101),
            CartLine {
                count: 2,
                selected: true,
            },
        )]
        .into_iter()
        .collect();

        account.merge_from(&guest);
        assert_eq!(
            account.get(sku(101)),
            Some(&CartLine {
                count: 3,
                selected: true
            })
        );
    }

    #[test]
    fn test_purge_is_idempotent() {
        let mut cart = CartSnapshot::new();
        cart.apply_delta(sku(101), 1, true);
        cart.apply_delta(sku(102), 2, true);
        cart.apply_delta(sku(103), 3, false);

        cart.purge(&[sku(101), sku(102)]);
        let after_once = cart.clone();
        cart.purge(&[sku(101), sku(102)]);
        assert_eq!(cart, after_once);
        assert_eq!(cart.len(), 1);
        assert!(cart.get(sku(103)).is_some());
    }

    #[test]
    fn test_token_round_trip_law() {
        let mut cart = CartSnapshot::new();
        cart.apply_delta(sku(101), 2, true);
        cart.apply_delta(sku(7), 1, false);
        cart.apply_delta(sku(3000), 9, true);

        let token = cart.encode_token();
        let decoded = CartSnapshot::decode_token(&token).unwrap();
        assert_eq!(decoded, cart);
        // Byte-stable: encode(decode(token)) == token.
        assert_eq!(decoded.encode_token(), token);
    }

    #[test]
    fn test_empty_token_round_trip() {
        let cart = CartSnapshot::new();
        let token = cart.encode_token();
        let decoded = CartSnapshot::decode_token(&token).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.encode_token(), token);
    }

    #[test]
    fn test_corrupted_tokens_fail_to_decode() {
        assert!(CartSnapshot::decode_token("!!not base64!!").is_err());

        // Valid base64, garbage payload.
        let garbage = URL_SAFE_NO_PAD.encode(b"not a line mapping");
        assert!(CartSnapshot::decode_token(&garbage).is_err());

        // Oversized.
        let huge = "A".repeat(MAX_TOKEN_LEN + 1);
        assert!(matches!(
            CartSnapshot::decode_token(&huge),
            Err(CartTokenError::Oversized(_))
        ));
    }
}
