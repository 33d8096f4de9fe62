//! Order book - one instrument's bid and ask sides.
//!
//! Sparse book: price levels live in hash maps keyed by price, with the
//! best price cached per side and rescanned only when the best level
//! empties. Cancel lookup is global (the engine's registry), so the book
//! itself only manages levels, tops and the published-BBO snapshots.

use rustc_hash::FxHashMap;

use crate::arena::{Arena, ArenaIndex};
use crate::command::Side;
use crate::fixed::Fixed;
use crate::price_level::PriceLevel;

/// Top of one side: `None` when the side is empty, otherwise
/// (best price, total quantity at that price).
pub type TopOfBook = Option<(Fixed, Fixed)>;

pub struct OrderBook {
    /// Bid price levels (buy orders)
    pub bids: FxHashMap<Fixed, PriceLevel>,
    /// Ask price levels (sell orders)
    pub asks: FxHashMap<Fixed, PriceLevel>,
    /// Cached best bid price (highest buy price)
    best_bid: Option<Fixed>,
    /// Cached best ask price (lowest sell price)
    best_ask: Option<Fixed>,
    /// Price of the most recent execution; zero until the first trade.
    last_traded_price: Fixed,
    /// Last published top per side, for delta suppression.
    published_bid: TopOfBook,
    published_ask: TopOfBook,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: FxHashMap::default(),
            asks: FxHashMap::default(),
            best_bid: None,
            best_ask: None,
            last_traded_price: Fixed::ZERO,
            published_bid: None,
            published_ask: None,
        }
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    #[inline]
    pub fn best_bid(&self) -> Option<Fixed> {
        self.best_bid
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Fixed> {
        self.best_ask
    }

    #[inline]
    pub fn best_price(&self, side: Side) -> Option<Fixed> {
        match side {
            Side::Bid => self.best_bid,
            Side::Ask => self.best_ask,
        }
    }

    /// Best price a taker on `side` would match against.
    #[inline]
    pub fn best_opposite_price(&self, side: Side) -> Option<Fixed> {
        match side {
            Side::Bid => self.best_ask,
            Side::Ask => self.best_bid,
        }
    }

    #[inline]
    pub fn last_traded_price(&self) -> Fixed {
        self.last_traded_price
    }

    #[inline]
    pub fn set_last_traded_price(&mut self, price: Fixed) {
        self.last_traded_price = price;
    }

    // ========================================================================
    // Level Access
    // ========================================================================

    #[inline]
    pub fn get_level(&self, side: Side, price: Fixed) -> Option<&PriceLevel> {
        match side {
            Side::Bid => self.bids.get(&price),
            Side::Ask => self.asks.get(&price),
        }
    }

    #[inline]
    pub fn get_level_mut(&mut self, side: Side, price: Fixed) -> Option<&mut PriceLevel> {
        match side {
            Side::Bid => self.bids.get_mut(&price),
            Side::Ask => self.asks.get_mut(&price),
        }
    }

    #[inline]
    pub fn get_or_create_level(&mut self, side: Side, price: Fixed) -> &mut PriceLevel {
        match side {
            Side::Bid => self.bids.entry(price).or_default(),
            Side::Ask => self.asks.entry(price).or_default(),
        }
    }

    /// Total distinct price levels, both sides. Guardrail input.
    #[inline]
    pub fn level_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    /// Whether either side already has a level at this price.
    #[inline]
    pub fn has_level(&self, price: Fixed) -> bool {
        self.bids.contains_key(&price) || self.asks.contains_key(&price)
    }

    // ========================================================================
    // Order Placement / Removal
    // ========================================================================

    /// Link an already-populated arena node to the tail of its level.
    pub fn add_order(&mut self, arena: &mut Arena, side: Side, price: Fixed, index: ArenaIndex) {
        let level = self.get_or_create_level(side, price);
        level.push_back(arena, index);
        self.update_best_price_on_add(side, price);
    }

    /// Unlink a resting node (cancel path). Drops the level if it empties.
    pub fn remove_order(&mut self, arena: &mut Arena, side: Side, price: Fixed, index: ArenaIndex) {
        let Some(level) = self.get_level_mut(side, price) else {
            debug_assert!(false, "registry points at a missing level");
            return;
        };
        let now_empty = level.unlink(arena, index);
        if now_empty {
            self.remove_empty_level(side, price);
        }
    }

    /// Remove an empty price level and refresh the cached best if needed.
    pub fn remove_empty_level(&mut self, side: Side, price: Fixed) {
        match side {
            Side::Bid => {
                self.bids.remove(&price);
                if self.best_bid == Some(price) {
                    self.recalculate_best_bid();
                }
            }
            Side::Ask => {
                self.asks.remove(&price);
                if self.best_ask == Some(price) {
                    self.recalculate_best_ask();
                }
            }
        }
    }

    // ========================================================================
    // Best Price Management
    // ========================================================================

    fn update_best_price_on_add(&mut self, side: Side, price: Fixed) {
        match side {
            Side::Bid => {
                if self.best_bid.map_or(true, |best| price > best) {
                    self.best_bid = Some(price);
                }
            }
            Side::Ask => {
                if self.best_ask.map_or(true, |best| price < best) {
                    self.best_ask = Some(price);
                }
            }
        }
    }

    /// Rescan bid levels. Only runs when the best bid level empties.
    fn recalculate_best_bid(&mut self) {
        self.best_bid = self.bids.keys().copied().max();
    }

    /// Rescan ask levels. Only runs when the best ask level empties.
    fn recalculate_best_ask(&mut self) {
        self.best_ask = self.asks.keys().copied().min();
    }

    // ========================================================================
    // Top-of-Book Publication
    // ========================================================================

    /// Current top of one side.
    pub fn top_of_book(&self, side: Side) -> TopOfBook {
        let best = self.best_price(side)?;
        let level = self.get_level(side, best)?;
        Some((best, level.total_qty))
    }

    /// Compare the current top against the last published top. When they
    /// differ, record and return the new one; otherwise `None` (suppress).
    pub fn bbo_delta(&mut self, side: Side) -> Option<TopOfBook> {
        let current = self.top_of_book(side);
        let published = match side {
            Side::Bid => &mut self.published_bid,
            Side::Ask => &mut self.published_ask,
        };
        if current == *published {
            return None;
        }
        *published = current;
        Some(current)
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Wipe all state without deallocating the book itself (FLUSH).
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.best_bid = None;
        self.best_ask = None;
        self.last_traded_price = Fixed::ZERO;
        self.published_bid = None;
        self.published_ask = None;
    }

    /// Depth (total quantity, order count) at one price.
    pub fn depth_at(&self, side: Side, price: Fixed) -> (Fixed, u32) {
        self.get_level(side, price)
            .map(|l| (l.total_qty, l.count))
            .unwrap_or((Fixed::ZERO, 0))
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("best_bid", &self.best_bid)
            .field("best_ask", &self.best_ask)
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("last_traded_price", &self.last_traded_price)
            .finish()
    }
}
