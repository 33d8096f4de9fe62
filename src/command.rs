//! Command types for the matching engine.
//!
//! Commands are the decoded form of one wire line. The parser owns all
//! validation; by the time a `Command` exists it is structurally sound.

use arrayvec::ArrayString;

use crate::fixed::Fixed;

/// Maximum symbol length in bytes.
pub const SYMBOL_CAPACITY: usize = 12;

/// Instrument identifier: inline, fixed-capacity, compared by byte content.
pub type Symbol = ArrayString<SYMBOL_CAPACITY>;

/// Order side (bid = buy, ask = sell)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Bid = 0,
    /// Sell side (asks)
    Ask = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// The single-letter code used on the wire and in BBO records.
    #[inline]
    pub const fn wire_code(self) -> char {
        match self {
            Side::Bid => 'B',
            Side::Ask => 'S',
        }
    }
}

/// Order type determines residual handling after the matching sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OrderType {
    /// Limit order - rests in book if not fully matched (default)
    #[default]
    Limit = 0,
    /// Market order - residual quantity is discarded (immediate-or-cancel)
    Market = 1,
}

/// Client-scoped order identity. Unique among live orders across all books.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OrderKey {
    pub user_id: u64,
    pub user_order_id: u64,
}

/// Place a new order
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewOrder {
    pub user_id: u64,
    pub user_order_id: u64,
    pub symbol: Symbol,
    pub side: Side,
    /// Limit price; zero for market orders.
    pub price: Fixed,
    pub qty: Fixed,
    pub order_type: OrderType,
}

impl NewOrder {
    #[inline]
    pub const fn key(&self) -> OrderKey {
        OrderKey {
            user_id: self.user_id,
            user_order_id: self.user_order_id,
        }
    }
}

/// Cancel an existing order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CancelOrder {
    pub user_id: u64,
    pub user_order_id: u64,
}

impl CancelOrder {
    #[inline]
    pub const fn key(&self) -> OrderKey {
        OrderKey {
            user_id: self.user_id,
            user_order_id: self.user_order_id,
        }
    }
}

/// Decoded wire commands
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Place a new order
    New(NewOrder),
    /// Cancel an existing order
    Cancel(CancelOrder),
    /// Clear every book and the registry
    Flush,
}
