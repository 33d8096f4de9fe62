//! Wire parser - one CSV line to one validated command.
//!
//! Validate-everything-early: the engine never sees a command that is not
//! structurally sound. Anything malformed is rejected here with a typed
//! error; the caller decides whether the reason is worth a stderr line.
//!
//! Field orders:
//! - `N, userId, symbol, price, quantity, side, userOrderId`
//! - `C, userId, userOrderId`
//! - `F`

use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::command::{CancelOrder, Command, NewOrder, OrderType, Side, Symbol};
use crate::fixed::Fixed;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("line is not valid utf-8")]
    NotUtf8,
    #[error("unknown command type {0:?}")]
    UnknownType(char),
    #[error("truncated {0} command")]
    Truncated(&'static str),
    #[error("extra fields after {0} command")]
    ExtraFields(&'static str),
    #[error("invalid user id {0:?}")]
    BadUserId(String),
    #[error("invalid user order id {0:?}")]
    BadUserOrderId(String),
    #[error("invalid symbol {0:?}")]
    BadSymbol(String),
    #[error("invalid side {0:?}")]
    BadSide(String),
    #[error("invalid price {0:?}")]
    BadPrice(String),
    #[error("invalid quantity {0:?}")]
    BadQuantity(String),
}

/// Parse one datagram payload into a command.
pub fn parse_line(raw: &[u8]) -> Result<Command, ParseError> {
    let text = std::str::from_utf8(raw).map_err(|_| ParseError::NotUtf8)?;
    let text = text.trim_matches(|c: char| c.is_ascii_whitespace());
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut fields = text.split(',').map(str::trim);
    let kind = fields.next().unwrap_or("");

    match kind {
        "N" => parse_new(&mut fields),
        "C" => parse_cancel(&mut fields),
        "F" => {
            if fields.next().is_some() {
                return Err(ParseError::ExtraFields("FLUSH"));
            }
            Ok(Command::Flush)
        }
        other => Err(ParseError::UnknownType(
            other.chars().next().unwrap_or('?'),
        )),
    }
}

fn parse_new<'a>(fields: &mut impl Iterator<Item = &'a str>) -> Result<Command, ParseError> {
    let user_id = fields.next().ok_or(ParseError::Truncated("NEW"))?;
    let symbol = fields.next().ok_or(ParseError::Truncated("NEW"))?;
    let price = fields.next().ok_or(ParseError::Truncated("NEW"))?;
    let qty = fields.next().ok_or(ParseError::Truncated("NEW"))?;
    let side = fields.next().ok_or(ParseError::Truncated("NEW"))?;
    let user_order_id = fields.next().ok_or(ParseError::Truncated("NEW"))?;
    if fields.next().is_some() {
        return Err(ParseError::ExtraFields("NEW"));
    }

    let user_id =
        parse_u64(user_id).ok_or_else(|| ParseError::BadUserId(user_id.into()))?;
    let user_order_id = parse_u64(user_order_id)
        .ok_or_else(|| ParseError::BadUserOrderId(user_order_id.into()))?;

    if symbol.is_empty() {
        return Err(ParseError::BadSymbol(symbol.into()));
    }
    let symbol =
        Symbol::from(symbol).map_err(|_| ParseError::BadSymbol(symbol.into()))?;

    let side = match side {
        "B" => Side::Bid,
        "S" => Side::Ask,
        other => return Err(ParseError::BadSide(other.into())),
    };

    let price_dec =
        Decimal::from_str(price).map_err(|_| ParseError::BadPrice(price.into()))?;
    let price_fx = Fixed::from_decimal(price_dec)
        .ok_or_else(|| ParseError::BadPrice(price.into()))?;
    let qty_fx = parse_fixed(qty).ok_or_else(|| ParseError::BadQuantity(qty.into()))?;
    if qty_fx.is_zero() {
        return Err(ParseError::BadQuantity(qty.into()));
    }

    // A literal zero price selects a market order. A positive price below
    // the representable tick is not a market order; it is junk.
    let order_type = if price_dec.is_zero() {
        OrderType::Market
    } else if price_fx.is_zero() {
        return Err(ParseError::BadPrice(price.into()));
    } else {
        OrderType::Limit
    };

    Ok(Command::New(NewOrder {
        user_id,
        user_order_id,
        symbol,
        side,
        price: price_fx,
        qty: qty_fx,
        order_type,
    }))
}

fn parse_cancel<'a>(fields: &mut impl Iterator<Item = &'a str>) -> Result<Command, ParseError> {
    let user_id = fields.next().ok_or(ParseError::Truncated("CANCEL"))?;
    let user_order_id = fields.next().ok_or(ParseError::Truncated("CANCEL"))?;
    if fields.next().is_some() {
        return Err(ParseError::ExtraFields("CANCEL"));
    }

    let user_id =
        parse_u64(user_id).ok_or_else(|| ParseError::BadUserId(user_id.into()))?;
    let user_order_id = parse_u64(user_order_id)
        .ok_or_else(|| ParseError::BadUserOrderId(user_order_id.into()))?;

    Ok(Command::Cancel(CancelOrder {
        user_id,
        user_order_id,
    }))
}

/// Unsigned id parse. A leading sign is rejected even though `u64::from_str`
/// would accept `+`.
fn parse_u64(s: &str) -> Option<u64> {
    if s.starts_with(['+', '-']) {
        return None;
    }
    s.parse().ok()
}

/// Decimal parse for prices and quantities. `Decimal` has no NaN or
/// infinity and fails on trailing garbage; negatives are rejected in the
/// fixed-point conversion.
fn parse_fixed(s: &str) -> Option<Fixed> {
    Decimal::from_str(s).ok().and_then(Fixed::from_decimal)
}
