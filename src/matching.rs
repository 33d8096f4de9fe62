//! Matching engine - the single-writer core.
//!
//! Owns every book, the global order registry and the node arena. Exactly
//! one thread calls into this type; all book state is lock-free by
//! construction. Every observable effect leaves through the tape, so the
//! order of stdout lines is the order of decisions made here.
//!
//! NEW processing is cross-then-rest:
//! 1. acknowledge, 2. sweep the opposite side best-first, 3. rest any
//! limit residual, 4. publish top-of-book deltas.

use rustc_hash::FxHashMap;

use crate::arena::{Arena, ArenaIndex, NULL_INDEX};
use crate::command::{
    CancelOrder, Command, NewOrder, OrderKey, OrderType, Side, Symbol,
};
use crate::config::{Config, DuplicatePolicy, MAX_PRICE, MAX_QTY};
use crate::fixed::Fixed;
use crate::order_book::OrderBook;
use crate::output::Tape;

/// Where a resting order lives: the value side of the cancel registry.
#[derive(Clone, Copy, Debug)]
pub struct OrderLocation {
    pub symbol: Symbol,
    pub side: Side,
    pub price: Fixed,
    pub index: ArenaIndex,
}

/// The matching engine core.
pub struct MatchingEngine {
    /// Memory arena for resting-order nodes, shared by all books.
    arena: Arena,
    /// One book per instrument, created lazily.
    books: FxHashMap<Symbol, OrderBook>,
    /// OrderKey -> location; exists iff the order is resting somewhere.
    registry: FxHashMap<OrderKey, OrderLocation>,
    tape: Tape,
    config: Config,
}

impl MatchingEngine {
    pub fn new(config: Config, tape: Tape) -> Self {
        Self {
            arena: Arena::new(config.max_open_orders),
            books: FxHashMap::default(),
            registry: FxHashMap::default(),
            tape,
            config,
        }
    }

    /// Entry point for every parsed command.
    pub fn process(&mut self, cmd: Command) {
        match cmd {
            Command::New(order) => self.process_new(order),
            Command::Cancel(cancel) => self.process_cancel(cancel),
            Command::Flush => self.process_flush(),
        }
    }

    // ========================================================================
    // NEW
    // ========================================================================

    fn process_new(&mut self, order: NewOrder) {
        // Guardrails run before any output: a dropped command is silent on
        // stdout no matter how far along it got.
        if order.qty > MAX_QTY {
            self.reject(&order, "quantity above limit");
            return;
        }
        if order.order_type == OrderType::Limit && order.price > MAX_PRICE {
            self.reject(&order, "price above limit");
            return;
        }
        if !self.config.symbol_allowed(&order.symbol) {
            self.reject(&order, "symbol not whitelisted");
            return;
        }
        if self.registry.len() as u32 >= self.config.max_open_orders {
            self.reject(&order, "open order limit reached");
            return;
        }
        let mut replaced_symbol = None;
        if let Some(loc) = self.registry.get(&order.key()) {
            match self.config.duplicate_policy {
                DuplicatePolicy::Reject => {
                    self.reject(&order, "duplicate order id");
                    return;
                }
                DuplicatePolicy::Replace => {
                    replaced_symbol = Some(loc.symbol);
                    self.unhook(order.key());
                }
            }
        }

        let level_capped = {
            let book = self.books.entry(order.symbol).or_default();
            order.order_type == OrderType::Limit
                && book.level_count() >= self.config.max_price_levels_per_book
                && !book.has_level(order.price)
        };
        if level_capped {
            self.reject(&order, "price level limit reached");
            return;
        }

        // Acknowledge before matching: the client sees acceptance latency
        // bounded by parse time, not match time.
        self.tape.ack(order.user_id, order.user_order_id);

        let mut remaining = order.qty;
        remaining = self.match_incoming(&order, remaining);

        // Limit residual rests; market residual is discarded.
        if order.order_type == OrderType::Limit && !remaining.is_zero() {
            self.rest_order(&order, remaining);
        }

        self.publish_bbo(order.symbol);

        // A replaced order may have rested on another instrument's book;
        // that top changed too.
        if let Some(old) = replaced_symbol {
            if old != order.symbol {
                self.publish_bbo(old);
            }
        }
    }

    /// Sweep the opposite side from the best price outward.
    ///
    /// Returns the taker quantity left after the sweep.
    fn match_incoming(&mut self, taker: &NewOrder, mut remaining: Fixed) -> Fixed {
        let maker_side = taker.side.opposite();

        loop {
            if remaining.is_zero() {
                break;
            }

            let Some(book) = self.books.get_mut(&taker.symbol) else {
                debug_assert!(false, "book vanished mid-command");
                break;
            };
            let Some(best) = book.best_opposite_price(taker.side) else {
                break; // opposite side is empty
            };

            // A limit taker stops at the first level strictly worse than
            // its limit; a market taker takes every level.
            if taker.order_type == OrderType::Limit
                && !prices_cross(taker.side, taker.price, best)
            {
                break;
            }

            let before = remaining;
            remaining = self.match_at_level(taker, best, maker_side, remaining);

            // Drop the level if the sweep emptied it; the cached best is
            // rescanned and the outer loop moves to the next level.
            let Some(book) = self.books.get_mut(&taker.symbol) else {
                break;
            };
            if book
                .get_level(maker_side, best)
                .map_or(false, |l| l.is_empty())
            {
                book.remove_empty_level(maker_side, best);
            }

            // A crossing level must consume taker quantity. No progress
            // means the best-price cache and the levels disagree; skip the
            // sweep rather than spin.
            if remaining == before && !remaining.is_zero() {
                debug_assert!(false, "crossing level produced no fill");
                break;
            }
        }

        remaining
    }

    /// Match against the FIFO queue at one price level.
    fn match_at_level(
        &mut self,
        taker: &NewOrder,
        price: Fixed,
        maker_side: Side,
        mut remaining: Fixed,
    ) -> Fixed {
        loop {
            if remaining.is_zero() {
                break;
            }

            let Some(book) = self.books.get_mut(&taker.symbol) else {
                break;
            };
            let Some(level) = book.get_level_mut(maker_side, price) else {
                break;
            };

            let Some(maker_idx) = level.front() else {
                break;
            };

            let maker = self.arena.get(maker_idx);
            let maker_user_id = maker.user_id;
            let maker_user_order_id = maker.user_order_id;
            let maker_qty = maker.qty;

            let trade_qty = remaining.min(maker_qty);

            // Trades always print buy-side columns first and execute at
            // the maker's price, never the taker's limit.
            match taker.side {
                Side::Bid => self.tape.trade(
                    taker.user_id,
                    taker.user_order_id,
                    maker_user_id,
                    maker_user_order_id,
                    price,
                    trade_qty,
                ),
                Side::Ask => self.tape.trade(
                    maker_user_id,
                    maker_user_order_id,
                    taker.user_id,
                    taker.user_order_id,
                    price,
                    trade_qty,
                ),
            }

            remaining -= trade_qty;
            let new_maker_qty = maker_qty - trade_qty;

            if new_maker_qty.is_zero() {
                // Maker fully filled: leaves the list, registry and arena.
                // pop_front subtracts the node's full quantity from the
                // level total, which equals the traded quantity here.
                level.pop_front(&mut self.arena);
                self.registry.remove(&OrderKey {
                    user_id: maker_user_id,
                    user_order_id: maker_user_order_id,
                });
                self.arena.free(maker_idx);
            } else {
                // Partial fill: maker stays at the head, taker exhausted.
                self.arena.get_mut(maker_idx).qty = new_maker_qty;
                level.reduce(trade_qty);
            }

            book.set_last_traded_price(price);
        }

        remaining
    }

    /// Rest a limit residual at its price level (maker placement).
    fn rest_order(&mut self, order: &NewOrder, qty: Fixed) {
        let Some(index) = self.arena.alloc() else {
            // The registry cap normally trips first; this is the backstop.
            self.reject(order, "order pool exhausted");
            return;
        };

        let node = self.arena.get_mut(index);
        node.user_id = order.user_id;
        node.user_order_id = order.user_order_id;
        node.price = order.price;
        node.qty = qty;

        let Some(book) = self.books.get_mut(&order.symbol) else {
            debug_assert!(false, "book vanished mid-command");
            self.arena.free(index);
            return;
        };
        book.add_order(&mut self.arena, order.side, order.price, index);

        self.registry.insert(
            order.key(),
            OrderLocation {
                symbol: order.symbol,
                side: order.side,
                price: order.price,
                index,
            },
        );
    }

    // ========================================================================
    // CANCEL
    // ========================================================================

    fn process_cancel(&mut self, cancel: CancelOrder) {
        let Some(loc) = self.registry.remove(&cancel.key()) else {
            // Unknown key: silent no-op.
            if self.config.diagnostics {
                self.tape.diag(format_args!(
                    "cancel miss: {}:{} not resting",
                    cancel.user_id, cancel.user_order_id
                ));
            }
            return;
        };

        let Some(book) = self.books.get_mut(&loc.symbol) else {
            debug_assert!(false, "registry names a book that does not exist");
            tracing::error!(symbol = %loc.symbol, "registry/book mismatch; cancel skipped");
            return;
        };

        book.remove_order(&mut self.arena, loc.side, loc.price, loc.index);
        self.arena.free(loc.index);

        self.tape.cancel(cancel.user_id, cancel.user_order_id);
        self.publish_bbo(loc.symbol);
    }

    /// Remove a resting order without printing (duplicate-replace path).
    fn unhook(&mut self, key: OrderKey) {
        let Some(loc) = self.registry.remove(&key) else {
            return;
        };
        if let Some(book) = self.books.get_mut(&loc.symbol) {
            book.remove_order(&mut self.arena, loc.side, loc.price, loc.index);
        }
        self.arena.free(loc.index);
    }

    // ========================================================================
    // FLUSH
    // ========================================================================

    /// Global reset. Books are cleared in place and retained for reuse;
    /// FLUSH produces no output.
    fn process_flush(&mut self) {
        for book in self.books.values_mut() {
            book.clear();
        }
        self.registry.clear();
        self.arena.clear();
    }

    // ========================================================================
    // Publication / Diagnostics
    // ========================================================================

    /// Emit at most one BBO record per changed side, bid before ask.
    fn publish_bbo(&mut self, symbol: Symbol) {
        let Some(book) = self.books.get_mut(&symbol) else {
            return;
        };
        for side in [Side::Bid, Side::Ask] {
            if let Some(top) = book.bbo_delta(side) {
                self.tape.bbo(side, top);
            }
        }
    }

    fn reject(&self, order: &NewOrder, reason: &str) {
        if self.config.diagnostics {
            self.tape.diag(format_args!(
                "reject {}:{} ({}): {reason}",
                order.user_id, order.user_order_id, order.symbol
            ));
        }
    }

    // ========================================================================
    // Introspection (tests, benches)
    // ========================================================================

    #[inline]
    pub fn best_bid(&self, symbol: &Symbol) -> Option<Fixed> {
        self.books.get(symbol).and_then(|b| b.best_bid())
    }

    #[inline]
    pub fn best_ask(&self, symbol: &Symbol) -> Option<Fixed> {
        self.books.get(symbol).and_then(|b| b.best_ask())
    }

    /// Number of resting orders across all books.
    #[inline]
    pub fn open_orders(&self) -> usize {
        self.registry.len()
    }

    pub fn book(&self, symbol: &Symbol) -> Option<&OrderBook> {
        self.books.get(symbol)
    }

    /// Walk every book and cross-check the structural invariants:
    /// level totals equal the sum of their orders, every resting order is
    /// registered at its true location, and the registry holds nothing
    /// else. Test support; O(orders).
    pub fn assert_consistent(&self) {
        let mut seen = 0usize;
        for (symbol, book) in &self.books {
            for (side, levels) in [(Side::Bid, &book.bids), (Side::Ask, &book.asks)] {
                for (&price, level) in levels {
                    assert!(!level.is_empty(), "empty level retained at {price}");
                    let mut sum = Fixed::ZERO;
                    let mut count = 0u32;
                    let mut idx = level.head;
                    while idx != NULL_INDEX {
                        let node = self.arena.get(idx);
                        assert!(!node.qty.is_zero(), "zero-quantity node in level");
                        assert_eq!(node.price, price);
                        sum += node.qty;
                        count += 1;
                        let key = OrderKey {
                            user_id: node.user_id,
                            user_order_id: node.user_order_id,
                        };
                        let loc = self
                            .registry
                            .get(&key)
                            .expect("resting order missing from registry");
                        assert_eq!(loc.symbol, *symbol);
                        assert_eq!(loc.side, side);
                        assert_eq!(loc.price, price);
                        assert_eq!(loc.index, idx);
                        idx = node.next;
                    }
                    assert_eq!(sum, level.total_qty, "level total out of sync");
                    assert_eq!(count, level.count);
                    seen += count as usize;
                }
            }
        }
        assert_eq!(seen, self.registry.len(), "registry holds dead entries");
        assert_eq!(seen as u32, self.arena.allocated());
    }
}

/// Whether a taker limit is aggressive enough to trade at a maker price.
/// Equal prices cross; only a strictly worse maker price stops the sweep.
#[inline]
fn prices_cross(taker_side: Side, limit: Fixed, maker_price: Fixed) -> bool {
    match taker_side {
        Side::Bid => maker_price <= limit,
        Side::Ask => maker_price >= limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputEnvelope;
    use crossbeam_channel::{unbounded, Receiver};

    fn engine() -> (MatchingEngine, Receiver<OutputEnvelope>) {
        let (tx, rx) = unbounded();
        (MatchingEngine::new(Config::default(), Tape::new(tx)), rx)
    }

    fn sym(s: &str) -> Symbol {
        Symbol::from(s).unwrap()
    }

    fn new_order(
        user_id: u64,
        user_order_id: u64,
        side: Side,
        price: u64,
        qty: u64,
    ) -> NewOrder {
        NewOrder {
            user_id,
            user_order_id,
            symbol: sym("IBM"),
            side,
            price: Fixed::from_int(price),
            qty: Fixed::from_int(qty),
            order_type: if price == 0 {
                OrderType::Market
            } else {
                OrderType::Limit
            },
        }
    }

    fn lines(rx: &Receiver<OutputEnvelope>) -> Vec<String> {
        rx.try_iter()
            .map(|e| String::from_utf8_lossy(e.as_bytes()).trim_end().to_owned())
            .collect()
    }

    #[test]
    fn test_place_no_match() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Bid, 10, 100)));

        assert_eq!(lines(&rx), vec!["A, 1, 1", "B, B, 10, 100"]);
        assert_eq!(eng.best_bid(&sym("IBM")), Some(Fixed::from_int(10)));
        assert_eq!(eng.open_orders(), 1);
        eng.assert_consistent();
    }

    #[test]
    fn test_full_match_at_maker_price() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Ask, 10, 100)));
        eng.process(Command::New(new_order(2, 2, Side::Bid, 12, 100)));

        // Trade executes at the maker's price (10), not the taker's limit.
        assert_eq!(
            lines(&rx),
            vec![
                "A, 1, 1",
                "B, S, 10, 100",
                "A, 2, 2",
                "T, 2, 2, 1, 1, 10, 100",
                "B, S, -, -",
            ]
        );
        assert_eq!(eng.open_orders(), 0);
        eng.assert_consistent();
    }

    #[test]
    fn test_partial_fill_taker_rests() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Ask, 10, 50)));
        eng.process(Command::New(new_order(2, 2, Side::Bid, 10, 100)));

        assert_eq!(
            lines(&rx),
            vec![
                "A, 1, 1",
                "B, S, 10, 50",
                "A, 2, 2",
                "T, 2, 2, 1, 1, 10, 50",
                "B, B, 10, 50",
                "B, S, -, -",
            ]
        );
        assert_eq!(eng.open_orders(), 1);
        assert_eq!(eng.best_bid(&sym("IBM")), Some(Fixed::from_int(10)));
        eng.assert_consistent();
    }

    #[test]
    fn test_partial_fill_maker_stays() {
        let (mut eng, _rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Ask, 10, 100)));
        eng.process(Command::New(new_order(2, 2, Side::Bid, 10, 30)));

        let book = eng.book(&sym("IBM")).unwrap();
        let (qty, count) = book.depth_at(Side::Ask, Fixed::from_int(10));
        assert_eq!(qty, Fixed::from_int(70));
        assert_eq!(count, 1);
        eng.assert_consistent();
    }

    #[test]
    fn test_sweep_multiple_levels_price_order() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Ask, 12, 50)));
        eng.process(Command::New(new_order(1, 2, Side::Ask, 10, 50)));
        eng.process(Command::New(new_order(1, 3, Side::Ask, 11, 50)));
        let _ = lines(&rx);

        eng.process(Command::New(new_order(2, 9, Side::Bid, 12, 120)));
        let out = lines(&rx);
        assert_eq!(
            out,
            vec![
                "A, 2, 9",
                "T, 2, 9, 1, 2, 10, 50",
                "T, 2, 9, 1, 3, 11, 50",
                "T, 2, 9, 1, 1, 12, 20",
                "B, S, 12, 30",
            ]
        );
        eng.assert_consistent();
    }

    #[test]
    fn test_fifo_within_level() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Ask, 10, 100)));
        eng.process(Command::New(new_order(2, 2, Side::Ask, 10, 100)));
        eng.process(Command::New(new_order(3, 3, Side::Ask, 10, 100)));
        let _ = lines(&rx);

        eng.process(Command::New(new_order(9, 9, Side::Bid, 10, 200)));
        let out = lines(&rx);
        // Earliest makers fill first.
        assert_eq!(out[1], "T, 9, 9, 1, 1, 10, 100");
        assert_eq!(out[2], "T, 9, 9, 2, 2, 10, 100");
        assert_eq!(eng.open_orders(), 1);
        eng.assert_consistent();
    }

    #[test]
    fn test_sell_taker_prints_buy_columns_first() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Bid, 10, 100)));
        let _ = lines(&rx);

        eng.process(Command::New(new_order(2, 2, Side::Ask, 10, 100)));
        let out = lines(&rx);
        assert_eq!(out[1], "T, 1, 1, 2, 2, 10, 100");
    }

    #[test]
    fn test_market_order_ioc() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Ask, 100, 5)));
        eng.process(Command::New(new_order(1, 2, Side::Ask, 101, 5)));
        let _ = lines(&rx);

        // Market buy for 8: takes 5@100, 3@101; residual 0, nothing rests.
        eng.process(Command::New(new_order(2, 9, Side::Bid, 0, 8)));
        let out = lines(&rx);
        assert_eq!(
            out,
            vec![
                "A, 2, 9",
                "T, 2, 9, 1, 1, 100, 5",
                "T, 2, 9, 1, 2, 101, 3",
                "B, S, 101, 2",
            ]
        );
        assert_eq!(eng.open_orders(), 1);
        eng.assert_consistent();
    }

    #[test]
    fn test_market_order_empty_book_is_silent_after_ack() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(2, 9, Side::Bid, 0, 8)));
        // No trades, no resting residual, no BBO change.
        assert_eq!(lines(&rx), vec!["A, 2, 9"]);
        assert_eq!(eng.open_orders(), 0);
    }

    #[test]
    fn test_cancel_prints_then_publishes() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 101, Side::Bid, 50_000, 10)));
        let _ = lines(&rx);

        eng.process(Command::Cancel(CancelOrder {
            user_id: 1,
            user_order_id: 101,
        }));
        assert_eq!(lines(&rx), vec!["C, 1, 101", "B, B, -, -"]);
        assert_eq!(eng.open_orders(), 0);
        eng.assert_consistent();
    }

    #[test]
    fn test_cancel_unknown_is_silent() {
        let (mut eng, rx) = engine();
        eng.process(Command::Cancel(CancelOrder {
            user_id: 9,
            user_order_id: 9,
        }));
        assert!(lines(&rx).is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Bid, 10, 100)));
        eng.process(Command::Cancel(CancelOrder {
            user_id: 1,
            user_order_id: 1,
        }));
        let _ = lines(&rx);

        eng.process(Command::Cancel(CancelOrder {
            user_id: 1,
            user_order_id: 1,
        }));
        assert!(lines(&rx).is_empty());
        eng.assert_consistent();
    }

    #[test]
    fn test_flush_is_silent_and_total() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Bid, 10, 100)));
        eng.process(Command::New(new_order(2, 2, Side::Ask, 20, 100)));
        let _ = lines(&rx);

        eng.process(Command::Flush);
        assert!(lines(&rx).is_empty());
        assert_eq!(eng.open_orders(), 0);
        assert!(eng.book(&sym("IBM")).unwrap().is_empty());

        // Flush is idempotent.
        eng.process(Command::Flush);
        assert!(lines(&rx).is_empty());

        // Keys are reusable afterwards, and the engine behaves as fresh.
        eng.process(Command::New(new_order(1, 1, Side::Bid, 10, 100)));
        assert_eq!(lines(&rx), vec!["A, 1, 1", "B, B, 10, 100"]);
        eng.assert_consistent();
    }

    #[test]
    fn test_duplicate_key_rejected_silently() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Bid, 10, 100)));
        let _ = lines(&rx);

        eng.process(Command::New(new_order(1, 1, Side::Bid, 11, 50)));
        assert!(lines(&rx).is_empty());
        assert_eq!(eng.open_orders(), 1);
        assert_eq!(eng.best_bid(&sym("IBM")), Some(Fixed::from_int(10)));
    }

    #[test]
    fn test_duplicate_key_replace_policy() {
        let (tx, rx) = unbounded();
        let cfg = Config {
            duplicate_policy: DuplicatePolicy::Replace,
            ..Config::default()
        };
        let mut eng = MatchingEngine::new(cfg, Tape::new(tx));

        eng.process(Command::New(new_order(1, 1, Side::Bid, 10, 100)));
        let _ = lines(&rx);

        eng.process(Command::New(new_order(1, 1, Side::Bid, 11, 50)));
        // No cancel print; the old order is gone and the new one rests.
        assert_eq!(lines(&rx), vec!["A, 1, 1", "B, B, 11, 50"]);
        assert_eq!(eng.open_orders(), 1);
        eng.assert_consistent();
    }

    #[test]
    fn test_key_reusable_after_fill() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Ask, 10, 100)));
        eng.process(Command::New(new_order(2, 2, Side::Bid, 10, 100)));
        let _ = lines(&rx);

        // (1, 1) left the book on the fill; the key may be used again.
        eng.process(Command::New(new_order(1, 1, Side::Ask, 15, 5)));
        assert_eq!(lines(&rx), vec!["A, 1, 1", "B, S, 15, 5"]);
        eng.assert_consistent();
    }

    #[test]
    fn test_books_are_independent() {
        let (mut eng, rx) = engine();
        let mut eth = new_order(1, 1, Side::Bid, 10, 100);
        eth.symbol = sym("ETH/USD");
        let mut btc = new_order(2, 2, Side::Ask, 9, 100);
        btc.symbol = sym("BTC/USD");

        eng.process(Command::New(eth));
        eng.process(Command::New(btc));

        // Crossing prices on different symbols never trade.
        let out = lines(&rx);
        assert!(out.iter().all(|l| !l.starts_with('T')), "{out:?}");
        assert_eq!(eng.open_orders(), 2);
        eng.assert_consistent();
    }

    #[test]
    fn test_bbo_suppressed_when_top_unchanged() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Bid, 10, 100)));
        let _ = lines(&rx);

        // A worse bid does not move the top: ack only.
        eng.process(Command::New(new_order(2, 2, Side::Bid, 9, 100)));
        assert_eq!(lines(&rx), vec!["A, 2, 2"]);
    }

    #[test]
    fn test_bbo_volume_change_same_price_published() {
        let (mut eng, rx) = engine();
        eng.process(Command::New(new_order(1, 1, Side::Bid, 10, 100)));
        let _ = lines(&rx);

        // Same top price, more volume: the pair changed, so publish.
        eng.process(Command::New(new_order(2, 2, Side::Bid, 10, 50)));
        assert_eq!(lines(&rx), vec!["A, 2, 2", "B, B, 10, 150"]);
    }

    #[test]
    fn test_conservation_over_mixed_flow() {
        let (mut eng, rx) = engine();
        let arrived: u64 = 100 + 80 + 50 + 70;
        eng.process(Command::New(new_order(1, 1, Side::Ask, 10, 100)));
        eng.process(Command::New(new_order(1, 2, Side::Ask, 11, 80)));
        eng.process(Command::New(new_order(2, 1, Side::Bid, 10, 50)));
        eng.process(Command::New(new_order(2, 2, Side::Bid, 11, 70)));

        let traded: u64 = lines(&rx)
            .iter()
            .filter(|l| l.starts_with('T'))
            .map(|l| l.rsplit(", ").next().unwrap().parse::<u64>().unwrap())
            .sum();

        let resting: u64 = {
            let book = eng.book(&sym("IBM")).unwrap();
            let mut total = Fixed::ZERO;
            for side in [Side::Bid, Side::Ask] {
                for price in [10u64, 11] {
                    total += book.depth_at(side, Fixed::from_int(price)).0;
                }
            }
            total.raw() / crate::fixed::UNIT
        };

        // Each trade consumes its quantity from both the taker and the
        // maker, so traded quantity counts twice against arrivals.
        assert_eq!(resting + 2 * traded, arrived);
        eng.assert_consistent();
    }
}
