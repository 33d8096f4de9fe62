//! Output tape - asynchronous, ordered drain to stdout/stderr.
//!
//! The matching thread formats every record into a fixed-size stack
//! envelope and sends it down a channel; the output thread writes batches
//! and flushes once per batch. Because the matching thread is the only
//! producer and the channel is FIFO, stdout order equals emission order.

use std::fmt::{self, Write as _};
use std::io::{self, Write};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::command::Side;
use crate::fixed::Fixed;
use crate::order_book::TopOfBook;

/// Inline buffer size. Every record format fits with room to spare; a
/// diagnostic that does not is truncated, never reallocated.
pub const ENVELOPE_CAPACITY: usize = 128;

/// Routing tag: canonical records go to stdout, diagnostics to stderr.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Data,
    Diag,
}

/// A formatted output record. Value-typed and trivially movable so a
/// channel send is a bounded memory copy with no heap allocation.
#[derive(Clone, Copy)]
pub struct OutputEnvelope {
    buf: [u8; ENVELOPE_CAPACITY],
    len: u16,
    channel: Channel,
}

impl OutputEnvelope {
    /// Format a record directly into a stack envelope.
    pub fn format(channel: Channel, args: fmt::Arguments<'_>) -> Self {
        let mut env = Self {
            buf: [0u8; ENVELOPE_CAPACITY],
            len: 0,
            channel,
        };
        let mut cursor = Cursor {
            buf: &mut env.buf,
            len: 0,
        };
        // Truncation is the only possible "failure" and Cursor absorbs it.
        let _ = cursor.write_fmt(args);
        env.len = cursor.len as u16;
        env
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    #[inline]
    pub fn channel(&self) -> Channel {
        self.channel
    }
}

impl fmt::Debug for OutputEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputEnvelope")
            .field("channel", &self.channel)
            .field("text", &String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

/// `fmt::Write` adapter over a fixed byte slice; drops anything past the
/// end rather than erroring so hot-path formatting can never fail.
struct Cursor<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl fmt::Write for Cursor<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let avail = self.buf.len() - self.len;
        let take = s.len().min(avail);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// Producer handle held by the processing thread. Formats each record kind
/// in its exact wire shape (spaces after commas are part of the format).
#[derive(Clone)]
pub struct Tape {
    tx: Sender<OutputEnvelope>,
}

impl Tape {
    pub fn new(tx: Sender<OutputEnvelope>) -> Self {
        Self { tx }
    }

    /// `A, userId, userOrderId`
    pub fn ack(&self, user_id: u64, user_order_id: u64) {
        self.push(
            Channel::Data,
            format_args!("A, {user_id}, {user_order_id}\n"),
        );
    }

    /// `C, userId, userOrderId`
    pub fn cancel(&self, user_id: u64, user_order_id: u64) {
        self.push(
            Channel::Data,
            format_args!("C, {user_id}, {user_order_id}\n"),
        );
    }

    /// `T, buyUserId, buyUserOrderId, sellUserId, sellUserOrderId, price, qty`
    #[allow(clippy::too_many_arguments)]
    pub fn trade(
        &self,
        buy_user_id: u64,
        buy_user_order_id: u64,
        sell_user_id: u64,
        sell_user_order_id: u64,
        price: Fixed,
        qty: Fixed,
    ) {
        self.push(
            Channel::Data,
            format_args!(
                "T, {buy_user_id}, {buy_user_order_id}, {sell_user_id}, {sell_user_order_id}, {price}, {qty}\n"
            ),
        );
    }

    /// `B, side, price, totalQuantity` or `B, side, -, -` for an empty side.
    pub fn bbo(&self, side: Side, top: TopOfBook) {
        let code = side.wire_code();
        match top {
            Some((price, qty)) => self.push(
                Channel::Data,
                format_args!("B, {code}, {price}, {qty}\n"),
            ),
            None => self.push(Channel::Data, format_args!("B, {code}, -, -\n")),
        }
    }

    /// One diagnostic line, routed to stderr by the output thread.
    pub fn diag(&self, args: fmt::Arguments<'_>) {
        self.push(Channel::Diag, format_args!("{args}\n"));
    }

    fn push(&self, channel: Channel, args: fmt::Arguments<'_>) {
        // A send can only fail after the output thread has gone away
        // during shutdown; there is nobody left to tell.
        let _ = self.tx.send(OutputEnvelope::format(channel, args));
    }
}

/// Spawn the output thread: block for the first envelope, drain the rest
/// of the batch without blocking, flush stdout once per batch. Exits when
/// every `Tape` clone has been dropped and the channel is drained.
pub fn spawn_writer(rx: Receiver<OutputEnvelope>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("output".into())
        .spawn(move || {
            let stdout = io::stdout();
            let stderr = io::stderr();
            let mut out = stdout.lock();
            let mut err = stderr.lock();

            while let Ok(first) = rx.recv() {
                if write_envelope(&mut out, &mut err, &first).is_err() {
                    return;
                }
                while let Ok(env) = rx.try_recv() {
                    if write_envelope(&mut out, &mut err, &env).is_err() {
                        return;
                    }
                }
                let _ = out.flush();
            }
        })
}

fn write_envelope(
    out: &mut impl Write,
    err: &mut impl Write,
    env: &OutputEnvelope,
) -> io::Result<()> {
    match env.channel() {
        Channel::Data => out.write_all(env.as_bytes()),
        Channel::Diag => err.write_all(env.as_bytes()),
    }
}
