//! Notifier contract and alert message formatting.
//!
//! The concrete delivery channel is an external collaborator; this module only
//! defines the `Notifier` trait, a bounded-timeout wrapper and a console
//! implementation that writes through `tracing`.
//!
//! Delivery is not assumed idempotent. Every message carries the transition's
//! idempotency key so a receiver can drop the duplicate that follows a crash
//! between delivery and commit.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pairwatch_core::domain::{PairKey, PositionState, Signal};
use pairwatch_core::spread::ZScoreResult;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotifyError {
    #[error("notification rejected by channel: {0}")]
    Rejected(String),

    #[error("notification transport failure: {0}")]
    Transport(String),

    #[error("notification timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Delivers a formatted message to an external channel.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok` means the channel confirmed delivery.
    fn send(&self, text: &str) -> Result<(), NotifyError>;
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn send(&self, text: &str) -> Result<(), NotifyError> {
        (**self).send(text)
    }
}

// ── Formatting ──

/// Everything a message needs besides the engine result.
#[derive(Debug, Clone)]
pub struct AlertContext<'a> {
    pub pair: &'a PairKey,
    pub from: PositionState,
    pub to: PositionState,
    pub signal: Signal,
    pub entry_z: f64,
    pub exit_z: f64,
    pub cooldown_minutes: u64,
    pub idempotency_key: &'a str,
}

/// HTML-formatted alert text.
pub fn format_alert(ctx: &AlertContext<'_>, r: &ZScoreResult) -> String {
    let a = escape_html(&ctx.pair.a);
    let b = escape_html(&ctx.pair.b);
    format!(
        "<b>{signal}</b>\n\
         <b>{a} vs {b}</b> ({interval})\n\
         Z: <b>{z}</b>\n\
         Spread(log A/B): {spread}\n\
         {a}: {pa}\n\
         {b}: {pb}\n\
         State: {from} → {to}\n\
         Rule: entry={entry}, exit={exit}, cd={cd}m\n\
         Key: <code>{key}</code>",
        signal = ctx.signal,
        interval = escape_html(&r.interval),
        z = fmt_num(r.z, 2),
        spread = fmt_num(r.spread, 6),
        pa = r.price_a,
        pb = r.price_b,
        from = ctx.from,
        to = ctx.to,
        entry = ctx.entry_z,
        exit = ctx.exit_z,
        cd = ctx.cooldown_minutes,
        key = escape_html(ctx.idempotency_key),
    )
}

fn fmt_num(n: f64, decimals: usize) -> String {
    if n.is_finite() {
        format!("{n:.decimals$}")
    } else {
        n.to_string()
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

// ── Implementations ──

/// Writes alerts to the log. Always succeeds.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn name(&self) -> &str {
        "console"
    }

    fn send(&self, text: &str) -> Result<(), NotifyError> {
        info!(target: "pairwatch::alert", "\n{text}");
        Ok(())
    }
}

/// Bounds the inner notifier's `send` to `timeout`.
///
/// The call runs on a helper thread; on timeout the thread is abandoned and
/// its eventual result discarded. A timed-out delivery may still have reached
/// the channel, which the idempotency key in the message covers.
pub struct TimeoutNotifier<N> {
    inner: Arc<N>,
    timeout: Duration,
}

impl<N: Notifier + 'static> TimeoutNotifier<N> {
    pub fn new(inner: N, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
        }
    }
}

impl<N: Notifier + 'static> Notifier for TimeoutNotifier<N> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn send(&self, text: &str) -> Result<(), NotifyError> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        thread::Builder::new()
            .name("pairwatch-notify".into())
            .spawn(move || {
                let _ = tx.send(inner.send(&text));
            })
            .map_err(|e| NotifyError::Transport(format!("spawn notifier thread: {e}")))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(NotifyError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(NotifyError::Transport("notifier thread exited without a result".into()))
            }
        }
    }
}
