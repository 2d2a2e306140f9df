//! `waitgate` is a manual-reset event — a gate that stays open once signalled until it
//! is explicitly closed again — for signalling between threads and for building other
//! synchronization primitives on top of.
//!
//! Unlike a classic blocking event, waiting here is split into two steps: calling
//! [`ManualResetEvent::wait()`] *registers* the caller and returns immediately with a
//! [`WaitHandle`], and the caller only suspends when it waits on that handle (via the
//! [`Awaitable`] trait). Registration is what places the caller in the event's FIFO
//! queue, so the queue length is exact and observable via
//! [`ManualResetEvent::status()`] at any point between registering and suspending.
//!
//! Two properties of the queue are part of the contract and worth calling out:
//!
//! * [`set()`](ManualResetEvent::set) releases every queued waiter in FIFO
//!   (registration) order and empties the queue; a released handle can never become
//!   pending again.
//! * [`reset()`](ManualResetEvent::reset) closes the gate but does **not** touch the
//!   queue: waiters registered before a reset are still released by the next `set()`.
//!
//! Suspension is implemented with the `parking_lot_core` crate, which takes care of
//! efficiently parking threads while they wait for their handle to be released.

use parking_lot::Mutex;
use parking_lot_core as plc;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;


/// The initial state of a [`ManualResetEvent`], which can either be `Set` (i.e.
/// signalled, open) or `Unset` (i.e. not ready, closed).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventState {
    /// The event is signalled and calls to [`ManualResetEvent::wait()`] return an
    /// already-released handle.
    Set,
    /// The event is not signalled and calls to [`ManualResetEvent::wait()`] enqueue
    /// the caller until the event becomes set.
    Unset,
}

/// A point-in-time snapshot of a [`ManualResetEvent`], as returned by
/// [`ManualResetEvent::status()`].
///
/// The snapshot is taken atomically with respect to the other event operations, but
/// only describes the instant it was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventStatus {
    /// Whether the event was signalled.
    pub completed: bool,
    /// How many registered waiters had not yet been released.
    pub wait_count: usize,
}

/// An object that a thread can block on, obtained from a [`ManualResetEvent`].
pub trait Awaitable {
    /// Block the calling thread until the awaited object becomes ready. Returns
    /// immediately if it is already ready.
    fn wait(&self);

    /// Test for readiness without blocking, returning `false` immediately if the
    /// object is not ready. The calling thread never yields.
    fn wait0(&self) -> bool;
}

// One parking slot per registered wait, true once released. A token is released at
// most once, by the set() call that drains it out of the queue, and never goes back
// to unreleased.
struct WaitToken(AtomicBool);

impl WaitToken {
    const fn new(released: bool) -> WaitToken {
        WaitToken(AtomicBool::new(released))
    }

    fn is_released(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Releases the token, unparking the thread suspended on it (if any).
    fn release(&self) {
        self.0.store(true, Ordering::Release);
        unsafe { plc::unpark_all(self as *const WaitToken as usize, plc::DEFAULT_UNPARK_TOKEN) };
    }

    /// Parks the calling thread until the token has been released.
    fn suspend(&self) {
        unsafe {
            plc::park(
                self as *const WaitToken as usize,
                || !self.is_released(),
                || {},
                |_, _| {},
                plc::DEFAULT_PARK_TOKEN,
                None,
            );
        }
    }
}

/// A one-shot handle to a single registered wait on a [`ManualResetEvent`].
///
/// The handle starts out pending (unless the event was already set at registration
/// time) and becomes released when a subsequent [`ManualResetEvent::set()`] drains its
/// slot from the queue. Once released it stays released: waiting on it again returns
/// immediately, and no later [`reset()`](ManualResetEvent::reset) affects it.
///
/// There is no way to cancel a pending handle; it is released only by a future
/// `set()`. Dropping a pending handle is fine — the event still drains its slot on the
/// next `set()`.
pub struct WaitHandle {
    token: Arc<WaitToken>,
}

impl WaitHandle {
    /// A handle that was born released, for waits made while the event is set.
    fn ready() -> WaitHandle {
        WaitHandle {
            token: Arc::new(WaitToken::new(true)),
        }
    }
}

impl Awaitable for WaitHandle {
    /// Check if the handle has been released, and if not, block waiting for the
    /// event's `set()` to release it.
    fn wait(&self) {
        if !self.token.is_released() {
            self.token.suspend();
        }
    }

    fn wait0(&self) -> bool {
        self.token.is_released()
    }
}

impl fmt::Debug for WaitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitHandle")
            .field("released", &self.wait0())
            .finish()
    }
}

// signaled and the queue form a single critical section; every operation takes the
// lock so snapshots and drains cannot interleave.
struct Inner {
    signaled: bool,
    waiters: Vec<Arc<WaitToken>>,
}

/// A `ManualResetEvent` is best understood as a waitable boolean with a waiting room:
/// it allows one or more threads to wait for a signal from one or more other threads,
/// where the signal could have either occurred in the past or could come at any time
/// in the future, and it keeps an explicit FIFO queue of everyone waiting.
///
/// Each call to [`wait()`](Self::wait) gets its own independent [`WaitHandle`]; a
/// [`set()`](Self::set) releases all handles queued so far and leaves the event open
/// for future waiters, until [`reset()`](Self::reset) closes it again. The event has
/// no terminal state and is reusable indefinitely.
///
/// An event can be shared by reference, via an `Arc`, or through a `static` (the
/// constructor is `const`):
///
/// ```
/// use waitgate::{Awaitable, EventState, ManualResetEvent};
///
/// static GATE: ManualResetEvent = ManualResetEvent::new(EventState::Unset);
///
/// let pending = GATE.wait();
/// assert!(!pending.wait0());
/// GATE.set();
/// pending.wait(); // returns immediately, the handle was released
/// ```
pub struct ManualResetEvent {
    inner: Mutex<Inner>,
}

impl ManualResetEvent {
    /// Create a new `ManualResetEvent` in the given initial state, with an empty
    /// waiter queue.
    pub const fn new(state: EventState) -> ManualResetEvent {
        ManualResetEvent {
            inner: Mutex::new(Inner {
                signaled: matches!(state, EventState::Set),
                waiters: Vec::new(),
            }),
        }
    }

    /// Register a wait on the event.
    ///
    /// If the event is currently set, the returned handle is already released and the
    /// caller is never enqueued (the queue length is unchanged). Otherwise the caller
    /// is appended to the tail of the queue and the handle stays pending until a
    /// future [`set()`](Self::set) releases it.
    ///
    /// This call itself never blocks; suspension happens only in
    /// [`Awaitable::wait()`] on the returned handle.
    pub fn wait(&self) -> WaitHandle {
        let mut inner = self.inner.lock();
        if inner.signaled {
            return WaitHandle::ready();
        }
        let token = Arc::new(WaitToken::new(false));
        inner.waiters.push(Arc::clone(&token));
        WaitHandle { token }
    }

    /// Signal the event, releasing all queued waiters (oldest first) and leaving the
    /// event set for future callers.
    ///
    /// Every handle registered before this call is released exactly once; the queue is
    /// empty when `set()` returns. Calling `set()` while the event is already set is a
    /// no-op beyond re-confirming the state.
    pub fn set(&self) {
        let mut inner = self.inner.lock();
        inner.signaled = true;
        for waiter in inner.waiters.drain(..) {
            waiter.release();
        }
    }

    /// Close the gate again, regardless of its current state.
    ///
    /// Only the signalled flag changes: waiters still queued from before the reset
    /// remain queued and are released by the next [`set()`](Self::set). Calling
    /// `reset()` repeatedly has no additional effect.
    pub fn reset(&self) {
        self.inner.lock().signaled = false;
    }

    /// Take a snapshot of the event's state: whether it is signalled, and how many
    /// registered waiters have not yet been released.
    pub fn status(&self) -> EventStatus {
        let inner = self.inner.lock();
        EventStatus {
            completed: inner.signaled,
            wait_count: inner.waiters.len(),
        }
    }

    /// Test if the event is signalled without blocking and without registering.
    pub fn is_set(&self) -> bool {
        self.inner.lock().signaled
    }
}

impl Default for ManualResetEvent {
    /// Equivalent to `ManualResetEvent::new(EventState::Unset)`.
    fn default() -> ManualResetEvent {
        ManualResetEvent::new(EventState::Unset)
    }
}

impl fmt::Debug for ManualResetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status();
        f.debug_struct("ManualResetEvent")
            .field("completed", &status.completed)
            .field("wait_count", &status.wait_count)
            .finish()
    }
}
