//! Strict-FIFO serialization of VM-mutating tool calls.
//!
//! The VM guest has no internal locking: interleaved input or concurrent
//! mutation corrupts application state inside it. [`ToolCallScheduler`]
//! guarantees that at most one VM-bound operation executes at any instant,
//! across all concurrently running subagents, in submission order.
//!
//! Each submission chains off the previous tail: it waits for the prior
//! operation's completion signal, then checks the global pause flag, then
//! runs its own operation and becomes the new tail. Because every submission
//! chains strictly off the prior tail, submission order equals execution
//! order even though submitters race. The caller suspends until its own
//! operation completes and receives the result directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::ScheduleError;

/// Poll interval while an operation at the head of the queue waits out a
/// pause. Cancellation is checked on every poll, so a cancelled submitter
/// leaves the queue promptly even while paused.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Signal passed down the queue when a slot resolves.
enum Release {
    /// The predecessor finished (or was cancelled before starting).
    Done,
    /// The predecessor's submitting future was dropped while still queued;
    /// the successor inherits its unresolved wait on the operation before it.
    Forward(oneshot::Receiver<Release>),
}

#[derive(Default)]
pub struct ToolCallScheduler {
    /// Completion signal of the most recently submitted operation.
    tail: Mutex<Option<oneshot::Receiver<Release>>>,
    /// Global pause flag. Pausing blocks the head of the queue, and with it
    /// every operation behind the head.
    paused: AtomicBool,
}

/// Resolves this submission's slot when dropped. A submission that ran (or
/// was cancelled after reaching the head) signals `Done`; one dropped while
/// still waiting on its predecessor forwards that unresolved wait instead,
/// so a dropped submitter can never release its successor early.
struct ReleaseNext {
    tx: Option<oneshot::Sender<Release>>,
    pending: Option<oneshot::Receiver<Release>>,
}

impl Drop for ReleaseNext {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let signal = match self.pending.take() {
                Some(previous) => Release::Forward(previous),
                None => Release::Done,
            };
            let _ = tx.send(signal);
        }
    }
}

impl ToolCallScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Submit an operation and suspend until it has executed.
    ///
    /// Ordering: waits for the previously submitted operation to finish,
    /// waits out any pause (polling, cancellation-responsive), then runs
    /// `op`. Returns `op`'s output, or [`ScheduleError::Cancelled`] if the
    /// token fired before `op` started executing. An operation that has
    /// already started always runs to completion (no preemption).
    pub async fn run<T, F>(&self, cancel: &CancellationToken, op: F) -> Result<T, ScheduleError>
    where
        F: std::future::Future<Output = T>,
    {
        let (tx, rx) = oneshot::channel();
        let previous = {
            let mut tail = self.tail.lock().unwrap();
            tail.replace(rx)
        };
        let mut release = ReleaseNext {
            tx: Some(tx),
            pending: previous,
        };

        // Walk the predecessor chain. A forwarded receiver comes from a
        // submitter dropped while queued; its own predecessor's signal takes
        // its place. The receiver stays inside the guard while awaited, so
        // dropping this future forwards it rather than signalling done.
        while let Some(previous) = release.pending.as_mut() {
            match previous.await {
                Ok(Release::Forward(inherited)) => release.pending = Some(inherited),
                // A RecvError can only mean a leaked guard; treat it as done.
                Ok(Release::Done) | Err(_) => release.pending = None,
            }
        }

        while self.is_paused() {
            if cancel.is_cancelled() {
                return Err(ScheduleError::Cancelled);
            }
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
        }
        if cancel.is_cancelled() {
            return Err(ScheduleError::Cancelled);
        }

        Ok(op.await)
    }
}
