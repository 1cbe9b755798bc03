//! Handles for a running interactive adb session
//!
//! An [`InteractiveCommand`] is the consumer side of a session: decoded
//! output chunks, a [`SessionWriter`] for answers and a [`CancelHandle`].
//! The producing side ([`SessionIo`]) is owned by a single task, either the
//! pseudo-terminal driver or a test fixture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use buddy_core::prelude::*;
use tokio::sync::{mpsc, watch, Notify};

/// Chunks buffered between the session task and its consumer
const CHUNK_BUFFER: usize = 64;

/// Idempotent cancellation shared by every handle of one session.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Safe to call any number of times, before or
    /// after the session finished.
    pub fn cancel(&self) {
        if !self.tx.send_replace(true) {
            debug!("Cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only returns once the flag is set
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Send on a bounded channel unless cancellation arrives first.
    ///
    /// Returns false when the item was not delivered, either because the
    /// receiver is gone or because the session was cancelled while the
    /// channel was full.
    pub async fn send<T>(&self, tx: &mpsc::Sender<T>, item: T) -> bool {
        tokio::select! {
            biased;
            _ = self.cancelled() => false,
            sent = tx.send(item) => sent.is_ok(),
        }
    }
}

/// Exit flag set by the session task once the child has been reaped.
#[derive(Debug, Clone, Default)]
pub struct ExitSignal {
    exited: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ExitSignal {
    pub fn mark_exited(&self) {
        self.exited.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        // Register before checking so a concurrent mark_exited is not missed
        let notified = self.notify.notified();
        if self.has_exited() {
            return;
        }
        notified.await;
    }
}

/// Sends lines to a session's input.
///
/// Each write gets a trailing newline. Writes after the session ended are
/// dropped.
#[derive(Debug, Clone)]
pub struct SessionWriter {
    tx: mpsc::UnboundedSender<String>,
}

impl SessionWriter {
    pub fn write(&self, text: &str) {
        if self.tx.send(format!("{text}\n")).is_err() {
            debug!("Session closed, dropping input {:?}", text);
        }
    }
}

/// Producer side of an interactive session
#[derive(Debug)]
pub struct SessionIo {
    pub chunks: mpsc::Sender<Result<String>>,
    pub input: mpsc::UnboundedReceiver<String>,
    pub cancel: CancelHandle,
    pub exit: ExitSignal,
}

/// A running interactive adb command.
///
/// Dropping it closes the chunk channel, which the session task treats like
/// a cancellation.
#[derive(Debug)]
pub struct InteractiveCommand {
    chunks: mpsc::Receiver<Result<String>>,
    writer: SessionWriter,
    cancel: CancelHandle,
    exit: ExitSignal,
    pid: Option<u32>,
}

impl InteractiveCommand {
    /// Create a connected command/producer pair.
    pub fn channel(pid: Option<u32>) -> (Self, SessionIo) {
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_BUFFER);
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let cancel = CancelHandle::new();
        let exit = ExitSignal::default();

        let command = Self {
            chunks: chunk_rx,
            writer: SessionWriter { tx: input_tx },
            cancel: cancel.clone(),
            exit: exit.clone(),
            pid,
        };
        let io = SessionIo {
            chunks: chunk_tx,
            input: input_rx,
            cancel,
            exit,
        };
        (command, io)
    }

    /// Next decoded chunk, in arrival order.
    ///
    /// Returns `None` when the process finished and all output was
    /// delivered, or immediately once the session is cancelled. A decoding
    /// error is the last item.
    pub async fn next_chunk(&mut self) -> Option<Result<String>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            chunk = self.chunks.recv() => chunk,
        }
    }

    /// Write a line to the process's input.
    pub fn write(&self, text: &str) {
        self.writer.write(text);
    }

    pub fn writer(&self) -> SessionWriter {
        self.writer.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn exit_signal(&self) -> ExitSignal {
        self.exit.clone()
    }

    /// Process ID of the adb child, when backed by a real process
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        self.exit.has_exited()
    }
}
