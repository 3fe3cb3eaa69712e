//! Reusable task objects.
//!
//! A [`Task`] is owned by exactly one party at a time: the download worker,
//! then the decode worker, then the consumer context. It moves between them
//! by value, so none of its fields are ever shared.

use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::images::{Payload, PixelBuffer, Provenance};
use crate::models::{RequestIdentity, Status};

/// Handle returned to callers so they can cancel a request later.
///
/// A handle names one activation of a pool slot; once the task is recycled
/// and the slot reused, the old handle no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pub(crate) slot: usize,
    pub(crate) generation: u64,
}

impl TaskHandle {
    /// Pool slot index
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Activation counter of the slot when the handle was issued
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// One in-flight image request and its pipeline state.
#[derive(Debug)]
pub struct Task {
    slot: usize,
    generation: u64,
    state: Status,
    identity: RequestIdentity,
    payload: Option<Payload>,
    provenance: Option<Provenance>,
    pixels: Option<PixelBuffer>,
    cancel: CancellationToken,
    failure: Option<PipelineError>,
}

impl Task {
    pub(crate) fn new(slot: usize) -> Self {
        Self {
            slot,
            generation: 0,
            state: Status::TaskNone,
            identity: RequestIdentity::default(),
            payload: None,
            provenance: None,
            pixels: None,
            cancel: CancellationToken::new(),
            failure: None,
        }
    }

    /// Bind an idle task to a new request.
    pub(crate) fn activate(
        &mut self,
        generation: u64,
        identity: RequestIdentity,
        cancel: CancellationToken,
    ) {
        debug_assert_eq!(self.state, Status::TaskNone);
        self.generation = generation;
        self.identity = identity;
        self.cancel = cancel;
    }

    /// Return to the idle state, dropping every buffer.
    pub(crate) fn reset(&mut self) {
        self.state = Status::TaskNone;
        self.identity = RequestIdentity::default();
        self.payload = None;
        self.provenance = None;
        self.pixels = None;
        self.failure = None;
        self.cancel = CancellationToken::new();
    }

    /// Move along one edge of the state machine.
    pub(crate) fn advance(&mut self, next: Status) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Start from a cache miss: waiting for a download worker.
    pub(crate) fn begin_queued(&mut self) -> Result<()> {
        self.advance(Status::TaskQueued)
    }

    /// Start from a memory cache hit: the payload is already here.
    pub(crate) fn begin_cached(&mut self, payload: Payload) -> Result<()> {
        self.advance(Status::DownloadComplete)?;
        self.payload = Some(payload);
        self.provenance = Some(Provenance::Memory);
        Ok(())
    }

    /// Terminate with a failure regardless of the current state.
    pub(crate) fn abort(&mut self, error: PipelineError) {
        self.state = Status::DownloadFailed;
        self.payload = None;
        self.pixels = None;
        self.failure = Some(error);
    }

    pub(crate) fn set_payload(&mut self, payload: Payload, provenance: Provenance) {
        self.pixels = None;
        self.payload = Some(payload);
        self.provenance = Some(provenance);
    }

    pub(crate) fn take_payload(&mut self) -> Option<Payload> {
        self.payload.take()
    }

    /// Store decoded pixels. The payload must already be gone.
    pub(crate) fn set_pixels(&mut self, pixels: PixelBuffer) {
        self.payload = None;
        self.pixels = Some(pixels);
    }

    pub(crate) fn take_pixels(&mut self) -> Option<PixelBuffer> {
        self.pixels.take()
    }

    pub(crate) fn set_failure(&mut self, error: PipelineError) {
        self.payload = None;
        self.pixels = None;
        self.failure = Some(error);
    }

    pub(crate) const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Handle naming this activation
    pub const fn handle(&self) -> TaskHandle {
        TaskHandle {
            slot: self.slot,
            generation: self.generation,
        }
    }

    /// Current state
    pub const fn status(&self) -> Status {
        self.state
    }

    /// What this task is producing
    pub const fn identity(&self) -> &RequestIdentity {
        &self.identity
    }

    /// Raw payload, present between download and decode
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Where the payload was read from, once there is one
    pub const fn provenance(&self) -> Option<Provenance> {
        self.provenance
    }

    /// Decoded pixels, present between decode and hand-off
    pub const fn pixels(&self) -> Option<&PixelBuffer> {
        self.pixels.as_ref()
    }

    /// Why the task failed, if it did
    pub const fn failure(&self) -> Option<&PipelineError> {
        self.failure.as_ref()
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True when no buffer is held
    pub const fn is_empty(&self) -> bool {
        self.payload.is_none() && self.pixels.is_none()
    }
}
