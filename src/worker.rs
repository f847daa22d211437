//! Single worker thread owning a bounded FIFO of typed requests (spec §4.7),
//! grounded on `worker_thread.h`'s message-queue design and reimagined with
//! `std::sync::mpsc` instead of a hand-rolled queue + condition variable —
//! the same channel pattern `art-den-astra_lite/src/core/core.rs` uses to
//! hand work to its capture thread.

use crate::calibration::Direction;
use crate::engine::Camera;
use crate::error::{PhdError, PhdResult};
use crate::image::{Image, Rect};
use crate::mount::MountBackend;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

#[derive(Debug)]
pub enum WorkerRequest {
    Expose { exposure_ms: u32, subframe: Option<Rect> },
    Move { direction: Direction, duration_ms: u32 },
    Terminate,
}

#[derive(Debug)]
pub enum WorkerResponse {
    Exposed(PhdResult<Image>),
    Moved(PhdResult<()>),
}

/// Backend a worker thread drives. `Camera`/`Mount` compositions implement
/// this; a move-only worker (e.g. a secondary-mount channel) answers
/// `expose` with an error since it was never asked to capture.
pub trait WorkerService: Send {
    fn expose(&mut self, exposure_ms: u32, subframe: Option<Rect>) -> PhdResult<Image>;
    fn pulse(&mut self, direction: Direction, duration_ms: u32) -> PhdResult<()>;
}

/// Drives one `Camera` on its own thread (spec §2: `worker.capture`). Only
/// ever receives `Expose` requests; the engine never routes a `Move` to a
/// camera worker.
pub struct CameraWorkerService<C: Camera> {
    camera: C,
}

impl<C: Camera> CameraWorkerService<C> {
    pub fn new(camera: C) -> Self {
        CameraWorkerService { camera }
    }
}

impl<C: Camera> WorkerService for CameraWorkerService<C> {
    fn expose(&mut self, exposure_ms: u32, subframe: Option<Rect>) -> PhdResult<Image> {
        self.camera.capture(exposure_ms, subframe)
    }

    fn pulse(&mut self, _direction: Direction, _duration_ms: u32) -> PhdResult<()> {
        Err(PhdError::IllegalStateTransition("camera worker does not pulse".to_string()))
    }
}

/// Drives one mount backend's pulses on its own thread (spec §2:
/// `worker.pulse`). Only constructed for backends `Mount::take_backend_for_worker`
/// actually hands over — i.e. ones that report `has_nonui_move`. Backends
/// that can't safely pulse off the controller thread never reach this type;
/// `Mount::execute_pulse` serves those directly instead (spec §4.7).
pub struct MountWorkerService {
    backend: Box<dyn MountBackend>,
}

impl MountWorkerService {
    pub fn new(backend: Box<dyn MountBackend>) -> Self {
        MountWorkerService { backend }
    }
}

impl WorkerService for MountWorkerService {
    fn expose(&mut self, _exposure_ms: u32, _subframe: Option<Rect>) -> PhdResult<Image> {
        Err(PhdError::IllegalStateTransition("mount worker does not expose".to_string()))
    }

    fn pulse(&mut self, direction: Direction, duration_ms: u32) -> PhdResult<()> {
        self.backend.pulse(direction.into(), duration_ms)
    }
}

struct Envelope {
    request: WorkerRequest,
    reply: Sender<WorkerResponse>,
}

/// A completion handle for one enqueued request. The worker posts the
/// response as soon as it's ready; `wait()` blocks the controller thread
/// until then, matching the "completion event processed in post order"
/// guarantee from spec §5.
pub struct Completion(Receiver<WorkerResponse>);

impl Completion {
    pub fn wait(self) -> PhdResult<WorkerResponse> {
        self.0.recv().map_err(|_| PhdError::Cancelled("worker terminated before completion".to_string()))
    }
}

pub struct Worker {
    tx: Sender<Envelope>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<S: WorkerService + 'static>(mut service: S) -> Self {
        let (tx, rx) = mpsc::channel::<Envelope>();
        let handle = thread::spawn(move || {
            while let Ok(envelope) = rx.recv() {
                let response = match envelope.request {
                    WorkerRequest::Terminate => break,
                    WorkerRequest::Expose { exposure_ms, subframe } => {
                        WorkerResponse::Exposed(service.expose(exposure_ms, subframe))
                    }
                    WorkerRequest::Move { direction, duration_ms } => {
                        WorkerResponse::Moved(service.pulse(direction, duration_ms))
                    }
                };
                let _ = envelope.reply.send(response);
            }
        });
        Worker { tx, handle: Some(handle) }
    }

    /// Enqueues a request (strict FIFO relative to prior `submit` calls) and
    /// returns immediately with a completion handle. The caller decides when
    /// to wait; only one outstanding Expose and one outstanding Move per
    /// worker is the engine's responsibility to enforce, not this queue's.
    pub fn submit(&self, request: WorkerRequest) -> PhdResult<Completion> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Envelope { request, reply: reply_tx })
            .map_err(|_| PhdError::Cancelled("worker thread is gone".to_string()))?;
        Ok(Completion(reply_rx))
    }

    /// Honored after the current in-flight request finishes; there is no
    /// mid-request cancellation (spec §4.7).
    pub fn terminate(mut self) {
        let (reply_tx, _reply_rx) = mpsc::channel();
        let _ = self.tx.send(Envelope { request: WorkerRequest::Terminate, reply: reply_tx });
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let (reply_tx, _reply_rx) = mpsc::channel();
            let _ = self.tx.send(Envelope { request: WorkerRequest::Terminate, reply: reply_tx });
            let _ = handle.join();
        }
    }
}

/// One pulse worker per mount channel: `primary` and `secondary` mirror
/// `worker_thread.h`'s primary/secondary thread pair (spec §4.7/§15). Either
/// slot is `None` when that mount's backend reports `has_nonui_move ==
/// false` — such a backend stays on `Mount` and is pulsed by the controller
/// thread directly rather than handed to a worker.
pub struct WorkerSet {
    pub primary: Option<Worker>,
    pub secondary: Option<Worker>,
}

impl WorkerSet {
    pub fn new(primary: Option<Worker>, secondary: Option<Worker>) -> Self {
        WorkerSet { primary, secondary }
    }
}
