//! Render coordinator.
//!
//! Serializes key/tempo renders: one job runs on a worker thread while the
//! rest wait in FIFO order. Worker results come back over a channel and are
//! applied to the queue on the owning thread.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::errors::RenderError;
use super::types::{CancelHandle, RenderIntent, RenderMessage, RenderOutput, RenderProgress, RenderRequest};
use super::worker::ShiftRenderWorker;
use crate::models::{RenderState, ShiftedAsset, TrackId};
use crate::queue::{PlaybackControl, QueueManager};

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Processing,
}

/// Something the front-end may want to show.
#[derive(Debug)]
pub enum RenderEvent {
    Started {
        track: TrackId,
        file_name: String,
    },
    Progress {
        track: TrackId,
        progress: RenderProgress,
    },
    Completed {
        track: TrackId,
        intent: RenderIntent,
        output: RenderOutput,
    },
    Failed {
        track: TrackId,
        file_name: String,
        error: RenderError,
    },
}

struct ActiveJob {
    request: RenderRequest,
    cancel: CancelHandle,
    handle: Option<JoinHandle<()>>,
    progress: Option<RenderProgress>,
}

/// FIFO render queue with a single worker.
pub struct RenderCoordinator {
    worker: Arc<ShiftRenderWorker>,
    backlog: VecDeque<RenderRequest>,
    active: Option<ActiveJob>,
    tx: Sender<RenderMessage>,
    rx: Receiver<RenderMessage>,
    events: Vec<RenderEvent>,
}

impl RenderCoordinator {
    pub fn new(worker: ShiftRenderWorker) -> Self {
        let (tx, rx) = unbounded();
        Self {
            worker: Arc::new(worker),
            backlog: VecDeque::new(),
            active: None,
            tx,
            rx,
            events: Vec::new(),
        }
    }

    pub fn worker(&self) -> &ShiftRenderWorker {
        &self.worker
    }

    pub fn state(&self) -> CoordinatorState {
        if self.active.is_some() {
            CoordinatorState::Processing
        } else {
            CoordinatorState::Idle
        }
    }

    /// Renders waiting or running.
    pub fn pending_count(&self) -> usize {
        self.backlog.len() + usize::from(self.active.is_some())
    }

    pub fn active_track(&self) -> Option<TrackId> {
        self.active.as_ref().map(|a| a.request.track().id())
    }

    /// Latest progress of the running render.
    pub fn active_progress(&self) -> Option<RenderProgress> {
        self.active.as_ref().and_then(|a| a.progress)
    }

    /// Status line while renders are outstanding.
    pub fn status_line(&self) -> Option<String> {
        match self.pending_count() {
            0 => None,
            n => Some(format!("Rendering: {} to be added to queue", n)),
        }
    }

    /// Channel worker results arrive on.
    pub fn messages(&self) -> &Receiver<RenderMessage> {
        &self.rx
    }

    /// Queue a render, starting it right away when nothing else runs.
    ///
    /// The track is marked pending both in the request and in the queue
    /// (if queued).
    pub fn enqueue(&mut self, mut request: RenderRequest, queue: &mut QueueManager) {
        let id = request.track().id();
        request.track_mut().set_render_state(RenderState::Pending);
        queue.set_render_state(id, RenderState::Pending);
        tracing::info!(
            "Render requested for {} ({:?}, {} waiting)",
            request.track().file_name(),
            request.intent(),
            self.backlog.len()
        );

        self.backlog.push_back(request);
        if self.active.is_none() {
            self.start_next(queue);
        }
    }

    /// Apply all available worker messages and return the resulting events.
    pub fn poll(&mut self, queue: &mut QueueManager, player: &mut dyn PlaybackControl) -> Vec<RenderEvent> {
        while let Ok(message) = self.rx.try_recv() {
            self.handle_message(message, queue, player);
        }
        std::mem::take(&mut self.events)
    }

    /// Apply one worker message. Events are collected for the next `poll`.
    pub fn handle_message(
        &mut self,
        message: RenderMessage,
        queue: &mut QueueManager,
        player: &mut dyn PlaybackControl,
    ) {
        match message {
            RenderMessage::Progress { track, progress } => {
                if let Some(active) = self.active.as_mut().filter(|a| a.request.track().id() == track) {
                    active.progress = Some(progress);
                    self.events.push(RenderEvent::Progress { track, progress });
                }
            }
            RenderMessage::Done { track, result } => self.finish(track, result, queue, player),
        }
    }

    fn finish(
        &mut self,
        track: TrackId,
        result: Result<RenderOutput, RenderError>,
        queue: &mut QueueManager,
        player: &mut dyn PlaybackControl,
    ) {
        let Some(mut active) = self.active.take() else {
            tracing::debug!("Ignoring result for {} with no active render", track);
            return;
        };
        if active.request.track().id() != track {
            tracing::debug!("Ignoring stale render result for {}", track);
            self.active = Some(active);
            return;
        }
        if let Some(handle) = active.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Render worker for {} panicked", track);
            }
        }

        let intent = active.request.intent();
        let mut rendered = active.request.into_track();
        rendered.set_render_state(RenderState::Idle);
        queue.set_render_state(track, RenderState::Idle);

        match result {
            Ok(output) => {
                if let Some(path) = output.path() {
                    let asset = ShiftedAsset::for_controls(&rendered.controls(), path.to_path_buf());
                    rendered.set_shifted(asset);
                }
                match intent {
                    RenderIntent::PromoteAndPlay => queue.promote_and_play(rendered, player),
                    RenderIntent::AppendToQueue => queue.append_rendered(rendered, player),
                }
                self.events.push(RenderEvent::Completed {
                    track,
                    intent,
                    output,
                });
            }
            Err(error) => {
                tracing::warn!("Render of {} failed: {}", rendered.file_name(), error);
                self.events.push(RenderEvent::Failed {
                    track,
                    file_name: rendered.file_name(),
                    error,
                });
            }
        }

        self.start_next(queue);
    }

    fn start_next(&mut self, queue: &mut QueueManager) {
        while let Some(mut request) = self.backlog.pop_front() {
            let id = request.track().id();
            let file_name = request.track().file_name();
            request.track_mut().set_render_state(RenderState::Rendering);
            queue.set_render_state(id, RenderState::Rendering);

            let cancel = CancelHandle::new();
            match self.worker.spawn(request.job(), cancel.clone(), self.tx.clone()) {
                Ok(handle) => {
                    tracing::info!("Rendering {}", file_name);
                    self.active = Some(ActiveJob {
                        request,
                        cancel,
                        handle: Some(handle),
                        progress: None,
                    });
                    self.events.push(RenderEvent::Started { track: id, file_name });
                    return;
                }
                Err(e) => {
                    queue.set_render_state(id, RenderState::Idle);
                    self.events.push(RenderEvent::Failed {
                        track: id,
                        file_name,
                        error: RenderError::io("starting render thread", e),
                    });
                }
            }
        }
    }

    /// Ask the running render to stop. Its result still arrives as a
    /// `Failed` event with a cancellation error.
    pub fn cancel_active(&self) -> bool {
        match &self.active {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel everything and wait for the worker thread to exit.
    pub fn shutdown(&mut self) {
        let dropped = self.backlog.len();
        self.backlog.clear();
        if let Some(mut active) = self.active.take() {
            active.cancel.cancel();
            if let Some(handle) = active.handle.take() {
                if handle.join().is_err() {
                    tracing::error!("Render worker panicked during shutdown");
                }
            }
        }
        while self.rx.try_recv().is_ok() {}
        if dropped > 0 {
            tracing::info!("Dropped {} pending renders", dropped);
        }
    }
}

impl Drop for RenderCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
