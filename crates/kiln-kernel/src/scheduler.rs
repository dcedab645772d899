//! Frame scheduler.
//!
//! The host drives everything from a single-threaded update loop; one call
//! to [`FrameScheduler::run_frame`] is one tick. Work handed to
//! [`FrameScheduler::defer`] runs at the start of the *next* tick: a
//! one-step cooperative yield. A task that defers further work pushes it
//! another frame out, never into the current drain.
//!
//! Cancellation ([`FrameScheduler::cancel`]) exists as a forward-compatible
//! hook; nothing in the reload path cancels today.

use std::mem;

use tracing::trace;

use crate::scene::Scene;

/// A deferred unit of work executed against the scene on a later frame.
type DeferredJob = Box<dyn FnOnce(&mut Scene)>;

/// Handle returned by [`FrameScheduler::defer`], usable to cancel the task
/// before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle(u64);

struct DeferredTask {
    id: u64,
    queued_at: u64,
    job: DeferredJob,
}

/// Single-threaded frame loop: a frame counter plus the deferred task
/// queue drained once per tick.
#[derive(Default)]
pub struct FrameScheduler {
    frame: u64,
    next_task: u64,
    queue: Vec<DeferredTask>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current frame number. Starts at 0; the first
    /// [`run_frame`](Self::run_frame) advances it to 1.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queues `job` to run at the start of the next frame.
    pub fn defer(&mut self, job: impl FnOnce(&mut Scene) + 'static) -> TaskHandle {
        let id = self.next_task;
        self.next_task += 1;
        self.queue.push(DeferredTask {
            id,
            queued_at: self.frame,
            job: Box::new(job),
        });
        trace!(task = id, frame = self.frame, "task deferred");
        TaskHandle(id)
    }

    /// Cancels a pending task. Returns `true` if the task was still queued.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        let before = self.queue.len();
        self.queue.retain(|task| task.id != handle.0);
        self.queue.len() != before
    }

    /// Advances one frame: runs the tasks queued on earlier frames, drives
    /// component updates, then lets the scene process deferred destroys.
    pub fn run_frame(&mut self, scene: &mut Scene) {
        self.frame += 1;
        let current = self.frame;

        let queue = mem::take(&mut self.queue);
        let (due, later): (Vec<_>, Vec<_>) =
            queue.into_iter().partition(|task| task.queued_at < current);
        self.queue = later;

        for task in due {
            trace!(task = task.id, frame = current, "running deferred task");
            (task.job)(scene);
        }

        scene.update(current);
        scene.end_frame();
    }
}
