//! Cooperative timers and animation-frame callbacks.
//!
//! Nothing in the controller blocks. Every wait (debounce, frame settle,
//! resize throttle) is a task handed to a [`Scheduler`] and remembered in a
//! [`TaskSlot`] so it can be cancelled before it is replaced or on teardown.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::collections::map::{HashMap, HashSet};

/// Handle of a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

pub type Task = Box<dyn FnOnce()>;

/// Source of timers and frame callbacks.
///
/// Implementations run tasks from their own loop, never synchronously inside
/// `set_timeout` or `request_animation_frame`.
pub trait Scheduler {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;

    fn set_timeout(&self, delay: Duration, task: Task) -> TaskId;

    /// Runs `task` before the next frame is painted.
    fn request_animation_frame(&self, task: Task) -> TaskId;

    /// Cancels a timer or frame callback. Unknown ids are ignored.
    fn cancel(&self, id: TaskId);
}

/// Time source for [`LoopScheduler`].
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Real time, backed by `web_time` so it also works under wasm.
#[derive(Clone, Copy, Debug)]
pub struct WallClock {
    origin: web_time::Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            origin: web_time::Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[derive(Default)]
struct LoopQueue {
    next_id: u64,
    /// Keyed by (deadline, id) so equal deadlines run in scheduling order.
    timers: BTreeMap<(Duration, u64), Task>,
    deadlines: HashMap<u64, Duration>,
    frames: Vec<(u64, Task)>,
    /// Frame tasks cancelled while their batch is running.
    cancelled_in_flight: HashSet<u64>,
}

impl LoopQueue {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Single-threaded task queue driven by an outer loop.
///
/// The owner calls [`run_due_timers`](Self::run_due_timers) whenever time
/// advances and [`run_frame`](Self::run_frame) once per rendered frame.
pub struct LoopScheduler<C: Clock> {
    clock: C,
    queue: RefCell<LoopQueue>,
    frames_run: Cell<u64>,
}

impl<C: Clock> LoopScheduler<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            queue: RefCell::new(LoopQueue::default()),
            frames_run: Cell::new(0),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Runs every timer whose deadline has passed, earliest first.
    ///
    /// Timers scheduled by a running timer are picked up in the same call if
    /// they are already due.
    pub fn run_due_timers(&self) -> usize {
        let mut ran = 0;
        loop {
            let now = self.clock.now();
            let task = {
                let mut queue = self.queue.borrow_mut();
                let due = match queue.timers.first_key_value() {
                    Some((&(deadline, id), _)) if deadline <= now => (deadline, id),
                    _ => break,
                };
                queue.deadlines.remove(&due.1);
                queue.timers.remove(&due)
            };
            if let Some(task) = task {
                task();
                ran += 1;
            }
        }
        ran
    }

    /// Runs the frame callbacks queued before this call.
    ///
    /// Callbacks requested while the frame runs wait for the next frame,
    /// matching `requestAnimationFrame`.
    pub fn run_frame(&self) -> usize {
        let batch = std::mem::take(&mut self.queue.borrow_mut().frames);
        let mut ran = 0;
        for (id, task) in batch {
            let cancelled = self.queue.borrow_mut().cancelled_in_flight.remove(&id);
            if cancelled {
                continue;
            }
            task();
            ran += 1;
        }
        self.queue.borrow_mut().cancelled_in_flight.clear();
        self.frames_run.set(self.frames_run.get() + 1);
        ran
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue
            .borrow()
            .timers
            .first_key_value()
            .map(|(&(deadline, _), _)| deadline)
    }

    pub fn pending_timers(&self) -> usize {
        self.queue.borrow().timers.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.queue.borrow().frames.len()
    }

    pub fn has_pending(&self) -> bool {
        let queue = self.queue.borrow();
        !queue.timers.is_empty() || !queue.frames.is_empty()
    }

    /// Number of frames run so far.
    pub fn frame_count(&self) -> u64 {
        self.frames_run.get()
    }
}

impl<C: Clock> Scheduler for LoopScheduler<C> {
    fn now(&self) -> Duration {
        self.clock.now()
    }

    fn set_timeout(&self, delay: Duration, task: Task) -> TaskId {
        let deadline = self.clock.now() + delay;
        let mut queue = self.queue.borrow_mut();
        let id = queue.allocate();
        queue.timers.insert((deadline, id), task);
        queue.deadlines.insert(id, deadline);
        TaskId(id)
    }

    fn request_animation_frame(&self, task: Task) -> TaskId {
        let mut queue = self.queue.borrow_mut();
        let id = queue.allocate();
        queue.frames.push((id, task));
        TaskId(id)
    }

    fn cancel(&self, id: TaskId) {
        let mut queue = self.queue.borrow_mut();
        if let Some(deadline) = queue.deadlines.remove(&id.0) {
            queue.timers.remove(&(deadline, id.0));
            return;
        }
        let before = queue.frames.len();
        queue.frames.retain(|(frame_id, _)| *frame_id != id.0);
        if queue.frames.len() == before {
            queue.cancelled_in_flight.insert(id.0);
        }
    }
}

/// How a [`TaskSlot`] waits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Wait {
    Timeout(Duration),
    Frame,
}

/// Holder for at most one live task.
///
/// Each arming bumps a generation that the task captures; when the task runs
/// it must [`claim`](Self::claim) its generation, so a callback that fires
/// after being replaced or cancelled does nothing.
#[derive(Debug, Default)]
pub(crate) struct TaskSlot {
    generation: u64,
    live: Option<TaskId>,
}

impl TaskSlot {
    /// Cancels any live task and schedules a new one built by `make`.
    pub(crate) fn arm(
        &mut self,
        scheduler: &dyn Scheduler,
        wait: Wait,
        make: impl FnOnce(u64) -> Task,
    ) {
        self.cancel(scheduler);
        self.generation += 1;
        let task = make(self.generation);
        let id = match wait {
            Wait::Timeout(delay) => scheduler.set_timeout(delay, task),
            Wait::Frame => scheduler.request_animation_frame(task),
        };
        self.live = Some(id);
    }

    /// Called from the task itself. Returns `true` if `generation` is still
    /// the live one, and clears the slot.
    pub(crate) fn claim(&mut self, generation: u64) -> bool {
        if self.live.is_some() && self.generation == generation {
            self.live = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub(crate) fn cancel(&mut self, scheduler: &dyn Scheduler) {
        if let Some(id) = self.live.take() {
            scheduler.cancel(id);
        }
        // Invalidate a task that may already be running.
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct TestClock(Rc<Cell<Duration>>);

    impl TestClock {
        fn advance(&self, by: Duration) {
            self.0.set(self.0.get() + by);
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Duration {
            self.0.get()
        }
    }

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, move |name| {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(name)) as Task
        })
    }

    #[test]
    fn test_timers_run_in_deadline_order() {
        let clock = TestClock::default();
        let scheduler = LoopScheduler::new(clock.clone());
        let (log, task) = recorder();

        scheduler.set_timeout(Duration::from_millis(30), task("late"));
        scheduler.set_timeout(Duration::from_millis(10), task("early"));
        scheduler.set_timeout(Duration::from_millis(10), task("early-second"));

        clock.advance(Duration::from_millis(15));
        assert_eq!(scheduler.run_due_timers(), 2);
        assert_eq!(*log.borrow(), vec!["early", "early-second"]);

        clock.advance(Duration::from_millis(15));
        scheduler.run_due_timers();
        assert_eq!(*log.borrow(), vec!["early", "early-second", "late"]);
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn test_cancelled_timer_never_runs() {
        let clock = TestClock::default();
        let scheduler = LoopScheduler::new(clock.clone());
        let (log, task) = recorder();

        let id = scheduler.set_timeout(Duration::from_millis(5), task("cancelled"));
        scheduler.cancel(id);
        clock.advance(Duration::from_millis(10));
        assert_eq!(scheduler.run_due_timers(), 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_frame_requested_during_frame_waits() {
        let scheduler = Rc::new(LoopScheduler::new(TestClock::default()));
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_scheduler = scheduler.clone();
        let inner_log = log.clone();
        scheduler.request_animation_frame(Box::new(move || {
            inner_log.borrow_mut().push(1);
            let nested_log = inner_log.clone();
            inner_scheduler.request_animation_frame(Box::new(move || {
                nested_log.borrow_mut().push(2);
            }));
        }));

        scheduler.run_frame();
        assert_eq!(*log.borrow(), vec![1]);
        scheduler.run_frame();
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert_eq!(scheduler.frame_count(), 2);
    }

    #[test]
    fn test_task_slot_rejects_stale_generation() {
        let scheduler = LoopScheduler::new(TestClock::default());
        let mut slot = TaskSlot::default();
        let mut first = 0;
        slot.arm(&scheduler, Wait::Frame, |generation| {
            first = generation;
            Box::new(|| {})
        });
        let mut second = 0;
        slot.arm(&scheduler, Wait::Frame, |generation| {
            second = generation;
            Box::new(|| {})
        });

        assert_eq!(scheduler.pending_frames(), 1);
        assert!(!slot.claim(first));
        assert!(slot.claim(second));
        assert!(!slot.is_live());
    }
}
