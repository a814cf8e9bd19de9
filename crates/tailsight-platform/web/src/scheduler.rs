use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tailsight_core::collections::map::HashMap;
use tailsight_core::{HostError, Scheduler, Task, TaskId};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Performance, Window};

/// Delay used for frame callbacks when `requestAnimationFrame` is missing.
const FRAME_FALLBACK: Duration = Duration::from_millis(16);

struct Pending {
    handle: i32,
    frame: bool,
    task: Rc<RefCell<Option<Task>>>,
}

/// [`Scheduler`] over `setTimeout`, `requestAnimationFrame` and
/// `performance.now()`.
pub struct WebScheduler {
    window: Window,
    performance: Option<Performance>,
    animation_frame: bool,
    pending: Rc<RefCell<HashMap<u64, Pending>>>,
    next_id: Cell<u64>,
}

impl WebScheduler {
    pub fn new(animation_frame: bool) -> Result<Self, HostError> {
        let window = web_sys::window().ok_or(HostError::Unsupported("window"))?;
        let performance = window.performance();
        Ok(Self {
            window,
            performance,
            animation_frame,
            pending: Rc::new(RefCell::new(HashMap::default())),
            next_id: Cell::new(0),
        })
    }

    /// Tasks scheduled and neither run nor cancelled yet.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    fn schedule(&self, frame: bool, delay: Duration, task: Task) -> TaskId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);

        let slot = Rc::new(RefCell::new(Some(task)));
        let run_slot = slot.clone();
        let pending = Rc::downgrade(&self.pending);
        let run = Closure::once_into_js(move || {
            if let Some(pending) = pending.upgrade() {
                pending.borrow_mut().remove(&id);
            }
            let task = run_slot.borrow_mut().take();
            if let Some(task) = task {
                task();
            }
        });

        let frame = frame && self.animation_frame;
        let handle = if frame {
            self.window.request_animation_frame(run.unchecked_ref())
        } else {
            let millis = delay.as_millis().min(i32::MAX as u128) as i32;
            self.window
                .set_timeout_with_callback_and_timeout_and_arguments_0(run.unchecked_ref(), millis)
        };
        match handle {
            Ok(handle) => {
                self.pending.borrow_mut().insert(
                    id,
                    Pending {
                        handle,
                        frame,
                        task: slot,
                    },
                );
            }
            Err(err) => log::warn!("task {id} could not be scheduled: {err:?}"),
        }
        TaskId(id)
    }
}

impl Scheduler for WebScheduler {
    fn now(&self) -> Duration {
        let millis = self
            .performance
            .as_ref()
            .map_or_else(js_sys::Date::now, Performance::now);
        Duration::from_secs_f64(millis.max(0.0) / 1000.0)
    }

    fn set_timeout(&self, delay: Duration, task: Task) -> TaskId {
        self.schedule(false, delay, task)
    }

    fn request_animation_frame(&self, task: Task) -> TaskId {
        self.schedule(true, FRAME_FALLBACK, task)
    }

    fn cancel(&self, id: TaskId) {
        let Some(pending) = self.pending.borrow_mut().remove(&id.0) else {
            return;
        };
        // The JS side keeps a shim alive until the browser forgets it; the
        // task itself goes now.
        pending.task.borrow_mut().take();
        if pending.frame {
            if let Err(err) = self.window.cancel_animation_frame(pending.handle) {
                log::trace!("cancelAnimationFrame failed: {err:?}");
            }
        } else {
            self.window.clear_timeout_with_handle(pending.handle);
        }
    }
}
