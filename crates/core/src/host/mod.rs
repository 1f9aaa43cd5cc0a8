//! Single-threaded cooperative host.
//!
//! Everything the orchestration core does happens inside callbacks driven by
//! an [`EventLoop`]: deferred timers, next-frame callbacks and viewport resize
//! notifications. The loop never holds its internal borrow while a callback
//! runs, so callbacks are free to schedule or cancel further work.

use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
    time::{Duration, Instant},
};

use crate::config::HostConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Where the loop reads the current time from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    /// Virtual time that only moves when the loop runs. Used by tests and
    /// offline rendering.
    Manual,
    /// Monotonic wall clock. The loop sleeps until the next callback is due.
    System,
}

enum TimeSource {
    Manual { now_ms: f64 },
    System { origin: Instant },
}

impl TimeSource {
    fn now_ms(&self) -> f64 {
        match self {
            TimeSource::Manual { now_ms } => *now_ms,
            TimeSource::System { origin } => origin.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

struct Timer {
    id: TimerId,
    due_ms: f64,
    callback: Box<dyn FnOnce()>,
}

struct Frame {
    id: FrameId,
    callback: Box<dyn FnOnce(f64)>,
}

struct LoopState {
    source: TimeSource,
    frame_interval_ms: f64,
    next_id: u64,
    // Insertion order doubles as the tie-break for equal due times.
    timers: Vec<Timer>,
    frames: Vec<Frame>,
    frame_due_ms: Option<f64>,
    listeners: Vec<(ListenerId, Rc<dyn Fn()>)>,
}

impl LoopState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn next_frame_boundary(&self) -> f64 {
        let now = self.source.now_ms();
        ((now / self.frame_interval_ms).floor() + 1.0) * self.frame_interval_ms
    }

    fn earliest_timer(&self) -> Option<(usize, f64)> {
        self.timers
            .iter()
            .enumerate()
            .fold(None, |best, (index, timer)| match best {
                Some((_, due)) if due <= timer.due_ms => best,
                _ => Some((index, timer.due_ms)),
            })
    }
}

enum Due {
    Timer(usize, f64),
    Frames(f64),
}

/// Cloneable handle to the host event loop.
#[derive(Clone)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
}

impl EventLoop {
    pub fn new(mode: TimeMode, config: &HostConfig) -> Self {
        let source = match mode {
            TimeMode::Manual => TimeSource::Manual { now_ms: 0.0 },
            TimeMode::System => TimeSource::System {
                origin: Instant::now(),
            },
        };
        Self {
            state: Rc::new(RefCell::new(LoopState {
                source,
                frame_interval_ms: config.frame_interval_ms,
                next_id: 0,
                timers: Vec::new(),
                frames: Vec::new(),
                frame_due_ms: None,
                listeners: Vec::new(),
            })),
        }
    }

    /// Virtual-time loop with the default frame cadence.
    pub fn manual() -> Self {
        Self::new(TimeMode::Manual, &HostConfig::default())
    }

    /// Milliseconds since the loop was created.
    pub fn now_ms(&self) -> f64 {
        self.state.borrow().source.now_ms()
    }

    pub fn now_seconds(&self) -> f64 {
        self.now_ms() / 1000.0
    }

    pub fn frame_interval_ms(&self) -> f64 {
        self.state.borrow().frame_interval_ms
    }

    pub fn set_timeout(&self, delay_ms: f64, callback: impl FnOnce() + 'static) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = TimerId(state.next_id());
        let due_ms = state.source.now_ms() + delay_ms.max(0.0);
        state.timers.push(Timer {
            id,
            due_ms,
            callback: Box::new(callback),
        });
        id
    }

    /// Returns `false` when the timer already fired or was cleared.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.timers.len();
        state.timers.retain(|timer| timer.id != id);
        state.timers.len() != before
    }

    /// Schedules `callback` for the next frame boundary. The callback receives
    /// the frame timestamp in milliseconds.
    pub fn request_frame(&self, callback: impl FnOnce(f64) + 'static) -> FrameId {
        let mut state = self.state.borrow_mut();
        let id = FrameId(state.next_id());
        if state.frame_due_ms.is_none() {
            state.frame_due_ms = Some(state.next_frame_boundary());
        }
        state.frames.push(Frame {
            id,
            callback: Box::new(callback),
        });
        id
    }

    pub fn cancel_frame(&self, id: FrameId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.frames.len();
        state.frames.retain(|frame| frame.id != id);
        let removed = state.frames.len() != before;
        if state.frames.is_empty() {
            state.frame_due_ms = None;
        }
        removed
    }

    pub fn add_resize_listener(&self, listener: impl Fn() + 'static) -> ListenerId {
        let mut state = self.state.borrow_mut();
        let id = ListenerId(state.next_id());
        state.listeners.push((id, Rc::new(listener)));
        id
    }

    pub fn remove_resize_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.listeners.len();
        state.listeners.retain(|(listener, _)| *listener != id);
        state.listeners.len() != before
    }

    /// Notifies every resize listener synchronously.
    pub fn dispatch_resize(&self) {
        let listeners: Vec<Rc<dyn Fn()>> = self
            .state
            .borrow()
            .listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.state.borrow().frames.len()
    }

    pub fn resize_listeners(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    /// True when no timer, frame or resize listener is registered.
    pub fn is_quiescent(&self) -> bool {
        let state = self.state.borrow();
        state.timers.is_empty() && state.frames.is_empty() && state.listeners.is_empty()
    }

    pub fn run_for(&self, duration_ms: f64) {
        let deadline = self.now_ms() + duration_ms;
        self.run_until(deadline);
    }

    /// Runs every timer and frame due at or before `deadline_ms`, in due
    /// order. Timers win ties against frames.
    pub fn run_until(&self, deadline_ms: f64) {
        while let Some(due) = self.next_due(deadline_ms) {
            match due {
                Due::Timer(index, due_ms) => {
                    self.advance_to(due_ms);
                    let timer = self.state.borrow_mut().timers.remove(index);
                    (timer.callback)();
                }
                Due::Frames(due_ms) => {
                    self.advance_to(due_ms);
                    let frames = {
                        let mut state = self.state.borrow_mut();
                        state.frame_due_ms = None;
                        std::mem::take(&mut state.frames)
                    };
                    let now = self.now_ms();
                    for frame in frames {
                        (frame.callback)(now);
                    }
                }
            }
        }
        self.advance_to(deadline_ms);
    }

    fn next_due(&self, deadline_ms: f64) -> Option<Due> {
        let state = self.state.borrow();
        let timer = state.earliest_timer();
        let frame = state.frame_due_ms.filter(|_| !state.frames.is_empty());
        let due = match (timer, frame) {
            (Some((index, t)), Some(f)) if t <= f => Due::Timer(index, t),
            (Some(_), Some(f)) | (None, Some(f)) => Due::Frames(f),
            (Some((index, t)), None) => Due::Timer(index, t),
            (None, None) => return None,
        };
        let at = match due {
            Due::Timer(_, t) | Due::Frames(t) => t,
        };
        (at <= deadline_ms).then_some(due)
    }

    fn advance_to(&self, target_ms: f64) {
        let wait = match &mut self.state.borrow_mut().source {
            TimeSource::Manual { now_ms } => {
                if target_ms > *now_ms {
                    *now_ms = target_ms;
                }
                None
            }
            TimeSource::System { origin } => {
                let now = origin.elapsed().as_secs_f64() * 1000.0;
                (target_ms > now).then(|| Duration::from_secs_f64((target_ms - now) / 1000.0))
            }
        };
        if let Some(wait) = wait {
            std::thread::sleep(wait);
        }
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventLoop")
            .field("now_ms", &state.source.now_ms())
            .field("timers", &state.timers.len())
            .field("frames", &state.frames.len())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}
