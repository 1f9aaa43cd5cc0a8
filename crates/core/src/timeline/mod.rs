use std::{cell::RefCell, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::{
    host::{EventLoop, TimerId},
    LamplightError, Release, Result,
};

/// A payload delivered `offset_seconds` after the schedule call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent<T> {
    pub offset_seconds: f64,
    pub payload: T,
}

impl<T> TimedEvent<T> {
    pub fn new(offset_seconds: f64, payload: T) -> Self {
        Self {
            offset_seconds,
            payload,
        }
    }
}

#[derive(Debug, Default)]
struct HandleState {
    cancelled: bool,
    pending: Vec<TimerId>,
}

/// Cancellation token for one call to [`Scheduler::schedule`].
///
/// The `cancelled` flag is consulted again when each timer fires, so a
/// callback that the host already dequeued still stays silent after
/// [`ScheduleHandle::cancel`].
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    host: EventLoop,
    state: Rc<RefCell<HandleState>>,
}

impl ScheduleHandle {
    pub fn cancel(&self) -> Release {
        let pending = {
            let mut state = self.state.borrow_mut();
            if state.cancelled {
                return Release::AlreadyReleased;
            }
            state.cancelled = true;
            std::mem::take(&mut state.pending)
        };
        for id in pending {
            self.host.clear_timeout(id);
        }
        Release::Released
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().cancelled
    }

    /// Number of events that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        self.state.borrow().pending.len()
    }
}

/// Arms deferred callbacks for a list of [`TimedEvent`]s, all anchored to the
/// moment of the call.
#[derive(Debug, Clone)]
pub struct Scheduler {
    host: EventLoop,
}

impl Scheduler {
    pub fn new(host: EventLoop) -> Self {
        Self { host }
    }

    /// Validates every offset before arming anything, so a rejected script
    /// leaves no timers behind.
    pub fn schedule<T, F>(&self, events: Vec<TimedEvent<T>>, on_fire: F) -> Result<ScheduleHandle>
    where
        T: 'static,
        F: FnMut(T) + 'static,
    {
        if let Some(bad) = events
            .iter()
            .find(|event| !(event.offset_seconds.is_finite() && event.offset_seconds >= 0.0))
        {
            return Err(LamplightError::InvalidEvent {
                offset_seconds: bad.offset_seconds,
            });
        }

        let state = Rc::new(RefCell::new(HandleState::default()));
        let on_fire = Rc::new(RefCell::new(on_fire));

        for event in events {
            let fire_state = state.clone();
            let on_fire = on_fire.clone();
            // The id is only known after arming, so the callback looks itself
            // up through a shared slot.
            let slot: Rc<RefCell<Option<TimerId>>> = Rc::new(RefCell::new(None));
            let own_id = slot.clone();
            let payload = event.payload;

            let id = self.host.set_timeout(event.offset_seconds * 1000.0, move || {
                {
                    let mut state = fire_state.borrow_mut();
                    if state.cancelled {
                        return;
                    }
                    if let Some(id) = *own_id.borrow() {
                        state.pending.retain(|pending| *pending != id);
                    }
                }
                (on_fire.borrow_mut())(payload);
            });
            *slot.borrow_mut() = Some(id);
            state.borrow_mut().pending.push(id);
        }

        tracing::debug!(events = state.borrow().pending.len(), "armed timed events");
        Ok(ScheduleHandle {
            host: self.host.clone(),
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<(f64, u32)>>>, EventLoop) {
        (Rc::new(RefCell::new(Vec::new())), EventLoop::manual())
    }

    #[test]
    fn fires_each_event_once_at_its_offset() {
        let (log, host) = recorder();
        let scheduler = Scheduler::new(host.clone());
        let sink = log.clone();
        let clock = host.clone();
        let handle = scheduler
            .schedule(
                vec![
                    TimedEvent::new(1.5, 2),
                    TimedEvent::new(0.5, 1),
                    TimedEvent::new(1.5, 3),
                ],
                move |payload| sink.borrow_mut().push((clock.now_ms(), payload)),
            )
            .unwrap();

        host.run_for(5_000.0);

        let log = log.borrow();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0], (500.0, 1));
        let mut tied: Vec<_> = log[1..].iter().map(|(_, p)| *p).collect();
        tied.sort_unstable();
        assert_eq!(tied, vec![2, 3]);
        assert!(log[1..].iter().all(|(at, _)| *at == 1_500.0));
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn cancel_suppresses_the_remainder() {
        let (log, host) = recorder();
        let sink = log.clone();
        let handle = Scheduler::new(host.clone())
            .schedule(
                vec![TimedEvent::new(0.1, 1), TimedEvent::new(2.0, 2)],
                move |payload| sink.borrow_mut().push((0.0, payload)),
            )
            .unwrap();

        host.run_for(500.0);
        assert_eq!(handle.cancel(), Release::Released);
        assert_eq!(handle.cancel(), Release::AlreadyReleased);
        host.run_for(5_000.0);

        assert_eq!(log.borrow().len(), 1);
        assert_eq!(host.pending_timers(), 0);
    }

    #[test]
    fn cancel_wins_over_an_armed_timer_at_fire_time() {
        let host = EventLoop::manual();
        let scheduler = Scheduler::new(host.clone());
        let fired = Rc::new(Cell::new(0));

        // The first event cancels the handle; the second shares its offset
        // and was already armed before the cancel happened.
        let handle_slot: Rc<RefCell<Option<ScheduleHandle>>> = Rc::new(RefCell::new(None));
        let slot = handle_slot.clone();
        let counter = fired.clone();
        let handle = scheduler
            .schedule(
                vec![TimedEvent::new(1.0, true), TimedEvent::new(1.0, false)],
                move |cancel| {
                    counter.set(counter.get() + 1);
                    if cancel {
                        if let Some(handle) = slot.borrow().as_ref() {
                            handle.cancel();
                        }
                    }
                },
            )
            .unwrap();
        *handle_slot.borrow_mut() = Some(handle.clone());

        host.run_for(2_000.0);
        assert_eq!(fired.get(), 1);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn rejects_negative_offsets_without_arming() {
        let host = EventLoop::manual();
        let err = Scheduler::new(host.clone())
            .schedule(
                vec![TimedEvent::new(1.0, ()), TimedEvent::new(-0.25, ())],
                |_| {},
            )
            .unwrap_err();

        assert!(matches!(
            err,
            LamplightError::InvalidEvent { offset_seconds } if offset_seconds == -0.25
        ));
        assert_eq!(host.pending_timers(), 0);
    }

    #[test]
    fn empty_schedule_is_valid() {
        let host = EventLoop::manual();
        let handle = Scheduler::new(host)
            .schedule(Vec::<TimedEvent<()>>::new(), |_| {})
            .unwrap();
        assert_eq!(handle.pending(), 0);
        assert_eq!(handle.cancel(), Release::Released);
    }
}
