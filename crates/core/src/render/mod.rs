use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    config::RenderConfig,
    host::{EventLoop, FrameId, ListenerId},
    Release,
};

/// Drawable area owned by the render loop.
pub trait Surface {
    /// Logical size of the containing area, before device-pixel scaling.
    fn container_size(&self) -> (f64, f64);
    /// Ratio reported by the host; may be missing (zero or NaN).
    fn device_pixel_ratio(&self) -> f64;
    /// Resizes the backing store to the given pixel dimensions.
    fn set_backing_size(&mut self, size: PixelSize);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f64,
}

impl PixelSize {
    pub const ZERO: PixelSize = PixelSize {
        width: 0,
        height: 0,
        device_pixel_ratio: 1.0,
    };
}

/// Pixel dimensions for a logical size, with the device-pixel ratio capped at
/// `max_ratio`. A missing ratio counts as 1.
pub fn pixel_size(logical: (f64, f64), ratio: f64, max_ratio: f64) -> PixelSize {
    let ratio = if ratio.is_finite() && ratio > 0.0 {
        ratio.min(max_ratio)
    } else {
        1.0
    };
    let scale = |extent: f64| (extent.max(0.0) * ratio).floor() as u32;
    PixelSize {
        width: scale(logical.0),
        height: scale(logical.1),
        device_pixel_ratio: ratio,
    }
}

fn measure<S: Surface>(surface: &mut S, max_ratio: f64) -> PixelSize {
    let size = pixel_size(
        surface.container_size(),
        surface.device_pixel_ratio(),
        max_ratio,
    );
    surface.set_backing_size(size);
    size
}

#[derive(Debug)]
struct LoopControl {
    cancelled: Cell<bool>,
    frame: Cell<Option<FrameId>>,
    listener: Cell<Option<ListenerId>>,
    size: Cell<PixelSize>,
    frames_drawn: Cell<u64>,
    anchor_ms: f64,
}

struct RenderSession<S, F> {
    control: Rc<LoopControl>,
    surface: Rc<RefCell<S>>,
    draw: RefCell<F>,
    max_ratio: f64,
}

/// Drives a draw callback once per host frame with the elapsed time since
/// the loop started.
#[derive(Debug, Clone)]
pub struct RenderLoop {
    host: EventLoop,
    max_device_pixel_ratio: f64,
}

impl RenderLoop {
    pub fn new(host: EventLoop, config: &RenderConfig) -> Self {
        Self {
            host,
            max_device_pixel_ratio: config.max_device_pixel_ratio,
        }
    }

    /// Sizes the surface, installs the resize listener, captures the anchor
    /// time and requests the first frame.
    pub fn start<S, F>(&self, surface: Rc<RefCell<S>>, draw: F) -> RenderHandle
    where
        S: Surface + 'static,
        F: FnMut(&mut S, u32, u32, f64) + 'static,
    {
        let size = measure(&mut *surface.borrow_mut(), self.max_device_pixel_ratio);
        let control = Rc::new(LoopControl {
            cancelled: Cell::new(false),
            frame: Cell::new(None),
            listener: Cell::new(None),
            size: Cell::new(size),
            frames_drawn: Cell::new(0),
            anchor_ms: self.host.now_ms(),
        });
        let session = Rc::new(RenderSession {
            control: control.clone(),
            surface,
            draw: RefCell::new(draw),
            max_ratio: self.max_device_pixel_ratio,
        });

        let on_resize = session.clone();
        let listener = self.host.add_resize_listener(move || {
            if on_resize.control.cancelled.get() {
                return;
            }
            let size = measure(
                &mut *on_resize.surface.borrow_mut(),
                on_resize.max_ratio,
            );
            tracing::debug!(width = size.width, height = size.height, "surface resized");
            on_resize.control.size.set(size);
        });
        control.listener.set(Some(listener));

        request_tick(&self.host, session);
        tracing::info!(width = size.width, height = size.height, "render loop started");

        RenderHandle {
            host: self.host.clone(),
            control,
        }
    }
}

fn request_tick<S, F>(host: &EventLoop, session: Rc<RenderSession<S, F>>)
where
    S: Surface + 'static,
    F: FnMut(&mut S, u32, u32, f64) + 'static,
{
    let control = session.control.clone();
    let next_host = host.clone();
    let id = host.request_frame(move |now_ms| {
        let control = &session.control;
        if control.cancelled.get() {
            return;
        }
        let size = control.size.get();
        let elapsed = (now_ms - control.anchor_ms) / 1000.0;
        {
            let mut surface = session.surface.borrow_mut();
            (session.draw.borrow_mut())(&mut *surface, size.width, size.height, elapsed);
        }
        control.frames_drawn.set(control.frames_drawn.get() + 1);
        // The draw callback may have cancelled the loop.
        if control.cancelled.get() {
            return;
        }
        request_tick(&next_host, session);
    });
    control.frame.set(Some(id));
}

/// Stops a render loop: cancels the pending frame and removes the resize
/// listener. Dropping the handle does the same.
#[derive(Debug)]
pub struct RenderHandle {
    host: EventLoop,
    control: Rc<LoopControl>,
}

impl RenderHandle {
    pub fn cancel(&self) -> Release {
        if self.control.cancelled.replace(true) {
            return Release::AlreadyReleased;
        }
        if let Some(frame) = self.control.frame.take() {
            self.host.cancel_frame(frame);
        }
        if let Some(listener) = self.control.listener.take() {
            self.host.remove_resize_listener(listener);
        }
        tracing::info!(frames = self.control.frames_drawn.get(), "render loop cancelled");
        Release::Released
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.cancelled.get()
    }

    pub fn size(&self) -> PixelSize {
        self.control.size.get()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.control.frames_drawn.get()
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Surface with a fixed container, for hosts without a real window. It keeps
/// only the backing size it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessSurface {
    pub container: (f64, f64),
    pub device_pixel_ratio: f64,
    pub backing: PixelSize,
}

impl HeadlessSurface {
    pub fn new(width: f64, height: f64, device_pixel_ratio: f64) -> Self {
        Self {
            container: (width, height),
            device_pixel_ratio,
            backing: PixelSize::ZERO,
        }
    }
}

impl Surface for HeadlessSurface {
    fn container_size(&self) -> (f64, f64) {
        self.container
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    fn set_backing_size(&mut self, size: PixelSize) {
        self.backing = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::host::TimeMode;

    type Draws = Rc<RefCell<Vec<(u32, u32, f64)>>>;

    fn host() -> EventLoop {
        EventLoop::new(
            TimeMode::Manual,
            &HostConfig {
                frame_interval_ms: 10.0,
            },
        )
    }

    fn start(host: &EventLoop, surface: Rc<RefCell<HeadlessSurface>>) -> (RenderHandle, Draws) {
        let draws: Draws = Rc::new(RefCell::new(Vec::new()));
        let sink = draws.clone();
        let handle = RenderLoop::new(host.clone(), &RenderConfig::default()).start(
            surface,
            move |surface: &mut HeadlessSurface, width, height, elapsed| {
                assert_eq!((surface.backing.width, surface.backing.height), (width, height));
                sink.borrow_mut().push((width, height, elapsed));
            },
        );
        (handle, draws)
    }

    #[test]
    fn device_pixel_ratio_is_capped() {
        assert_eq!(pixel_size((100.5, 50.0), 3.0, 2.0).width, 201);
        assert_eq!(pixel_size((100.0, 50.0), 1.5, 2.0).height, 75);
        assert_eq!(pixel_size((100.0, 50.0), f64::NAN, 2.0).device_pixel_ratio, 1.0);
        assert_eq!(pixel_size((100.0, 50.0), 0.0, 2.0).width, 100);
    }

    #[test]
    fn draws_with_elapsed_time_since_anchor() {
        let host = host();
        host.run_until(5.0);
        let surface = Rc::new(RefCell::new(HeadlessSurface::new(200.0, 100.0, 2.0)));
        let (handle, draws) = start(&host, surface);

        host.run_until(35.0);

        let draws = draws.borrow();
        assert_eq!(draws.len(), 3);
        assert_eq!(draws[0], (400, 200, 0.005));
        assert!((draws[2].2 - 0.025).abs() < 1e-12);
        assert_eq!(handle.frames_drawn(), 3);
    }

    #[test]
    fn resize_is_observed_by_the_next_draw() {
        let host = host();
        let surface = Rc::new(RefCell::new(HeadlessSurface::new(200.0, 100.0, 1.0)));
        let (handle, draws) = start(&host, surface.clone());
        host.run_until(10.0);

        surface.borrow_mut().container = (320.0, 180.0);
        host.dispatch_resize();
        assert_eq!(handle.size().width, 320);
        host.run_until(20.0);

        let draws = draws.borrow();
        assert_eq!(draws.last().map(|d| (d.0, d.1)), Some((320, 180)));
    }

    #[test]
    fn cancel_removes_frame_and_listener() {
        let host = host();
        let surface = Rc::new(RefCell::new(HeadlessSurface::new(10.0, 10.0, 1.0)));
        let (handle, draws) = start(&host, surface);
        host.run_until(30.0);

        assert_eq!(handle.cancel(), Release::Released);
        assert_eq!(handle.cancel(), Release::AlreadyReleased);
        assert!(host.is_quiescent());

        host.run_until(100.0);
        assert_eq!(draws.borrow().len(), 3);
    }

    #[test]
    fn cancelling_from_inside_draw_leaves_no_frame() {
        let host = host();
        let surface = Rc::new(RefCell::new(HeadlessSurface::new(10.0, 10.0, 1.0)));
        let slot: Rc<RefCell<Option<RenderHandle>>> = Rc::new(RefCell::new(None));
        let own = slot.clone();
        let handle = RenderLoop::new(host.clone(), &RenderConfig::default()).start(
            surface,
            move |_: &mut HeadlessSurface, _, _, _| {
                if let Some(handle) = own.borrow().as_ref() {
                    handle.cancel();
                }
            },
        );
        *slot.borrow_mut() = Some(handle);

        host.run_for(20.0);

        let handle = slot.borrow_mut().take().unwrap();
        assert!(handle.is_cancelled());
        assert_eq!(handle.frames_drawn(), 1);
        assert_eq!(host.pending_frames(), 0);
        assert!(host.is_quiescent());
    }

    #[test]
    fn dropping_the_handle_cancels() {
        let host = host();
        let surface = Rc::new(RefCell::new(HeadlessSurface::new(10.0, 10.0, 1.0)));
        let (handle, _draws) = start(&host, surface);
        drop(handle);
        assert!(host.is_quiescent());
    }
}
