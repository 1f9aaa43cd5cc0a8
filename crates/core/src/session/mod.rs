//! Top-level lifecycle of one viewing session.
//!
//! The controller is the only owner of the audio session, the narration
//! handle and the render handle, so there is never more than one of each
//! alive. Every transition is synchronous.

use std::{cell::RefCell, rc::Rc};

use crate::{
    audio::{AudioCapability, AudioSession, GenerativeEngine},
    config::AppConfig,
    host::EventLoop,
    narration::{NarrationHandle, Narrator, Script},
    render::{RenderHandle, RenderLoop, Surface},
    speech::{SpeechBackend, Speaker},
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running { muted: bool },
}

type DrawFn<S> = Rc<RefCell<dyn FnMut(&mut S, u32, u32, f64)>>;
type CaptionObserver = Rc<dyn Fn(&str)>;

/// Host capabilities handed to the controller once.
pub struct SessionHost<S> {
    pub event_loop: EventLoop,
    pub audio: AudioCapability,
    pub speech: Option<Rc<dyn SpeechBackend>>,
    pub surface: Rc<RefCell<S>>,
}

pub struct SessionController<S: Surface + 'static> {
    host: EventLoop,
    volume: f32,
    engine: GenerativeEngine,
    narrator: Narrator,
    render_loop: RenderLoop,
    surface: Rc<RefCell<S>>,
    draw: DrawFn<S>,
    script: Script,
    caption: Rc<RefCell<String>>,
    caption_observer: Option<CaptionObserver>,
    state: SessionState,
    start_muted: bool,
    audio: Option<AudioSession>,
    narration: Option<NarrationHandle>,
    render: Option<RenderHandle>,
}

impl<S: Surface + 'static> SessionController<S> {
    /// Wires the subsystems together without starting any of them. Fails
    /// when the configuration or the script is invalid.
    pub fn new<F>(host: SessionHost<S>, config: &AppConfig, script: Script, draw: F) -> Result<Self>
    where
        F: FnMut(&mut S, u32, u32, f64) + 'static,
    {
        config.validate()?;
        script.validate()?;

        let speaker = Speaker::new(host.speech, &config.narration);
        let draw: DrawFn<S> = Rc::new(RefCell::new(draw));
        Ok(Self {
            engine: GenerativeEngine::new(host.event_loop.clone(), host.audio, &config.audio),
            narrator: Narrator::new(host.event_loop.clone(), speaker),
            render_loop: RenderLoop::new(host.event_loop.clone(), &config.render),
            host: host.event_loop,
            volume: config.audio.volume,
            surface: host.surface,
            draw,
            script,
            caption: Rc::new(RefCell::new(String::new())),
            caption_observer: None,
            state: SessionState::Idle,
            start_muted: false,
            audio: None,
            narration: None,
            render: None,
        })
    }

    /// Called with every caption change, including the final clear.
    pub fn on_caption(&mut self, observer: impl Fn(&str) + 'static) {
        self.caption_observer = Some(Rc::new(observer));
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether sound is (or will be, once started) suppressed.
    pub fn is_muted(&self) -> bool {
        match self.state {
            SessionState::Running { muted } => muted,
            _ => self.start_muted,
        }
    }

    pub fn caption(&self) -> String {
        self.caption.borrow().clone()
    }

    pub fn host(&self) -> &EventLoop {
        &self.host
    }

    pub fn engine(&self) -> &GenerativeEngine {
        &self.engine
    }

    pub fn audio_session(&self) -> Option<&AudioSession> {
        self.audio.as_ref()
    }

    pub fn narration(&self) -> Option<&NarrationHandle> {
        self.narration.as_ref()
    }

    pub fn render_handle(&self) -> Option<&RenderHandle> {
        self.render.as_ref()
    }

    pub fn surface(&self) -> &Rc<RefCell<S>> {
        &self.surface
    }

    /// Launches audio (unless muted), narration and the render loop. A
    /// missing audio capability is logged and otherwise ignored. Does nothing
    /// unless the controller is idle.
    pub fn start(&mut self) {
        if self.state != SessionState::Idle {
            tracing::debug!(state = ?self.state, "start ignored, session already active");
            return;
        }
        self.state = SessionState::Starting;
        let muted = self.start_muted;

        if !muted {
            self.start_audio();
        }
        self.start_narration();

        let draw = self.draw.clone();
        self.render = Some(self.render_loop.start(
            self.surface.clone(),
            move |surface: &mut S, width, height, elapsed| {
                (*draw.borrow_mut())(surface, width, height, elapsed)
            },
        ));

        self.state = SessionState::Running { muted };
        tracing::info!(muted, "session started");
    }

    /// Stops the current audio session; narration and animation carry on.
    /// Before start this only records the preference.
    pub fn mute(&mut self) {
        match self.state {
            SessionState::Running { muted: false } => {
                if let Some(audio) = self.audio.take() {
                    audio.stop();
                }
                self.state = SessionState::Running { muted: true };
                tracing::info!("session muted");
            }
            SessionState::Running { muted: true } => {}
            SessionState::Idle | SessionState::Starting => self.start_muted = true,
        }
    }

    /// Starts a fresh audio session. Before start this only records the
    /// preference.
    pub fn unmute(&mut self) {
        match self.state {
            SessionState::Running { muted: true } => {
                self.start_audio();
                self.state = SessionState::Running { muted: false };
                tracing::info!("session unmuted");
            }
            SessionState::Running { muted: false } => {}
            SessionState::Idle | SessionState::Starting => self.start_muted = false,
        }
    }

    pub fn toggle_mute(&mut self) {
        if self.is_muted() {
            self.unmute();
        } else {
            self.mute();
        }
    }

    /// Cancels the render loop, then narration, then audio. Each step runs
    /// whether or not the previous ones had anything to release.
    pub fn teardown(&mut self) {
        if let Some(render) = self.render.take() {
            render.cancel();
        }
        if let Some(narration) = self.narration.take() {
            narration.cancel();
        }
        if let Some(audio) = self.audio.take() {
            audio.stop();
        }
        self.caption.borrow_mut().clear();
        if self.state != SessionState::Idle {
            tracing::info!("session torn down");
        }
        // A restart keeps the mute preference of the session it replaces.
        self.start_muted = self.is_muted();
        self.state = SessionState::Idle;
    }

    fn start_audio(&mut self) {
        if let Some(previous) = self.audio.take() {
            previous.stop();
        }
        match self.engine.start(self.volume) {
            Ok(session) => self.audio = Some(session),
            Err(err) => tracing::warn!(%err, "continuing without sound"),
        }
    }

    fn start_narration(&mut self) {
        self.caption.borrow_mut().clear();
        let caption = self.caption.clone();
        let observer = self.caption_observer.clone();
        let started = self.narrator.start(self.script.events(), move |text| {
            *caption.borrow_mut() = text.to_string();
            if let Some(observer) = &observer {
                observer(text);
            }
        });
        match started {
            Ok(handle) => self.narration = Some(handle),
            Err(err) => tracing::warn!(%err, "narration could not be scheduled"),
        }
    }
}

impl<S: Surface + 'static> Drop for SessionController<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<S: Surface + 'static> std::fmt::Debug for SessionController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state)
            .field("audio", &self.audio)
            .field("narration", &self.narration)
            .field("render", &self.render)
            .finish()
    }
}
