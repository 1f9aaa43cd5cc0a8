//! Generative ambient music bed.
//!
//! [`GenerativeEngine::start`] builds a fresh [`AudioSession`]: an audio
//! context, a master gain, four detuned pad voices with feedback delay and a
//! swell generator that re-randomizes its level on a fixed period. Sessions
//! are one-shot: [`AudioSession::stop`] releases everything and a new
//! session has to be started to make sound again.

pub mod dsp;
pub mod pad;
pub mod swell;

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    config::AudioConfig,
    host::{EventLoop, TimerId},
    Capability, LamplightError, Release, Result,
};
use pad::{PadSnapshot, PadVoice, PAD_CHORD};
use swell::{SwellGenerator, SWELL_TARGET_RANGE};

/// Samples between two evaluations of automation and filter cutoffs.
const CONTROL_BLOCK: usize = 32;

/// Whether the host can produce audio at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCapability {
    Available { sample_rate: u32 },
    Unavailable,
}

/// Clock and render cursor of one session. The clock follows the host event
/// loop, so parameter automation and scheduled callbacks share a time base.
#[derive(Debug)]
pub struct AudioContext {
    host: EventLoop,
    sample_rate: u32,
    origin_ms: f64,
    rendered_frames: u64,
    closed: bool,
}

impl AudioContext {
    fn open(host: &EventLoop, sample_rate: u32) -> Self {
        Self {
            host: host.clone(),
            sample_rate,
            origin_ms: host.now_ms(),
            rendered_frames: 0,
            closed: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds since the context was opened.
    pub fn current_time(&self) -> f64 {
        (self.host.now_ms() - self.origin_ms) / 1000.0
    }

    /// Context time of the next sample to be rendered.
    pub fn render_time(&self) -> f64 {
        self.rendered_frames as f64 / self.sample_rate as f64
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) -> Release {
        if self.closed {
            return Release::AlreadyReleased;
        }
        self.closed = true;
        Release::Released
    }
}

struct SessionGraph {
    context: AudioContext,
    master: f32,
    voices: Vec<PadVoice>,
    swell: SwellGenerator,
    rng: StdRng,
    running: bool,
    swell_timer: Option<TimerId>,
    live: Rc<Cell<usize>>,
}

impl SessionGraph {
    fn render(&mut self, out: &mut [f32]) {
        if self.context.closed {
            out.fill(0.0);
            return;
        }
        let sample_rate = self.context.sample_rate as f64;
        for block in out.chunks_mut(CONTROL_BLOCK) {
            let time = self.context.render_time();
            for voice in &mut self.voices {
                voice.update_controls(time, sample_rate);
            }
            self.swell.update_controls(time);

            for sample in block.iter_mut() {
                let pad: f32 = self
                    .voices
                    .iter_mut()
                    .map(|voice| voice.process(sample_rate))
                    .sum();
                *sample = (pad + self.swell.process(sample_rate)) * self.master;
            }
            self.context.rendered_frames += block.len() as u64;
        }
    }
}

/// A running (or stopped) instance of the music bed.
///
/// Dropping a session stops it.
pub struct AudioSession {
    id: u64,
    host: EventLoop,
    graph: Rc<RefCell<SessionGraph>>,
}

impl AudioSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.graph.borrow().running
    }

    pub fn sample_rate(&self) -> u32 {
        self.graph.borrow().context.sample_rate
    }

    pub fn volume(&self) -> f32 {
        self.graph.borrow().master
    }

    pub fn current_time(&self) -> f64 {
        self.graph.borrow().context.current_time()
    }

    pub fn voice_count(&self) -> usize {
        self.graph.borrow().voices.len()
    }

    pub fn voices(&self) -> Vec<PadSnapshot> {
        let graph = self.graph.borrow();
        let now = graph.context.current_time();
        graph.voices.iter().map(|voice| voice.snapshot(now)).collect()
    }

    pub fn swells(&self) -> usize {
        self.graph.borrow().swell.swells()
    }

    pub fn swell_level(&self) -> f32 {
        let graph = self.graph.borrow();
        graph.swell.level_at(graph.context.current_time())
    }

    /// Frames between the render cursor and the context clock.
    pub fn frames_behind(&self) -> usize {
        let graph = self.graph.borrow();
        let due = (graph.context.current_time() * graph.context.sample_rate as f64).floor() as u64;
        due.saturating_sub(graph.context.rendered_frames) as usize
    }

    /// Renders mono samples into `out`. A stopped session renders silence.
    pub fn render(&self, out: &mut [f32]) {
        self.graph.borrow_mut().render(out);
    }

    /// Halts every oscillator, cancels the pending swell and releases the
    /// context. Only the first call does anything.
    pub fn stop(&self) -> Release {
        let mut graph = self.graph.borrow_mut();
        if !graph.running {
            return Release::AlreadyReleased;
        }
        graph.running = false;
        if let Some(timer) = graph.swell_timer.take() {
            self.host.clear_timeout(timer);
        }
        for voice in &mut graph.voices {
            voice.stop();
        }
        graph.swell.stop();
        graph.context.close();
        graph.live.set(graph.live.get().saturating_sub(1));
        tracing::info!(session = self.id, "audio session stopped");
        Release::Released
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AudioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let graph = self.graph.borrow();
        f.debug_struct("AudioSession")
            .field("id", &self.id)
            .field("running", &graph.running)
            .field("voices", &graph.voices.len())
            .field("master", &graph.master)
            .finish()
    }
}

fn schedule_swell(graph: &Rc<RefCell<SessionGraph>>, host: &EventLoop, period_ms: f64) {
    {
        let mut graph = graph.borrow_mut();
        if !graph.running {
            return;
        }
        let now = graph.context.current_time();
        let target = graph.rng.gen_range(SWELL_TARGET_RANGE);
        graph.swell.swell(now, target);
        tracing::debug!(now, target, "swell scheduled");
    }

    // The next swell is armed on the fixed period, even though each swell
    // lasts longer than that; the newer one takes over from the current level.
    let weak: Weak<RefCell<SessionGraph>> = Rc::downgrade(graph);
    let next_host = host.clone();
    let timer = host.set_timeout(period_ms, move || {
        if let Some(graph) = weak.upgrade() {
            schedule_swell(&graph, &next_host, period_ms);
        }
    });
    graph.borrow_mut().swell_timer = Some(timer);
}

/// Factory for audio sessions. Owns the randomness source so every session
/// draws fresh but reproducible parameters when seeded.
pub struct GenerativeEngine {
    host: EventLoop,
    capability: AudioCapability,
    rng: StdRng,
    swell_period_ms: f64,
    next_id: u64,
    live: Rc<Cell<usize>>,
    peak_live: usize,
}

impl GenerativeEngine {
    pub fn new(host: EventLoop, capability: AudioCapability, config: &AudioConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            host,
            capability,
            rng,
            swell_period_ms: config.swell_period_seconds * 1000.0,
            next_id: 0,
            live: Rc::new(Cell::new(0)),
            peak_live: 0,
        }
    }

    pub fn capability(&self) -> AudioCapability {
        self.capability
    }

    /// Sessions started and not yet stopped.
    pub fn live_sessions(&self) -> usize {
        self.live.get()
    }

    /// Highest number of simultaneously live sessions seen so far.
    pub fn peak_live_sessions(&self) -> usize {
        self.peak_live
    }

    pub fn sessions_started(&self) -> u64 {
        self.next_id
    }

    /// Builds a new session with the master bus at `volume` (clamped to
    /// `[0, 1]`). Fails with [`LamplightError::CapabilityUnavailable`] when
    /// the host has no audio.
    pub fn start(&mut self, volume: f32) -> Result<AudioSession> {
        let AudioCapability::Available { sample_rate } = self.capability else {
            return Err(LamplightError::CapabilityUnavailable(Capability::Audio));
        };

        let context = AudioContext::open(&self.host, sample_rate);
        let now = context.current_time();
        let mut rng = StdRng::seed_from_u64(self.rng.gen());
        let voices = PAD_CHORD
            .iter()
            .map(|pitch| PadVoice::start(*pitch, &mut rng, sample_rate as f64, now))
            .collect();

        self.next_id += 1;
        let id = self.next_id;
        self.live.set(self.live.get() + 1);
        self.peak_live = self.peak_live.max(self.live.get());

        let graph = Rc::new(RefCell::new(SessionGraph {
            context,
            master: volume.clamp(0.0, 1.0),
            voices,
            swell: SwellGenerator::start(),
            rng,
            running: true,
            swell_timer: None,
            live: self.live.clone(),
        }));
        schedule_swell(&graph, &self.host, self.swell_period_ms);

        tracing::info!(session = id, sample_rate, volume, "audio session started");
        Ok(AudioSession {
            id,
            host: self.host.clone(),
            graph,
        })
    }
}

impl std::fmt::Debug for GenerativeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeEngine")
            .field("capability", &self.capability)
            .field("swell_period_ms", &self.swell_period_ms)
            .field("sessions_started", &self.next_id)
            .field("live", &self.live.get())
            .finish()
    }
}
