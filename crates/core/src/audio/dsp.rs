//! Signal-level building blocks of the pad graph: automatable parameters,
//! oscillators, a lowpass filter and a feedback delay line.

use std::f64::consts::TAU;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

use crate::Release;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Automation {
    SetValue { time: f64, value: f32 },
    LinearRamp { time: f64, value: f32 },
    SetTarget { time: f64, target: f32, time_constant: f64 },
}

impl Automation {
    fn time(&self) -> f64 {
        match *self {
            Automation::SetValue { time, .. }
            | Automation::LinearRamp { time, .. }
            | Automation::SetTarget { time, .. } => time,
        }
    }
}

/// A value with a timeline of scheduled changes, evaluated against the audio
/// context clock.
#[derive(Debug, Clone)]
pub struct Param {
    initial: f32,
    events: Vec<Automation>,
}

impl Param {
    pub fn new(initial: f32) -> Self {
        Self {
            initial,
            events: Vec::new(),
        }
    }

    fn insert(&mut self, event: Automation) {
        let at = self
            .events
            .iter()
            .position(|existing| existing.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(at, event);
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Automation::SetValue { time, value });
    }

    /// Ramps linearly from the previous event's value to `value`, arriving at
    /// `time`.
    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Automation::LinearRamp { time, value });
    }

    /// Approaches `target` exponentially from `start` on, with the given time
    /// constant in seconds.
    pub fn set_target_at_time(&mut self, target: f32, start: f64, time_constant: f64) {
        self.insert(Automation::SetTarget {
            time: start,
            target,
            time_constant: time_constant.max(f64::EPSILON),
        });
    }

    /// Holds the value the parameter has at `time` and drops every scheduled
    /// event, so later ramps start from where the sound is. History before
    /// `time` collapses into the held value, which keeps the timeline short
    /// for parameters that are rescheduled forever.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        let held = self.value_at(time);
        self.initial = held;
        self.events.clear();
        self.events.push(Automation::SetValue { time, value: held });
    }

    /// Number of scheduled events.
    pub fn scheduled(&self) -> usize {
        self.events.len()
    }

    pub fn value_at(&self, t: f64) -> f32 {
        let mut value = self.initial;
        let mut since = 0.0_f64;

        for (index, event) in self.events.iter().enumerate() {
            match *event {
                Automation::SetValue { time, value: next } => {
                    if time > t {
                        return value;
                    }
                    value = next;
                    since = time;
                }
                Automation::LinearRamp { time, value: next } => {
                    if time > t {
                        let span = time - since;
                        if span <= 0.0 {
                            return value;
                        }
                        let progress = ((t - since) / span).clamp(0.0, 1.0) as f32;
                        return value + (next - value) * progress;
                    }
                    value = next;
                    since = time;
                }
                Automation::SetTarget {
                    time,
                    target,
                    time_constant,
                } => {
                    if time > t {
                        return value;
                    }
                    let until = self
                        .events
                        .get(index + 1)
                        .map(Automation::time)
                        .filter(|next| *next <= t)
                        .unwrap_or(t);
                    let decay = (-(until - time) / time_constant).exp() as f32;
                    value = target + (value - target) * decay;
                    since = until;
                }
            }
        }

        value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    frequency: f64,
    detune_cents: f64,
    phase: f64,
    state: NodeState,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f64) -> Self {
        Self {
            waveform,
            frequency,
            detune_cents: 0.0,
            phase: 0.0,
            state: NodeState::Idle,
        }
    }

    pub fn with_detune(mut self, cents: f64) -> Self {
        self.detune_cents = cents;
        self
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn detune_cents(&self) -> f64 {
        self.detune_cents
    }

    /// Frequency after detune is applied.
    pub fn effective_frequency(&self) -> f64 {
        self.frequency * (self.detune_cents / 1200.0).exp2()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Starting a stopped oscillator is ignored; nodes are one-shot.
    pub fn start(&mut self) {
        if self.state == NodeState::Idle {
            self.state = NodeState::Running;
        }
    }

    /// Stops the oscillator for good. A node that never started is stopped
    /// as well, so it can not be started later.
    pub fn stop(&mut self) -> Release {
        match self.state {
            NodeState::Stopped => Release::AlreadyReleased,
            NodeState::Idle | NodeState::Running => {
                self.state = NodeState::Stopped;
                Release::Released
            }
        }
    }

    pub fn next(&mut self, sample_rate: f64) -> f32 {
        if self.state != NodeState::Running {
            return 0.0;
        }
        let value = match self.waveform {
            Waveform::Sine => (self.phase * TAU).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (self.phase - 0.5).abs(),
        };
        self.phase = (self.phase + self.effective_frequency() / sample_rate).fract();
        value as f32
    }
}

/// Second-order lowpass whose cutoff can move while running.
pub struct Lowpass {
    filter: DirectForm2Transposed<f32>,
    cutoff: f32,
    q: f32,
}

impl Lowpass {
    pub fn new(cutoff: f32, q: f32, sample_rate: f32) -> Self {
        let coefficients = lowpass_coefficients(cutoff, q, sample_rate).unwrap_or(PASS_THROUGH);
        Self {
            filter: DirectForm2Transposed::<f32>::new(coefficients),
            cutoff,
            q,
        }
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    /// Recomputes the coefficients when the cutoff moved noticeably. An
    /// unrepresentable cutoff keeps the previous coefficients.
    pub fn set_cutoff(&mut self, cutoff: f32, sample_rate: f32) {
        if (cutoff - self.cutoff).abs() < 0.01 {
            return;
        }
        if let Some(coefficients) = lowpass_coefficients(cutoff, self.q, sample_rate) {
            self.filter.update_coefficients(coefficients);
            self.cutoff = cutoff;
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        self.filter.run(input)
    }
}

impl std::fmt::Debug for Lowpass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lowpass")
            .field("cutoff", &self.cutoff)
            .field("q", &self.q)
            .finish()
    }
}

const PASS_THROUGH: Coefficients<f32> = Coefficients {
    a1: 0.0,
    a2: 0.0,
    b0: 1.0,
    b1: 0.0,
    b2: 0.0,
};

fn lowpass_coefficients(cutoff: f32, q: f32, sample_rate: f32) -> Option<Coefficients<f32>> {
    let nyquist = sample_rate * 0.5;
    let cutoff = cutoff.clamp(10.0, nyquist * 0.99);
    Coefficients::<f32>::from_params(Type::LowPass, sample_rate.hz(), cutoff.hz(), q).ok()
}

/// Delay line whose output is fed back into its own input.
#[derive(Debug, Clone)]
pub struct FeedbackDelay {
    buffer: Vec<f32>,
    position: usize,
    feedback: f32,
}

impl FeedbackDelay {
    pub fn new(delay_seconds: f64, feedback: f32, sample_rate: f64) -> Self {
        let length = (delay_seconds * sample_rate).round().max(1.0) as usize;
        Self {
            buffer: vec![0.0; length],
            position: 0,
            feedback,
        }
    }

    pub fn delay_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Pushes `input` into the loop and returns the delayed signal.
    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.position];
        self.buffer[self.position] = input + delayed * self.feedback;
        self.position = (self.position + 1) % self.buffer.len();
        delayed
    }
}
