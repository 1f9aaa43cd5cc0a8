use rand::Rng;

use super::dsp::{FeedbackDelay, Lowpass, NodeState, Oscillator, Param, Waveform};
use crate::Release;

pub const ROOT_HZ: f64 = 220.0;
const BASE_CUTOFF_HZ: f32 = 1_600.0;
const FILTER_Q: f32 = 0.4;
const DELAY_SECONDS: f64 = 0.35;
const DELAY_FEEDBACK: f32 = 0.35;
const FADE_TARGET: f32 = 0.35;
const FADE_LEAD_SECONDS: f64 = 0.05;
const FADE_TIME_CONSTANT: f64 = 3.0;

/// Pitch of one pad voice relative to [`ROOT_HZ`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PadPitch {
    pub semitones: f64,
    pub detune_cents: f64,
}

/// A minor colour: root, minor third, fifth and minor seventh.
pub const PAD_CHORD: [PadPitch; 4] = [
    PadPitch {
        semitones: 0.0,
        detune_cents: -4.0,
    },
    PadPitch {
        semitones: 3.0,
        detune_cents: 0.0,
    },
    PadPitch {
        semitones: 7.0,
        detune_cents: 3.0,
    },
    PadPitch {
        semitones: 10.0,
        detune_cents: -7.0,
    },
];

impl PadPitch {
    pub fn frequency(&self) -> f64 {
        ROOT_HZ * (self.semitones / 12.0).exp2()
    }
}

/// Read-only view of a voice's randomized and fixed parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PadSnapshot {
    pub frequency: f64,
    pub detune_cents: f64,
    pub lfo_rate: f64,
    pub lfo_depth: f32,
    pub gain: f32,
}

/// Oscillator -> lowpass (LFO on cutoff) -> voice gain, with the gain also
/// feeding a feedback delay. Both the dry voice and the delay reach the bus.
#[derive(Debug)]
pub struct PadVoice {
    osc: Oscillator,
    lfo: Oscillator,
    lfo_depth: f32,
    lfo_value: f32,
    filter: Lowpass,
    amp: Param,
    gain: f32,
    delay: FeedbackDelay,
}

impl PadVoice {
    /// Builds and starts the voice; its gain fades in from silence shortly
    /// after `start_time` (context seconds).
    pub fn start<R: Rng>(pitch: PadPitch, rng: &mut R, sample_rate: f64, start_time: f64) -> Self {
        let mut osc = Oscillator::new(Waveform::Sine, pitch.frequency()).with_detune(pitch.detune_cents);
        let mut lfo = Oscillator::new(Waveform::Sine, rng.gen_range(0.09..0.13));
        let lfo_depth = rng.gen_range(6.0..16.0);

        let mut amp = Param::new(0.0);
        amp.set_target_at_time(
            FADE_TARGET,
            start_time + FADE_LEAD_SECONDS,
            FADE_TIME_CONSTANT,
        );

        osc.start();
        lfo.start();
        Self {
            osc,
            lfo,
            lfo_depth,
            lfo_value: 0.0,
            filter: Lowpass::new(BASE_CUTOFF_HZ, FILTER_Q, sample_rate as f32),
            amp,
            gain: 0.0,
            delay: FeedbackDelay::new(DELAY_SECONDS, DELAY_FEEDBACK, sample_rate),
        }
    }

    /// Control-rate update: voice gain from its envelope and the filter
    /// cutoff from the latest LFO value.
    pub fn update_controls(&mut self, time: f64, sample_rate: f64) {
        self.gain = self.amp.value_at(time);
        self.filter
            .set_cutoff(BASE_CUTOFF_HZ + self.lfo_value * self.lfo_depth, sample_rate as f32);
    }

    /// Next sample of dry voice plus delay return.
    pub fn process(&mut self, sample_rate: f64) -> f32 {
        self.lfo_value = self.lfo.next(sample_rate);
        let voiced = self.filter.process(self.osc.next(sample_rate)) * self.gain;
        voiced + self.delay.process(voiced)
    }

    pub fn stop(&mut self) -> Release {
        let osc = self.osc.stop();
        let lfo = self.lfo.stop();
        if osc.was_released() || lfo.was_released() {
            Release::Released
        } else {
            Release::AlreadyReleased
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.osc.state() != NodeState::Running && self.lfo.state() != NodeState::Running
    }

    pub fn gain_at(&self, time: f64) -> f32 {
        self.amp.value_at(time)
    }

    pub fn snapshot(&self, time: f64) -> PadSnapshot {
        PadSnapshot {
            frequency: self.osc.frequency(),
            detune_cents: self.osc.detune_cents(),
            lfo_rate: self.lfo.frequency(),
            lfo_depth: self.lfo_depth,
            gain: self.amp.value_at(time),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn chord_frequencies_match_equal_temperament() {
        let freqs: Vec<f64> = PAD_CHORD.iter().map(PadPitch::frequency).collect();
        assert_eq!(freqs[0], 220.0);
        assert!((freqs[1] - 261.6256).abs() < 1e-3);
        assert!((freqs[2] - 329.6276).abs() < 1e-3);
        assert!((freqs[3] - 391.9954).abs() < 1e-3);
    }

    #[test]
    fn randomized_modulation_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..64 {
            let voice = PadVoice::start(PAD_CHORD[0], &mut rng, 48_000.0, 0.0);
            let snapshot = voice.snapshot(0.0);
            assert!((0.09..0.13).contains(&snapshot.lfo_rate));
            assert!((6.0..16.0).contains(&snapshot.lfo_depth));
        }
    }

    #[test]
    fn fades_in_without_abrupt_onset() {
        let mut rng = StdRng::seed_from_u64(3);
        let voice = PadVoice::start(PAD_CHORD[1], &mut rng, 48_000.0, 2.0);

        assert_eq!(voice.gain_at(2.0), 0.0);
        assert_eq!(voice.gain_at(2.05), 0.0);
        assert!(voice.gain_at(2.15) < 0.02);
        assert!(voice.gain_at(5.05) > 0.2);
        assert!(voice.gain_at(30.0) <= FADE_TARGET);
    }

    #[test]
    fn stopping_twice_reports_already_released() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut voice = PadVoice::start(PAD_CHORD[2], &mut rng, 48_000.0, 0.0);
        assert_eq!(voice.stop(), Release::Released);
        assert_eq!(voice.stop(), Release::AlreadyReleased);
        assert!(voice.is_stopped());
    }

    #[test]
    fn produces_sound_once_faded_in() {
        let sample_rate = 8_000.0;
        let mut rng = StdRng::seed_from_u64(9);
        let mut voice = PadVoice::start(PAD_CHORD[0], &mut rng, sample_rate, 0.0);
        voice.update_controls(10.0, sample_rate);

        let peak = (0..800)
            .map(|_| voice.process(sample_rate).abs())
            .fold(0.0f32, f32::max);
        assert!(peak > 0.1, "peak {peak}");
    }
}
