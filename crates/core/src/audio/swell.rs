use std::ops::Range;

use super::dsp::{Oscillator, Param, Waveform};
use crate::Release;

const SWELL_OSC_HZ: f64 = 55.0;
const RISE_SECONDS: f64 = 4.0;
const FALL_END_SECONDS: f64 = 10.0;
pub const SWELL_TARGET_RANGE: Range<f32> = 0.02..0.10;

/// Low triangle drone under the pad whose level rises and falls in slow,
/// randomized swells.
#[derive(Debug)]
pub struct SwellGenerator {
    osc: Oscillator,
    gain: Param,
    level: f32,
    swells: usize,
}

impl SwellGenerator {
    pub fn start() -> Self {
        let mut osc = Oscillator::new(Waveform::Triangle, SWELL_OSC_HZ);
        osc.start();
        Self {
            osc,
            gain: Param::new(0.0),
            level: 0.0,
            swells: 0,
        }
    }

    /// Rises to `target` over four seconds from `now`, then falls back to
    /// silence by ten seconds after `now`. Any swell still in flight is cut
    /// at its current level.
    pub fn swell(&mut self, now: f64, target: f32) {
        self.gain.cancel_scheduled_values(now);
        self.gain
            .linear_ramp_to_value_at_time(target, now + RISE_SECONDS);
        self.gain
            .linear_ramp_to_value_at_time(0.0, now + FALL_END_SECONDS);
        self.swells += 1;
    }

    /// Number of swells scheduled so far.
    pub fn swells(&self) -> usize {
        self.swells
    }

    /// Automation events currently scheduled on the swell gain.
    pub fn scheduled_events(&self) -> usize {
        self.gain.scheduled()
    }

    pub fn level_at(&self, time: f64) -> f32 {
        self.gain.value_at(time)
    }

    pub fn update_controls(&mut self, time: f64) {
        self.level = self.gain.value_at(time);
    }

    pub fn process(&mut self, sample_rate: f64) -> f32 {
        self.osc.next(sample_rate) * self.level
    }

    pub fn stop(&mut self) -> Release {
        self.osc.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swell_rises_then_falls() {
        let mut swell = SwellGenerator::start();
        swell.swell(0.0, 0.08);

        assert_eq!(swell.level_at(0.0), 0.0);
        assert!((swell.level_at(4.0) - 0.08).abs() < 1e-6);
        assert!((swell.level_at(7.0) - 0.04).abs() < 1e-6);
        assert_eq!(swell.level_at(10.0), 0.0);
    }

    #[test]
    fn overlapping_swell_restarts_from_current_level() {
        let mut swell = SwellGenerator::start();
        swell.swell(0.0, 0.08);
        // The next swell lands one second before the previous one finished.
        let level_at_nine = swell.level_at(9.0);
        swell.swell(9.0, 0.05);

        assert!((swell.level_at(9.0) - level_at_nine).abs() < 1e-6);
        assert!((swell.level_at(13.0) - 0.05).abs() < 1e-6);
        assert_eq!(swell.swells(), 2);
    }

    #[test]
    fn an_hour_of_swells_keeps_automation_bounded() {
        let mut swell = SwellGenerator::start();
        for i in 0..400 {
            swell.swell(i as f64 * 9.0, 0.05);
        }

        assert_eq!(swell.swells(), 400);
        assert!(swell.scheduled_events() <= 3);
        assert!((swell.level_at(399.0 * 9.0 + 4.0) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn stop_silences_the_drone() {
        let mut swell = SwellGenerator::start();
        swell.swell(0.0, 0.1);
        swell.update_controls(4.0);
        assert_eq!(swell.stop(), Release::Released);
        assert_eq!(swell.process(48_000.0), 0.0);
        assert_eq!(swell.stop(), Release::AlreadyReleased);
    }
}
