//! One synthesis voice: phase-accumulator oscillator plus a linear
//! attack/sustain/release envelope.

use dirtproto::api::audio::{EnvelopeState, Waveform};

#[derive(Debug, Clone)]
pub struct Voice {
    frequency_hz: f64,
    amplitude: f64,
    waveform: Waveform,
    attack_s: f64,
    release_s: f64,
    phase: f64,
    sample_rate: f64,
    envelope_state: EnvelopeState,
    envelope_level: f64,
}

impl Voice {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            frequency_hz: 0.0,
            amplitude: 0.0,
            waveform: Waveform::Sine,
            attack_s: 0.0,
            release_s: 0.0,
            phase: 0.0,
            sample_rate,
            envelope_state: EnvelopeState::Idle,
            envelope_level: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate.max(1.0);
    }

    /// Start or retrigger. Phase continues so retriggering a held note
    /// doesn't click.
    pub fn note_on(
        &mut self,
        frequency_hz: f64,
        amplitude: f64,
        attack_s: f64,
        release_s: f64,
        waveform: Waveform,
    ) {
        self.frequency_hz = frequency_hz.max(0.0);
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self.attack_s = attack_s.max(0.0);
        self.release_s = release_s.max(0.0);
        self.waveform = waveform;
        if self.attack_s > 0.0 {
            self.envelope_state = EnvelopeState::Attack;
        } else {
            self.envelope_state = EnvelopeState::Sustain;
            self.envelope_level = 1.0;
        }
    }

    pub fn note_off(&mut self) {
        if self.envelope_state == EnvelopeState::Idle {
            return;
        }
        if self.release_s > 0.0 {
            self.envelope_state = EnvelopeState::Release;
        } else {
            self.envelope_state = EnvelopeState::Idle;
            self.envelope_level = 0.0;
        }
    }

    pub fn is_active(&self) -> bool {
        self.envelope_state != EnvelopeState::Idle
    }

    pub fn envelope_state(&self) -> EnvelopeState {
        self.envelope_state
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Produce the next sample and advance envelope and phase.
    pub fn render_sample(&mut self) -> f64 {
        if self.envelope_state == EnvelopeState::Idle {
            return 0.0;
        }

        let raw = match self.waveform {
            Waveform::Sine => (self.phase * std::f64::consts::TAU).sin(),
            Waveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => 4.0 * (self.phase - 0.5).abs() - 1.0,
            Waveform::Saw => 2.0 * self.phase - 1.0,
        };

        let sample = raw * self.amplitude * self.envelope_level;

        self.phase += self.frequency_hz / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }

        match self.envelope_state {
            EnvelopeState::Attack => {
                self.envelope_level += 1.0 / (self.attack_s * self.sample_rate).max(1.0);
                if self.envelope_level >= 1.0 {
                    self.envelope_level = 1.0;
                    self.envelope_state = EnvelopeState::Sustain;
                }
            }
            EnvelopeState::Release => {
                self.envelope_level -= 1.0 / (self.release_s * self.sample_rate).max(1.0);
                if self.envelope_level <= 0.0 {
                    self.envelope_level = 0.0;
                    self.envelope_state = EnvelopeState::Idle;
                }
            }
            _ => {}
        }

        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_attack_jumps_to_sustain() {
        let mut voice = Voice::new(48000.0);
        voice.note_on(440.0, 1.0, 0.0, 0.0, Waveform::Sine);
        assert_eq!(voice.envelope_state(), EnvelopeState::Sustain);
    }

    #[test]
    fn attack_ramps_to_sustain() {
        let mut voice = Voice::new(1000.0);
        voice.note_on(100.0, 1.0, 0.01, 0.0, Waveform::Sine);
        assert_eq!(voice.envelope_state(), EnvelopeState::Attack);
        for _ in 0..20 {
            voice.render_sample();
        }
        assert_eq!(voice.envelope_state(), EnvelopeState::Sustain);
    }

    #[test]
    fn release_winds_down_to_idle() {
        let mut voice = Voice::new(1000.0);
        voice.note_on(100.0, 1.0, 0.0, 0.01, Waveform::Square);
        voice.note_off();
        assert_eq!(voice.envelope_state(), EnvelopeState::Release);
        for _ in 0..20 {
            voice.render_sample();
        }
        assert!(!voice.is_active());
    }

    #[test]
    fn instant_release_goes_straight_to_idle() {
        let mut voice = Voice::new(48000.0);
        voice.note_on(440.0, 1.0, 0.0, 0.0, Waveform::Saw);
        voice.note_off();
        assert!(!voice.is_active());
    }

    #[test]
    fn samples_stay_within_unit_range() {
        for waveform in [
            Waveform::Sine,
            Waveform::Square,
            Waveform::Triangle,
            Waveform::Saw,
        ] {
            let mut voice = Voice::new(48000.0);
            voice.note_on(997.0, 1.0, 0.0, 0.0, waveform);
            for _ in 0..2000 {
                let sample = voice.render_sample();
                assert!((-1.0..=1.0).contains(&sample), "{waveform:?}: {sample}");
            }
        }
    }

    #[test]
    fn square_wave_alternates_sign() {
        let mut voice = Voice::new(8000.0);
        voice.note_on(1000.0, 1.0, 0.0, 0.0, Waveform::Square);
        let mut saw_positive = false;
        let mut saw_negative = false;
        for _ in 0..16 {
            let sample = voice.render_sample();
            saw_positive |= sample > 0.5;
            saw_negative |= sample < -0.5;
        }
        assert!(saw_positive && saw_negative);
    }
}
