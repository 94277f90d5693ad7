//! The 16-slot voice pool and its allocation policy.
//!
//! Allocation order for a NoteOn:
//! 1. a slot already carrying the note id retriggers in place,
//! 2. else any free slot,
//! 3. else steal: prefer the Releasing slot with the smallest start
//!    order, otherwise the oldest Held slot.

use dirtproto::api::audio::{ActiveNote, HoldState, NoteOn};

use crate::voice::Voice;

pub const VOICE_COUNT: usize = 16;

#[derive(Debug)]
struct VoiceSlot {
    voice: Voice,
    note_id: u32,
    /// Frames until automatic release; -1 means hold indefinitely.
    auto_off_frames: i64,
    start_order: u64,
    hold_state: HoldState,
}

impl VoiceSlot {
    fn new(sample_rate: f64) -> Self {
        Self {
            voice: Voice::new(sample_rate),
            note_id: 0,
            auto_off_frames: -1,
            start_order: 0,
            hold_state: HoldState::Held,
        }
    }

    fn is_free(&self) -> bool {
        self.note_id == 0 && !self.voice.is_active()
    }

    fn clear(&mut self) {
        self.note_id = 0;
        self.auto_off_frames = -1;
        self.hold_state = HoldState::Held;
    }
}

#[derive(Debug)]
pub struct VoicePool {
    slots: Vec<VoiceSlot>,
    sample_rate: f64,
    next_order: u64,
}

impl VoicePool {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            slots: (0..VOICE_COUNT).map(|_| VoiceSlot::new(sample_rate)).collect(),
            sample_rate,
            next_order: 1,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate.max(1.0);
        for slot in &mut self.slots {
            slot.voice.set_sample_rate(self.sample_rate);
        }
    }

    /// Apply a NoteOn. `params.note_id` must already be resolved (never 0
    /// here; id allocation happens at the service edge).
    pub fn note_on(&mut self, params: &NoteOn) {
        let index = self.select_slot(params.note_id);
        let order = self.next_order;
        self.next_order += 1;

        let slot = &mut self.slots[index];
        slot.voice.note_on(
            params.frequency_hz,
            params.amplitude,
            params.attack_s,
            params.release_s,
            params.waveform,
        );
        slot.note_id = params.note_id;
        slot.hold_state = HoldState::Held;
        slot.start_order = order;
        slot.auto_off_frames = if params.duration_s > 0.0 {
            ((params.duration_s * self.sample_rate).round() as i64).max(1)
        } else {
            -1
        };
    }

    /// Apply a NoteOff. Id 0 releases every sounding slot; a missing id
    /// is dropped silently.
    pub fn note_off(&mut self, note_id: u32) {
        for slot in &mut self.slots {
            if slot.note_id == 0 {
                continue;
            }
            if note_id == 0 || slot.note_id == note_id {
                slot.voice.note_off();
                slot.hold_state = HoldState::Releasing;
                slot.auto_off_frames = -1;
            }
        }
    }

    /// Sum one frame across all voices (unclamped; the renderer clamps
    /// after master gain). Advances auto-off counters and reaps finished
    /// voices.
    pub fn render_sample(&mut self) -> f64 {
        let mut sum = 0.0;
        for slot in &mut self.slots {
            if slot.note_id == 0 {
                continue;
            }
            sum += slot.voice.render_sample();

            if slot.auto_off_frames > 0 {
                slot.auto_off_frames -= 1;
                if slot.auto_off_frames == 0 {
                    slot.voice.note_off();
                    slot.hold_state = HoldState::Releasing;
                    slot.auto_off_frames = -1;
                }
            }

            if !slot.voice.is_active() {
                slot.clear();
            }
        }
        sum
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.note_id != 0).count()
    }

    pub fn active_notes(&self) -> Vec<ActiveNote> {
        self.slots
            .iter()
            .filter(|slot| slot.note_id != 0)
            .map(|slot| ActiveNote {
                note_id: slot.note_id,
                frequency_hz: slot.voice.frequency_hz(),
                amplitude: slot.voice.amplitude(),
                waveform: slot.voice.waveform(),
                envelope_state: slot.voice.envelope_state(),
                hold_state: slot.hold_state,
            })
            .collect()
    }

    fn select_slot(&self, note_id: u32) -> usize {
        // Retrigger in place.
        if let Some(index) = self.slots.iter().position(|slot| slot.note_id == note_id) {
            return index;
        }
        // Free slot.
        if let Some(index) = self.slots.iter().position(|slot| slot.is_free()) {
            return index;
        }
        // Steal a releasing slot, oldest first.
        let releasing = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.hold_state == HoldState::Releasing)
            .min_by_key(|(_, slot)| slot.start_order)
            .map(|(index, _)| index);
        if let Some(index) = releasing {
            return index;
        }
        // Steal the oldest held slot.
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, slot)| slot.start_order)
            .map(|(index, _)| index)
            .expect("pool is never empty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirtproto::api::audio::Waveform;

    fn note(id: u32, frequency: f64) -> NoteOn {
        NoteOn {
            note_id: id,
            frequency_hz: frequency,
            amplitude: 0.5,
            attack_s: 0.0,
            duration_s: 0.0,
            release_s: 0.1,
            waveform: Waveform::Sine,
        }
    }

    #[test]
    fn sixteen_distinct_notes_all_sound() {
        let mut pool = VoicePool::new(48000.0);
        for id in 1..=16 {
            pool.note_on(&note(id, 100.0 + id as f64));
        }
        pool.render_sample();
        assert_eq!(pool.active_count(), 16);
    }

    #[test]
    fn retrigger_replaces_in_place() {
        let mut pool = VoicePool::new(48000.0);
        pool.note_on(&note(5, 440.0));
        pool.render_sample();

        let mut retrigger = note(5, 880.0);
        retrigger.amplitude = 0.9;
        pool.note_on(&retrigger);
        pool.render_sample();

        let notes = pool.active_notes();
        assert_eq!(notes.len(), 1);
        assert!((notes[0].frequency_hz - 880.0).abs() < 1e-9);
        assert!((notes[0].amplitude - 0.9).abs() < 1e-9);
        assert_eq!(notes[0].hold_state, HoldState::Held);
    }

    #[test]
    fn selective_note_off_releases_only_the_target() {
        let mut pool = VoicePool::new(48000.0);
        pool.note_on(&note(1, 220.0));
        pool.note_on(&note(2, 440.0));
        pool.note_off(1);

        let notes = pool.active_notes();
        let first = notes.iter().find(|n| n.note_id == 1).unwrap();
        let second = notes.iter().find(|n| n.note_id == 2).unwrap();
        assert_eq!(first.hold_state, HoldState::Releasing);
        assert_eq!(second.hold_state, HoldState::Held);
    }

    #[test]
    fn note_off_zero_releases_everything() {
        let mut pool = VoicePool::new(48000.0);
        for id in 1..=4 {
            pool.note_on(&note(id, 100.0 * id as f64));
        }
        pool.note_off(0);
        assert!(pool
            .active_notes()
            .iter()
            .all(|n| n.hold_state == HoldState::Releasing));
    }

    #[test]
    fn unknown_note_off_is_silently_dropped() {
        let mut pool = VoicePool::new(48000.0);
        pool.note_on(&note(1, 220.0));
        pool.note_off(99);
        assert_eq!(pool.active_notes()[0].hold_state, HoldState::Held);
    }

    #[test]
    fn steal_prefers_releasing_over_oldest_held() {
        let mut pool = VoicePool::new(48000.0);
        for id in 1..=16 {
            pool.note_on(&note(id, 100.0 + id as f64));
        }
        // Voice 8 enters release; the 17th note must take its slot, not
        // the oldest held one (id 1).
        pool.note_off(8);
        pool.note_on(&note(17, 999.0));

        let notes = pool.active_notes();
        assert_eq!(notes.len(), 16);
        assert!(notes.iter().any(|n| n.note_id == 17));
        assert!(notes.iter().any(|n| n.note_id == 1));
        assert!(!notes.iter().any(|n| n.note_id == 8));
    }

    #[test]
    fn steal_falls_back_to_oldest_held() {
        let mut pool = VoicePool::new(48000.0);
        for id in 1..=16 {
            pool.note_on(&note(id, 100.0 + id as f64));
        }
        pool.note_on(&note(17, 999.0));

        let notes = pool.active_notes();
        assert!(!notes.iter().any(|n| n.note_id == 1));
        assert!(notes.iter().any(|n| n.note_id == 17));
    }

    #[test]
    fn auto_off_fires_after_duration_frames() {
        let sample_rate = 1000.0;
        let mut pool = VoicePool::new(sample_rate);
        let mut timed = note(1, 440.0);
        timed.duration_s = 0.05; // 50 frames
        pool.note_on(&timed);

        for _ in 0..49 {
            pool.render_sample();
        }
        assert_eq!(pool.active_notes()[0].hold_state, HoldState::Held);

        pool.render_sample();
        assert_eq!(pool.active_notes()[0].hold_state, HoldState::Releasing);
    }

    #[test]
    fn nonpositive_duration_means_hold() {
        let mut pool = VoicePool::new(1000.0);
        let mut held = note(1, 440.0);
        held.duration_s = -1.0;
        pool.note_on(&held);
        for _ in 0..5000 {
            pool.render_sample();
        }
        assert_eq!(pool.active_notes()[0].hold_state, HoldState::Held);
    }

    #[test]
    fn finished_voices_free_their_slots() {
        let mut pool = VoicePool::new(1000.0);
        let mut short = note(1, 440.0);
        short.duration_s = 0.01;
        short.release_s = 0.01;
        pool.note_on(&short);
        for _ in 0..100 {
            pool.render_sample();
        }
        assert_eq!(pool.active_count(), 0);
    }
}
