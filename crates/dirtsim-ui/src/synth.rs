//! Synth keyboard: key labels to frequencies.

/// Parse a key label like "C4", "F#3" or "Bb5" into its equal-temperament
/// frequency (A4 = 440 Hz). Returns None for labels that aren't notes.
pub fn key_frequency(key: &str) -> Option<f64> {
    let bytes = key.as_bytes();
    if bytes.is_empty() {
        return None;
    }

    let letter = bytes[0].to_ascii_uppercase();
    let base_semitone: i32 = match letter {
        b'C' => 0,
        b'D' => 2,
        b'E' => 4,
        b'F' => 5,
        b'G' => 7,
        b'A' => 9,
        b'B' => 11,
        _ => return None,
    };

    let mut index = 1;
    let mut accidental = 0;
    match bytes.get(index) {
        Some(b'#') => {
            accidental = 1;
            index += 1;
        }
        Some(b'b') => {
            accidental = -1;
            index += 1;
        }
        _ => {}
    }

    let octave: i32 = key.get(index..)?.parse().ok()?;

    // MIDI note number, then distance from A4 (MIDI 69).
    let midi = (octave + 1) * 12 + base_semitone + accidental;
    let semitones_from_a4 = midi - 69;
    Some(440.0 * 2f64.powf(semitones_from_a4 as f64 / 12.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn reference_pitches() {
        assert!(close(key_frequency("A4").unwrap(), 440.0));
        assert!(close(key_frequency("C4").unwrap(), 261.63));
        assert!(close(key_frequency("A3").unwrap(), 220.0));
        assert!(close(key_frequency("A5").unwrap(), 880.0));
    }

    #[test]
    fn accidentals() {
        assert!(close(key_frequency("C#4").unwrap(), 277.18));
        assert!(close(key_frequency("Bb3").unwrap(), 233.08));
        // Enharmonic pair.
        assert!(close(
            key_frequency("C#4").unwrap(),
            key_frequency("Db4").unwrap()
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(key_frequency("").is_none());
        assert!(key_frequency("H4").is_none());
        assert!(key_frequency("C").is_none());
        assert!(key_frequency("C#x").is_none());
    }
}
