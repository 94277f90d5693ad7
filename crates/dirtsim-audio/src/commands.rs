//! The command path into the audio callback.
//!
//! WebSocket handlers are many; the ring is single-producer. A bridge
//! thread fans handler commands into the `rtrb` ring, and the callback
//! drains the consumer with plain reads. The ring holds 128 commands; a
//! full ring drops the command with a warning, which is normal under
//! load and never an error.

use std::sync::mpsc;
use std::thread::JoinHandle;

use dirtproto::api::audio::NoteOn;
use tracing::warn;

/// Capacity of the SPSC ring (power of two).
pub const COMMAND_QUEUE_CAPACITY: usize = 128;

#[derive(Debug, Clone)]
pub enum AudioCommand {
    NoteOn(NoteOn),
    NoteOff { note_id: u32 },
}

/// Cloneable handle the service edge pushes commands through.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<AudioCommand>,
}

impl CommandSender {
    pub fn send(&self, command: AudioCommand) {
        if self.tx.send(command).is_err() {
            warn!(target: "audio", "Audio engine stopped; command dropped");
        }
    }
}

/// Build the fan-in: an mpsc front door, a bridge thread, and the ring
/// consumer for the callback side.
pub fn command_channel() -> (CommandSender, rtrb::Consumer<AudioCommand>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<AudioCommand>();
    let (mut producer, consumer) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);

    let bridge = std::thread::Builder::new()
        .name("audio-cmd-bridge".into())
        .spawn(move || {
            // Ends when every CommandSender is gone.
            while let Ok(command) = rx.recv() {
                if producer.push(command).is_err() {
                    warn!(target: "audio", "Audio command queue full; dropping command");
                }
            }
        })
        .expect("spawn audio command bridge");

    (CommandSender { tx }, consumer, bridge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirtproto::api::audio::Waveform;

    fn note_on(id: u32) -> AudioCommand {
        AudioCommand::NoteOn(NoteOn {
            note_id: id,
            frequency_hz: 440.0,
            amplitude: 0.5,
            attack_s: 0.0,
            duration_s: 0.0,
            release_s: 0.0,
            waveform: Waveform::Sine,
        })
    }

    #[test]
    fn commands_arrive_in_enqueue_order() {
        let (sender, mut consumer, bridge) = command_channel();
        for id in 1..=10 {
            sender.send(note_on(id));
        }
        drop(sender);
        bridge.join().unwrap();

        let mut seen = Vec::new();
        while let Ok(command) = consumer.pop() {
            if let AudioCommand::NoteOn(params) = command {
                seen.push(params.note_id);
            }
        }
        assert_eq!(seen, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn overflow_drops_instead_of_blocking() {
        let (sender, mut consumer, bridge) = command_channel();
        // Twice the ring capacity with nobody draining.
        for id in 0..(2 * COMMAND_QUEUE_CAPACITY as u32) {
            sender.send(note_on(id));
        }
        drop(sender);
        bridge.join().unwrap();

        let mut drained = 0;
        while consumer.pop().is_ok() {
            drained += 1;
        }
        assert_eq!(drained, COMMAND_QUEUE_CAPACITY);
    }
}
