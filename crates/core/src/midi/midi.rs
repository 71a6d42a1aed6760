// MIDI message types we emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn(u8, u8), // (note, velocity)
    NoteOff(u8),    // note
}

impl MidiMessage {
    /// Raw channel-1 voice message bytes.
    pub fn to_bytes(&self) -> [u8; 3] {
        match self {
            MidiMessage::NoteOn(note, velocity) => [0x90, *note, *velocity],
            MidiMessage::NoteOff(note) => [0x80, *note, 0],
        }
    }
}
