pub mod midi;
pub mod midi_sink;
pub mod note_scheduler;

// Re-export for convenience
pub use midi::MidiMessage;
pub use midi_sink::{
    list_output_ports, open_midi_sink, CapturingSink, MidiSink, MidirSink, NullSink,
};
pub use note_scheduler::{NoteOffScheduler, DEFAULT_NOTE_OFF_DELAY};
