use std::sync::Arc;

use midir::{MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;

use super::midi::MidiMessage;

/// Client name registered with the system MIDI service.
const CLIENT_NAME: &str = "motif";

/// Outgoing MIDI seam.
///
/// Failures surface as strings; callers log them and move on. A dropped
/// note must never disturb detection or region state.
pub trait MidiSink: Send {
    fn send(&mut self, message: MidiMessage) -> Result<(), String>;

    fn note_on(&mut self, note: u8, velocity: u8) -> Result<(), String> {
        self.send(MidiMessage::NoteOn(note, velocity))
    }

    fn note_off(&mut self, note: u8) -> Result<(), String> {
        self.send(MidiMessage::NoteOff(note))
    }
}

/// Sink backed by a real midir output connection.
pub struct MidirSink {
    connection: MidiOutputConnection,
}

impl MidirSink {
    pub fn new(connection: MidiOutputConnection) -> Self {
        Self { connection }
    }
}

impl MidiSink for MidirSink {
    fn send(&mut self, message: MidiMessage) -> Result<(), String> {
        self.connection
            .send(&message.to_bytes())
            .map_err(|e| format!("Failed to send MIDI: {}", e))
    }
}

/// Sink used when no MIDI output is available; drops messages.
pub struct NullSink;

impl MidiSink for NullSink {
    fn send(&mut self, _message: MidiMessage) -> Result<(), String> {
        Ok(())
    }
}

/// Sink that records messages instead of sending them, observable through
/// cloned handles. Used for dry runs and tests.
#[derive(Clone, Default)]
pub struct CapturingSink {
    messages: Arc<Mutex<Vec<MidiMessage>>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<MidiMessage> {
        self.messages.lock().clone()
    }
}

impl MidiSink for CapturingSink {
    fn send(&mut self, message: MidiMessage) -> Result<(), String> {
        self.messages.lock().push(message);
        Ok(())
    }
}

/// Names of the available MIDI output ports.
pub fn list_output_ports() -> Vec<String> {
    match MidiOutput::new(CLIENT_NAME) {
        Ok(output) => output
            .ports()
            .iter()
            .filter_map(|port| output.port_name(port).ok())
            .collect(),
        Err(err) => {
            log::warn!("Failed to enumerate MIDI outputs: {}", err);
            Vec::new()
        }
    }
}

/// Open the best available MIDI output.
///
/// Preference order: the first port whose name contains `preferred_port`
/// (an empty preference matches the first port), then a virtual output
/// port where the platform supports one, then the null sink. MIDI being
/// unavailable is a degraded mode, not an error.
pub fn open_midi_sink(preferred_port: &str, virtual_port_name: &str) -> Box<dyn MidiSink> {
    let output = match MidiOutput::new(CLIENT_NAME) {
        Ok(output) => output,
        Err(err) => {
            log::warn!("MIDI init failed: {}, note events will be dropped", err);
            return Box::new(NullSink);
        }
    };

    let ports = output.ports();
    let matched = ports.iter().find(|port| {
        output
            .port_name(port)
            .map(|name| name.contains(preferred_port))
            .unwrap_or(false)
    });

    let output = match matched {
        Some(port) => {
            let port_name = output
                .port_name(port)
                .unwrap_or_else(|_| "unknown".to_string());
            match output.connect(port, "motif-out") {
                Ok(connection) => {
                    log::info!("Connected to MIDI output '{}'", port_name);
                    return Box::new(MidirSink::new(connection));
                }
                Err(err) => {
                    log::warn!("Failed to connect to MIDI port '{}': {}", port_name, err);
                    err.into_inner()
                }
            }
        }
        None => {
            log::info!(
                "No MIDI output matching '{}' among {} ports",
                preferred_port,
                ports.len()
            );
            output
        }
    };

    #[cfg(unix)]
    {
        use midir::os::unix::VirtualOutput;

        match output.create_virtual(virtual_port_name) {
            Ok(connection) => {
                log::info!("Created virtual MIDI output '{}'", virtual_port_name);
                return Box::new(MidirSink::new(connection));
            }
            Err(err) => {
                log::warn!(
                    "Failed to create virtual MIDI port '{}': {}",
                    virtual_port_name,
                    err
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = (output, virtual_port_name);

    log::warn!("No MIDI output available, note events will be dropped");
    Box::new(NullSink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capturing_sink_records_in_order() {
        let sink = CapturingSink::new();
        let mut handle = sink.clone();

        handle.note_on(60, 100).unwrap();
        handle.note_off(60).unwrap();

        assert_eq!(
            sink.messages(),
            vec![MidiMessage::NoteOn(60, 100), MidiMessage::NoteOff(60)]
        );
    }

    #[test]
    fn test_null_sink_swallows_everything() {
        let mut sink = NullSink;
        assert!(sink.note_on(0, 0).is_ok());
        assert!(sink.note_off(127).is_ok());
    }
}
