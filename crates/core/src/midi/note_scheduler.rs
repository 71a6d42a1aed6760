use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::midi_sink::MidiSink;

/// Default delay between a trigger's note-on and its note-off.
pub const DEFAULT_NOTE_OFF_DELAY: Duration = Duration::from_secs(2);

/// Schedules the delayed note-off that follows every triggered note-on.
///
/// Tasks are detached: the detection path never waits on them, and a
/// failed send inside a task is logged and discarded. Join handles are
/// retained so pending note-offs can be aborted on shutdown and so tests
/// can observe what is in flight. Under a paused tokio clock the delays
/// are driven by simulated time.
pub struct NoteOffScheduler {
    sink: Arc<Mutex<Box<dyn MidiSink>>>,
    delay: Duration,
    runtime: Handle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NoteOffScheduler {
    /// Capture the current tokio runtime for task dispatch. Must be
    /// called from within a runtime; schedule calls may then come from
    /// any thread.
    pub fn new(sink: Arc<Mutex<Box<dyn MidiSink>>>, delay: Duration) -> Self {
        Self {
            sink,
            delay,
            runtime: Handle::current(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Fire-and-forget: deliver `note_off(note)` after the configured
    /// delay.
    pub fn schedule(&self, note: u8) {
        let sink = Arc::clone(&self.sink);
        let delay = self.delay;

        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = sink.lock().note_off(note) {
                log::warn!("Delayed note-off for note {} failed: {}", note, err);
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Number of note-offs not yet delivered.
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.len()
    }

    /// Abort every pending note-off. Shutdown path; in normal operation
    /// scheduled note-offs always run to completion.
    pub fn abort_all(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}
