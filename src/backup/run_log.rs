//! Run-scoped log capture.
//!
//! A [`RunLog`] collects every log line of one run in memory, next to the
//! usual stdout output, so it can be mailed as a report afterwards. It is only
//! active inside [`RunLog::in_scope`]; nothing is kept process wide.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

#[derive(Debug, Default)]
struct RunLogState {
    buffer: Vec<u8>,
    /// Most severe level seen. `tracing` orders ERROR as the smallest level.
    most_severe: Option<Level>,
    finalized: bool,
}

#[derive(Clone, Debug, Default)]
pub struct RunLog {
    state: Arc<Mutex<RunLogState>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RunLogState> {
        // A panic while holding the lock leaves the buffer usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` with this log installed as the thread's default subscriber,
    /// printing to stdout and capturing into the buffer.
    pub fn in_scope<T>(&self, verbose: bool, f: impl FnOnce() -> T) -> T {
        let level = if verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        let subscriber = Registry::default()
            .with(level)
            .with(tracing_subscriber::fmt::layer())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(self.clone()),
            )
            .with(SeverityLayer {
                state: self.state.clone(),
            });

        tracing::subscriber::with_default(subscriber, f)
    }

    /// Everything captured so far.
    pub fn collected(&self) -> String {
        String::from_utf8_lossy(&self.lock().buffer).into_owned()
    }

    pub fn max_level(&self) -> Option<Level> {
        self.lock().most_severe
    }

    /// Label for the report subject: `FATAL` if the run failed, else the most
    /// severe level logged.
    pub fn report_level(&self, failed: bool) -> &'static str {
        if failed {
            return "FATAL";
        }
        match self.max_level() {
            Some(Level::ERROR) => "ERROR",
            Some(Level::WARN) => "WARN",
            _ => "INFO",
        }
    }

    /// Drops what was captured so the log can serve another run.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.buffer.clear();
        state.most_severe = None;
        state.finalized = false;
    }

    /// Stops capturing and returns the collected log.
    pub fn finalize(&self) -> String {
        let mut state = self.lock();
        state.finalized = true;
        String::from_utf8_lossy(&state.buffer).into_owned()
    }
}

pub struct RunLogWriter {
    state: Arc<Mutex<RunLogState>>,
}

impl Write for RunLogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.finalized {
            state.buffer.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for RunLog {
    type Writer = RunLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RunLogWriter {
            state: self.state.clone(),
        }
    }
}

struct SeverityLayer {
    state: Arc<Mutex<RunLogState>>,
}

impl<S: Subscriber> Layer<S> for SeverityLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.finalized {
            return;
        }
        if state.most_severe.map_or(true, |seen| level < seen) {
            state.most_severe = Some(level);
        }
    }
}
