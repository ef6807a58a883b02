//! Chrome trace output, viewable in chrome://tracing or Perfetto.
//!
//! Tracing is off until `open` is called.  Events can be written from any
//! thread; each node span lands on the track of the worker that ran it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

static TRACE: Mutex<Option<Trace>> = Mutex::new(None);

struct Event<'a> {
    name: &'a str,
    tid: usize,
    start: Instant,
    end: Instant,
}

struct Trace {
    start: Instant,
    w: BufWriter<File>,
}

impl Trace {
    fn new(path: &Path) -> std::io::Result<Self> {
        let mut w = BufWriter::new(File::create(path)?);
        writeln!(w, "[")?;
        Ok(Trace {
            start: Instant::now(),
            w,
        })
    }

    fn write_event(&mut self, event: &Event) -> std::io::Result<()> {
        write!(
            self.w,
            "{{ \"pid\": 0, \"tid\": {}, \"name\": {:?}, \"ts\": {}, \"ph\": \"X\", \"dur\": {} }}",
            event.tid,
            event.name,
            event.start.saturating_duration_since(self.start).as_micros(),
            event.end.saturating_duration_since(event.start).as_micros(),
        )
    }

    fn write(&mut self, event: &Event) -> std::io::Result<()> {
        self.write_event(event)?;
        writeln!(self.w, ",")
    }

    fn close(&mut self) -> std::io::Result<()> {
        let main = Event {
            name: "main",
            tid: 0,
            start: self.start,
            end: Instant::now(),
        };
        self.write_event(&main)?;
        writeln!(self.w, "]")?;
        self.w.flush()
    }
}

fn record(event: Event) {
    let mut trace = match TRACE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(t) = trace.as_mut() {
        // A trace that can't be written is dropped rather than failing the build.
        if t.write(&event).is_err() {
            *trace = None;
        }
    }
}

fn enabled() -> bool {
    TRACE.lock().map(|t| t.is_some()).unwrap_or(false)
}

pub fn open(path: impl AsRef<Path>) -> std::io::Result<()> {
    let trace = Trace::new(path.as_ref())?;
    let mut guard = TRACE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = Some(trace);
    Ok(())
}

/// Runs `f`, recording its duration as a span on the main track.
#[inline]
pub fn scope<T>(name: &str, f: impl FnOnce() -> T) -> T {
    if !enabled() {
        return f();
    }
    let start = Instant::now();
    let result = f();
    record(Event {
        name,
        tid: 0,
        start,
        end: Instant::now(),
    });
    result
}

/// Records a span that already happened, on track `tid`.
pub fn span(name: &str, tid: usize, start: Instant, end: Instant) {
    if enabled() {
        record(Event {
            name,
            tid,
            start,
            end,
        });
    }
}

pub fn close() -> std::io::Result<()> {
    let mut guard = TRACE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(mut t) = guard.take() {
        return t.close();
    }
    Ok(())
}
