//! Chrome Trace ("flame style") profiling of dispatcher runs.
//!
//! Feature-gated with `--features profiling`.
//!
//! Usage:
//!   lockstep::profiler::init("profile/trace.json");
//!   dispatcher.run()?;
//!   lockstep::profiler::shutdown();
//!
//! Worker threads buffer their events locally and hand them over in batches,
//! so recording a span inside the step loop never contends on a global lock
//! more than once per [`FLUSH_EVERY`] events.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

/// Events buffered per thread before they are handed to the global sink.
pub const FLUSH_EVERY: usize = 1024;

/// Recording backend, compiled in with the `profiling` feature.
#[cfg(feature = "profiling")]
mod enabled {
    use std::cell::RefCell;
    use std::fs::File;
    use std::io::{BufWriter, Write};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::OnceLock;
    use std::time::Instant;

    use parking_lot::Mutex;

    use super::*;

    enum Event {
        Span {
            name: String,
            ts_us: u64,
            dur_us: u64,
            tid: u64,
            args: Vec<(String, super::Arg)>,
        },
        ThreadName {
            tid: u64,
            name: String,
        },
    }

    struct Sink {
        start: Instant,
        out_path: PathBuf,
        on: AtomicBool,
        events: Mutex<Vec<Event>>,
    }

    static SINK: OnceLock<Sink> = OnceLock::new();
    static NEXT_TID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static TID: u64 = NEXT_TID.fetch_add(1, Ordering::Relaxed);
        static LOCAL: RefCell<Vec<Event>> = const { RefCell::new(Vec::new()) };
    }

    fn active() -> Option<&'static Sink> {
        SINK.get().filter(|s| s.on.load(Ordering::Acquire))
    }

    fn now_us(sink: &Sink) -> u64 {
        sink.start.elapsed().as_micros() as u64
    }

    fn record(sink: &Sink, ev: Event) {
        LOCAL.with(|local| {
            let mut local = local.borrow_mut();
            local.push(ev);
            if local.len() >= FLUSH_EVERY {
                sink.events.lock().append(&mut local);
            }
        });
    }

    /// Initialize the profiler and set the output path.
    pub fn init<P: AsRef<Path>>(path: P) {
        let _ = SINK.set(Sink {
            start: Instant::now(),
            out_path: path.as_ref().to_path_buf(),
            on: AtomicBool::new(true),
            events: Mutex::new(Vec::new()),
        });
    }

    /// Hand this thread's buffered events to the global sink.
    pub fn flush_thread() {
        if let Some(sink) = SINK.get() {
            LOCAL.with(|local| sink.events.lock().append(&mut local.borrow_mut()));
        }
    }

    /// Stop recording and write the Chrome Trace JSON.
    pub fn shutdown() {
        if let Some(sink) = SINK.get() {
            flush_thread();
            sink.on.store(false, Ordering::Release);
            if let Err(e) = write_trace(sink) {
                log::error!("profiler: failed to write {}: {e}", sink.out_path.display());
            }
        }
    }

    fn write_trace(sink: &Sink) -> std::io::Result<()> {
        let events = std::mem::take(&mut *sink.events.lock());

        if let Some(parent) = sink.out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut w = BufWriter::new(File::create(&sink.out_path)?);

        w.write_all(b"{\"traceEvents\":[")?;
        for (i, ev) in events.iter().enumerate() {
            if i > 0 {
                w.write_all(b",")?;
            }
            match ev {
                Event::Span { name, ts_us, dur_us, tid, args } => {
                    w.write_all(b"{\"name\":")?;
                    write_str(&mut w, name)?;
                    write!(
                        w,
                        ",\"cat\":\"dispatch\",\"ph\":\"X\",\"ts\":{ts_us},\"dur\":{dur_us},\"pid\":1,\"tid\":{tid}"
                    )?;
                    if !args.is_empty() {
                        w.write_all(b",\"args\":{")?;
                        for (j, (k, v)) in args.iter().enumerate() {
                            if j > 0 {
                                w.write_all(b",")?;
                            }
                            write_str(&mut w, k)?;
                            w.write_all(b":")?;
                            match v {
                                super::Arg::Str(s) => write_str(&mut w, s)?,
                                super::Arg::U64(x) => write!(w, "{x}")?,
                                super::Arg::I64(x) => write!(w, "{x}")?,
                            }
                        }
                        w.write_all(b"}")?;
                    }
                    w.write_all(b"}")?;
                }
                Event::ThreadName { tid, name } => {
                    write!(w, "{{\"name\":\"thread_name\",\"ph\":\"M\",\"pid\":1,\"tid\":{tid},\"args\":{{\"name\":")?;
                    write_str(&mut w, name)?;
                    w.write_all(b"}}")?;
                }
            }
        }
        w.write_all(b"]}")?;
        w.flush()
    }

    fn write_str<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
        w.write_all(b"\"")?;
        for ch in s.chars() {
            match ch {
                '"' => w.write_all(b"\\\"")?,
                '\\' => w.write_all(b"\\\\")?,
                '\n' => w.write_all(b"\\n")?,
                c if c.is_control() => write!(w, "\\u{:04x}", c as u32)?,
                c => write!(w, "{c}")?,
            }
        }
        w.write_all(b"\"")
    }

    /// Name the calling thread in the trace viewer.
    pub fn thread_name(name: impl Into<String>) {
        if let Some(sink) = active() {
            let tid = TID.with(|t| *t);
            record(sink, Event::ThreadName { tid, name: name.into() });
        }
    }

    /// Open a span that ends when the guard is dropped.
    pub fn span(name: impl Into<super::SpanName>) -> SpanGuard {
        match active() {
            Some(sink) => SpanGuard {
                inner: Some(Open {
                    name: name.into().0.into_owned(),
                    ts0: now_us(sink),
                    args: Vec::new(),
                }),
            },
            None => SpanGuard { inner: None },
        }
    }

    /// Open a span with a formatted name.
    pub fn span_fmt(args: fmt::Arguments<'_>) -> SpanGuard {
        if active().is_none() {
            return SpanGuard { inner: None };
        }
        span(args.to_string())
    }

    struct Open {
        name: String,
        ts0: u64,
        args: Vec<(String, super::Arg)>,
    }

    /// RAII guard recording a complete event on drop.
    pub struct SpanGuard {
        inner: Option<Open>,
    }

    impl SpanGuard {
        /// Attach an argument to this span.
        #[inline]
        pub fn arg(mut self, key: impl Into<String>, value: super::Arg) -> Self {
            if let Some(open) = self.inner.as_mut() {
                open.args.push((key.into(), value));
            }
            self
        }
    }

    impl Drop for SpanGuard {
        fn drop(&mut self) {
            let (Some(open), Some(sink)) = (self.inner.take(), active()) else {
                return;
            };
            let ts1 = now_us(sink);
            record(
                sink,
                Event::Span {
                    name: open.name,
                    ts_us: open.ts0,
                    dur_us: ts1.saturating_sub(open.ts0),
                    tid: TID.with(|t| *t),
                    args: open.args,
                },
            );
        }
    }
}

/// No-op twin used when the `profiling` feature is off.
#[cfg(not(feature = "profiling"))]
mod disabled {
    use super::*;

    /// Initialize profiler (no-op).
    #[inline]
    pub fn init<P: AsRef<Path>>(_path: P) {}

    /// Flush thread buffer (no-op).
    #[inline]
    pub fn flush_thread() {}

    /// Shut down profiler (no-op).
    #[inline]
    pub fn shutdown() {}

    /// Set thread name (no-op).
    #[inline]
    pub fn thread_name(_name: impl Into<String>) {}

    /// Open span (no-op).
    #[inline]
    pub fn span(_name: impl Into<super::SpanName>) -> SpanGuard {
        SpanGuard
    }

    /// Open span with formatted name (no-op).
    #[inline]
    pub fn span_fmt(_args: fmt::Arguments<'_>) -> SpanGuard {
        SpanGuard
    }

    /// No-op span guard.
    pub struct SpanGuard;

    impl SpanGuard {
        /// Attach an argument (no-op).
        #[inline]
        pub fn arg(self, _key: impl Into<String>, _value: super::Arg) -> Self {
            self
        }
    }
}

/// A span name; accepts `&'static str`, `String`, or `Cow<'static, str>`.
pub struct SpanName(pub Cow<'static, str>);

impl From<&'static str> for SpanName {
    fn from(s: &'static str) -> Self {
        SpanName(Cow::Borrowed(s))
    }
}

impl From<String> for SpanName {
    fn from(s: String) -> Self {
        SpanName(Cow::Owned(s))
    }
}

impl From<Cow<'static, str>> for SpanName {
    fn from(s: Cow<'static, str>) -> Self {
        SpanName(s)
    }
}

/// Span argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// UTF-8 string.
    Str(String),

    /// Unsigned integer (step index, thread index, counts).
    U64(u64),

    /// Signed integer (control codes).
    I64(i64),
}

#[cfg(feature = "profiling")]
pub use enabled::{flush_thread, init, shutdown, span, span_fmt, thread_name, SpanGuard};

#[cfg(not(feature = "profiling"))]
pub use disabled::{flush_thread, init, shutdown, span, span_fmt, thread_name, SpanGuard};
