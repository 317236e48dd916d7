/// Chrome Trace (flame-style) profiler for dispatcher runs.
///
/// With the `profiling` feature enabled the dispatcher records one span per
/// run, per worker loop, and per barrier section, and writes them as Chrome
/// Trace Event JSON that can be opened in:
///
/// - `chrome://tracing`
/// - <https://ui.perfetto.dev>
///
/// ```bash
/// cargo test --features profiling
/// ```
///
/// Without the feature every call compiles to a no-op.
///
/// ```no_run
/// use lockstep::profiler;
///
/// profiler::init("profile/trace.json");
/// {
///     let _g = profiler::span("warmup");
/// }
/// profiler::shutdown();
/// ```
pub mod profiler;
