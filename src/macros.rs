// Writes a single line to a `Logger`. Loggers that do not want output return
// `None` from `line_writer`, so formatting is skipped for them.
macro_rules! log {
    ($logger:expr, $($arg:tt)*) => {{
        if !cfg!(feature = "no_logging") {
            if let Some(w) = $logger.line_writer() {
                let _ = std::io::Write::write_fmt(w, format_args!($($arg)*));
                let _ = std::io::Write::write_all(w, b"\n");
            }
        }
    }};
}

// Tracing of the executor and the symbolic processor. Compiled to nothing
// unless the `trace_exec` feature is enabled.
macro_rules! debug_log {
    ($target:literal, $($arg:tt)*) => {{
        if cfg!(feature = "trace_exec") {
            log::trace!(target: $target, $($arg)*);
        }
    }};
}
