//! Provides logging utilities, used by application.
//!
//! Library code logs through the [`log`] facade, so embedding applications
//! are free to use any logger. [`init`] installs the JSON dual logger as the
//! global one and bridges [`log`] records into it.
//!
//! [`log`]: https://docs.rs/log

use std::io;

use chrono::Local;
use slog::{
    o, Discard, Drain, Duplicate, FnValue, Fuse, Level, Logger, PushFnValue,
    Record,
};
use slog_async::Async;
use slog_json::Json;
use slog_scope::GlobalLoggerGuard;

use crate::conf;

/// Builds JSON [`Logger`] which prints all its log records to `w_out` writer,
/// but WARN level (and higher) to `w_err` writer. Logger will use [`Async`]
/// drain with channel size of 2048 entries and
/// [`OverflowStrategy::DropAndReport`][1].
///
/// Records below the provided `level` are dropped. [`None`] level disables
/// logging at all.
///
/// Created [`Logger`] produces log records with `fqn`, `lvl`, `time` and `msg`
/// fields by default.
///
/// [1]: slog_async::OverflowStrategy::DropAndReport
pub fn new_dual_logger<W1, W2>(
    w_out: W1,
    w_err: W2,
    level: Option<Level>,
) -> Logger
where
    W1: io::Write + Send + 'static,
    W2: io::Write + Send + 'static,
{
    let level = match level {
        Some(level) => level,
        None => return Logger::root(Discard, o!()),
    };

    let drain_out = Json::new(w_out).build();
    let drain_err = Json::new(w_err).build();
    let drain = Duplicate(
        drain_out.filter(|r| !r.level().is_at_least(Level::Warning)),
        drain_err.filter_level(Level::Warning),
    )
    .map(Fuse)
    .filter_level(level)
    .fuse();
    let drain = Async::new(drain).chan_size(2048).build().fuse();
    add_default_keys(&Logger::root(drain, o!()))
}

/// Installs the JSON dual logger writing to stdout/stderr as the global
/// [`slog_scope`] logger and redirects [`log`] records into it.
///
/// Returned [`GlobalLoggerGuard`] must be kept alive while logging is used.
///
/// # Errors
///
/// If some other [`log`] logger has been set already.
///
/// [`log`]: https://docs.rs/log
pub fn init(
    conf: &conf::Log,
) -> Result<GlobalLoggerGuard, ::log::SetLoggerError> {
    let logger =
        new_dual_logger(io::stdout(), io::stderr(), conf.level());
    let guard = slog_scope::set_global_logger(logger);
    slog_stdlog::init()?;
    Ok(guard)
}

/// Adds default log record data (key-value pairs) to specified [`Logger`]:
/// - `msg`: log record message.
/// - `fqn`: path to code line that called log function.
/// - `time`: creation date and time of log record in [RFC 3339] format.
/// - `lvl`: logging level of log record.
///
/// [RFC 3339]: https://www.ietf.org/rfc/rfc3339.txt
fn add_default_keys(logger: &Logger) -> Logger {
    logger.new(o!(
        "msg" => PushFnValue(move |record : &Record, ser| {
            ser.emit(record.msg())
        }),
        "fqn" => PushFnValue(move |record : &Record, ser| {
             ser.emit(format_args!("{}:{}", record.module(), record.line()))
        }),
        "time" => PushFnValue(move |_ : &Record, ser| {
            ser.emit(Local::now().to_rfc3339())
        }),
        "lvl" => FnValue(move |rinfo : &Record| {
            rinfo.level().as_str()
        }),
    ))
}
