//! Built-in handlers
//!
//! Stream sinks write `[<program>: ]<message>[: <error text>]\n`. Syslog sinks
//! pass the message, with the error suffix, through at a fixed priority.

use std::ffi::CString;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Handler, Record, Severity};

fn write_line<W: Write>(out: &mut W, record: &Record<'_>) -> io::Result<()> {
    if let Some(program) = record.program {
        write!(out, "{program}: ")?;
    }
    writeln!(out, "{record}")
}

/// Writes to standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stdout;

impl Handler for Stdout {
    fn handle(&self, record: &Record<'_>) {
        let mut out = io::stdout().lock();
        let _ = write_line(&mut out, record);
        let _ = out.flush();
    }
}

/// Writes to standard error, flushing standard output first so interleaved
/// output keeps its order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stderr;

impl Handler for Stderr {
    fn handle(&self, record: &Record<'_>) {
        let _ = io::stdout().flush();
        let mut err = io::stderr().lock();
        let _ = write_line(&mut err, record);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyslogPriority {
    Debug,
    Info,
    Notice,
    Warning,
    Err,
    Crit,
}

impl SyslogPriority {
    pub fn as_raw(self) -> libc::c_int {
        match self {
            SyslogPriority::Debug => libc::LOG_DEBUG,
            SyslogPriority::Info => libc::LOG_INFO,
            SyslogPriority::Notice => libc::LOG_NOTICE,
            SyslogPriority::Warning => libc::LOG_WARNING,
            SyslogPriority::Err => libc::LOG_ERR,
            SyslogPriority::Crit => libc::LOG_CRIT,
        }
    }
}

/// Sends messages to the system log at a fixed priority.
///
/// The log identity and facility are whatever the program set with
/// `openlog`, or the platform default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Syslog {
    priority: SyslogPriority,
}

impl Syslog {
    pub const fn new(priority: SyslogPriority) -> Self {
        Syslog { priority }
    }

    pub const fn debug() -> Self {
        Self::new(SyslogPriority::Debug)
    }

    pub const fn info() -> Self {
        Self::new(SyslogPriority::Info)
    }

    pub const fn notice() -> Self {
        Self::new(SyslogPriority::Notice)
    }

    pub const fn warning() -> Self {
        Self::new(SyslogPriority::Warning)
    }

    pub const fn err() -> Self {
        Self::new(SyslogPriority::Err)
    }

    pub const fn crit() -> Self {
        Self::new(SyslogPriority::Crit)
    }

    pub fn priority(&self) -> SyslogPriority {
        self.priority
    }
}

impl Handler for Syslog {
    fn handle(&self, record: &Record<'_>) {
        let text = record.to_string().replace('\0', " ");
        let Ok(text) = CString::new(text) else {
            return;
        };
        // SAFETY: both pointers are valid nul-terminated strings and the
        // format consumes exactly one string argument.
        unsafe { libc::syslog(self.priority.as_raw(), c"%s".as_ptr(), text.as_ptr()) };
    }
}

/// Accumulates `"<severity> <message>\n"` lines in memory.
///
/// Clones share the same buffer, so a test suite can install one clone as a
/// handler and keep another to collect the output.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    buf: Arc<Mutex<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return everything captured so far and start over with an empty buffer.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.buf.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.buf.lock().is_empty()
    }
}

impl Handler for BufferSink {
    fn handle(&self, record: &Record<'_>) {
        let mut buf = self.buf.lock();
        let _ = writeln!(buf, "{} {record}", record.severity);
    }
}

/// Forwards diagnostics into `tracing`: debug to DEBUG, notice to INFO,
/// warn to WARN, die to ERROR.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl Handler for TracingSink {
    fn handle(&self, record: &Record<'_>) {
        let program = record.program.unwrap_or_default();
        match record.severity {
            Severity::Debug => tracing::debug!(target: "rutil::message", program, "{record}"),
            Severity::Notice => tracing::info!(target: "rutil::message", program, "{record}"),
            Severity::Warn => tracing::warn!(target: "rutil::message", program, "{record}"),
            Severity::Die => tracing::error!(target: "rutil::message", program, "{record}"),
        }
    }
}
