//! Diagnostic reporting
//!
//! A [`Reporter`] owns one ordered chain of [`Handler`]s per [`Severity`].
//! Raising a diagnostic formats nothing up front: every handler in the chain
//! receives the same [`Record`] carrying the raw `fmt::Arguments`, the length
//! of the formatted message and, for the `sys*` variants, the OS error number
//! captured at the point of the call.
//!
//! ```
//! use std::sync::Arc;
//! use rutil::message::{BufferSink, Handler, Reporter, Severity};
//!
//! let reporter = Reporter::silent();
//! let sink = BufferSink::new();
//! reporter.set_handlers(Severity::Warn, [Arc::new(sink.clone()) as Arc<dyn Handler>]);
//! reporter.warn(format_args!("cannot open {}", "config"));
//! assert_eq!(sink.take(), "warn cannot open config\n");
//! ```

mod sinks;

pub use sinks::{BufferSink, Stderr, Stdout, Syslog, SyslogPriority, TracingSink};

use std::ffi::CStr;
use std::fmt;
use std::io;
use std::process;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

/// Exit status used by a fatal diagnostic when no cleanup hook is installed.
pub const FATAL_STATUS: i32 = 1;

/// Diagnostic severity, one sink chain each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Debug,
    Notice,
    Warn,
    Die,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Debug, Severity::Notice, Severity::Warn, Severity::Die];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Notice => "notice",
            Severity::Warn => "warn",
            Severity::Die => "die",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single raised diagnostic as seen by a handler.
///
/// Displaying a record writes the message followed by `": <error text>"`
/// when an error number was captured. The program-name prefix is left to the
/// sinks that want it.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub severity: Severity,
    /// Length in bytes of the formatted message, without any suffix.
    pub len: usize,
    pub args: fmt::Arguments<'a>,
    pub errnum: Option<i32>,
    pub program: Option<&'a str>,
}

impl Record<'_> {
    /// The platform text for the captured error, if any.
    pub fn error_text(&self) -> Option<ErrorText> {
        self.errnum.map(ErrorText)
    }
}

impl fmt::Display for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(self.args)?;
        if let Some(text) = self.error_text() {
            write!(f, ": {text}")?;
        }
        Ok(())
    }
}

/// A sink in a chain.
///
/// Handlers may run concurrently when diagnostics are raised from several
/// threads, so implementations must be reentrant.
pub trait Handler: Send + Sync {
    fn handle(&self, record: &Record<'_>);
}

impl<F> Handler for F
where
    F: Fn(&Record<'_>) + Send + Sync,
{
    fn handle(&self, record: &Record<'_>) {
        self(record)
    }
}

/// Hook run before a fatal diagnostic exits; returns the exit status.
pub type FatalCleanup = Arc<dyn Fn() -> i32 + Send + Sync>;

/// Swapped whole on reconfiguration; a snapshot is a reference count bump.
type Chain = Arc<[Arc<dyn Handler>]>;

struct State {
    chains: [Chain; 4],
    program_name: Option<Arc<str>>,
    fatal_cleanup: Option<FatalCleanup>,
}

/// Runtime context for diagnostics: sink chains, program name and fatal
/// cleanup hook.
///
/// Cloning is cheap and clones share state. Configuration calls swap whole
/// chains; raising clones the chain out of the lock before running handlers,
/// so a handler may itself reconfigure the reporter.
#[derive(Clone)]
pub struct Reporter {
    state: Arc<RwLock<State>>,
}

static GLOBAL: LazyLock<Reporter> = LazyLock::new(Reporter::new);

impl Reporter {
    /// A reporter with the standard chains: debug discarded, notice to
    /// stdout, warn and die to stderr.
    pub fn new() -> Self {
        let reporter = Self::silent();
        reporter.set_handlers(Severity::Notice, [Arc::new(Stdout) as Arc<dyn Handler>]);
        reporter.set_handlers(Severity::Warn, [Arc::new(Stderr) as Arc<dyn Handler>]);
        reporter.set_handlers(Severity::Die, [Arc::new(Stderr) as Arc<dyn Handler>]);
        reporter
    }

    /// A reporter with every chain empty.
    pub fn silent() -> Self {
        Reporter {
            state: Arc::new(RwLock::new(State {
                chains: Default::default(),
                program_name: None,
                fatal_cleanup: None,
            })),
        }
    }

    /// The process-wide reporter used by components not given their own.
    pub fn global() -> &'static Reporter {
        &GLOBAL
    }

    /// Replace the chain for `severity`. An empty chain silences it.
    pub fn set_handlers<I>(&self, severity: Severity, handlers: I)
    where
        I: IntoIterator<Item = Arc<dyn Handler>>,
    {
        let chain: Chain = handlers.into_iter().collect();
        self.state.write().chains[severity.index()] = chain;
    }

    /// Number of handlers currently installed for `severity`.
    pub fn handler_count(&self, severity: Severity) -> usize {
        self.state.read().chains[severity.index()].len()
    }

    /// Set the prefix written by the stream sinks as `"<name>: "`.
    pub fn set_program_name(&self, name: Option<&str>) {
        self.state.write().program_name = name.map(Arc::from);
    }

    /// The program name set with [`set_program_name`](Self::set_program_name).
    pub fn program_name(&self) -> Option<Arc<str>> {
        self.state.read().program_name.clone()
    }

    /// Install the hook run after the die chain; its return value becomes
    /// the exit status.
    pub fn set_fatal_cleanup<F>(&self, hook: F)
    where
        F: Fn() -> i32 + Send + Sync + 'static,
    {
        self.state.write().fatal_cleanup = Some(Arc::new(hook));
    }

    /// Remove the cleanup hook; fatal diagnostics exit with [`FATAL_STATUS`].
    pub fn clear_fatal_cleanup(&self) {
        self.state.write().fatal_cleanup = None;
    }

    /// Dispatch a diagnostic to every handler of `severity`, in order.
    ///
    /// Dispatch itself does not allocate, nor do the stream sinks.
    pub fn raise(&self, severity: Severity, errnum: Option<i32>, args: fmt::Arguments<'_>) {
        let (chain, program) = {
            let state = self.state.read();
            let chain = &state.chains[severity.index()];
            if chain.is_empty() {
                return;
            }
            (chain.clone(), state.program_name.clone())
        };

        let record = Record {
            severity,
            len: formatted_len(args),
            args,
            errnum,
            program: program.as_deref(),
        };
        for handler in chain.iter() {
            handler.handle(&record);
        }
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.raise(Severity::Debug, None, args);
    }

    pub fn notice(&self, args: fmt::Arguments<'_>) {
        self.raise(Severity::Notice, None, args);
    }

    /// Like [`notice`](Self::notice), with the last OS error appended.
    pub fn sysnotice(&self, args: fmt::Arguments<'_>) {
        let errnum = last_errno();
        self.raise(Severity::Notice, errnum, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.raise(Severity::Warn, None, args);
    }

    /// Like [`warn`](Self::warn), with the last OS error appended.
    pub fn syswarn(&self, args: fmt::Arguments<'_>) {
        let errnum = last_errno();
        self.raise(Severity::Warn, errnum, args);
    }

    pub fn die(&self, args: fmt::Arguments<'_>) -> ! {
        self.fatal(None, args)
    }

    /// Like [`die`](Self::die), with the last OS error appended.
    pub fn sysdie(&self, args: fmt::Arguments<'_>) -> ! {
        let errnum = last_errno();
        self.fatal(errnum, args)
    }

    /// Run the die chain and the cleanup hook, then exit.
    pub fn fatal(&self, errnum: Option<i32>, args: fmt::Arguments<'_>) -> ! {
        self.raise(Severity::Die, errnum, args);
        process::exit(self.fatal_status())
    }

    fn fatal_status(&self) -> i32 {
        let hook = self.state.read().fatal_cleanup.clone();
        hook.map_or(FATAL_STATUS, |hook| hook())
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Reporter")
            .field("debug", &state.chains[0].len())
            .field("notice", &state.chains[1].len())
            .field("warn", &state.chains[2].len())
            .field("die", &state.chains[3].len())
            .field("program_name", &state.program_name)
            .field("fatal_cleanup", &state.fatal_cleanup.is_some())
            .finish()
    }
}

fn last_errno() -> Option<i32> {
    io::Error::last_os_error().raw_os_error()
}

struct Counter(usize);

impl fmt::Write for Counter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

fn formatted_len(args: fmt::Arguments<'_>) -> usize {
    let mut counter = Counter(0);
    let _ = fmt::write(&mut counter, args);
    counter.0
}

/// Platform text for an OS error number, rendered from a stack buffer.
///
/// Formatting an `ErrorText` does not allocate, so the die chain can report
/// an exhausted allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorText(pub i32);

impl fmt::Display for ErrorText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = [0 as libc::c_char; 256];
        // SAFETY: buf is writable for its full length and strerror_r nul
        // terminates on success.
        let rc = unsafe { libc::strerror_r(self.0, buf.as_mut_ptr(), buf.len()) };
        if rc != 0 {
            return write!(f, "Unknown error {}", self.0);
        }
        // SAFETY: see above.
        let text = unsafe { CStr::from_ptr(buf.as_ptr()) };
        match text.to_str() {
            Ok(text) => f.write_str(text),
            Err(_) => write!(f, "Unknown error {}", self.0),
        }
    }
}

/// Platform text for an OS error number, as `strerror` renders it.
pub fn strerror(errnum: i32) -> String {
    ErrorText(errnum).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Arc<dyn Handler> {
        let log = Arc::clone(log);
        Arc::new(move |record: &Record<'_>| {
            log.lock().push(format!("{tag}:{record}"));
        })
    }

    #[test]
    fn test_chain_runs_in_order() {
        let reporter = Reporter::silent();
        let log = Arc::new(Mutex::new(Vec::new()));
        reporter.set_handlers(Severity::Warn, [recorder(&log, "first"), recorder(&log, "second")]);

        reporter.warn(format_args!("disk {}", "full"));
        assert_eq!(*log.lock(), ["first:disk full", "second:disk full"]);

        reporter.warn(format_args!("again"));
        assert_eq!(log.lock().len(), 4);
    }

    #[test]
    fn test_replacing_one_chain_keeps_others() {
        let reporter = Reporter::silent();
        let log = Arc::new(Mutex::new(Vec::new()));
        reporter.set_handlers(Severity::Notice, [recorder(&log, "notice")]);
        reporter.set_handlers(Severity::Warn, [recorder(&log, "old")]);
        reporter.set_handlers(Severity::Warn, [recorder(&log, "new")]);

        reporter.warn(format_args!("w"));
        reporter.notice(format_args!("n"));
        assert_eq!(*log.lock(), ["new:w", "notice:n"]);
        assert_eq!(reporter.handler_count(Severity::Notice), 1);
    }

    #[test]
    fn test_empty_chain_is_silent() {
        let reporter = Reporter::silent();
        let log = Arc::new(Mutex::new(Vec::new()));
        reporter.set_handlers(Severity::Debug, [recorder(&log, "debug")]);
        reporter.set_handlers(Severity::Debug, Vec::<Arc<dyn Handler>>::new());
        reporter.debug(format_args!("dropped"));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_record_fields() {
        let reporter = Reporter::silent();
        reporter.set_program_name(Some("remctld"));
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        reporter.set_handlers(
            Severity::Notice,
            [Arc::new(move |record: &Record<'_>| {
                *slot.lock() = Some((record.severity, record.len, record.errnum, record.program.map(String::from)));
            }) as Arc<dyn Handler>],
        );

        reporter.raise(Severity::Notice, Some(libc::ENOENT), format_args!("{}-{}", "ab", 12));
        let seen = seen.lock().clone().unwrap();
        assert_eq!(seen, (Severity::Notice, 5, Some(libc::ENOENT), Some("remctld".to_string())));
    }

    #[test]
    fn test_sys_suffix() {
        let reporter = Reporter::silent();
        let sink = BufferSink::new();
        reporter.set_handlers(Severity::Warn, [Arc::new(sink.clone()) as Arc<dyn Handler>]);
        reporter.raise(Severity::Warn, Some(libc::ENOENT), format_args!("cannot open foo"));
        assert_eq!(sink.take(), format!("warn cannot open foo: {}\n", strerror(libc::ENOENT)));
    }

    #[test]
    fn test_handler_may_reconfigure() {
        let reporter = Reporter::silent();
        let inner = reporter.clone();
        reporter.set_handlers(
            Severity::Warn,
            [Arc::new(move |_: &Record<'_>| inner.set_handlers(Severity::Warn, Vec::<Arc<dyn Handler>>::new())) as Arc<dyn Handler>],
        );
        reporter.warn(format_args!("once"));
        assert_eq!(reporter.handler_count(Severity::Warn), 0);
    }

    #[test]
    fn test_fatal_status() {
        let reporter = Reporter::silent();
        assert_eq!(reporter.fatal_status(), FATAL_STATUS);
        reporter.set_fatal_cleanup(|| 7);
        assert_eq!(reporter.fatal_status(), 7);
        reporter.clear_fatal_cleanup();
        assert_eq!(reporter.fatal_status(), FATAL_STATUS);
    }

    #[test]
    fn test_default_chains() {
        let reporter = Reporter::new();
        assert_eq!(reporter.handler_count(Severity::Debug), 0);
        assert_eq!(reporter.handler_count(Severity::Notice), 1);
        assert_eq!(reporter.handler_count(Severity::Warn), 1);
        assert_eq!(reporter.handler_count(Severity::Die), 1);
    }

    #[test]
    fn test_strerror() {
        assert!(!strerror(libc::EINVAL).is_empty());
        assert_ne!(strerror(libc::EINVAL), strerror(libc::ENOENT));
        assert_eq!(ErrorText(libc::ENOENT).to_string(), strerror(libc::ENOENT));
    }

    fn errno_sink(reporter: &Reporter, severity: Severity) -> (BufferSink, Arc<Mutex<Vec<Option<i32>>>>) {
        let sink = BufferSink::new();
        let errnums = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&errnums);
        reporter.set_handlers(
            severity,
            [
                Arc::new(sink.clone()) as Arc<dyn Handler>,
                Arc::new(move |record: &Record<'_>| seen.lock().push(record.errnum)) as Arc<dyn Handler>,
            ],
        );
        (sink, errnums)
    }

    fn fail_open() {
        let err = std::fs::File::open("/nonexistent/rutil").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn test_syswarn_captures_errno() {
        let reporter = Reporter::silent();
        let (sink, errnums) = errno_sink(&reporter, Severity::Warn);

        fail_open();
        reporter.syswarn(format_args!("cannot open {}", "/nonexistent/rutil"));

        assert_eq!(sink.take(), format!("warn cannot open /nonexistent/rutil: {}\n", strerror(libc::ENOENT)));
        assert_eq!(*errnums.lock(), [Some(libc::ENOENT)]);
    }

    #[test]
    fn test_sysnotice_captures_errno() {
        let reporter = Reporter::silent();
        let (sink, errnums) = errno_sink(&reporter, Severity::Notice);

        fail_open();
        reporter.sysnotice(format_args!("config missing"));
        reporter.notice(format_args!("using defaults"));

        let expected = format!("notice config missing: {}\nnotice using defaults\n", strerror(libc::ENOENT));
        assert_eq!(sink.take(), expected);
        assert_eq!(*errnums.lock(), [Some(libc::ENOENT), None]);
    }

    #[test]
    fn test_record_error_text() {
        let reporter = Reporter::silent();
        let texts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&texts);
        reporter.set_handlers(
            Severity::Warn,
            [Arc::new(move |record: &Record<'_>| seen.lock().push(record.error_text())) as Arc<dyn Handler>],
        );

        reporter.raise(Severity::Warn, Some(libc::EACCES), format_args!("denied"));
        reporter.warn(format_args!("plain"));
        assert_eq!(*texts.lock(), [Some(ErrorText(libc::EACCES)), None]);
    }
}
