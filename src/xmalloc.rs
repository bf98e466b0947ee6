//! Checked allocation
//!
//! Every operation either hands back a buffer of the requested size or
//! passes an [`AllocFailure`] to the allocator's [`FailureHandler`] exactly
//! once. The default handler raises a fatal diagnostic naming the operation,
//! the size and the caller's location, then exits, so unmodified callers never
//! see an `Err`. Installing [`Recover`] turns failures into
//! [`AllocError::Exhausted`] values instead.
//!
//! Call sites are captured with `#[track_caller]`; nobody passes a file or
//! line by hand.

use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;

use crate::message::Reporter;

/// One failed allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocFailure {
    pub operation: &'static str,
    pub size: usize,
    pub location: &'static Location<'static>,
}

impl fmt::Display for AllocFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to {} {} bytes at {} line {}",
            self.operation,
            self.size,
            self.location.file(),
            self.location.line()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("{0}")]
    Exhausted(AllocFailure),

    #[error("failed to format string at {location}")]
    Format { location: &'static Location<'static> },
}

/// Policy invoked when an allocation cannot be satisfied.
///
/// The returned error is what the caller sees; a handler that terminates the
/// process simply never returns.
pub trait FailureHandler: Send + Sync {
    fn on_failure(&self, failure: AllocFailure) -> AllocError;
}

/// Reports the failure as fatal through a [`Reporter`] and exits.
#[derive(Debug, Clone)]
pub struct DieOnFailure {
    reporter: Reporter,
}

impl DieOnFailure {
    pub fn new(reporter: Reporter) -> Self {
        DieOnFailure { reporter }
    }
}

impl FailureHandler for DieOnFailure {
    fn on_failure(&self, failure: AllocFailure) -> AllocError {
        self.reporter.fatal(Some(libc::ENOMEM), format_args!("{failure}"))
    }
}

/// Records failures and lets the caller recover.
///
/// Recording does not allocate.
#[derive(Debug, Default)]
pub struct Recover {
    count: AtomicUsize,
    last: Mutex<Option<AllocFailure>>,
}

impl Recover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of failures seen so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// The most recent failure, if any.
    pub fn last(&self) -> Option<AllocFailure> {
        *self.last.lock()
    }
}

impl FailureHandler for Recover {
    fn on_failure(&self, failure: AllocFailure) -> AllocError {
        self.count.fetch_add(1, Ordering::Relaxed);
        *self.last.lock() = Some(failure);
        AllocError::Exhausted(failure)
    }
}

static DEFAULT: LazyLock<Allocator> =
    LazyLock::new(|| Allocator::new(Arc::new(DieOnFailure::new(Reporter::global().clone()))));

/// Front end for checked allocation, carrying the failure policy.
#[derive(Clone)]
pub struct Allocator {
    handler: Arc<dyn FailureHandler>,
}

impl Allocator {
    pub fn new(handler: Arc<dyn FailureHandler>) -> Self {
        Allocator { handler }
    }

    #[track_caller]
    fn fail(&self, operation: &'static str, size: usize) -> AllocError {
        self.handler.on_failure(AllocFailure {
            operation,
            size,
            location: Location::caller(),
        })
    }

    /// A zero-filled buffer of exactly `size` bytes.
    #[track_caller]
    pub fn alloc(&self, size: usize) -> Result<Vec<u8>, AllocError> {
        let mut buf = Vec::new();
        if buf.try_reserve_exact(size).is_err() {
            return Err(self.fail("malloc", size));
        }
        buf.resize(size, 0);
        Ok(buf)
    }

    /// A zero-filled buffer of `n * size` bytes. Overflow of the product is
    /// an allocation failure.
    #[track_caller]
    pub fn calloc(&self, n: usize, size: usize) -> Result<Vec<u8>, AllocError> {
        let Some(total) = n.checked_mul(size) else {
            return Err(self.fail("calloc", usize::MAX));
        };
        let mut buf = Vec::new();
        if buf.try_reserve_exact(total).is_err() {
            return Err(self.fail("calloc", total));
        }
        buf.resize(total, 0);
        Ok(buf)
    }

    /// Resize `buf` to `size` bytes, zero-filling any growth. A request for
    /// zero bytes yields a one-byte buffer. On failure `buf` is unchanged.
    #[track_caller]
    pub fn realloc(&self, buf: &mut Vec<u8>, size: usize) -> Result<(), AllocError> {
        let size = size.max(1);
        if size > buf.len() && buf.try_reserve_exact(size - buf.len()).is_err() {
            return Err(self.fail("realloc", size));
        }
        buf.resize(size, 0);
        buf.shrink_to(size);
        Ok(())
    }

    /// Grow `buf` so that `additional` more elements fit, amortized.
    #[track_caller]
    pub fn reserve<T>(&self, buf: &mut Vec<T>, additional: usize) -> Result<(), AllocError> {
        if buf.try_reserve(additional).is_err() {
            let wanted = buf.len().saturating_add(additional);
            return Err(self.fail("realloc", wanted.saturating_mul(size_of::<T>())));
        }
        Ok(())
    }

    /// Grow `buf` so that exactly `additional` more elements fit.
    #[track_caller]
    pub fn reserve_exact<T>(&self, buf: &mut Vec<T>, additional: usize) -> Result<(), AllocError> {
        if buf.try_reserve_exact(additional).is_err() {
            let wanted = buf.len().saturating_add(additional);
            return Err(self.fail("realloc", wanted.saturating_mul(size_of::<T>())));
        }
        Ok(())
    }

    /// An empty string able to hold `size` bytes.
    #[track_caller]
    pub fn string(&self, size: usize) -> Result<String, AllocError> {
        let mut out = String::new();
        if out.try_reserve_exact(size).is_err() {
            return Err(self.fail("malloc", size));
        }
        Ok(out)
    }

    #[track_caller]
    pub fn strdup(&self, s: &str) -> Result<String, AllocError> {
        let mut out = String::new();
        if out.try_reserve_exact(s.len()).is_err() {
            return Err(self.fail("strdup", s.len()));
        }
        out.push_str(s);
        Ok(out)
    }

    /// Copy at most `n` bytes of `bytes`, stopping at the first nul byte.
    /// Invalid UTF-8 is replaced.
    #[track_caller]
    pub fn strndup(&self, bytes: &[u8], n: usize) -> Result<String, AllocError> {
        let limit = n.min(bytes.len());
        let end = bytes[..limit].iter().position(|&b| b == 0).unwrap_or(limit);
        let text = String::from_utf8_lossy(&bytes[..end]);
        let mut out = String::new();
        if out.try_reserve_exact(text.len()).is_err() {
            return Err(self.fail("strndup", text.len()));
        }
        out.push_str(&text);
        Ok(out)
    }

    /// Build a string from `format_args!`.
    ///
    /// A `Display` impl that reports an error yields [`AllocError::Format`]
    /// without involving the failure handler; running out of memory goes
    /// through the handler like every other operation.
    #[track_caller]
    pub fn format(&self, args: fmt::Arguments<'_>) -> Result<String, AllocError> {
        let mut out = CheckedString::default();
        if fmt::write(&mut out, args).is_ok() {
            return Ok(out.buf);
        }
        match out.exhausted {
            Some(size) => Err(self.fail("format", size)),
            None => Err(AllocError::Format {
                location: Location::caller(),
            }),
        }
    }

    /// Concatenate `parts` into one newly allocated string.
    #[track_caller]
    pub fn concat(&self, parts: &[&str]) -> Result<String, AllocError> {
        let size = parts.iter().fold(0usize, |acc, p| acc.saturating_add(p.len()));
        let mut out = self.string(size)?;
        for part in parts {
            out.push_str(part);
        }
        Ok(out)
    }

    /// Join `base` and `name` with a slash. An absolute `name` is returned
    /// as is; a missing `base` means the current directory.
    #[track_caller]
    pub fn concat_path(&self, base: Option<&str>, name: &str) -> Result<String, AllocError> {
        if name.starts_with('/') {
            return self.strdup(name);
        }
        self.concat(&[base.unwrap_or("."), "/", name])
    }
}

impl Default for Allocator {
    /// The process-wide allocator: fatal on failure through
    /// [`Reporter::global`].
    fn default() -> Self {
        DEFAULT.clone()
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator").finish_non_exhaustive()
    }
}

#[derive(Default)]
struct CheckedString {
    buf: String,
    exhausted: Option<usize>,
}

impl fmt::Write for CheckedString {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.buf.try_reserve(s.len()).is_err() {
            self.exhausted = Some(self.buf.len().saturating_add(s.len()));
            return Err(fmt::Error);
        }
        self.buf.push_str(s);
        Ok(())
    }
}
