//! Growable string sequences
//!
//! [`Vector`] owns independent copies of its strings. [`CVector`] borrows
//! slices of caller memory for `'a`; splitting into one copies nothing.
//! Both grow geometrically on append, keep their capacity across
//! [`clear`](Vector::clear), and route every allocation through an
//! [`Allocator`].
//!
//! ```
//! use rutil::Vector;
//!
//! let v = Vector::split("a::b", ':').unwrap();
//! assert_eq!(v.len(), 3);
//! assert_eq!(v.join(":").unwrap(), "a::b");
//! ```

use std::ffi::CString;
use std::io;
use std::ops::Index;
use std::ptr;

use crate::xmalloc::{AllocError, Allocator};

fn is_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn exact_count(s: &str, sep: char) -> usize {
    if s.is_empty() { 0 } else { s.matches(sep).count() + 1 }
}

fn space_count(s: &str) -> usize {
    s.split(is_space).filter(|p| !p.is_empty()).count()
}

#[track_caller]
fn join_with<S: AsRef<str>>(alloc: &Allocator, items: &[S], sep: &str) -> Result<String, AllocError> {
    let Some((first, rest)) = items.split_first() else {
        return Ok(String::new());
    };
    let size = items
        .iter()
        .fold(sep.len().saturating_mul(rest.len()), |acc, s| acc.saturating_add(s.as_ref().len()));
    let mut out = alloc.string(size)?;
    out.push_str(first.as_ref());
    for item in rest {
        out.push_str(sep);
        out.push_str(item.as_ref());
    }
    Ok(out)
}

/// Replace the current process image, `execv` style. Returns only on
/// failure.
fn execv<'s, I>(path: &str, args: I) -> io::Error
where
    I: IntoIterator<Item = &'s str>,
{
    let path = match CString::new(path) {
        Ok(path) => path,
        Err(err) => return io::Error::new(io::ErrorKind::InvalidInput, err),
    };
    let args = match args.into_iter().map(CString::new).collect::<Result<Vec<_>, _>>() {
        Ok(args) => args,
        Err(err) => return io::Error::new(io::ErrorKind::InvalidInput, err),
    };
    let mut argv: Vec<*const libc::c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
    argv.push(ptr::null());

    // SAFETY: path and every argv entry are live nul-terminated strings and
    // argv ends with a null pointer.
    unsafe { libc::execv(path.as_ptr(), argv.as_ptr()) };
    io::Error::last_os_error()
}

/// A sequence of owned strings.
#[derive(Clone)]
pub struct Vector {
    strings: Vec<String>,
    alloc: Allocator,
}

impl Vector {
    pub fn new() -> Self {
        Self::with_allocator(Allocator::default())
    }

    pub fn with_allocator(alloc: Allocator) -> Self {
        Vector {
            strings: Vec::new(),
            alloc,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Number of entries that fit before the next reallocation.
    pub fn capacity(&self) -> usize {
        self.strings.capacity()
    }

    /// The entry at `index`, or None past the end.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.strings
    }

    #[track_caller]
    fn grow(&mut self) -> Result<(), AllocError> {
        if self.strings.len() == self.strings.capacity() {
            self.alloc.reserve(&mut self.strings, 1)?;
        }
        Ok(())
    }

    /// Append a copy of `s`.
    #[track_caller]
    pub fn add(&mut self, s: &str) -> Result<(), AllocError> {
        self.grow()?;
        let copy = self.alloc.strdup(s)?;
        self.strings.push(copy);
        Ok(())
    }

    /// Append the first `len` bytes of `bytes`, embedded nul bytes included.
    /// Invalid UTF-8 is replaced.
    #[track_caller]
    pub fn add_n(&mut self, bytes: &[u8], len: usize) -> Result<(), AllocError> {
        let end = len.min(bytes.len());
        let text = String::from_utf8_lossy(&bytes[..end]);
        self.add(&text)
    }

    /// Make room for `size` entries in total. Never drops live entries.
    #[track_caller]
    pub fn resize(&mut self, size: usize) -> Result<(), AllocError> {
        if size > self.strings.capacity() {
            let additional = size - self.strings.len();
            self.alloc.reserve_exact(&mut self.strings, additional)?;
        }
        Ok(())
    }

    /// Drop every entry, keeping the capacity for reuse.
    pub fn clear(&mut self) {
        self.strings.clear();
    }

    /// Split `s` on every `sep`. Empty fields are kept; an empty `s` gives
    /// an empty vector.
    #[track_caller]
    pub fn split(s: &str, sep: char) -> Result<Self, AllocError> {
        let mut vector = Self::new();
        vector.split_into(s, sep)?;
        Ok(vector)
    }

    /// Like [`split`](Self::split), reusing this vector's storage.
    #[track_caller]
    pub fn split_into(&mut self, s: &str, sep: char) -> Result<(), AllocError> {
        self.clear();
        self.resize(exact_count(s, sep))?;
        if s.is_empty() {
            return Ok(());
        }
        for field in s.split(sep) {
            self.add(field)?;
        }
        Ok(())
    }

    /// Split `s` on runs of spaces and tabs, dropping empty fields.
    #[track_caller]
    pub fn split_space(s: &str) -> Result<Self, AllocError> {
        let mut vector = Self::new();
        vector.split_space_into(s)?;
        Ok(vector)
    }

    #[track_caller]
    pub fn split_space_into(&mut self, s: &str) -> Result<(), AllocError> {
        self.clear();
        self.resize(space_count(s))?;
        for field in s.split(is_space).filter(|p| !p.is_empty()) {
            self.add(field)?;
        }
        Ok(())
    }

    /// Join the entries with `sep` between each pair.
    #[track_caller]
    pub fn join(&self, sep: &str) -> Result<String, AllocError> {
        join_with(&self.alloc, &self.strings, sep)
    }

    /// Run `path` with this vector as its argument list. Returns only if
    /// `execv` fails, with its error.
    pub fn exec(&self, path: &str) -> io::Error {
        execv(path, self.iter())
    }
}

impl Default for Vector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Vector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.strings).finish()
    }
}

impl PartialEq for Vector {
    fn eq(&self, other: &Self) -> bool {
        self.strings == other.strings
    }
}

impl Eq for Vector {}

impl Index<usize> for Vector {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.strings[index]
    }
}

impl<'v> IntoIterator for &'v Vector {
    type Item = &'v str;
    type IntoIter = std::iter::Map<std::slice::Iter<'v, String>, fn(&String) -> &str>;

    fn into_iter(self) -> Self::IntoIter {
        self.strings.iter().map(String::as_str as fn(&String) -> &str)
    }
}

/// A sequence of strings borrowed from the caller.
#[derive(Clone)]
pub struct CVector<'a> {
    strings: Vec<&'a str>,
    alloc: Allocator,
}

impl<'a> CVector<'a> {
    pub fn new() -> Self {
        Self::with_allocator(Allocator::default())
    }

    pub fn with_allocator(alloc: Allocator) -> Self {
        CVector {
            strings: Vec::new(),
            alloc,
        }
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.strings.capacity()
    }

    /// The entry at `index`, borrowed from the original buffer.
    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.strings.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.strings.iter().copied()
    }

    pub fn as_slice(&self) -> &[&'a str] {
        &self.strings
    }

    /// Append `s` without copying it.
    #[track_caller]
    pub fn add(&mut self, s: &'a str) -> Result<(), AllocError> {
        if self.strings.len() == self.strings.capacity() {
            self.alloc.reserve(&mut self.strings, 1)?;
        }
        self.strings.push(s);
        Ok(())
    }

    #[track_caller]
    pub fn resize(&mut self, size: usize) -> Result<(), AllocError> {
        if size > self.strings.capacity() {
            let additional = size - self.strings.len();
            self.alloc.reserve_exact(&mut self.strings, additional)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.strings.clear();
    }

    /// Split `s` on every `sep`; the entries are slices of `s`.
    #[track_caller]
    pub fn split(s: &'a str, sep: char) -> Result<Self, AllocError> {
        let mut vector = Self::new();
        vector.split_into(s, sep)?;
        Ok(vector)
    }

    #[track_caller]
    pub fn split_into(&mut self, s: &'a str, sep: char) -> Result<(), AllocError> {
        self.clear();
        self.resize(exact_count(s, sep))?;
        if s.is_empty() {
            return Ok(());
        }
        for field in s.split(sep) {
            self.add(field)?;
        }
        Ok(())
    }

    #[track_caller]
    pub fn split_space(s: &'a str) -> Result<Self, AllocError> {
        let mut vector = Self::new();
        vector.split_space_into(s)?;
        Ok(vector)
    }

    #[track_caller]
    pub fn split_space_into(&mut self, s: &'a str) -> Result<(), AllocError> {
        self.clear();
        self.resize(space_count(s))?;
        for field in s.split(is_space).filter(|p| !p.is_empty()) {
            self.add(field)?;
        }
        Ok(())
    }

    #[track_caller]
    pub fn join(&self, sep: &str) -> Result<String, AllocError> {
        join_with(&self.alloc, &self.strings, sep)
    }

    pub fn exec(&self, path: &str) -> io::Error {
        execv(path, self.iter())
    }

    /// Copy every entry into an owning [`Vector`].
    #[track_caller]
    pub fn to_vector(&self) -> Result<Vector, AllocError> {
        let mut vector = Vector::with_allocator(self.alloc.clone());
        vector.resize(self.len())?;
        for s in self.iter() {
            vector.add(s)?;
        }
        Ok(vector)
    }
}

impl Default for CVector<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CVector<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.strings).finish()
    }
}

impl Index<usize> for CVector<'_> {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        self.strings[index]
    }
}
