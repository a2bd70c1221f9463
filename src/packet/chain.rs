//! Bounded, ordered list of decoded headers.

use super::{Header, MAX_HEADERS};
use crate::{Error, Result};

/// Headers in decode order, never more than [`MAX_HEADERS`]
///
/// Backed by a `Vec` reserved once; `clear` keeps the allocation so a
/// reused packet does not reallocate per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderChain {
    headers: Vec<Header>,
}

impl Default for HeaderChain {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderChain {
    pub fn new() -> Self {
        Self {
            headers: Vec::with_capacity(MAX_HEADERS),
        }
    }

    /// Append a header
    ///
    /// Fails with [`Error::TooManyHeaders`] once the chain is full; the
    /// headers already present are left untouched.
    pub fn push(&mut self, header: Header) -> Result<()> {
        if self.headers.len() >= MAX_HEADERS {
            return Err(Error::TooManyHeaders { limit: MAX_HEADERS });
        }
        self.headers.push(header);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.headers.clear();
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.headers.len() >= MAX_HEADERS
    }

    pub fn get(&self, index: usize) -> Option<&Header> {
        self.headers.get(index)
    }

    pub fn as_slice(&self) -> &[Header] {
        &self.headers
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.headers.iter()
    }
}

impl<'a> IntoIterator for &'a HeaderChain {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.iter()
    }
}
