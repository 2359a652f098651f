//! Subspace: a key prefix with tuple packing underneath it.

use crate::tuple::{self, Element, TupleError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Key for `elements` inside this subspace.
    pub fn pack(&self, elements: &[Element]) -> Vec<u8> {
        let mut key = self.prefix.clone();
        tuple::pack_into(elements, &mut key);
        key
    }

    /// Shorthand for a single string element.
    pub fn key(&self, name: &str) -> Vec<u8> {
        self.pack(&[Element::from(name)])
    }

    /// Decode the tuple that follows this subspace's prefix.
    ///
    /// Returns `Ok(None)` for keys outside the subspace.
    pub fn unpack(&self, key: &[u8]) -> Result<Option<Vec<Element>>, TupleError> {
        match key.strip_prefix(self.prefix.as_slice()) {
            Some(rest) => tuple::unpack(rest).map(Some),
            None => Ok(None),
        }
    }

    /// Half-open range covering every key strictly inside this subspace.
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        let mut begin = self.prefix.clone();
        begin.push(0x00);
        let mut end = self.prefix.clone();
        end.push(0xFF);
        (begin, end)
    }
}

/// Smallest key greater than every key that starts with `prefix`.
///
/// Returns `None` when `prefix` is empty or all `0xFF`.
pub fn strinc(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(&last) = out.last() {
        if last == 0xFF {
            out.pop();
        } else {
            let n = out.len() - 1;
            out[n] += 1;
            return Some(out);
        }
    }
    None
}
