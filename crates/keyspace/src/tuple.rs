//! Order-preserving tuple encoding for keys.
//!
//! Packed tuples compare bytewise in the same order as the tuples themselves,
//! so a range scan over a packed prefix visits entries in logical order.
//!
//! Encoding:
//! - `Str`: `0x02`, UTF-8 bytes with `0x00` escaped as `0x00 0xFF`, then `0x00`
//! - `Int`: `0x1C`, 8 bytes big-endian

use std::fmt;

use thiserror::Error;

const STR_CODE: u8 = 0x02;
const INT_CODE: u8 = 0x1C;
const ESCAPE: u8 = 0xFF;

/// One element of a key tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Element {
    Str(String),
    Int(u64),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TupleError {
    #[error("unknown type code 0x{code:02x} at byte {at}")]
    UnknownCode { code: u8, at: usize },

    #[error("truncated tuple at byte {0}")]
    Truncated(usize),

    #[error("string element is not valid UTF-8")]
    InvalidUtf8,
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Str(s) => write!(f, "{:?}", s),
            Element::Int(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Element {
    fn from(s: &str) -> Self {
        Element::Str(s.to_string())
    }
}

impl From<String> for Element {
    fn from(s: String) -> Self {
        Element::Str(s)
    }
}

impl From<u64> for Element {
    fn from(v: u64) -> Self {
        Element::Int(v)
    }
}

/// Append the encoding of `elements` to `out`.
pub fn pack_into(elements: &[Element], out: &mut Vec<u8>) {
    for element in elements {
        match element {
            Element::Str(s) => {
                out.push(STR_CODE);
                for &b in s.as_bytes() {
                    out.push(b);
                    if b == 0x00 {
                        out.push(ESCAPE);
                    }
                }
                out.push(0x00);
            }
            Element::Int(v) => {
                out.push(INT_CODE);
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
    }
}

pub fn pack(elements: &[Element]) -> Vec<u8> {
    let mut out = Vec::new();
    pack_into(elements, &mut out);
    out
}

/// Pack a path of string segments.
pub fn pack_path<S: AsRef<str>>(path: &[S]) -> Vec<u8> {
    let elements: Vec<Element> = path.iter().map(|s| Element::from(s.as_ref())).collect();
    pack(&elements)
}

pub fn unpack(bytes: &[u8]) -> Result<Vec<Element>, TupleError> {
    let mut elements = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            STR_CODE => {
                pos += 1;
                let mut raw = Vec::new();
                loop {
                    let b = *bytes.get(pos).ok_or(TupleError::Truncated(pos))?;
                    if b == 0x00 {
                        if bytes.get(pos + 1) == Some(&ESCAPE) {
                            raw.push(0x00);
                            pos += 2;
                            continue;
                        }
                        pos += 1;
                        break;
                    }
                    raw.push(b);
                    pos += 1;
                }
                let s = String::from_utf8(raw).map_err(|_| TupleError::InvalidUtf8)?;
                elements.push(Element::Str(s));
            }
            INT_CODE => {
                let end = pos + 9;
                let slice = bytes.get(pos + 1..end).ok_or(TupleError::Truncated(pos))?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(slice);
                elements.push(Element::Int(u64::from_be_bytes(buf)));
                pos = end;
            }
            code => return Err(TupleError::UnknownCode { code, at: pos }),
        }
    }

    Ok(elements)
}

/// Render bytes with non-printable characters escaped as `\xNN`.
pub fn printable(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (0x20..0x7F).contains(&b) && b != b'\\' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{:02x}", b));
        }
    }
    out
}
