use std::fmt;
use crate::{Error, Result};

/// AMF0 value tree.
///
/// Strings and keys borrow from the buffer the tree was parsed from, so the
/// buffer must outlive the tree. Objects keep their pairs in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue<'a> {
    Undefined,                                   // 0x06
    Str(&'a [u8]),                               // 0x02 / 0x0C
    Num(f64),                                    // 0x00
    Bool(bool),                                  // 0x01
    Null,                                        // 0x05
    Array(Vec<AmfValue<'a>>),                    // 0x0A (strict array)
    Object(Vec<(&'a [u8], AmfValue<'a>)>),       // 0x03
    EcmaArray(Vec<(&'a [u8], AmfValue<'a>)>),    // 0x08 (metadata)
}

// AMF0 type markers
pub mod markers {
    pub const NUMBER: u8 = 0x00;
    pub const BOOLEAN: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const OBJECT: u8 = 0x03;
    pub const NULL: u8 = 0x05;
    pub const UNDEFINED: u8 = 0x06;
    pub const ECMA_ARRAY: u8 = 0x08;
    pub const OBJECT_END: u8 = 0x09;
    pub const STRICT_ARRAY: u8 = 0x0A;
    pub const LONG_STRING: u8 = 0x0C;
}

impl<'a> AmfValue<'a> {
    /// Build a string value from text
    pub fn str(s: &'a str) -> Self {
        AmfValue::Str(s.as_bytes())
    }

    /// Extract number value
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Extract string if it is valid UTF-8
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            AmfValue::Str(s) => std::str::from_utf8(*s).ok(),
            _ => None,
        }
    }

    /// Extract raw string bytes
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            AmfValue::Str(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Pairs of an object or ECMA array
    pub fn as_object(&self) -> Option<&[(&'a [u8], AmfValue<'a>)]> {
        match self {
            AmfValue::Object(pairs) | AmfValue::EcmaArray(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[AmfValue<'a>]> {
        match self {
            AmfValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// First value stored under `key` (linear scan)
    pub fn get(&self, key: &str) -> Option<&AmfValue<'a>> {
        self.as_object()?
            .iter()
            .find(|(k, _)| *k == key.as_bytes())
            .map(|(_, v)| v)
    }

    /// Check if null or undefined
    pub fn is_null(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }

    /// Visit each key/value pair of an object, one level deep
    pub fn walk_object<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&'a [u8], &AmfValue<'a>),
    {
        let pairs = self
            .as_object()
            .ok_or_else(|| Error::invalid_arg("value is not an object"))?;
        for (key, value) in pairs {
            visit(*key, value);
        }
        Ok(())
    }

    /// Visit each item of a strict array, one level deep
    pub fn walk_array<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(usize, &AmfValue<'a>),
    {
        let items = self
            .as_array()
            .ok_or_else(|| Error::invalid_arg("value is not an array"))?;
        for (idx, item) in items.iter().enumerate() {
            visit(idx, item);
        }
        Ok(())
    }
}

/// Value at `idx` of a parsed value list
pub fn get_by_idx<'v, 'a>(list: &'v [AmfValue<'a>], idx: usize) -> Option<&'v AmfValue<'a>> {
    list.get(idx)
}

impl fmt::Display for AmfValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfValue::Undefined => write!(f, "undefined"),
            AmfValue::Null => write!(f, "null"),
            AmfValue::Num(n) => write!(f, "{}", n),
            AmfValue::Bool(b) => write!(f, "{}", b),
            AmfValue::Str(s) => write!(f, "\"{}\"", String::from_utf8_lossy(s)),
            AmfValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            AmfValue::Object(pairs) | AmfValue::EcmaArray(pairs) => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", String::from_utf8_lossy(key), value)?;
                }
                write!(f, "}}")
            }
        }
    }
}
