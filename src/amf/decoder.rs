use crate::amf::amf0::{markers, AmfValue};
use crate::{ByteReader, Error, Result};

/// Nesting deeper than this is treated as malformed input
const MAX_DEPTH: usize = 32;

/// Parse every AMF0 value in `data`.
///
/// Any unknown marker or truncated value fails the whole parse; no partial
/// list is ever returned. Strings in the result borrow from `data`.
pub fn parse_data(data: &[u8]) -> Result<Vec<AmfValue<'_>>> {
    let mut decoder = Amf0Decoder::new(data);
    let mut values = Vec::new();
    while decoder.has_remaining() {
        values.push(decoder.decode()?);
    }
    Ok(values)
}

pub struct Amf0Decoder<'a> {
    reader: ByteReader<'a>,
    depth: usize,
}

impl<'a> Amf0Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Amf0Decoder {
            reader: ByteReader::new(data),
            depth: 0,
        }
    }

    /// Check if decoder has remaining data to decode
    pub fn has_remaining(&self) -> bool {
        self.reader.remaining() > 0
    }

    pub fn decode(&mut self) -> Result<AmfValue<'a>> {
        let marker = self.reader.read_u8()?;
        match marker {
            markers::NUMBER => Ok(AmfValue::Num(self.reader.read_f64_be()?)),
            markers::BOOLEAN => Ok(AmfValue::Bool(self.reader.read_u8()? != 0)),
            markers::STRING => {
                let len = self.reader.read_u16_be()? as usize;
                Ok(AmfValue::Str(self.reader.read_bytes(len)?))
            }
            markers::LONG_STRING => {
                let len = self.reader.read_u32_be()? as usize;
                Ok(AmfValue::Str(self.reader.read_bytes(len)?))
            }
            markers::OBJECT => Ok(AmfValue::Object(self.decode_pairs()?)),
            markers::NULL => Ok(AmfValue::Null),
            markers::UNDEFINED => Ok(AmfValue::Undefined),
            markers::ECMA_ARRAY => {
                // Count is advisory; the end marker terminates the pairs
                let _count = self.reader.read_u32_be()?;
                Ok(AmfValue::EcmaArray(self.decode_pairs()?))
            }
            markers::STRICT_ARRAY => self.decode_strict_array(),
            _ => Err(Error::bad_data(format!(
                "Unknown AMF0 marker 0x{:02x} at offset {}",
                marker,
                self.reader.position() - 1
            ))),
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::bad_data("AMF0 nesting too deep"));
        }
        Ok(())
    }

    fn decode_pairs(&mut self) -> Result<Vec<(&'a [u8], AmfValue<'a>)>> {
        self.enter()?;
        let mut pairs = Vec::new();
        loop {
            let name_len = self.reader.read_u16_be()? as usize;
            if name_len == 0 {
                let end = self.reader.read_u8()?;
                if end != markers::OBJECT_END {
                    return Err(Error::bad_data(format!(
                        "Expected object end marker, found 0x{:02x}",
                        end
                    )));
                }
                break;
            }
            let name = self.reader.read_bytes(name_len)?;
            let value = self.decode()?;
            pairs.push((name, value));
        }
        self.depth -= 1;
        Ok(pairs)
    }

    fn decode_strict_array(&mut self) -> Result<AmfValue<'a>> {
        self.enter()?;
        let count = self.reader.read_u32_be()? as usize;
        // Every element takes at least one byte
        if count > self.reader.remaining() {
            return Err(Error::bad_data(format!(
                "Strict array claims {} items with {} bytes left",
                count,
                self.reader.remaining()
            )));
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.decode()?);
        }
        self.depth -= 1;
        Ok(AmfValue::Array(items))
    }
}
