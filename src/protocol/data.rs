use crate::amf::{parse_data, AmfValue};
use crate::{Error, Result};

pub const SET_DATA_FRAME: &str = "@setDataFrame";
pub const ON_METADATA: &str = "onMetaData";

/// AMF0 data message (message type 18)
#[derive(Debug, Clone, PartialEq)]
pub struct RtmpData<'a> {
    /// Handler name, e.g. `onMetaData`
    pub name: &'a str,
    pub values: Vec<AmfValue<'a>>,
}

impl<'a> RtmpData<'a> {
    /// Decode data message from payload bytes.
    ///
    /// A leading `@setDataFrame` is stripped so publishers and players see the
    /// same shape.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut values = parse_data(payload)?;
        if values.is_empty() {
            return Err(Error::bad_data("Empty data message"));
        }

        let mut name = values[0]
            .as_str()
            .ok_or_else(|| Error::bad_data("Data handler name must be string"))?;
        values.remove(0);

        if name == SET_DATA_FRAME {
            if values.is_empty() {
                return Err(Error::bad_data("@setDataFrame without handler"));
            }
            name = values[0]
                .as_str()
                .ok_or_else(|| Error::bad_data("@setDataFrame handler must be string"))?;
            values.remove(0);
        }

        Ok(RtmpData { name, values })
    }

    pub fn is_metadata(&self) -> bool {
        self.name == ON_METADATA
    }

    /// The metadata object or ECMA array, when this is onMetaData
    pub fn metadata(&self) -> Option<&AmfValue<'a>> {
        if !self.is_metadata() {
            return None;
        }
        self.values.iter().find(|v| v.as_object().is_some())
    }
}

/// Strip `@setDataFrame` from a publisher's data payload, returning the bytes
/// players should receive.
pub fn strip_set_data_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let values = parse_data(payload)?;
    match values.first().and_then(|v| v.as_str()) {
        Some(SET_DATA_FRAME) => crate::amf::encode_values(&values[1..]),
        Some(_) => Ok(payload.to_vec()),
        None => Err(Error::bad_data("Data handler name must be string")),
    }
}
