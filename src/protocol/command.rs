use crate::amf::{parse_data, AmfValue, AmfWriter};
use crate::{ByteQueue, Error, Result};

/// NetConnection / NetStream status codes
pub mod status {
    pub const CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
    pub const CONNECT_REJECTED: &str = "NetConnection.Connect.Rejected";
    pub const PUBLISH_START: &str = "NetStream.Publish.Start";
    pub const PUBLISH_BAD_NAME: &str = "NetStream.Publish.BadName";
    pub const PUBLISH_UNAUTHORIZED: &str = "NetStream.Publish.Unauthorized";
    pub const UNPUBLISH_SUCCESS: &str = "NetStream.Unpublish.Success";
    pub const PLAY_RESET: &str = "NetStream.Play.Reset";
    pub const PLAY_START: &str = "NetStream.Play.Start";
    pub const PLAY_STOP: &str = "NetStream.Play.Stop";
    pub const PLAY_UNAUTHORIZED: &str = "NetStream.Play.Unauthorized";
    pub const PLAY_PUBLISH_NOTIFY: &str = "NetStream.Play.PublishNotify";
    pub const PLAY_UNPUBLISH_NOTIFY: &str = "NetStream.Play.UnpublishNotify";
}

/// A parsed AMF0 command message.
///
/// Borrowed from the message payload; values live as long as the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RtmpCommand<'a> {
    pub name: &'a str,
    pub transaction_id: f64,
    pub command_object: AmfValue<'a>,
    pub arguments: Vec<AmfValue<'a>>,
}

impl<'a> RtmpCommand<'a> {
    /// Decode command from payload bytes
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut values = parse_data(payload)?.into_iter();

        let name = values
            .next()
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::bad_data("Command name must be string"))?;

        let transaction_id = values
            .next()
            .and_then(|v| v.as_number())
            .ok_or_else(|| Error::bad_data(format!("Command {} lacks a transaction id", name)))?;

        let command_object = values.next().unwrap_or(AmfValue::Null);

        Ok(RtmpCommand {
            name,
            transaction_id,
            command_object,
            arguments: values.collect(),
        })
    }

    /// Argument at `idx` as text
    pub fn arg_str(&self, idx: usize) -> Option<&'a str> {
        self.arguments.get(idx).and_then(|v| v.as_str())
    }

    /// `info.code` of an onStatus / _error response
    pub fn status_code(&self) -> Option<&'a str> {
        self.arguments.first()?.get("code")?.as_str()
    }

    /// `info.level` of an onStatus / _error response
    pub fn status_level(&self) -> Option<&'a str> {
        self.arguments.first()?.get("level")?.as_str()
    }

    /// Create connect command
    pub fn connect(transaction_id: f64, app: &str, tc_url: &str) -> Result<Vec<u8>> {
        encode_with(|w| {
            w.add_string("connect")?;
            w.add_number(transaction_id)?;
            w.add_obj(|obj| {
                obj.add_key_string("app", app)?;
                obj.add_key_string("type", "nonprivate")?;
                obj.add_key_string("flashVer", "FMLE/3.0 (compatible; FMSc/1.0)")?;
                obj.add_key_string("tcUrl", tc_url)?;
                obj.add_key_bool("fpad", false)?;
                obj.add_key_number("capabilities", 15.0)?;
                obj.add_key_number("audioCodecs", 3575.0)?;
                obj.add_key_number("videoCodecs", 252.0)?;
                obj.add_key_number("videoFunction", 1.0)?;
                obj.add_key_number("objectEncoding", 0.0)
            })
        })
    }

    /// Create createStream command
    pub fn create_stream(transaction_id: f64) -> Result<Vec<u8>> {
        simple("createStream", transaction_id, None)
    }

    pub fn release_stream(transaction_id: f64, stream_name: &str) -> Result<Vec<u8>> {
        simple("releaseStream", transaction_id, Some(stream_name))
    }

    pub fn fc_publish(transaction_id: f64, stream_name: &str) -> Result<Vec<u8>> {
        simple("FCPublish", transaction_id, Some(stream_name))
    }

    pub fn fc_unpublish(transaction_id: f64, stream_name: &str) -> Result<Vec<u8>> {
        simple("FCUnpublish", transaction_id, Some(stream_name))
    }

    /// Create publish command
    pub fn publish(transaction_id: f64, stream_name: &str, publish_type: &str) -> Result<Vec<u8>> {
        encode_with(|w| {
            w.add_string("publish")?;
            w.add_number(transaction_id)?;
            w.add_null()?;
            w.add_string(stream_name)?;
            w.add_string(publish_type)
        })
    }

    /// Create play command for a live stream
    pub fn play(transaction_id: f64, stream_name: &str) -> Result<Vec<u8>> {
        encode_with(|w| {
            w.add_string("play")?;
            w.add_number(transaction_id)?;
            w.add_null()?;
            w.add_string(stream_name)?;
            w.add_number(-2000.0)
        })
    }

    pub fn delete_stream(transaction_id: f64, stream_id: u32) -> Result<Vec<u8>> {
        encode_with(|w| {
            w.add_string("deleteStream")?;
            w.add_number(transaction_id)?;
            w.add_null()?;
            w.add_number(stream_id as f64)
        })
    }

    /// receiveAudio / receiveVideo toggles
    pub fn receive(name: &str, enable: bool) -> Result<Vec<u8>> {
        encode_with(|w| {
            w.add_string(name)?;
            w.add_number(0.0)?;
            w.add_null()?;
            w.add_bool(enable)
        })
    }

    /// _result for connect
    pub fn connect_result(transaction_id: f64) -> Result<Vec<u8>> {
        encode_with(|w| {
            w.add_string("_result")?;
            w.add_number(transaction_id)?;
            w.add_obj(|obj| {
                obj.add_key_string("fmsVer", "FMS/3,5,7,7009")?;
                obj.add_key_number("capabilities", 31.0)?;
                obj.add_key_number("mode", 1.0)
            })?;
            w.add_obj(|info| {
                info.add_key_string("level", "status")?;
                info.add_key_string("code", status::CONNECT_SUCCESS)?;
                info.add_key_string("description", "Connection succeeded.")?;
                info.add_key_number("objectEncoding", 0.0)
            })
        })
    }

    /// _result carrying a single number (createStream) or nothing
    pub fn result(transaction_id: f64, value: Option<f64>) -> Result<Vec<u8>> {
        encode_with(|w| {
            w.add_string("_result")?;
            w.add_number(transaction_id)?;
            w.add_null()?;
            match value {
                Some(n) => w.add_number(n),
                None => w.add_undefined(),
            }
        })
    }

    /// Create error response
    pub fn error(transaction_id: f64, code: &str, description: &str) -> Result<Vec<u8>> {
        encode_with(|w| {
            w.add_string("_error")?;
            w.add_number(transaction_id)?;
            w.add_null()?;
            w.add_obj(|info| {
                info.add_key_string("level", "error")?;
                info.add_key_string("code", code)?;
                info.add_key_string("description", description)
            })
        })
    }

    /// Create onStatus response
    pub fn on_status(level: &str, code: &str, description: &str) -> Result<Vec<u8>> {
        encode_with(|w| {
            w.add_string("onStatus")?;
            w.add_number(0.0)?;
            w.add_null()?;
            w.add_obj(|info| {
                info.add_key_string("level", level)?;
                info.add_key_string("code", code)?;
                info.add_key_string("description", description)
            })
        })
    }
}

fn simple(name: &str, transaction_id: f64, stream_name: Option<&str>) -> Result<Vec<u8>> {
    encode_with(|w| {
        w.add_string(name)?;
        w.add_number(transaction_id)?;
        w.add_null()?;
        match stream_name {
            Some(stream) => w.add_string(stream),
            None => Ok(()),
        }
    })
}

/// Run `build` against a fresh writer and return the encoded bytes
pub fn encode_with<F>(build: F) -> Result<Vec<u8>>
where
    F: FnOnce(&mut AmfWriter<'_>) -> Result<()>,
{
    let mut queue = ByteQueue::with_capacity(256);
    let mut writer = AmfWriter::new(&mut queue);
    build(&mut writer)?;
    Ok(queue.take_all())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_command() {
        let bytes = RtmpCommand::connect(1.0, "live", "rtmp://localhost/live").unwrap();
        let cmd = RtmpCommand::parse(&bytes).unwrap();
        assert_eq!(cmd.name, "connect");
        assert_eq!(cmd.transaction_id, 1.0);
        assert_eq!(cmd.command_object.get("app").and_then(|v| v.as_str()), Some("live"));
        assert_eq!(
            cmd.command_object.get("tcUrl").and_then(|v| v.as_str()),
            Some("rtmp://localhost/live")
        );
    }

    #[test]
    fn test_publish_arguments() {
        let bytes = RtmpCommand::publish(5.0, "cam?token=1", "live").unwrap();
        let cmd = RtmpCommand::parse(&bytes).unwrap();
        assert_eq!(cmd.name, "publish");
        assert!(cmd.command_object.is_null());
        assert_eq!(cmd.arg_str(0), Some("cam?token=1"));
        assert_eq!(cmd.arg_str(1), Some("live"));
    }

    #[test]
    fn test_status_accessors() {
        let bytes = RtmpCommand::on_status("error", status::PUBLISH_UNAUTHORIZED, "denied").unwrap();
        let cmd = RtmpCommand::parse(&bytes).unwrap();
        assert_eq!(cmd.status_level(), Some("error"));
        assert_eq!(cmd.status_code(), Some(status::PUBLISH_UNAUTHORIZED));
    }

    #[test]
    fn test_create_stream_result() {
        let bytes = RtmpCommand::result(2.0, Some(1.0)).unwrap();
        let cmd = RtmpCommand::parse(&bytes).unwrap();
        assert_eq!(cmd.name, "_result");
        assert_eq!(cmd.arguments[0].as_number(), Some(1.0));
    }

    #[test]
    fn test_missing_transaction_id() {
        let bytes = encode_with(|w| w.add_string("play")).unwrap();
        assert!(matches!(RtmpCommand::parse(&bytes), Err(Error::BadData(_))));
    }
}
