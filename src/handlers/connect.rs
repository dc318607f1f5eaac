use log::{debug, warn};
use crate::handlers::{CommandHandler, Request};
use crate::protocol::{status, BandwidthLimit, ControlMessage, RtmpCommand, RtmpMessage};
use crate::server::ServerContext;
use crate::Result;

pub struct ConnectHandler;

impl ConnectHandler {
    /// `app` from the command object, without query or trailing slash
    fn requested_app<'a>(command: &RtmpCommand<'a>) -> Option<&'a str> {
        let app = command.command_object.get("app")?.as_str()?;
        let app = app.split('?').next().unwrap_or(app);
        Some(app.trim_end_matches('/'))
    }
}

impl CommandHandler for ConnectHandler {
    fn command_name(&self) -> &str {
        "connect"
    }

    fn handle(&self, command: &RtmpCommand<'_>, request: Request, ctx: &mut ServerContext) -> Result<()> {
        let expected = ctx.config().app_name.clone();
        let window = ctx.config().window_ack_size;
        let chunk_size = ctx.config().chunk_size;
        let Some(client) = ctx.client(request.client) else {
            return Ok(());
        };

        let app = ConnectHandler::requested_app(command).unwrap_or_default();
        if app != expected {
            warn!("Client {} asked for app '{}', serving '{}'", client.id, app, expected);
            client.send(RtmpMessage::command(
                0,
                RtmpCommand::error(command.transaction_id, status::CONNECT_REJECTED, "Unknown application")?,
            ));
            client.begin_close();
            return Ok(());
        }

        client.send(ControlMessage::WindowAckSize(window).encode()?);
        client.send(
            ControlMessage::SetPeerBandwidth {
                size: window,
                limit: BandwidthLimit::Dynamic,
            }
            .encode()?,
        );
        client.send(ControlMessage::SetChunkSize(chunk_size).encode()?);
        client.send(RtmpMessage::command(0, RtmpCommand::connect_result(command.transaction_id)?));
        client.app_connected = true;
        debug!("Client {} connected to app '{}'", client.id, app);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;
    use crate::server::ServerConfig;

    #[tokio::test]
    async fn test_connect_accepted() {
        let mut ctx = context(ServerConfig::default());
        let (id, _peer) = add_client(&mut ctx).await;
        let payload = RtmpCommand::connect(1.0, "live", "rtmp://localhost/live").unwrap();
        let command = RtmpCommand::parse(&payload).unwrap();

        ConnectHandler
            .handle(&command, Request { client: id, stream_id: 0 }, &mut ctx)
            .unwrap();
        assert!(ctx.client(id).unwrap().app_connected);

        let out = drain(&mut ctx, id);
        let controls: Vec<_> = out
            .iter()
            .filter_map(|m| ControlMessage::parse(m).unwrap())
            .collect();
        assert!(controls.contains(&ControlMessage::SetChunkSize(4096)));
        assert!(matches!(controls[0], ControlMessage::WindowAckSize(_)));
        assert_eq!(commands(&out), vec![format!("_result {}", status::CONNECT_SUCCESS)]);
    }

    #[tokio::test]
    async fn test_wrong_app_rejected() {
        let mut ctx = context(ServerConfig::default());
        let (id, _peer) = add_client(&mut ctx).await;
        let payload = RtmpCommand::connect(1.0, "other", "rtmp://localhost/other").unwrap();
        let command = RtmpCommand::parse(&payload).unwrap();

        ConnectHandler
            .handle(&command, Request { client: id, stream_id: 0 }, &mut ctx)
            .unwrap();
        let client = ctx.client(id).unwrap();
        assert!(!client.app_connected);
        assert!(client.is_closing());
        assert_eq!(
            commands(&drain(&mut ctx, id)),
            vec![format!("_error {}", status::CONNECT_REJECTED)]
        );
    }
}
