// Integration tests: publishers and players running against the server
// over loopback TCP.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use rtmp::{
    AudioCodec, AudioFrame, AudioInfo, AvcDecoderConfig, Error, NetConnection, PushSession,
    PushState, RtmpEvent, RtmpServer, RtmpUrl, ServerConfig, SourceSession, SourceState,
    VideoFrame, connect_transport,
};

/// Push key frames tagged `marker` until `done` holds
async fn push_keys_until<F>(push: &PushSession, marker: u8, mut done: F) -> bool
where
    F: FnMut() -> bool,
{
    for i in 0..250u32 {
        if done() {
            return true;
        }
        push.push_video(&VideoFrame::new(i * 40, true, idr_frame(marker)))
            .await
            .expect("push video");
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    done()
}

fn record_events(events: &Arc<Mutex<Vec<RtmpEvent>>>) -> impl Fn(RtmpEvent) + Send + Sync + 'static {
    let events = events.clone();
    move |event| events.lock().unwrap().push(event)
}

#[tokio::test]
async fn test_h264_end_to_end_callback_mode() {
    let port = 19450;
    let server = start_server(port, |b| b).await;

    let push = start_h264_push(port, "cam").await.unwrap();
    assert_eq!(push.state().await, PushState::Publishing);

    let collected = Collected::default();
    let source = SourceSession::open(collected.attach(source_builder(port, "cam")).build().unwrap()).unwrap();
    with_timeout(source.connect()).await.unwrap();
    assert_eq!(source.state().await, SourceState::Playing);

    // Inter frames before the first key frame never reach the player
    push.push_video(&VideoFrame::new(0, false, inter_frame(0x01))).await.unwrap();

    let frames = collected.clone();
    assert!(push_keys_until(&push, 0x11, || !frames.video_frames().is_empty()).await);

    let infos = collected.infos.lock().unwrap().clone();
    let video = infos
        .iter()
        .find_map(|info| info.video.clone())
        .expect("video info announced");
    assert_eq!(video.codec_spec_info, Some(h264_codec_data()));

    let first = collected.video_frames().remove(0);
    assert!(first.key_frame);
    assert_eq!(first.data.as_ref(), idr_frame(0x11).as_slice());
    assert_eq!(source.video_info().await.unwrap().codec_spec_info, Some(h264_codec_data()));

    // Inter frames flow once the player has its key frame
    push.push_video(&VideoFrame::new(5000, false, inter_frame(0x12))).await.unwrap();
    let frames = collected.clone();
    assert!(wait_until(|| frames.video_frames().iter().any(|f| !f.key_frame)).await);

    source.close().await.unwrap();
    push.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_h264_end_to_end_flv_mode() {
    let port = 19451;
    let server = start_server(port, |b| b).await;

    let push = start_h264_push(port, "flv").await.unwrap();
    let source = SourceSession::open(source_builder(port, "flv").build().unwrap()).unwrap();
    with_timeout(source.connect()).await.unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let pusher = {
        let push = push.clone();
        let stop = stop.clone();
        tokio::spawn(async move { push_keys_until(&push, 0x21, || stop.load(Ordering::SeqCst)).await })
    };

    let mut header = [0u8; 13];
    with_timeout(source.read(&mut header)).await.unwrap();
    assert_eq!(&header[..3], b"FLV");
    assert_eq!(header[4] & 0x01, 0x01, "video flag");

    let mut video_tags = Vec::new();
    while video_tags.len() < 2 {
        let mut tag_header = [0u8; 11];
        with_timeout(source.read(&mut tag_header)).await.unwrap();
        let size = u32::from_be_bytes([0, tag_header[1], tag_header[2], tag_header[3]]) as usize;
        let mut body = vec![0u8; size + 4];
        with_timeout(source.read(&mut body)).await.unwrap();
        let prev = u32::from_be_bytes([body[size], body[size + 1], body[size + 2], body[size + 3]]);
        assert_eq!(prev as usize, size + 11);
        if tag_header[0] == 9 {
            body.truncate(size);
            video_tags.push(body);
        }
    }
    stop.store(true, Ordering::SeqCst);
    pusher.await.unwrap();

    // Sequence header first, carrying the publisher's parameter sets
    let seq = &video_tags[0];
    assert_eq!(seq[0], 0x17);
    assert_eq!(seq[1], 0);
    let record = AvcDecoderConfig::parse(&seq[5..]).unwrap();
    assert_eq!(record.to_annexb(), h264_codec_data());

    let key = &video_tags[1];
    assert_eq!(key[0], 0x17);
    assert_eq!(key[1], 1);

    source.close().await.unwrap();
    push.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_aac_audio_reaches_player() {
    let port = 19452;
    let server = start_server(port, |b| b).await;

    let push = PushSession::open(push_config(port, "mic")).unwrap();
    push.set_audio_info(AudioInfo::new(AudioCodec::Aac, 44100, 2)).await.unwrap();
    push.connect().await.unwrap();

    let collected = Collected::default();
    let source = SourceSession::open(collected.attach(source_builder(port, "mic")).build().unwrap()).unwrap();
    with_timeout(source.connect()).await.unwrap();

    for i in 0..250u32 {
        if collected.audio_count() > 0 {
            break;
        }
        push.push_audio(&AudioFrame::new(i * 23, vec![0x21, 0x10, 0x04, 0x60])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    assert!(collected.audio_count() > 0);

    let audio = source.audio_info().await.expect("audio info");
    assert_eq!(audio.codec, AudioCodec::Aac);
    assert_eq!(audio.sample_rate, 44100);
    assert_eq!(audio.channels, 2);

    source.close().await.unwrap();
    push.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_auth_callback_gates_publish_and_play() {
    let port = 19453;
    let server = start_server(port, |b| b.max_clients(4).auth_cb(|key: &str| key == "good")).await;

    let refused = PushSession::open(push_config(port, "bad")).unwrap();
    refused.set_video_info(h264_info()).await.unwrap();
    let result = with_timeout(refused.connect()).await;
    assert!(matches!(result, Err(Error::ConnectFail(_))), "{:?}", result);
    assert_eq!(refused.state().await, PushState::Closed);

    let allowed = with_timeout(start_h264_push(port, "good")).await.unwrap();
    assert_eq!(allowed.state().await, PushState::Publishing);

    let player = SourceSession::open(source_builder(port, "bad").build().unwrap()).unwrap();
    assert!(with_timeout(player.connect()).await.is_err());
    assert_eq!(player.state().await, SourceState::Closed);

    allowed.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_close_unblocks_read() {
    let port = 19454;
    let server = start_server(port, |b| b).await;

    // Nobody publishes, so the read has nothing to return
    let source = SourceSession::open(source_builder(port, "idle").build().unwrap()).unwrap();
    with_timeout(source.connect()).await.unwrap();

    let reader = {
        let source = source.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            source.read(&mut buf).await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    source.close().await.unwrap();

    let result = with_timeout(reader).await.unwrap();
    assert!(matches!(result, Err(Error::ReadData(_))), "{:?}", result);
    assert_eq!(source.state().await, SourceState::Closed);

    let mut buf = [0u8; 4];
    assert!(source.read(&mut buf).await.is_err());
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_close_cancels_connect() {
    init_logging();
    // Accepts and then stays silent, so the handshake never completes
    let listener = tokio::net::TcpListener::bind("127.0.0.1:19455").await.unwrap();
    let silent = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let push = PushSession::open(push_config(19455, "stuck")).unwrap();
    push.set_video_info(h264_info()).await.unwrap();
    let connecting = {
        let push = push.clone();
        tokio::spawn(async move { push.connect().await })
    };

    let source = SourceSession::open(source_builder(19455, "stuck").build().unwrap()).unwrap();
    let playing = {
        let source = source.clone();
        tokio::spawn(async move { source.connect().await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    push.close().await.unwrap();
    source.close().await.unwrap();

    // Well inside the 5s connect timeout
    let pushed = tokio::time::timeout(Duration::from_secs(2), connecting).await.unwrap().unwrap();
    assert!(matches!(pushed, Err(Error::ConnectFail(_))));
    let played = tokio::time::timeout(Duration::from_secs(2), playing).await.unwrap().unwrap();
    assert!(matches!(played, Err(Error::ConnectFail(_))));

    assert_eq!(push.state().await, PushState::Closed);
    assert_eq!(source.state().await, SourceState::Closed);
    silent.abort();
}

#[tokio::test]
async fn test_slow_player_does_not_stall_others() {
    let port = 19456;
    let server = start_server(port, |b| b.max_clients(3).client_cache_size(64 * 1024)).await;

    let push = start_h264_push(port, "busy").await.unwrap();

    // A player that never reads what the server sends
    let url = RtmpUrl::parse(&stream_url(port, "busy")).unwrap();
    let transport = connect_transport(&url, None).await.unwrap();
    let mut stalled = NetConnection::establish(transport, 4096).await.unwrap();
    with_timeout(stalled.connect_app(&url)).await.unwrap();
    with_timeout(stalled.play(&url)).await.unwrap();

    let collected = Collected::default();
    let source = SourceSession::open(collected.attach(source_builder(port, "busy")).build().unwrap()).unwrap();
    with_timeout(source.connect()).await.unwrap();

    // Far more than the socket buffers and the cache can hold
    let mut big = idr_frame(0x31);
    big.resize(8 * 1024, 0x31);
    for i in 0..1200u32 {
        push.push_video(&VideoFrame::new(i * 40, true, big.clone())).await.unwrap();
        if i % 50 == 0 {
            tokio::task::yield_now().await;
        }
    }
    push.push_video(&VideoFrame::new(1200 * 40, true, idr_frame(0xEE))).await.unwrap();

    let frames = collected.clone();
    assert!(
        wait_until(|| frames.video_frames().iter().any(|f| f.data.as_ref() == idr_frame(0xEE).as_slice())).await,
        "latest frame reached the reading player"
    );
    assert_eq!(server.client_count(), 3);

    drop(stalled);
    source.close().await.unwrap();
    push.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_max_clients_rejects_extra_connection() {
    let port = 19457;
    let server = start_server(port, |b| b.max_clients(2)).await;

    let push = start_h264_push(port, "full").await.unwrap();
    let first = SourceSession::open(source_builder(port, "full").build().unwrap()).unwrap();
    with_timeout(first.connect()).await.unwrap();
    assert!(wait_until(|| server.client_count() == 2).await);

    let extra = SourceSession::open(source_builder(port, "full").build().unwrap()).unwrap();
    assert!(with_timeout(extra.connect()).await.is_err());
    assert_eq!(extra.state().await, SourceState::Closed);
    assert_eq!(first.state().await, SourceState::Playing);

    first.close().await.unwrap();
    push.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_silent_connections_free_their_slots() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let port = 19466;
    let server = start_server(port, |b| b.max_clients(2).idle_timeout(Duration::from_secs(2))).await;

    // One never speaks, one stops halfway through C0C1
    let addr = format!("127.0.0.1:{}", port);
    let mut silent = tokio::net::TcpStream::connect(&addr).await.unwrap();
    let mut stalled = tokio::net::TcpStream::connect(&addr).await.unwrap();
    stalled.write_all(&[3, 0, 0, 0, 0]).await.unwrap();
    assert!(wait_until(|| server.client_count() == 2).await);

    // Both slots are held, so a publisher is turned away for now
    assert!(with_timeout(start_h264_push(port, "late")).await.is_err());

    assert!(wait_until(|| server.client_count() == 0).await);
    let mut buf = [0u8; 4096];
    for socket in [&mut silent, &mut stalled] {
        loop {
            match with_timeout(socket.read(&mut buf)).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    }

    let push = with_timeout(start_h264_push(port, "late")).await.unwrap();
    assert_eq!(push.state().await, PushState::Publishing);

    push.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_monitor_reports_first_and_last_player() {
    init_logging();
    let port = 19458;
    let config = ServerConfig::builder().host("127.0.0.1").port(port).build().unwrap();
    let server = RtmpServer::open(config).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        server.monitor_puller(move |name: &str, watched: bool| {
            seen.lock().unwrap().push((name.to_string(), watched));
        });
    }
    server.setup().await.unwrap();

    let source = SourceSession::open(source_builder(port, "lobby").build().unwrap()).unwrap();
    with_timeout(source.connect()).await.unwrap();
    let watched = seen.clone();
    assert!(wait_until(|| watched.lock().unwrap().len() == 1).await);
    assert_eq!(seen.lock().unwrap()[0], ("lobby".to_string(), true));

    source.close().await.unwrap();
    let watched = seen.clone();
    assert!(wait_until(|| watched.lock().unwrap().len() == 2).await);
    assert_eq!(seen.lock().unwrap()[1], ("lobby".to_string(), false));

    server.close().await.unwrap();
}

#[tokio::test]
async fn test_publisher_leaving_closes_players() {
    let port = 19459;
    let server = start_server(port, |b| b).await;

    let push = start_h264_push(port, "gone").await.unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let source = SourceSession::open(
        source_builder(port, "gone")
            .event_cb(record_events(&events))
            .build()
            .unwrap(),
    )
    .unwrap();
    with_timeout(source.connect()).await.unwrap();

    push.close().await.unwrap();

    let reported = events.clone();
    assert!(wait_until(|| reported.lock().unwrap().contains(&RtmpEvent::ClosedByServer)).await);

    // Whatever was buffered drains, then reads fail
    let mut buf = [0u8; 4096];
    let result = with_timeout(async {
        loop {
            if let Err(e) = source.read(&mut buf[..1]).await {
                return e;
            }
        }
    })
    .await;
    assert!(matches!(result, Error::ReadData(_)));

    source.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_keep_src_holds_players_across_republish() {
    let port = 19460;
    let server = start_server(port, |b| b.keep_src(true)).await;

    let push = start_h264_push(port, "relay").await.unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let collected = Collected::default();
    let source = SourceSession::open(
        collected
            .attach(source_builder(port, "relay"))
            .event_cb(record_events(&events))
            .build()
            .unwrap(),
    )
    .unwrap();
    with_timeout(source.connect()).await.unwrap();

    let frames = collected.clone();
    assert!(push_keys_until(&push, 0x41, || !frames.video_frames().is_empty()).await);
    push.close().await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(source.state().await, SourceState::Playing);
    assert!(events.lock().unwrap().is_empty());

    let again = start_h264_push(port, "relay").await.unwrap();
    let frames = collected.clone();
    assert!(
        push_keys_until(&again, 0x42, || frames
            .video_frames()
            .iter()
            .any(|f| f.data.as_ref() == idr_frame(0x42).as_slice()))
        .await
    );

    source.close().await.unwrap();
    again.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_custom_command_both_ways() {
    let port = 19461;
    let server = start_server(port, |b| b).await;

    let push = start_h264_push(port, "talk").await.unwrap();
    let to_publisher = Arc::new(Mutex::new(Vec::new()));
    {
        let to_publisher = to_publisher.clone();
        push.set_command_cb(move |payload: &[u8]| to_publisher.lock().unwrap().push(payload.to_vec()));
    }

    let to_player = Arc::new(Mutex::new(Vec::new()));
    let source = {
        let to_player = to_player.clone();
        SourceSession::open(
            source_builder(port, "talk")
                .command_cb(move |payload: &[u8]| to_player.lock().unwrap().push(payload.to_vec()))
                .build()
                .unwrap(),
        )
        .unwrap()
    };
    with_timeout(source.connect()).await.unwrap();

    push.send_command(b"zoom in").await.unwrap();
    let got = to_player.clone();
    assert!(wait_until(|| !got.lock().unwrap().is_empty()).await);
    assert_eq!(to_player.lock().unwrap()[0], b"zoom in".to_vec());

    source.send_command(b"ack").await.unwrap();
    let got = to_publisher.clone();
    assert!(wait_until(|| !got.lock().unwrap().is_empty()).await);
    assert_eq!(to_publisher.lock().unwrap()[0], b"ack".to_vec());

    source.close().await.unwrap();
    push.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_receive_media_pauses_delivery() {
    let port = 19462;
    let server = start_server(port, |b| b).await;

    let push = start_h264_push(port, "pause").await.unwrap();
    let collected = Collected::default();
    let source = SourceSession::open(collected.attach(source_builder(port, "pause")).build().unwrap()).unwrap();
    with_timeout(source.connect()).await.unwrap();

    let frames = collected.clone();
    assert!(push_keys_until(&push, 0x51, || !frames.video_frames().is_empty()).await);

    source.receive_media(false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let paused_at = collected.video_frames().len();
    for i in 0..10u32 {
        push.push_video(&VideoFrame::new(20_000 + i * 40, true, idr_frame(0x52))).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(collected.video_frames().len(), paused_at);

    source.receive_media(true).await.unwrap();
    let frames = collected.clone();
    assert!(push_keys_until(&push, 0x53, || frames.video_frames().len() > paused_at).await);

    source.close().await.unwrap();
    push.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_server_close_reported_to_sessions() {
    let port = 19463;
    let server = start_server(port, |b| b).await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let push = PushSession::open(
        rtmp::PushConfig::builder()
            .url(stream_url(port, "down"))
            .event_cb(record_events(&events))
            .build()
            .unwrap(),
    )
    .unwrap();
    push.set_video_info(h264_info()).await.unwrap();
    with_timeout(push.connect()).await.unwrap();

    server.close().await.unwrap();
    assert!(!server.is_running());

    let reported = events.clone();
    assert!(wait_until(|| reported.lock().unwrap().contains(&RtmpEvent::ClosedByServer)).await);
    push.close().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_publish_refused() {
    let port = 19464;
    let server = start_server(port, |b| b.max_clients(3)).await;

    let first = start_h264_push(port, "solo").await.unwrap();
    let second = with_timeout(start_h264_push(port, "solo")).await;
    assert!(second.is_err());
    assert_eq!(first.state().await, PushState::Publishing);

    first.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_wrong_app_refused() {
    let port = 19465;
    let server = start_server(port, |b| b.app_name("studio")).await;

    let push = PushSession::open(push_config(port, "cam")).unwrap();
    push.set_video_info(h264_info()).await.unwrap();
    assert!(matches!(with_timeout(push.connect()).await, Err(Error::ConnectFail(_))));

    server.close().await.unwrap();
}

#[test]
fn test_server_config_validation() {
    assert!(ServerConfig::builder().max_clients(0).build().is_err());
    assert!(ServerConfig::builder().client_cache_size(100).build().is_err());
    assert!(ServerConfig::builder().app_name("").build().is_err());

    let config = ServerConfig::default();
    assert_eq!(config.max_clients, 2);
    assert_eq!(config.client_cache_size, 160 * 1024);
    assert!(!config.keep_src);
}
