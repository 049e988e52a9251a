mod common;

use bytes::Bytes;
use common::{codec_header_frame, pcm16, settings_frame, FakeBackend, ManualClock, STEREO_16};
use snapsync::audio::{SampleFormat, Volume};
use snapsync::error::Error;
use snapsync::protocol::messages::{TimeProbe, WireChunk};
use snapsync::session::PlaybackSession;
use snapsync::{ClientConfig, Frame, FrameBody, FrameKind, TimeValue};
use std::sync::Arc;

fn session(backend: &Arc<FakeBackend>) -> (Arc<ManualClock>, PlaybackSession) {
    let clock = ManualClock::new(1000.0);
    let session = PlaybackSession::with_clock(
        Arc::new(ClientConfig::default()),
        backend.clone(),
        clock.clone(),
    );
    (clock, session)
}

fn chunk_frame(start_ms: f64, frames: usize) -> Frame {
    Frame::new(FrameBody::WireChunk(WireChunk {
        timestamp: TimeValue::from_ms(start_ms),
        payload: Bytes::from(pcm16(frames, |_| 1000)),
    }))
    .unwrap()
}

#[test]
fn test_supported_formats_start_playback() {
    for bits in [16, 24, 32] {
        let backend = FakeBackend::new();
        let (_clock, mut session) = session(&backend);
        let format = SampleFormat::new(48_000, 2, bits);

        session
            .handle_frame(codec_header_frame("pcm", &format))
            .unwrap();

        assert!(session.is_active());
        assert_eq!(session.format(), Some(format));
        assert_eq!(backend.opened.lock().as_slice(), &[format]);
        assert_eq!(backend.start_times(), vec![1100.0, 1180.0, 1260.0]);
    }
}

#[test]
fn test_unsupported_formats_are_fatal() {
    for format in [
        SampleFormat::new(48_000, 1, 16),
        SampleFormat::new(48_000, 2, 8),
        SampleFormat::new(96_000, 6, 24),
    ] {
        let backend = FakeBackend::new();
        let (_clock, mut session) = session(&backend);

        let err = session
            .handle_frame(codec_header_frame("pcm", &format))
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert!(err.is_fatal());
        assert!(!session.is_active());
        assert!(backend.opened.lock().is_empty());
    }
}

#[test]
fn test_unsupported_codec_is_fatal() {
    let backend = FakeBackend::new();
    let (_clock, mut session) = session(&backend);

    let err = session
        .handle_frame(codec_header_frame("opus", &STEREO_16))
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedCodec(_)));
    assert!(!session.is_active());
}

#[test]
fn test_output_failure_is_fatal() {
    let backend = FakeBackend::failing();
    let (_clock, mut session) = session(&backend);

    let err = session
        .handle_frame(codec_header_frame("pcm", &STEREO_16))
        .unwrap_err();

    assert!(matches!(err, Error::Output(_)));
    assert!(err.is_fatal());
    assert!(!session.is_active());
}

/// Time reply answering the request sent with frame id `refers_to`
fn time_reply(refers_to: u16, latency_ms: f64, sent_ms: f64) -> Frame {
    let mut reply = Frame::new(FrameBody::Time(TimeProbe {
        latency: TimeValue::from_ms(latency_ms),
    }))
    .unwrap();
    reply.header.refers_to = refers_to;
    reply.header.sent = TimeValue::from_ms(sent_ms);
    reply
}

#[test]
fn test_time_reply_updates_offset() {
    let backend = FakeBackend::new();
    let (clock, mut session) = session(&backend);
    session.time_probe();
    session.probe_sent(7);

    // Server clock runs 500ms ahead; 5ms each way.
    // Request left at local 1000 (server 1500), arrived at server 1505,
    // reply left at server 1506 and arrives at local 1011.
    clock.set(1011.0);
    session.handle_frame(time_reply(7, 505.0, 1506.0)).unwrap();

    assert_eq!(session.clock_sync().offset_ms(), 500.0);
    assert_eq!(session.clock_sync().sample_count(), 1);

    // A duplicate reply to the same request is not counted twice
    session.handle_frame(time_reply(7, 505.0, 1506.0)).unwrap();
    assert_eq!(session.clock_sync().sample_count(), 1);
}

#[test]
fn test_unrequested_time_reply_is_ignored() {
    let backend = FakeBackend::new();
    let (_clock, mut session) = session(&backend);
    session.time_probe();
    session.probe_sent(3);

    session.handle_frame(time_reply(4, 505.0, 1506.0)).unwrap();

    assert_eq!(session.clock_sync().sample_count(), 0);
}

#[test]
fn test_opening_output_switches_clock_and_requests_probe() {
    let backend = FakeBackend::new();
    let (clock, mut session) = session(&backend);
    session.time_probe();
    session.probe_sent(1);
    clock.set(50_000.0);
    session.handle_frame(time_reply(1, 0.0, 0.0)).unwrap();
    assert_eq!(session.clock_sync().sample_count(), 1);
    assert!(!session.probe_due());

    session
        .handle_frame(codec_header_frame("pcm", &STEREO_16))
        .unwrap();

    // Offsets from the pre-output clock are meaningless in the device clock domain
    assert_eq!(session.clock_sync().sample_count(), 0);
    assert_eq!(session.clock_sync().now_ms(), 1000.0);
    assert!(session.probe_due());

    let (body, sent) = session.time_probe();
    assert_eq!(body.kind(), FrameKind::Time);
    assert_eq!(sent, TimeValue::from_ms(1000.0));
    assert!(!session.probe_due());
}

#[test]
fn test_reply_to_request_from_previous_clock_is_ignored() {
    let backend = FakeBackend::new();
    let (_clock, mut session) = session(&backend);

    // Request timed on the system clock at 1000, server 500ms ahead
    let (_, sent) = session.time_probe();
    assert_eq!(sent, TimeValue::from_ms(1000.0));
    session.probe_sent(1);

    // Codec header arrives first and switches to a device clock reading 5
    backend.clock.set(5.0);
    session
        .handle_frame(codec_header_frame("pcm", &STEREO_16))
        .unwrap();

    // The reply mixes both clocks and would estimate an offset of 2.5ms
    backend.clock.set(16.0);
    session.handle_frame(time_reply(1, -490.0, 511.0)).unwrap();
    assert_eq!(session.clock_sync().sample_count(), 0);

    // A request timed on the device clock is measured normally
    backend.clock.set(16.0);
    session.time_probe();
    session.probe_sent(2);
    backend.clock.set(27.0);
    session.handle_frame(time_reply(2, 505.0, 522.0)).unwrap();
    assert_eq!(session.clock_sync().sample_count(), 1);
    assert_eq!(session.clock_sync().offset_ms(), 500.0);
}

#[test]
fn test_chunks_before_codec_header_are_dropped() {
    let backend = FakeBackend::new();
    let (_clock, mut session) = session(&backend);

    session.handle_frame(chunk_frame(0.0, 960)).unwrap();

    assert!(!session.is_active());
    assert!(session.jitter_buffer().is_none());
}

#[test]
fn test_chunks_reach_the_jitter_buffer() {
    let backend = FakeBackend::new();
    let (_clock, mut session) = session(&backend);
    session
        .handle_frame(codec_header_frame("pcm", &STEREO_16))
        .unwrap();

    session.handle_frame(chunk_frame(2000.0, 960)).unwrap();
    session.handle_frame(chunk_frame(2020.0, 960)).unwrap();

    assert_eq!(session.jitter_buffer().map(|jb| jb.queued_chunks()), Some(2));
}

#[test]
fn test_settings_apply_depth_and_volume() {
    let backend = FakeBackend::new();
    let (_clock, mut session) = session(&backend);

    session
        .handle_frame(settings_frame(800, 50, 40, false))
        .unwrap();
    session
        .handle_frame(codec_header_frame("pcm", &STEREO_16))
        .unwrap();

    let jb = session.jitter_buffer().unwrap();
    assert_eq!(jb.buffer_depth_ms(), 750.0);
    assert_eq!(jb.volume(), Volume::new(40, false));

    // Settings arriving mid-stream update the running buffer
    session
        .handle_frame(settings_frame(1200, 0, 70, true))
        .unwrap();
    let jb = session.jitter_buffer().unwrap();
    assert_eq!(jb.buffer_depth_ms(), 1200.0);
    assert_eq!(jb.volume(), Volume::new(70, true));
}

#[test]
fn test_default_depth_before_settings() {
    let backend = FakeBackend::new();
    let (_clock, mut session) = session(&backend);
    session
        .handle_frame(codec_header_frame("pcm", &STEREO_16))
        .unwrap();

    assert_eq!(
        session.jitter_buffer().unwrap().buffer_depth_ms(),
        snapsync::session::playback::DEFAULT_BUFFER_DEPTH_MS
    );
}

#[test]
fn test_set_volume_is_idempotent() {
    let backend = FakeBackend::new();
    let (_clock, mut session) = session(&backend);
    session
        .handle_frame(codec_header_frame("pcm", &STEREO_16))
        .unwrap();

    session.set_volume(Volume::new(25, false));
    let first = session.jitter_buffer().unwrap().volume();
    session.set_volume(Volume::new(25, false));

    assert_eq!(session.volume(), first);
    assert_eq!(session.jitter_buffer().unwrap().volume(), first);
}

#[test]
fn test_buffer_completion_keeps_ring_full() {
    let backend = FakeBackend::new();
    let (_clock, mut session) = session(&backend);
    session
        .handle_frame(codec_header_frame("pcm", &STEREO_16))
        .unwrap();

    let done = backend.scheduled.lock().remove(0);
    session.on_buffer_complete(done).unwrap();

    assert_eq!(backend.start_times(), vec![1180.0, 1260.0, 1340.0]);
    assert_eq!(session.scheduler().map(|s| s.in_flight()), Some(3));
}

#[test]
fn test_new_codec_header_restarts_stream() {
    let backend = FakeBackend::new();
    let (_clock, mut session) = session(&backend);
    let first = SampleFormat::new(48_000, 2, 16);
    let second = SampleFormat::new(44_100, 2, 24);

    session.handle_frame(codec_header_frame("pcm", &first)).unwrap();
    session.handle_frame(chunk_frame(2000.0, 960)).unwrap();
    session.handle_frame(codec_header_frame("pcm", &second)).unwrap();

    assert_eq!(session.format(), Some(second));
    assert_eq!(backend.opened.lock().as_slice(), &[first, second]);
    assert!(session.jitter_buffer().unwrap().is_empty());
}

#[test]
fn test_shutdown_releases_stream() {
    let backend = FakeBackend::new();
    let (_clock, mut session) = session(&backend);
    session
        .handle_frame(codec_header_frame("pcm", &STEREO_16))
        .unwrap();

    session.shutdown();

    assert!(!session.is_active());
    assert!(session.jitter_stats().is_none());
    // Late completions after shutdown are ignored
    let buffer = backend.scheduled.lock().remove(0);
    session.on_buffer_complete(buffer).unwrap();
}

#[test]
fn test_stream_tags_are_ignored() {
    let backend = FakeBackend::new();
    let (_clock, mut session) = session(&backend);
    let tags = Frame::new(FrameBody::StreamTags(serde_json::json!({ "title": "x" }))).unwrap();
    session.handle_frame(tags).unwrap();
    assert!(!session.is_active());
}
