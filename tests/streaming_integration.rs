//! Playback integration: block-accurate scheduling, looping, and error
//! recovery against real files and a real worker thread.

mod helpers;

use helpers::*;
use reeltime::{Atom, LoopLength, OpenSpec, ReaderState, StopMode, StreamEvent};

fn open_named(reader: &reeltime::StreamReader, name: &str) {
    reader.open(OpenSpec {
        filename: name.to_string(),
        ..Default::default()
    });
}

#[test]
fn test_total_frames_reported_once_on_open() {
    let host = test_host("total_frames");
    write_ramp_wav(&host.dir, "clip.wav", 1000);

    let reader = host.engine.reader(1);
    reader.prepare(64);
    open_named(&reader, "clip.wav");
    run_until_armed(&reader, 64);

    let events = take_events(&host.sink);
    assert_eq!(events, vec![StreamEvent::TotalFrames(ftc(1000))]);
    assert_eq!(reader.total_frames(), Some(1000));
    assert_eq!(reader.state(), ReaderState::Startup2);

    // Further idle blocks report nothing more.
    let _ = process_block(&reader, 64);
    assert!(take_events(&host.sink).is_empty());

    cleanup_temp_dir("total_frames");
}

#[test]
fn test_exact_stop_boundary() {
    let host = test_host("stop_boundary");
    write_ramp_wav(&host.dir, "clip.wav", 1000);

    let anchor = host.engine.anchor("t0");
    anchor.mark();

    let reader = host.engine.reader(1);
    reader.prepare(50);
    reader.set_anchor(Some("t0")).unwrap();
    open_named(&reader, "clip.wav");
    run_until_armed(&reader, 50);
    reader.handle("looplength", &[Atom::symbol("self")]).unwrap();

    begin_playback(&reader, Some(ftc(0)), 50);
    reader.stop(StopMode::At(ftc(500))).unwrap();

    let mut played = Vec::new();
    for _ in 0..12 {
        played.extend(stream_block(&reader, &host.clock, 50, 2));
        if reader.state() != ReaderState::Stream {
            break;
        }
    }

    // Exactly 500 frames of audio, then silence.
    assert!(played.len() >= 550);
    for (frame, sample) in played.iter().enumerate().take(500) {
        assert_eq!(*sample, ramp_value(frame as i64), "frame {frame}");
    }
    assert_silent(&played[500..]);

    let events = take_events(&host.sink);
    let bangs = events
        .iter()
        .filter(|event| matches!(event, StreamEvent::Done))
        .count();
    assert_eq!(bangs, 1, "done bang fired once");
    assert!(events.contains(&StreamEvent::TotalFrames(ftc(1000))));
    assert_eq!(reader.state(), ReaderState::Idle);

    cleanup_temp_dir("stop_boundary");
}

#[test]
fn test_start_in_the_past_wraps_into_loop() {
    let host = test_host("start_past");
    write_ramp_wav(&host.dir, "clip.wav", 2000);

    let anchor = host.engine.anchor("t0");
    anchor.mark();

    let reader = host.engine.reader(1);
    reader.prepare(64);
    reader.set_anchor(Some("t0")).unwrap();
    open_named(&reader, "clip.wav");
    run_until_armed(&reader, 64);

    // At anchor time 10000, ask to have started at 5000 on a 2000-frame
    // loop: we should come in at file frame (10000-5000) % 2000 = 1000.
    host.clock.set(10_000);
    begin_playback(&reader, Some(ftc(5000)), 64);

    let block = stream_block(&reader, &host.clock, 64, 2);
    for (offset, sample) in block.iter().enumerate() {
        assert_eq!(*sample, ramp_value(1000 + offset as i64), "offset {offset}");
    }

    cleanup_temp_dir("start_past");
}

#[test]
fn test_loop_past_eof_inserts_silence() {
    let host = test_host("loop_eof");
    write_ramp_wav(&host.dir, "clip.wav", 1000);

    let anchor = host.engine.anchor("t0");
    anchor.mark();

    let reader = host.engine.reader(1);
    reader.prepare(50);
    reader.set_anchor(Some("t0")).unwrap();
    open_named(&reader, "clip.wav");
    run_until_armed(&reader, 50);
    reader.set_loop_length(LoopLength::Frames(1500)).unwrap();

    begin_playback(&reader, Some(ftc(0)), 50);
    reader.stop(StopMode::Never).unwrap();

    let mut played = Vec::new();
    for _ in 0..60 {
        played.extend(stream_block(&reader, &host.clock, 50, 2));
    }

    // Two full cycles: 0..1000 ramp, 1000..1500 exact zeros, repeat.
    for (frame, sample) in played.iter().enumerate().take(3000) {
        let position = frame % 1500;
        let expected = if position < 1000 {
            ramp_value(position as i64)
        } else {
            0.0
        };
        assert_eq!(*sample, expected, "frame {frame}");
    }

    cleanup_temp_dir("loop_eof");
}

#[test]
fn test_start_within_block_zero_prefix() {
    let host = test_host("start_mid_block");
    write_ramp_wav(&host.dir, "clip.wav", 1000);

    let anchor = host.engine.anchor("t0");
    anchor.mark();

    let reader = host.engine.reader(1);
    reader.prepare(64);
    reader.set_anchor(Some("t0")).unwrap();
    open_named(&reader, "clip.wav");
    run_until_armed(&reader, 64);

    begin_playback(&reader, Some(ftc(30)), 64);

    let block = stream_block(&reader, &host.clock, 64, 2);
    assert_silent(&block[..30]);
    for (offset, sample) in block[30..].iter().enumerate() {
        assert_eq!(*sample, ramp_value(offset as i64), "offset {offset}");
    }

    // The next block is fully inside the scheduled span.
    let block = stream_block(&reader, &host.clock, 64, 2);
    assert_eq!(block[0], ramp_value(34));

    cleanup_temp_dir("start_mid_block");
}

#[test]
fn test_loop_start_offsets_the_cycle() {
    let host = test_host("loop_start");
    write_ramp_wav(&host.dir, "clip.wav", 1000);

    let anchor = host.engine.anchor("t0");
    anchor.mark();

    let reader = host.engine.reader(1);
    reader.prepare(50);
    reader.set_anchor(Some("t0")).unwrap();
    open_named(&reader, "clip.wav");
    run_until_armed(&reader, 50);
    reader.set_loop_length(LoopLength::Frames(300)).unwrap();
    reader.set_loop_start(200);

    begin_playback(&reader, Some(ftc(0)), 50);

    let mut played = Vec::new();
    for _ in 0..12 {
        played.extend(stream_block(&reader, &host.clock, 50, 2));
    }

    // Frames 200..500 of the file, cycling.
    for (frame, sample) in played.iter().enumerate().take(600) {
        let expected = ramp_value(200 + (frame % 300) as i64);
        assert_eq!(*sample, expected, "frame {frame}");
    }

    cleanup_temp_dir("loop_start");
}

#[test]
fn test_open_error_reports_and_goes_idle() {
    let host = test_host("open_error");

    let reader = host.engine.reader(1);
    reader.prepare(64);
    open_named(&reader, "no_such_file.wav");

    assert!(
        wait_until(
            || {
                let _ = process_block(&reader, 64);
                reader.state() == ReaderState::Idle
            },
            5_000,
        ),
        "error never surfaced"
    );
    let events = take_events(&host.sink);
    assert!(events.contains(&StreamEvent::TotalFrames(ftc(0))));
    assert!(events.contains(&StreamEvent::Done));

    // Recoverable: a fresh open works.
    write_ramp_wav(&host.dir, "real.wav", 100);
    open_named(&reader, "real.wav");
    run_until_armed(&reader, 64);
    assert_eq!(reader.total_frames(), Some(100));

    cleanup_temp_dir("open_error");
}

#[test]
fn test_stop_immediate_goes_idle() {
    let host = test_host("stop_immediate");
    write_ramp_wav(&host.dir, "clip.wav", 1000);

    let reader = host.engine.reader(1);
    reader.prepare(64);
    open_named(&reader, "clip.wav");
    run_until_armed(&reader, 64);
    begin_playback(&reader, None, 64);

    reader.stop(StopMode::Immediate).unwrap();
    assert_eq!(reader.state(), ReaderState::Idle);
    assert_silent(&process_block(&reader, 64));

    cleanup_temp_dir("stop_immediate");
}

#[test]
fn test_messages_reject_bad_state_without_corruption() {
    let host = test_host("bad_state");

    let reader = host.engine.reader(1);
    reader.prepare(64);
    // start/stop before any open fail synchronously.
    assert!(reader.start(None).is_err());
    assert!(reader.stop(StopMode::Immediate).is_err());
    assert!(reader.handle("start", &[]).is_err());
    assert_eq!(reader.state(), ReaderState::Idle);

    // Unknown anchors are reported but leave the stream usable.
    assert!(reader.set_anchor(Some("nowhere")).is_err());
    assert_silent(&process_block(&reader, 64));

    cleanup_temp_dir("bad_state");
}

#[test]
fn test_stereo_zero_fills_missing_channel() {
    let host = test_host("stereo_fill");
    write_ramp_wav(&host.dir, "mono.wav", 500);

    let reader = host.engine.reader(2);
    reader.prepare(50);
    open_named(&reader, "mono.wav");
    run_until_armed(&reader, 50);
    begin_playback(&reader, Some(ftc(0)), 50);

    assert!(
        wait_until(|| reader.buffered_bytes() >= 100, 5_000),
        "fifo never filled"
    );
    let mut left = vec![0.0f32; 50];
    let mut right = vec![0.0f32; 50];
    {
        let mut slices = [left.as_mut_slice(), right.as_mut_slice()];
        reader.process(&mut slices);
    }
    host.clock.advance(50);

    assert_eq!(left[10], ramp_value(10));
    assert_silent(&right);

    cleanup_temp_dir("stereo_fill");
}
