//! Streaming capture: a realtime block callback producing into the byte
//! FIFO, drained to disk by a background worker.
//!
//! Capture can be armed to start on a schedule, on a signal threshold, or
//! "in the past": until the start arrives, blocks are pre-rolled into the
//! FIFO with the tail pushed along behind the head, so a late or
//! threshold-triggered start can recover samples from before the trigger.
//! The final recorded length is published after the worker finishes the
//! header and closes the file.

use crate::codec::{CodecRegistry, SoundfileCodec};
use crate::fifo::RingFifo;
use crate::pcm;
use crate::shared::{
    clamp_buffer_size, signal_period, Request, StreamCell, MAX_BLOCK_FRAMES, READ_SIZE, WRITE_SIZE,
};
use crate::soundfile::{valid_bytes_per_sample, SoundfileInfo, MAX_CHANNELS};
use parking_lot::MutexGuard;
use reeltime_core::anchor::{AnchorRegistry, TimeAnchor};
use reeltime_core::error::{Error, Result};
use reeltime_core::host::{FileOpener, HostCaps, LogicalTime, StreamEvent};
use reeltime_core::timecode::FrameTimeCode;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Capture stream lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// No file armed.
    Idle,
    /// Worker is creating the file; waiting for `start`.
    Startup,
    /// Armed; the start condition has not been met yet, or its first
    /// frames have not been produced.
    StreamJustStarting,
    /// Recording.
    Stream,
    /// Closed; waiting for the worker to publish the frame count.
    Idle2,
}

/// When capture begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureStart {
    /// Latch to the next block boundary.
    Now,
    /// First input sample with `|x| >= threshold`.
    Threshold(f32),
    /// A specific global frame, possibly in the past.
    At(u64),
}

/// Parameters of a capture `open`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureOpenSpec {
    pub filename: String,
    /// Codec forced by a `-<typename>` flag.
    pub codec: Option<String>,
    /// Sample width; defaults to 16-bit.
    pub bytes_per_sample: usize,
    /// Requested endianness; the codec policy has the last word.
    pub big_endian: Option<bool>,
    /// Overrides the engine sample rate.
    pub sample_rate: Option<f64>,
}

struct CaptureTarget {
    file: File,
    path: PathBuf,
    codec: Arc<dyn SoundfileCodec>,
    info: SoundfileInfo,
}

pub(crate) struct WriterShared {
    state: WriterState,
    request: Request,
    file_error: Option<Error>,
    filename: String,
    codec: Option<Arc<dyn SoundfileCodec>>,
    sf: SoundfileInfo,
    fifo: RingFifo,
    eof: bool,
    block_frames: usize,
    sig_countdown: i64,
    sig_period: i64,
    start_time: CaptureStart,
    /// Global frame to stop at; `u64::MAX` records until told otherwise.
    end_time: u64,
    /// Actual start reported on the start-time outlet.
    write_start_report: u64,
    /// Frames the worker has committed to disk.
    frames_written: u64,
    /// Final length, published once the file has closed.
    frames_report: Option<u64>,
    /// Bytes of real input currently represented in the FIFO, saturated
    /// at the FIFO size; bounds how far a late start can reach back.
    performed_fifo_bytes: usize,
    overruns: u64,
    in_overrun: bool,
    anchor: Option<Arc<TimeAnchor>>,
    anchor_name: Option<String>,
    local_origin: LogicalTime,
}

/// Streaming capture object.
pub struct StreamWriter {
    cell: Arc<StreamCell<WriterShared>>,
    caps: HostCaps,
    anchors: Arc<AnchorRegistry>,
    codecs: Arc<CodecRegistry>,
    channels: usize,
    sample_rate: f64,
    worker: Option<JoinHandle<()>>,
}

impl StreamWriter {
    /// `buffer_bytes == 0` selects the per-channel default.
    pub fn new(
        channels: usize,
        buffer_bytes: usize,
        sample_rate: f64,
        caps: HostCaps,
        anchors: Arc<AnchorRegistry>,
        codecs: Arc<CodecRegistry>,
    ) -> Self {
        let channels = channels.clamp(1, MAX_CHANNELS);
        let buffer = clamp_buffer_size(buffer_bytes, channels);
        let shared = WriterShared {
            state: WriterState::Idle,
            request: Request::Nothing,
            file_error: None,
            filename: String::new(),
            codec: None,
            sf: SoundfileInfo {
                channels,
                ..Default::default()
            },
            fifo: RingFifo::new(buffer),
            eof: false,
            block_frames: 64,
            sig_countdown: 0,
            sig_period: 1,
            start_time: CaptureStart::Now,
            end_time: u64::MAX,
            write_start_report: 0,
            frames_written: 0,
            frames_report: None,
            performed_fifo_bytes: 0,
            overruns: 0,
            in_overrun: false,
            anchor: None,
            anchor_name: None,
            local_origin: caps.clock.now(),
        };
        let cell = Arc::new(StreamCell::new(shared));
        let worker = thread::Builder::new()
            .name("reeltime-writer".into())
            .spawn({
                let cell = Arc::clone(&cell);
                let opener = Arc::clone(&caps.files);
                move || writer_worker(cell, opener)
            })
            .expect("failed to spawn writer worker");
        Self {
            cell,
            caps,
            anchors,
            codecs,
            channels,
            sample_rate,
            worker: Some(worker),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Arm a capture. Stops any running one, waits for the worker to
    /// finish the previous file, then hands it the new one.
    pub fn open(&self, spec: CaptureOpenSpec) -> Result<()> {
        let bytes_per_sample = if spec.bytes_per_sample == 0 {
            2
        } else {
            spec.bytes_per_sample
        };
        if !valid_bytes_per_sample(bytes_per_sample) {
            return Err(Error::InvalidArgument(format!(
                "bad bytes per sample: {bytes_per_sample}"
            )));
        }
        let codec = match &spec.codec {
            Some(name) => self
                .codecs
                .find(name)
                .ok_or_else(|| Error::InvalidArgument(format!("unknown file type: {name}")))?,
            None => self
                .codecs
                .by_extension(&spec.filename)
                .or_else(|| self.codecs.default_codec())
                .ok_or(Error::UnknownHeader)?,
        };
        let big_endian = codec.endianness(spec.big_endian, bytes_per_sample);
        if let Some(requested) = spec.big_endian {
            if requested != big_endian {
                tracing::info!(
                    codec = codec.name(),
                    "forced to {} endian",
                    if big_endian { "big" } else { "little" }
                );
            }
        }
        let filename = if codec.has_extension(&spec.filename) {
            spec.filename.clone()
        } else {
            codec.add_extension(&spec.filename)
        };

        if self.state() != WriterState::Idle {
            let _ = self.stop(None);
        }

        let mut s = self.cell.state.lock();
        // Let the worker finish writing the previous file.
        while s.request != Request::Nothing {
            self.cell.request.notify_one();
            self.cell.answer.wait(&mut s);
        }
        s.filename = filename;
        s.codec = Some(codec);
        s.sf = SoundfileInfo {
            channels: self.channels,
            bytes_per_sample,
            sample_rate: spec.sample_rate.unwrap_or(self.sample_rate),
            big_endian,
            header_size: 0,
            byte_limit: 0,
        };
        s.frames_written = 0;
        s.frames_report = None;
        s.request = Request::Open;
        s.fifo.reset();
        s.eof = false;
        s.file_error = None;
        s.state = WriterState::Startup;
        s.start_time = CaptureStart::Now;
        s.end_time = u64::MAX;
        s.performed_fifo_bytes = 0;
        let bytes_per_frame = s.sf.bytes_per_frame();
        s.fifo.set_granularity(bytes_per_frame * MAX_BLOCK_FRAMES);
        s.sig_period = signal_period(s.fifo.size, bytes_per_frame, s.block_frames);
        s.sig_countdown = s.sig_period;
        self.cell.request.notify_one();
        Ok(())
    }

    /// Begin now, on a threshold, or at a global frame.
    pub fn start(&self, start: CaptureStart) -> Result<()> {
        let mut s = self.cell.state.lock();
        if s.state != WriterState::Startup {
            return Err(Error::InvalidArgument(
                "start requested with no prior 'open'".into(),
            ));
        }
        s.state = WriterState::StreamJustStarting;
        s.start_time = start;
        s.local_origin = self.caps.clock.now();
        self.cell.request.notify_one();
        Ok(())
    }

    /// Start at a scheduled frame given as a time code.
    pub fn start_at(&self, at: FrameTimeCode) -> Result<()> {
        let frames = at.to_frames();
        if frames < 0 {
            return Err(Error::InvalidArgument(
                "start time must be >= 0 frames".into(),
            ));
        }
        self.start(CaptureStart::At(frames as u64))
    }

    /// Stop immediately, or at a scheduled global frame.
    pub fn stop(&self, at: Option<FrameTimeCode>) -> Result<()> {
        let end = match at {
            None => None,
            Some(ftc) => {
                let frames = ftc.to_frames();
                if frames < 0 {
                    return Err(Error::InvalidArgument(
                        "end time must be >= 0 frames".into(),
                    ));
                }
                Some(frames as u64)
            }
        };
        let mut s = self.cell.state.lock();
        if !matches!(
            s.state,
            WriterState::Stream | WriterState::StreamJustStarting | WriterState::Startup
        ) {
            return Err(Error::InvalidArgument(
                "stop requested with no prior 'open'".into(),
            ));
        }
        match end {
            None => {
                s.state = WriterState::Idle2;
                s.request = Request::Close;
            }
            Some(frames) => s.end_time = frames,
        }
        self.cell.request.notify_one();
        Ok(())
    }

    /// Bind to a shared anchor by name, or to a per-stream local origin
    /// with `None` / `"self"`.
    pub fn set_anchor(&self, name: Option<&str>) -> Result<()> {
        let mut s = self.cell.state.lock();
        match name {
            None | Some("self") => {
                s.anchor = None;
                s.anchor_name = None;
                Ok(())
            }
            Some(name) => {
                s.anchor_name = Some(name.to_string());
                match self.anchors.find(name) {
                    Some(anchor) => {
                        anchor.mark_used_in_graph();
                        s.anchor = Some(anchor);
                        Ok(())
                    }
                    None => {
                        s.anchor = None;
                        Err(Error::NoSuchAnchor(name.to_string()))
                    }
                }
            }
        }
    }

    /// Declare the host block size and refresh the drain cadence; also
    /// re-resolves the anchor binding.
    pub fn prepare(&self, block_frames: usize) {
        let mut s = self.cell.state.lock();
        s.block_frames = block_frames.clamp(1, MAX_BLOCK_FRAMES);
        s.sig_period = signal_period(s.fifo.size, s.sf.bytes_per_frame(), s.block_frames);
        if let Some(name) = s.anchor_name.clone() {
            s.anchor = self.anchors.find(&name);
            if let Some(anchor) = &s.anchor {
                anchor.mark_used_in_graph();
            }
        }
    }

    /// One realtime block of input.
    pub fn process(&self, inputs: &[&[f32]]) {
        let mut events: Vec<StreamEvent> = Vec::new();
        {
            let mut s = self.cell.state.lock();
            match s.state {
                WriterState::Stream | WriterState::StreamJustStarting => {
                    self.process_stream(&mut s, inputs, &mut events)
                }
                WriterState::Idle2 => {
                    if let Some(frames) = s.frames_report.take() {
                        events.push(StreamEvent::RecordedFrames(FrameTimeCode::from_frames(
                            frames as i64,
                        )));
                        s.state = WriterState::Idle;
                    }
                }
                WriterState::Startup | WriterState::Idle => {}
            }
        }
        for event in events {
            self.caps.events.emit(event);
        }
    }

    fn process_stream(
        &self,
        s: &mut WriterShared,
        inputs: &[&[f32]],
        events: &mut Vec<StreamEvent>,
    ) {
        let sf = s.sf.clone();
        let bytes_per_frame = sf.bytes_per_frame();
        let full_block = s.block_frames;
        let mut vecsize = full_block;
        debug_assert!(inputs.iter().all(|input| input.len() >= vecsize));

        let block_start = self.block_start(s);
        if matches!(s.start_time, CaptureStart::Now) {
            s.start_time = CaptureStart::At(block_start);
            s.write_start_report = block_start;
        }
        if let CaptureStart::Threshold(threshold) = s.start_time {
            if let Some(hit) = find_threshold(inputs, sf.channels, vecsize, threshold) {
                s.start_time = CaptureStart::At(block_start + hit as u64);
            }
        }

        let mut finished = false;
        let mut vecstart = 0usize;
        let mut tail_push = false;
        if block_start + vecsize as u64 > s.end_time {
            finished = true;
            vecsize = if s.end_time > block_start {
                ((s.end_time - block_start) as usize).min(vecsize)
            } else {
                0
            };
        } else {
            match s.start_time {
                // Threshold still armed: keep pre-rolling.
                CaptureStart::Threshold(_) => tail_push = true,
                CaptureStart::At(start) if block_start <= start => {
                    if block_start + (vecsize as u64) > start {
                        // The start lands inside this block: realign the
                        // FIFO so the head sits a whole block past zero
                        // and record from the in-block offset.
                        vecstart = (start - block_start) as usize;
                        let at = vecstart * bytes_per_frame;
                        s.fifo.tail = at;
                        s.fifo.head = at;
                        vecsize -= vecstart;
                        s.write_start_report = start;
                    } else {
                        tail_push = true;
                    }
                }
                CaptureStart::At(start) => {
                    if s.state == WriterState::StreamJustStarting && block_start > start {
                        // Start time already passed: reach back into the
                        // pre-roll for as much as the FIFO still holds.
                        let overdue = (block_start - start) as usize;
                        let mut overdue_bytes = overdue * bytes_per_frame;
                        if overdue_bytes >= s.fifo.size {
                            // One frame short keeps head and tail from
                            // lining up again.
                            overdue_bytes = s.fifo.size - bytes_per_frame;
                        }
                        if overdue_bytes > s.performed_fifo_bytes {
                            overdue_bytes = s.performed_fifo_bytes;
                        }
                        s.fifo.rewind_tail(overdue_bytes);
                        let recovered = overdue_bytes / bytes_per_frame;
                        s.write_start_report = start + (overdue - recovered) as u64;
                    }
                }
                CaptureStart::Now => unreachable!(),
            }
        }

        let want_bytes = vecsize * bytes_per_frame;
        let mut room = s.fifo.tail as i64 - s.fifo.head as i64;
        if room <= 0 {
            room += s.fifo.size as i64;
        }
        if !s.eof && (room as usize) < want_bytes + 1 {
            // The realtime side never waits on the worker: drop the block
            // and count the overrun.
            if !s.in_overrun {
                s.in_overrun = true;
                tracing::warn!(file = %s.filename, "capture FIFO overrun, dropping input");
            }
            s.overruns += 1;
            self.cell.request.notify_one();
            return;
        }
        s.in_overrun = false;

        if s.eof {
            report_error(s);
            s.state = WriterState::Idle;
            self.cell.request.notify_one();
            return;
        }

        // A block-size change can leave the head without a contiguous
        // block before the buffer end; restart the pre-roll instead of
        // writing past it.
        if s.fifo.head + want_bytes > s.fifo.size {
            s.fifo.reset();
            s.performed_fifo_bytes = 0;
            self.cell.request.notify_one();
            return;
        }

        if vecsize > 0 {
            let head = s.fifo.head;
            let bytes = s.fifo.slice_mut(head, want_bytes);
            pcm::encode_from(&sf, inputs, vecstart, bytes, vecsize);
        }
        s.performed_fifo_bytes = (s.performed_fifo_bytes + want_bytes).min(s.fifo.size);
        s.fifo.advance_head(want_bytes);

        if tail_push {
            // Nothing is due on disk yet; the FIFO keeps a rolling
            // pre-record of the most recent input.
            s.fifo.tail = s.fifo.head;
        } else if s.state == WriterState::StreamJustStarting && vecsize > 0 {
            s.state = WriterState::Stream;
            events.push(StreamEvent::StartTime(FrameTimeCode::from_frames(
                s.write_start_report as i64,
            )));
        }

        if finished {
            s.state = WriterState::Idle2;
            s.request = Request::Close;
            self.cell.request.notify_one();
        } else {
            s.sig_countdown -= 1;
            if s.sig_countdown <= 0 {
                self.cell.request.notify_one();
                s.sig_countdown = s.sig_period;
            }
        }
    }

    fn block_start(&self, s: &WriterShared) -> u64 {
        match &s.anchor {
            Some(anchor) => anchor.elapsed_frames(),
            None => {
                let since = self.caps.clock.frames_since(s.local_origin).ceil();
                if since < 0.0 {
                    0
                } else {
                    since as u64
                }
            }
        }
    }

    /// Log the stream's internals.
    pub fn print(&self) {
        let s = self.cell.state.lock();
        tracing::info!(
            state = ?s.state,
            head = s.fifo.head,
            tail = s.fifo.tail,
            size = s.fifo.size,
            eof = s.eof,
            start = ?s.start_time,
            end = s.end_time,
            frames_written = s.frames_written,
            "writer state"
        );
    }

    pub fn state(&self) -> WriterState {
        self.cell.state.lock().state
    }

    /// Frames committed to disk so far.
    pub fn frames_written(&self) -> u64 {
        self.cell.state.lock().frames_written
    }

    /// Blocks dropped because the FIFO was full.
    pub fn overruns(&self) -> u64 {
        self.cell.state.lock().overruns
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        {
            let mut s = self.cell.state.lock();
            s.request = Request::Quit;
            while s.request != Request::Nothing {
                self.cell.request.notify_one();
                self.cell.answer.wait(&mut s);
            }
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn report_error(s: &mut WriterShared) {
    if let Some(error) = s.file_error.take() {
        match s.codec.as_ref().map(|codec| codec.name().to_string()) {
            Some(codec) => tracing::error!(
                file = %s.filename,
                codec = %codec,
                "capture error: {error}"
            ),
            None => tracing::error!(file = %s.filename, "capture error: {error}"),
        }
    }
}

/// Scan the input channels for the first sample at or over the threshold.
fn find_threshold(
    inputs: &[&[f32]],
    channels: usize,
    nframes: usize,
    threshold: f32,
) -> Option<usize> {
    for input in inputs.iter().take(channels) {
        for (frame, sample) in input[..nframes.min(input.len())].iter().enumerate() {
            if sample.abs() >= threshold {
                return Some(frame);
            }
        }
    }
    None
}

/// Worker: owns the descriptor, drains the FIFO tail to disk.
fn writer_worker(cell: Arc<StreamCell<WriterShared>>, opener: Arc<dyn FileOpener>) {
    let mut scratch = vec![0u8; READ_SIZE];
    let mut current: Option<CaptureTarget> = None;
    let mut guard = cell.state.lock();
    loop {
        match guard.request {
            Request::Nothing => {
                cell.answer.notify_one();
                cell.request.wait(&mut guard);
            }
            Request::Busy => {
                guard.request = Request::Nothing;
            }
            Request::Open => {
                service_capture(&cell, &mut guard, &*opener, &mut current, &mut scratch);
            }
            Request::Close | Request::Quit => {
                let quit = guard.request == Request::Quit;
                if let Some(target) = current.take() {
                    let frames = guard.frames_written;
                    MutexGuard::unlocked(&mut guard, || finish_target(target, frames));
                }
                guard.request = Request::Nothing;
                guard.frames_report = Some(guard.frames_written);
                cell.answer.notify_one();
                if quit {
                    break;
                }
            }
        }
    }
}

/// Create the requested file, then drain the FIFO until the request
/// changes or an error ends the capture.
fn service_capture(
    cell: &StreamCell<WriterShared>,
    guard: &mut MutexGuard<'_, WriterShared>,
    opener: &dyn FileOpener,
    current: &mut Option<CaptureTarget>,
    scratch: &mut [u8],
) {
    let filename = guard.filename.clone();
    let info = guard.sf.clone();
    let codec = guard.codec.clone();
    guard.request = Request::Busy;
    guard.file_error = None;

    // Finish any file left over from a previous capture.
    if let Some(target) = current.take() {
        let frames = guard.frames_written;
        MutexGuard::unlocked(guard, || finish_target(target, frames));
        if guard.request != Request::Busy {
            return;
        }
    }

    let Some(codec) = codec else {
        guard.file_error = Some(Error::UnknownHeader);
        guard.eof = true;
        if guard.request == Request::Busy {
            guard.request = Request::Nothing;
        }
        cell.answer.notify_one();
        return;
    };

    let created = MutexGuard::unlocked(guard, || create_target(opener, codec, info, &filename));
    match created {
        Ok(target) => {
            guard.sf.header_size = target.info.header_size;
            *current = Some(target);
        }
        Err(error) => {
            guard.file_error = Some(error);
            guard.eof = true;
            if guard.request == Request::Busy {
                guard.request = Request::Nothing;
            }
            cell.answer.notify_one();
            return;
        }
    }
    if guard.request != Request::Busy {
        // A newer request supersedes this open; the next pass finishes
        // the file we just created.
        return;
    }

    guard.fifo.tail = 0;
    guard.frames_written = 0;
    let bytes_per_frame = guard.sf.bytes_per_frame();

    loop {
        let request = guard.request;
        let draining = request == Request::Busy
            || (request == Request::Close && guard.fifo.head != guard.fifo.tail);
        if !draining {
            break;
        }
        let fifo_size = guard.fifo.size;
        let head = guard.fifo.head;
        let tail = guard.fifo.tail;
        let flush_now = request == Request::Close && head != tail;

        // With the head wrapped behind the tail the span to the end of
        // the buffer is writable now; otherwise wait for a full chunk
        // unless we are closing out.
        let write_bytes = if head < tail || head >= tail + WRITE_SIZE || flush_now {
            let limit = if head < tail { fifo_size } else { head };
            (limit - tail).min(READ_SIZE)
        } else {
            cell.answer.notify_one();
            cell.request.wait(guard);
            continue;
        };

        let tail_snapshot = tail;
        scratch[..write_bytes].copy_from_slice(guard.fifo.slice(tail, write_bytes));
        let target = current.as_mut().expect("drain loop without open file");
        let io = MutexGuard::unlocked(guard, || target.file.write_all(&scratch[..write_bytes]));

        if guard.request != Request::Busy && guard.request != Request::Close {
            break;
        }
        let failed = io.is_err();
        if let Err(error) = io {
            guard.file_error = Some(error.into());
        }
        // The realtime side only realigns the tail while head == tail,
        // which cannot coincide with a drain in flight.
        if failed || guard.fifo.tail != tail_snapshot {
            if guard.request == Request::Busy {
                guard.request = Request::Nothing;
            }
            if let Some(target) = current.take() {
                MutexGuard::unlocked(guard, || drop(target));
            }
            guard.eof = true;
            cell.answer.notify_one();
            break;
        }
        guard.fifo.advance_tail(write_bytes);
        guard.frames_written += (write_bytes / bytes_per_frame) as u64;
        cell.answer.notify_one();
    }
}

fn create_target(
    opener: &dyn FileOpener,
    codec: Arc<dyn SoundfileCodec>,
    mut info: SoundfileInfo,
    filename: &str,
) -> std::result::Result<CaptureTarget, Error> {
    let (mut file, path) = opener.create(filename)?;
    let header_size = codec.write_header(&mut file, &info, 0)?;
    info.header_size = header_size;
    Ok(CaptureTarget {
        file,
        path,
        codec,
        info,
    })
}

fn finish_target(mut target: CaptureTarget, frames_written: u64) {
    if let Err(error) = target
        .codec
        .update_header(&mut target.file, &target.info, frames_written)
    {
        tracing::error!(
            file = %target.path.display(),
            codec = target.codec.name(),
            "finishing capture: {error}"
        );
    }
}
