//! Streaming playback: a realtime block callback fed from disk by a
//! background worker through the byte FIFO.
//!
//! The realtime side never blocks. Each block it consumes decoded frames
//! from the FIFO tail, schedules start and stop against the global frame
//! clock, and signals the worker every sixteenth of the FIFO. The worker
//! owns the file descriptor, plans loop-aware seeks, and pads reads past
//! the end of the file with silence.

use crate::codec::CodecRegistry;
use crate::fifo::RingFifo;
use crate::pcm;
use crate::shared::{
    clamp_buffer_size, signal_period, Request, StreamCell, MAX_BLOCK_FRAMES, READ_SIZE,
};
use crate::soundfile::{open_soundfile, OpenSpec, SoundfileInfo, MAX_CHANNELS};
use parking_lot::MutexGuard;
use reeltime_core::anchor::{AnchorRegistry, TimeAnchor};
use reeltime_core::error::{Error, Result};
use reeltime_core::host::{FileOpener, HostCaps, LogicalTime, StreamEvent};
use reeltime_core::timecode::FrameTimeCode;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Playback stream lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// No file armed.
    Idle,
    /// Worker is opening the file; output is silence.
    Startup,
    /// File ready, length reported; waiting for `start`.
    Startup2,
    /// Producing audio.
    Stream,
}

/// When playback begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTime {
    /// Latch to the next block boundary.
    Now,
    /// A specific global frame.
    At(u64),
}

/// When playback ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTime {
    /// At the end of the current loop cycle, resolved once the file
    /// length is known.
    AtLoop,
    Never,
    At(u64),
}

/// Loop span within the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopLength {
    /// The file's own usable length ("self").
    File,
    Frames(u64),
}

/// Forms of the `stop` message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopMode {
    /// Drop the stream on the next block.
    Immediate,
    /// Schedule the end at the current block boundary.
    Now,
    /// Schedule the end at the current loop boundary.
    End,
    /// Cancel any scheduled end.
    Never,
    At(FrameTimeCode),
}

pub(crate) struct ReaderShared {
    state: ReaderState,
    request: Request,
    file_error: Option<Error>,
    open_spec: OpenSpec,
    sf: SoundfileInfo,
    sf_valid: bool,
    codec_name: Option<String>,
    fifo: RingFifo,
    eof: bool,
    total_frames: Option<u64>,
    block_frames: usize,
    sig_countdown: i64,
    sig_period: i64,
    /// Where the worker should resume filling, in global frames.
    head_time_request: u64,
    /// Global frame corresponding to the FIFO tail.
    tail_time: u64,
    loop_length: LoopLength,
    loop_start: u64,
    loop_dirty: bool,
    start_time: StartTime,
    end_time: EndTime,
    anchor: Option<Arc<TimeAnchor>>,
    anchor_name: Option<String>,
    local_origin: LogicalTime,
}

/// Streaming playback object.
///
/// Owns its FIFO, its worker thread, and the mutex/condvar pair the two
/// share. Audio leaves through the channel slices passed to
/// [`StreamReader::process`]; everything else leaves through the host
/// event sink after the block.
pub struct StreamReader {
    cell: Arc<StreamCell<ReaderShared>>,
    caps: HostCaps,
    anchors: Arc<AnchorRegistry>,
    channels: usize,
    worker: Option<JoinHandle<()>>,
}

impl StreamReader {
    /// `buffer_bytes == 0` selects the per-channel default.
    pub fn new(
        channels: usize,
        buffer_bytes: usize,
        caps: HostCaps,
        anchors: Arc<AnchorRegistry>,
        codecs: Arc<CodecRegistry>,
    ) -> Self {
        let channels = channels.clamp(1, MAX_CHANNELS);
        let buffer = clamp_buffer_size(buffer_bytes, channels);
        let shared = ReaderShared {
            state: ReaderState::Idle,
            request: Request::Nothing,
            file_error: None,
            open_spec: OpenSpec::default(),
            sf: SoundfileInfo::default(),
            sf_valid: false,
            codec_name: None,
            fifo: RingFifo::new(buffer),
            eof: false,
            total_frames: None,
            block_frames: 64,
            sig_countdown: 0,
            sig_period: 1,
            head_time_request: 0,
            tail_time: 0,
            loop_length: LoopLength::File,
            loop_start: 0,
            loop_dirty: false,
            start_time: StartTime::Now,
            end_time: EndTime::AtLoop,
            anchor: None,
            anchor_name: None,
            local_origin: caps.clock.now(),
        };
        let cell = Arc::new(StreamCell::new(shared));
        let worker = thread::Builder::new()
            .name("reeltime-reader".into())
            .spawn({
                let cell = Arc::clone(&cell);
                let opener = Arc::clone(&caps.files);
                let codecs = Arc::clone(&codecs);
                move || reader_worker(cell, opener, codecs)
            })
            .expect("failed to spawn reader worker");
        Self {
            cell,
            caps,
            anchors,
            channels,
            worker: Some(worker),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Arm a stream. The worker opens the file; playback waits for
    /// `start`.
    pub fn open(&self, spec: OpenSpec) {
        let mut s = self.cell.state.lock();
        s.open_spec = spec;
        if s.open_spec.header_size.is_some() {
            if let Some(codec) = s.open_spec.codec.take() {
                tracing::info!("'-{codec}' overridden by headersize");
            }
        }
        s.fifo.reset();
        s.eof = false;
        s.sf_valid = false;
        s.codec_name = None;
        s.total_frames = None;
        s.file_error = None;
        s.head_time_request = 0;
        s.tail_time = 0;
        s.start_time = StartTime::Now;
        s.end_time = EndTime::AtLoop;
        s.state = ReaderState::Startup;
        s.request = Request::Open;
        self.cell.request.notify_one();
    }

    /// Begin immediately, or at a given global frame.
    pub fn start(&self, at: Option<FrameTimeCode>) -> Result<()> {
        let start = match at {
            None => StartTime::Now,
            Some(ftc) => {
                let frames = ftc.to_frames();
                if frames < 0 {
                    return Err(Error::InvalidArgument(
                        "start time must be >= 0 frames".into(),
                    ));
                }
                StartTime::At(frames as u64)
            }
        };
        let mut s = self.cell.state.lock();
        if !matches!(s.state, ReaderState::Startup | ReaderState::Startup2) {
            return Err(Error::InvalidArgument(
                "start requested with no prior 'open'".into(),
            ));
        }
        s.loop_dirty = true;
        s.state = ReaderState::Stream;
        s.start_time = start;
        s.local_origin = self.caps.clock.now();
        self.cell.request.notify_one();
        Ok(())
    }

    pub fn stop(&self, mode: StopMode) -> Result<()> {
        let end = match mode {
            StopMode::At(ftc) => {
                let frames = ftc.to_frames();
                if frames < 0 {
                    return Err(Error::InvalidArgument(
                        "end time must be >= 0 frames".into(),
                    ));
                }
                Some(EndTime::At(frames as u64))
            }
            _ => None,
        };
        let mut s = self.cell.state.lock();
        if !matches!(
            s.state,
            ReaderState::Stream | ReaderState::Startup | ReaderState::Startup2
        ) {
            return Err(Error::InvalidArgument(
                "stop requested with no prior 'open'".into(),
            ));
        }
        match mode {
            StopMode::Immediate => {
                s.state = ReaderState::Idle;
                s.request = Request::Close;
            }
            StopMode::Now => s.end_time = EndTime::At(0),
            StopMode::End => s.end_time = EndTime::AtLoop,
            StopMode::Never => s.end_time = EndTime::Never,
            StopMode::At(_) => s.end_time = end.unwrap_or(EndTime::Never),
        }
        self.cell.request.notify_one();
        Ok(())
    }

    pub fn set_loop_length(&self, length: LoopLength) -> Result<()> {
        if matches!(length, LoopLength::Frames(0)) {
            return Err(Error::InvalidArgument(
                "loop length must be > 0 frames".into(),
            ));
        }
        let mut s = self.cell.state.lock();
        s.loop_dirty = true;
        s.loop_length = length;
        self.cell.request.notify_one();
        Ok(())
    }

    /// Frames into the file, after the open-time onset, to loop from.
    pub fn set_loop_start(&self, frames: u64) {
        let mut s = self.cell.state.lock();
        s.loop_dirty = true;
        s.loop_start = frames;
        self.cell.request.notify_one();
    }

    /// Bind to a shared anchor by name, or to a per-stream local origin
    /// with `None` / `"self"`.
    pub fn set_anchor(&self, name: Option<&str>) -> Result<()> {
        let mut s = self.cell.state.lock();
        s.loop_dirty = true;
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

    /// Declare the host block size and refresh the refill cadence; also
    /// re-resolves the anchor binding, as graph rebuilds do.
    pub fn prepare(&self, block_frames: usize) {
        let mut s = self.cell.state.lock();
        s.block_frames = block_frames.clamp(1, MAX_BLOCK_FRAMES);
        if s.sf_valid {
            s.sig_period = signal_period(s.fifo.size, s.sf.bytes_per_frame(), s.block_frames);
        }
        if let Some(name) = s.anchor_name.clone() {
            s.anchor = self.anchors.find(&name);
            if let Some(anchor) = &s.anchor {
                anchor.mark_used_in_graph();
            }
        }
    }

    /// One realtime block: fill every channel slice with `block_frames`
    /// samples.
    pub fn process(&self, outputs: &mut [&mut [f32]]) {
        let mut events: Vec<StreamEvent> = Vec::new();
        {
            let mut s = self.cell.state.lock();
            match s.state {
                ReaderState::Stream => self.process_stream(&mut s, outputs, &mut events),
                ReaderState::Startup => {
                    self.poll_startup(&mut s, &mut events);
                    silence(outputs);
                }
                ReaderState::Startup2 | ReaderState::Idle => silence(outputs),
            }
        }
        for event in events {
            self.caps.events.emit(event);
        }
    }

    fn process_stream(
        &self,
        s: &mut ReaderShared,
        outputs: &mut [&mut [f32]],
        events: &mut Vec<StreamEvent>,
    ) {
        // Nothing plays until the file length has been reported.
        if s.total_frames.is_none() {
            note_total_frames(s, events);
            if s.total_frames.is_none() {
                if s.file_error.is_some() {
                    report_error(s);
                    s.state = ReaderState::Idle;
                    events.push(StreamEvent::TotalFrames(FrameTimeCode::ZERO));
                    events.push(StreamEvent::Done);
                }
                silence(outputs);
                return;
            }
        }
        let total_frames = s.total_frames.unwrap_or(0);
        let sf = s.sf.clone();
        let bytes_per_frame = sf.bytes_per_frame();
        let vecsize = s.block_frames;
        debug_assert!(outputs.iter().all(|out| out.len() >= vecsize));
        let want_bytes = vecsize * bytes_per_frame;

        let block_start = self.block_start(s);
        if matches!(s.start_time, StartTime::Now) {
            s.start_time = StartTime::At(block_start);
        }
        let start_frames = match s.start_time {
            StartTime::At(frames) => frames,
            StartTime::Now => unreachable!(),
        };

        // Loop parameters changed: restart the FIFO from this block.
        if s.loop_dirty {
            s.loop_dirty = false;
            s.fifo.reset();
            s.eof = false;
        }

        // Resync the tail with the frame clock, sliding forward when the
        // buffered span allows it.
        if s.tail_time != block_start {
            let delta = block_start as i64 - s.tail_time as i64;
            let mut resynced = false;
            if delta > 0 {
                let delta_bytes = (delta as u64).saturating_mul(bytes_per_frame as u64);
                let forward_limit = if s.fifo.head < s.fifo.tail {
                    s.fifo.size
                } else {
                    s.fifo.head
                };
                if (s.fifo.tail as u64) + delta_bytes + want_bytes as u64 <= forward_limit as u64 {
                    s.fifo.tail += delta_bytes as usize;
                    s.tail_time = block_start;
                    resynced = true;
                }
            }
            if !resynced {
                s.fifo.reset();
                s.eof = false;
            }
        }

        // An empty FIFO tells the worker where to resume.
        if s.fifo.head == s.fifo.tail {
            s.head_time_request = block_start;
            s.tail_time = block_start;
        }

        // Underfull and not at EOF: emit silence and ask for more.
        if !s.eof && s.fifo.head >= s.fifo.tail && s.fifo.head < s.fifo.tail + want_bytes - 1 {
            self.cell.request.notify_one();
            silence(outputs);
            return;
        }

        if s.file_error.is_some() {
            report_error(s);
            s.state = ReaderState::Idle;
            events.push(StreamEvent::Done);
            silence(outputs);
            return;
        }

        // A block-size change can leave the tail without a contiguous
        // block before the buffer end; resync instead of reading past it.
        if s.fifo.tail + want_bytes > s.fifo.size {
            s.fifo.reset();
            s.eof = false;
            self.cell.request.notify_one();
            silence(outputs);
            return;
        }

        // A stop-at-loop-end request resolves once the loop length is
        // known; past boundaries count so the end lands on the current
        // cycle, not the first.
        if matches!(s.end_time, EndTime::AtLoop) {
            let loop_frames = match s.loop_length {
                LoopLength::File => total_frames,
                LoopLength::Frames(frames) => frames,
            };
            s.end_time = if loop_frames == 0 {
                EndTime::At(start_frames)
            } else {
                let cycles = if start_frames <= block_start {
                    (block_start - start_frames) / loop_frames + 1
                } else {
                    1
                };
                EndTime::At(start_frames + cycles * loop_frames)
            };
        }
        let end_frames = match s.end_time {
            EndTime::At(frames) => frames,
            EndTime::Never => u64::MAX,
            EndTime::AtLoop => unreachable!(),
        };

        if block_start + vecsize as u64 > end_frames {
            // The block crosses the end: decode the prefix, silence the
            // rest, and close.
            let transfer = if block_start >= end_frames {
                0
            } else {
                ((end_frames - block_start) as usize).min(vecsize)
            };
            if transfer > 0 {
                let tail = s.fifo.tail;
                pcm::decode_into(
                    &sf,
                    s.fifo.slice(tail, transfer * bytes_per_frame),
                    outputs,
                    0,
                    transfer,
                );
            }
            for output in outputs.iter_mut() {
                output[transfer..vecsize].fill(0.0);
            }
            s.state = ReaderState::Idle;
            s.request = Request::Close;
            events.push(StreamEvent::Done);
            self.cell.request.notify_one();
            return;
        }

        if block_start < start_frames {
            // The start lands inside (or past) this block: silent prefix,
            // then decode from the matching FIFO offset. The tail still
            // advances a whole block to stay in sync.
            let zero_frames = ((start_frames - block_start) as usize).min(vecsize);
            for output in outputs.iter_mut() {
                output[..zero_frames].fill(0.0);
            }
            let transfer = vecsize - zero_frames;
            if transfer > 0 {
                let at = s.fifo.tail + zero_frames * bytes_per_frame;
                pcm::decode_into(
                    &sf,
                    s.fifo.slice(at, transfer * bytes_per_frame),
                    outputs,
                    zero_frames,
                    transfer,
                );
            }
        } else {
            // Fully inside the scheduled span; the worker already turned
            // any span past EOF into silence.
            let tail = s.fifo.tail;
            pcm::decode_into(&sf, s.fifo.slice(tail, want_bytes), outputs, 0, vecsize);
        }
        s.fifo.advance_tail(want_bytes);
        s.tail_time += vecsize as u64;

        s.sig_countdown -= 1;
        if s.sig_countdown <= 0 {
            self.cell.request.notify_one();
            s.sig_countdown = s.sig_period;
        }
    }

    fn poll_startup(&self, s: &mut ReaderShared, events: &mut Vec<StreamEvent>) {
        if s.total_frames.is_none() {
            note_total_frames(s, events);
            if s.total_frames.is_some() {
                s.state = ReaderState::Startup2;
            }
        }
        if s.file_error.is_some() {
            report_error(s);
            s.state = ReaderState::Idle;
            events.push(StreamEvent::TotalFrames(FrameTimeCode::ZERO));
            events.push(StreamEvent::Done);
        }
    }

    fn block_start(&self, s: &ReaderShared) -> u64 {
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

    /// Legacy float control: nonzero starts, zero stops.
    pub fn control_float(&self, value: f64) -> Result<()> {
        if value != 0.0 {
            self.start(None)
        } else {
            self.stop(StopMode::Immediate)
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
            total_frames = ?s.total_frames,
            "reader state"
        );
    }

    pub fn state(&self) -> ReaderState {
        self.cell.state.lock().state
    }

    /// Usable frames in the open file, once the header has been parsed.
    pub fn total_frames(&self) -> Option<u64> {
        self.cell.state.lock().total_frames
    }

    /// Bytes currently buffered ahead of the realtime thread.
    pub fn buffered_bytes(&self) -> usize {
        self.cell.state.lock().fifo.used()
    }

    pub fn is_eof(&self) -> bool {
        self.cell.state.lock().eof
    }
}

impl Drop for StreamReader {
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

fn silence(outputs: &mut [&mut [f32]]) {
    for output in outputs.iter_mut() {
        output.fill(0.0);
    }
}

fn note_total_frames(s: &mut ReaderShared, events: &mut Vec<StreamEvent>) {
    if s.sf_valid && s.sf.bytes_per_frame() > 0 {
        let frames = s.sf.byte_limit / s.sf.bytes_per_frame() as u64;
        if frames > 0 {
            s.total_frames = Some(frames);
            events.push(StreamEvent::TotalFrames(FrameTimeCode::from_frames(
                frames as i64,
            )));
        }
    }
}

fn report_error(s: &mut ReaderShared) {
    if let Some(error) = s.file_error.take() {
        match &s.codec_name {
            Some(codec) => tracing::error!(
                file = %s.open_spec.filename,
                codec = %codec,
                "stream error: {error}"
            ),
            None => tracing::error!(file = %s.open_spec.filename, "stream error: {error}"),
        }
    }
}

/// Worker: owns the descriptor, fills the FIFO head.
fn reader_worker(
    cell: Arc<StreamCell<ReaderShared>>,
    opener: Arc<dyn FileOpener>,
    codecs: Arc<CodecRegistry>,
) {
    let mut scratch = vec![0u8; READ_SIZE];
    let mut guard = cell.state.lock();
    loop {
        match guard.request {
            Request::Nothing => {
                cell.answer.notify_one();
                cell.request.wait(&mut guard);
            }
            Request::Close | Request::Busy => {
                guard.request = Request::Nothing;
                cell.answer.notify_one();
            }
            Request::Quit => {
                guard.request = Request::Nothing;
                cell.answer.notify_one();
                break;
            }
            Request::Open => {
                service_open(&cell, &mut guard, &*opener, &codecs, &mut scratch);
            }
        }
    }
}

/// Open the requested file and run the refill loop until the request
/// changes or the stream errors out.
fn service_open(
    cell: &StreamCell<ReaderShared>,
    guard: &mut MutexGuard<'_, ReaderShared>,
    opener: &dyn FileOpener,
    codecs: &CodecRegistry,
    scratch: &mut [u8],
) {
    let spec = guard.open_spec.clone();
    guard.request = Request::Busy;
    guard.file_error = None;

    let opened = MutexGuard::unlocked(guard, || open_soundfile(opener, codecs, &spec));
    let mut sound = match opened {
        Ok(sound) => sound,
        Err(error) => {
            guard.file_error = Some(error);
            if guard.request == Request::Busy {
                guard.request = Request::Nothing;
            }
            if guard.request != Request::Open {
                guard.eof = true;
            }
            cell.answer.notify_one();
            return;
        }
    };

    let bytes_per_frame = sound.info.bytes_per_frame() as u64;
    let original_byte_limit = sound.info.byte_limit;
    // Lowest and highest file offsets of the streamable region.
    let initial_offset = sound.info.header_size + spec.onset_frames * bytes_per_frame;
    let seek_max = original_byte_limit + initial_offset;

    guard.sf = sound.info.clone();
    guard.codec_name = sound.codec.as_ref().map(|codec| codec.name().to_string());
    guard.sf_valid = true;

    if guard.request == Request::Busy {
        guard.fifo.set_granularity(bytes_per_frame as usize * MAX_BLOCK_FRAMES);
        guard.sig_period =
            signal_period(guard.fifo.size, bytes_per_frame as usize, guard.block_frames);
        guard.sig_countdown = guard.sig_period;

        let mut next_seek: u64 = 0;
        while guard.request == Request::Busy {
            let loop_bytes = match guard.loop_length {
                LoopLength::File => original_byte_limit,
                LoopLength::Frames(frames) => frames * bytes_per_frame,
            };
            if loop_bytes == 0 {
                guard.eof = true;
                guard.file_error = Some(Error::Empty);
                break;
            }
            let loop_start_bytes = guard.loop_start * bytes_per_frame;
            let loop_end = loop_bytes + initial_offset + loop_start_bytes;

            if guard.fifo.head == 0 && guard.fifo.tail == 0 {
                // Fresh FIFO: derive the seek from the requested time. A
                // request before the start time lands on the in-loop
                // position the stream will have reached by then.
                let start = match guard.start_time {
                    StartTime::At(frames) => frames,
                    StartTime::Now => 0,
                };
                let byte_time =
                    (guard.head_time_request as i64 - start as i64) * bytes_per_frame as i64;
                next_seek = if byte_time >= 0 {
                    byte_time as u64 % loop_bytes + initial_offset + loop_start_bytes
                } else {
                    loop_bytes - (byte_time.unsigned_abs() % loop_bytes)
                        + initial_offset
                        + loop_start_bytes
                };
            }
            // Exactly on the loop seam: wrap to the loop start.
            if next_seek == loop_end {
                next_seek = initial_offset + loop_start_bytes;
            }
            let loop_byte_limit = loop_end.saturating_sub(next_seek) as usize;

            let fifo_size = guard.fifo.size;
            let head = guard.fifo.head;
            let tail = guard.fifo.tail;
            let want_bytes = if head >= tail {
                // Fill toward the end of the buffer, unless that would
                // make a full buffer indistinguishable from an empty one.
                if tail > 0 || fifo_size - head > READ_SIZE {
                    (fifo_size - head).min(READ_SIZE).min(loop_byte_limit)
                } else {
                    cell.answer.notify_one();
                    cell.request.wait(guard);
                    continue;
                }
            } else {
                let room = tail - head - 1;
                if room < READ_SIZE {
                    cell.answer.notify_one();
                    cell.request.wait(guard);
                    continue;
                }
                READ_SIZE.min(loop_byte_limit)
            };

            let head_snapshot = head;
            let head_time_snapshot = guard.head_time_request;
            // Bytes actually present in the file; the remainder of the
            // span lies past EOF and becomes silence.
            let file_bytes = (seek_max.saturating_sub(next_seek) as usize).min(want_bytes);
            let seek_to = next_seek;

            scratch[..want_bytes].fill(0);
            let io = MutexGuard::unlocked(guard, || {
                read_span(&mut sound.file, seek_to, &mut scratch[..file_bytes])
            });

            if guard.request != Request::Busy {
                break;
            }
            let bytes_read = match io {
                Ok(read) => read,
                Err(error) => {
                    guard.file_error = Some(error.into());
                    break;
                }
            };
            if bytes_read == 0 && file_bytes > 0 {
                // The header promised data the file does not have.
                break;
            }
            let advance = bytes_read + (want_bytes - file_bytes);

            // Apply only if the consumer left the FIFO alone during the
            // I/O; a stale read is discarded and replanned.
            if guard.fifo.head == head_snapshot && guard.head_time_request == head_time_snapshot {
                guard.fifo.fill(head_snapshot, &scratch[..advance]);
                guard.fifo.advance_head(advance);
                next_seek += advance as u64;
                if next_seek == loop_end {
                    next_seek = initial_offset + loop_start_bytes;
                }
            }
            cell.answer.notify_one();
        }
    }

    // Fell out of the refill loop: flag EOF unless a newer open
    // supersedes this one, and close the descriptor without the lock.
    if guard.request == Request::Busy {
        guard.request = Request::Nothing;
    }
    if guard.request != Request::Open {
        guard.eof = true;
    }
    MutexGuard::unlocked(guard, || drop(sound));
    cell.answer.notify_one();
}

fn read_span(file: &mut File, at: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    file.seek(SeekFrom::Start(at))?;
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(read) => total += read,
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
    Ok(total)
}
