//! Control-message grammar for the stream objects.
//!
//! Hosts deliver messages as a selector plus a list of atoms. This module
//! parses them into typed commands and dispatches those onto the streams,
//! so a malformed message is rejected synchronously without touching any
//! stream state.

use crate::reader::{LoopLength, StopMode, StreamReader};
use crate::soundfile::OpenSpec;
use crate::writer::{CaptureOpenSpec, CaptureStart, StreamWriter};
use reeltime_core::error::{Error, Result};
use reeltime_core::timecode::FrameTimeCode;

/// One element of a host message.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Float(f64),
    Symbol(String),
}

impl Atom {
    pub fn symbol(name: &str) -> Self {
        Atom::Symbol(name.to_string())
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Atom::Float(value) => Some(*value),
            Atom::Symbol(_) => None,
        }
    }

    fn as_symbol(&self) -> Option<&str> {
        match self {
            Atom::Symbol(name) => Some(name),
            Atom::Float(_) => None,
        }
    }
}

/// Parse a frame time code from exactly three float atoms.
pub fn ftc_from_atoms(atoms: &[Atom]) -> Result<FrameTimeCode> {
    let floats: Vec<f64> = atoms.iter().filter_map(Atom::as_float).collect();
    if floats.len() != atoms.len() {
        return Err(Error::InvalidArgument(
            "a frame time code must be three floats: 1|-1, epoch, frames".into(),
        ));
    }
    FrameTimeCode::parse(&floats)
}

fn nonnegative_frames(atoms: &[Atom], what: &str) -> Result<FrameTimeCode> {
    let ftc = ftc_from_atoms(atoms)?;
    if ftc.to_frames() < 0 {
        return Err(Error::InvalidArgument(format!(
            "{what} must be >= 0 frames"
        )));
    }
    Ok(ftc)
}

/// Typed form of a playback message.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderCommand {
    Open(OpenSpec),
    Start(Option<FrameTimeCode>),
    Stop(StopMode),
    LoopLength(LoopLength),
    LoopStart(u64),
    /// `None` selects the per-stream local anchor.
    Time(Option<String>),
    Print,
}

/// Parse a playback message.
///
/// `open [-<typename>] filename [onset [headersize [channels [bytes
/// [endian]]]]]`, `start [<ftc>]`, `stop [now|end|never|<ftc>]`,
/// `looplength self|<ftc>`, `loopstart <ftc>`, `time <anchor>`, `print`,
/// and the legacy bare float.
pub fn parse_reader(selector: &str, args: &[Atom]) -> Result<ReaderCommand> {
    match selector {
        "open" => Ok(ReaderCommand::Open(parse_reader_open(args)?)),
        "start" => {
            if args.is_empty() {
                Ok(ReaderCommand::Start(None))
            } else {
                Ok(ReaderCommand::Start(Some(nonnegative_frames(
                    args,
                    "start time",
                )?)))
            }
        }
        "stop" => {
            if args.is_empty() {
                return Ok(ReaderCommand::Stop(StopMode::Immediate));
            }
            match args[0].as_symbol() {
                Some("now") => Ok(ReaderCommand::Stop(StopMode::Now)),
                Some("end") => Ok(ReaderCommand::Stop(StopMode::End)),
                Some("never") => Ok(ReaderCommand::Stop(StopMode::Never)),
                _ => Ok(ReaderCommand::Stop(StopMode::At(nonnegative_frames(
                    args,
                    "end time",
                )?))),
            }
        }
        "looplength" => {
            if args.first().and_then(Atom::as_symbol) == Some("self") {
                return Ok(ReaderCommand::LoopLength(LoopLength::File));
            }
            let ftc = ftc_from_atoms(args)?;
            let frames = ftc.to_frames();
            if frames <= 0 {
                return Err(Error::InvalidArgument(
                    "loop length must be > 0 frames".into(),
                ));
            }
            Ok(ReaderCommand::LoopLength(LoopLength::Frames(frames as u64)))
        }
        "loopstart" => {
            let ftc = nonnegative_frames(args, "loop start")?;
            Ok(ReaderCommand::LoopStart(ftc.to_frames() as u64))
        }
        "time" => parse_time(args).map(ReaderCommand::Time),
        "print" => Ok(ReaderCommand::Print),
        "float" => {
            let value = args
                .first()
                .and_then(Atom::as_float)
                .ok_or_else(|| Error::InvalidArgument("expected a float".into()))?;
            if value != 0.0 {
                Ok(ReaderCommand::Start(None))
            } else {
                Ok(ReaderCommand::Stop(StopMode::Immediate))
            }
        }
        other => Err(Error::InvalidArgument(format!("unknown message: {other}"))),
    }
}

fn parse_reader_open(args: &[Atom]) -> Result<OpenSpec> {
    let mut args = args;
    let mut codec = None;
    while let Some(flag) = args.first().and_then(Atom::as_symbol) {
        let Some(name) = flag.strip_prefix('-') else {
            break;
        };
        codec = Some(name.to_string());
        args = &args[1..];
    }
    let filename = args
        .first()
        .and_then(Atom::as_symbol)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::InvalidArgument("open: missing filename".into()))?
        .to_string();
    args = &args[1..];

    let onset = args.first().and_then(Atom::as_float).unwrap_or(0.0);
    let header = args.get(1).and_then(Atom::as_float).unwrap_or(0.0);
    let channels = args.get(2).and_then(Atom::as_float).unwrap_or(0.0);
    let bytes = args.get(3).and_then(Atom::as_float).unwrap_or(0.0);
    let endian = args.get(4).and_then(Atom::as_symbol).unwrap_or("");

    let big_endian = match endian.chars().next() {
        Some('b') => true,
        Some('l') => false,
        Some(_) => {
            return Err(Error::InvalidArgument(
                "open: endianness neither 'b' nor 'l'".into(),
            ))
        }
        None => cfg!(target_endian = "big"),
    };

    Ok(OpenSpec {
        filename,
        codec,
        onset_frames: if onset > 0.0 { onset as u64 } else { 0 },
        // Positive sizes skip detection; zero auto-detects; negative
        // means a truly headerless file.
        header_size: if header > 0.0 {
            Some(header as u64)
        } else if header == 0.0 {
            None
        } else {
            Some(0)
        },
        channels: if channels >= 1.0 { channels as usize } else { 1 },
        bytes_per_sample: if bytes > 2.0 { bytes as usize } else { 2 },
        big_endian,
    })
}

fn parse_time(args: &[Atom]) -> Result<Option<String>> {
    let name = args
        .first()
        .and_then(Atom::as_symbol)
        .ok_or_else(|| Error::InvalidArgument("time: expected an anchor name".into()))?;
    if name == "self" {
        Ok(None)
    } else {
        Ok(Some(name.to_string()))
    }
}

/// Typed form of a capture message.
#[derive(Debug, Clone, PartialEq)]
pub enum WriterCommand {
    Open(CaptureOpenSpec),
    Start(CaptureStart),
    Stop(Option<FrameTimeCode>),
    Time(Option<String>),
    Print,
}

/// Parse a capture message.
///
/// `open [-bytes N] [-big|-little] [-rate N] [-<typename>] filename`,
/// `start [<threshold>|<ftc>]`, `stop [<ftc>]`, `time <anchor>`, `print`.
pub fn parse_writer(selector: &str, args: &[Atom]) -> Result<WriterCommand> {
    match selector {
        "open" => parse_writer_open(args),
        "start" => match args.len() {
            0 => Ok(WriterCommand::Start(CaptureStart::Now)),
            1 => {
                let threshold = args[0]
                    .as_float()
                    .ok_or_else(|| Error::InvalidArgument("start: expected a threshold".into()))?;
                Ok(WriterCommand::Start(CaptureStart::Threshold(
                    threshold as f32,
                )))
            }
            _ => {
                let ftc = nonnegative_frames(args, "start time")?;
                Ok(WriterCommand::Start(CaptureStart::At(
                    ftc.to_frames() as u64
                )))
            }
        },
        "stop" => {
            if args.is_empty() {
                Ok(WriterCommand::Stop(None))
            } else {
                Ok(WriterCommand::Stop(Some(nonnegative_frames(
                    args,
                    "end time",
                )?)))
            }
        }
        "time" => parse_time(args).map(WriterCommand::Time),
        "print" => Ok(WriterCommand::Print),
        other => Err(Error::InvalidArgument(format!("unknown message: {other}"))),
    }
}

fn parse_writer_open(args: &[Atom]) -> Result<WriterCommand> {
    let mut args = args;
    let mut spec = CaptureOpenSpec::default();
    while let Some(flag) = args.first().and_then(Atom::as_symbol) {
        let Some(flag) = flag.strip_prefix('-') else {
            break;
        };
        match flag {
            "bytes" => {
                let bytes = args
                    .get(1)
                    .and_then(Atom::as_float)
                    .ok_or_else(|| Error::InvalidArgument("open: -bytes needs a number".into()))?;
                if !matches!(bytes as usize, 2 | 3 | 4 | 8) || bytes < 2.0 {
                    return Err(Error::InvalidArgument(format!(
                        "open: bad bytes per sample: {bytes}"
                    )));
                }
                spec.bytes_per_sample = bytes as usize;
                args = &args[2..];
            }
            "big" => {
                spec.big_endian = Some(true);
                args = &args[1..];
            }
            "little" => {
                spec.big_endian = Some(false);
                args = &args[1..];
            }
            "rate" | "r" => {
                let rate = args
                    .get(1)
                    .and_then(Atom::as_float)
                    .filter(|rate| *rate > 0.0)
                    .ok_or_else(|| Error::InvalidArgument("open: -rate needs a number".into()))?;
                spec.sample_rate = Some(rate);
                args = &args[2..];
            }
            name => {
                spec.codec = Some(name.to_string());
                args = &args[1..];
            }
        }
    }
    let filename = args
        .first()
        .and_then(Atom::as_symbol)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::InvalidArgument("open: missing filename".into()))?;
    spec.filename = filename.to_string();
    if args.len() > 1 {
        return Err(Error::InvalidArgument(
            "open: extra arguments ignored".into(),
        ));
    }
    Ok(WriterCommand::Open(spec))
}

impl StreamReader {
    /// Apply a parsed playback command.
    pub fn dispatch(&self, command: ReaderCommand) -> Result<()> {
        match command {
            ReaderCommand::Open(spec) => {
                self.open(spec);
                Ok(())
            }
            ReaderCommand::Start(at) => self.start(at),
            ReaderCommand::Stop(mode) => self.stop(mode),
            ReaderCommand::LoopLength(length) => self.set_loop_length(length),
            ReaderCommand::LoopStart(frames) => {
                self.set_loop_start(frames);
                Ok(())
            }
            ReaderCommand::Time(name) => self.set_anchor(name.as_deref()),
            ReaderCommand::Print => {
                self.print();
                Ok(())
            }
        }
    }

    /// Parse and apply a playback message.
    pub fn handle(&self, selector: &str, args: &[Atom]) -> Result<()> {
        self.dispatch(parse_reader(selector, args)?)
    }
}

impl StreamWriter {
    /// Apply a parsed capture command.
    pub fn dispatch(&self, command: WriterCommand) -> Result<()> {
        match command {
            WriterCommand::Open(spec) => self.open(spec),
            WriterCommand::Start(start) => self.start(start),
            WriterCommand::Stop(at) => self.stop(at),
            WriterCommand::Time(name) => self.set_anchor(name.as_deref()),
            WriterCommand::Print => {
                self.print();
                Ok(())
            }
        }
    }

    /// Parse and apply a capture message.
    pub fn handle(&self, selector: &str, args: &[Atom]) -> Result<()> {
        self.dispatch(parse_writer(selector, args)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Atom {
        Atom::symbol(name)
    }

    fn num(value: f64) -> Atom {
        Atom::Float(value)
    }

    #[test]
    fn test_ftc_from_atoms() {
        let ftc = ftc_from_atoms(&[num(1.0), num(0.0), num(500.0)]).unwrap();
        assert_eq!(ftc.to_frames(), 500);
        assert!(ftc_from_atoms(&[num(1.0), num(0.0)]).is_err());
        assert!(ftc_from_atoms(&[sym("x"), num(0.0), num(0.0)]).is_err());
    }

    #[test]
    fn test_reader_open_minimal() {
        let cmd = parse_reader("open", &[sym("drums.wav")]).unwrap();
        let ReaderCommand::Open(spec) = cmd else {
            panic!("expected open");
        };
        assert_eq!(spec.filename, "drums.wav");
        assert_eq!(spec.codec, None);
        assert_eq!(spec.onset_frames, 0);
        assert_eq!(spec.header_size, None);
    }

    #[test]
    fn test_reader_open_full_form() {
        let cmd = parse_reader(
            "open",
            &[
                sym("-wave"),
                sym("raw.dat"),
                num(100.0),
                num(-1.0),
                num(2.0),
                num(3.0),
                sym("b"),
            ],
        )
        .unwrap();
        let ReaderCommand::Open(spec) = cmd else {
            panic!("expected open");
        };
        assert_eq!(spec.codec.as_deref(), Some("wave"));
        assert_eq!(spec.onset_frames, 100);
        assert_eq!(spec.header_size, Some(0)); // -1 means headerless
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.bytes_per_sample, 3);
        assert!(spec.big_endian);
    }

    #[test]
    fn test_reader_open_requires_filename() {
        assert!(parse_reader("open", &[]).is_err());
        assert!(parse_reader("open", &[sym("-wave")]).is_err());
    }

    #[test]
    fn test_reader_start_forms() {
        assert_eq!(parse_reader("start", &[]).unwrap(), ReaderCommand::Start(None));
        let cmd = parse_reader("start", &[num(1.0), num(0.0), num(5000.0)]).unwrap();
        let ReaderCommand::Start(Some(ftc)) = cmd else {
            panic!("expected scheduled start");
        };
        assert_eq!(ftc.to_frames(), 5000);
        assert!(parse_reader("start", &[num(-1.0), num(0.0), num(1.0)]).is_err());
    }

    #[test]
    fn test_reader_stop_forms() {
        assert_eq!(
            parse_reader("stop", &[]).unwrap(),
            ReaderCommand::Stop(StopMode::Immediate)
        );
        assert_eq!(
            parse_reader("stop", &[sym("now")]).unwrap(),
            ReaderCommand::Stop(StopMode::Now)
        );
        assert_eq!(
            parse_reader("stop", &[sym("end")]).unwrap(),
            ReaderCommand::Stop(StopMode::End)
        );
        assert_eq!(
            parse_reader("stop", &[sym("never")]).unwrap(),
            ReaderCommand::Stop(StopMode::Never)
        );
        let cmd = parse_reader("stop", &[num(1.0), num(0.0), num(500.0)]).unwrap();
        assert!(matches!(cmd, ReaderCommand::Stop(StopMode::At(_))));
    }

    #[test]
    fn test_looplength_forms() {
        assert_eq!(
            parse_reader("looplength", &[sym("self")]).unwrap(),
            ReaderCommand::LoopLength(LoopLength::File)
        );
        assert_eq!(
            parse_reader("looplength", &[num(1.0), num(0.0), num(1500.0)]).unwrap(),
            ReaderCommand::LoopLength(LoopLength::Frames(1500))
        );
        assert!(parse_reader("looplength", &[num(1.0), num(0.0), num(0.0)]).is_err());
    }

    #[test]
    fn test_time_self_selects_local() {
        assert_eq!(parse_reader("time", &[sym("self")]).unwrap(), ReaderCommand::Time(None));
        assert_eq!(
            parse_reader("time", &[sym("groove")]).unwrap(),
            ReaderCommand::Time(Some("groove".into()))
        );
    }

    #[test]
    fn test_legacy_float() {
        assert_eq!(
            parse_reader("float", &[num(1.0)]).unwrap(),
            ReaderCommand::Start(None)
        );
        assert_eq!(
            parse_reader("float", &[num(0.0)]).unwrap(),
            ReaderCommand::Stop(StopMode::Immediate)
        );
    }

    #[test]
    fn test_writer_open_flags() {
        let cmd = parse_writer(
            "open",
            &[
                sym("-bytes"),
                num(3.0),
                sym("-big"),
                sym("-rate"),
                num(48000.0),
                sym("take1"),
            ],
        )
        .unwrap();
        let WriterCommand::Open(spec) = cmd else {
            panic!("expected open");
        };
        assert_eq!(spec.filename, "take1");
        assert_eq!(spec.bytes_per_sample, 3);
        assert_eq!(spec.big_endian, Some(true));
        assert_eq!(spec.sample_rate, Some(48000.0));
    }

    #[test]
    fn test_writer_open_typename_flag() {
        let cmd = parse_writer("open", &[sym("-wave"), sym("take2.wav")]).unwrap();
        let WriterCommand::Open(spec) = cmd else {
            panic!("expected open");
        };
        assert_eq!(spec.codec.as_deref(), Some("wave"));
    }

    #[test]
    fn test_writer_open_rejects_bad_bytes() {
        assert!(parse_writer("open", &[sym("-bytes"), num(5.0), sym("x")]).is_err());
        assert!(parse_writer("open", &[sym("-bytes"), sym("x")]).is_err());
    }

    #[test]
    fn test_writer_start_forms() {
        assert_eq!(
            parse_writer("start", &[]).unwrap(),
            WriterCommand::Start(CaptureStart::Now)
        );
        assert_eq!(
            parse_writer("start", &[num(0.1)]).unwrap(),
            WriterCommand::Start(CaptureStart::Threshold(0.1))
        );
        assert_eq!(
            parse_writer("start", &[num(1.0), num(0.0), num(10000.0)]).unwrap(),
            WriterCommand::Start(CaptureStart::At(10000))
        );
    }

    #[test]
    fn test_unknown_selector() {
        assert!(parse_reader("seek", &[]).is_err());
        assert!(parse_writer("loop", &[]).is_err());
    }
}
