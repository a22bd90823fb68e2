//! Standard MIDI File reader
//!
//! A sequential byte reader over the chunked SMF container:
//!
//! ```text
//! "MThd" len:u32 format:u16 ntrks:u16 division:u16
//! "MTrk" len:u32 (delta:vlq event)*
//! ```
//!
//! Header problems are fatal. Anything wrong inside a track chunk ends that
//! track early with a warning and keeps what was decoded so far.

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

/// Errors raised while decoding the byte stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MidiError {
    #[error("not a Standard MIDI File: missing MThd header")]
    BadMagic,

    #[error("header chunk is too short ({0} bytes)")]
    ShortHeader(u32),

    #[error("tick resolution is zero")]
    ZeroDivision,

    #[error("SMPTE time division is not supported")]
    SmpteDivision,

    #[error("unsupported SMF format {0}")]
    UnsupportedFormat(u16),

    #[error("unexpected end of data at byte {0}")]
    UnexpectedEof(usize),

    #[error("variable-length quantity at byte {0} runs past 4 bytes")]
    VlqTooLong(usize),

    #[error("data byte {byte:#04x} at byte {offset} with no running status")]
    NoRunningStatus { byte: u8, offset: usize },

    #[error("unexpected status byte {byte:#04x} at byte {offset}")]
    UnexpectedStatus { byte: u8, offset: usize },
}

pub type Result<T> = std::result::Result<T, MidiError>;

/// Decode one variable-length quantity from the start of `data`.
///
/// Returns the value and the number of bytes consumed. Consumption stops at
/// the first byte whose top bit is clear.
pub fn read_vlq(data: &[u8]) -> Result<(u32, usize)> {
    let mut value = 0u32;
    for (i, &byte) in data.iter().enumerate() {
        if i == 4 {
            return Err(MidiError::VlqTooLong(0));
        }
        value = (value << 7) | (byte & 0x7f) as u32;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(MidiError::UnexpectedEof(data.len()))
}

/// Cursor over a byte slice with big-endian helpers
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = self.peek_u8().ok_or(MidiError::UnexpectedEof(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(MidiError::UnexpectedEof(self.data.len()));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_vlq(&mut self) -> Result<u32> {
        let start = self.pos;
        match read_vlq(&self.data[self.pos..]) {
            Ok((value, used)) => {
                self.pos += used;
                Ok(value)
            }
            Err(MidiError::VlqTooLong(_)) => Err(MidiError::VlqTooLong(start)),
            Err(_) => Err(MidiError::UnexpectedEof(self.data.len())),
        }
    }
}

/// Parsed `MThd` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmfHeader {
    pub format: u16,
    pub track_count: u16,
    /// Ticks per quarter note
    pub division: u16,
}

/// A sounding note decoded from a note-on/note-off pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawNote {
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
    pub start: u64,
    pub end: u64,
}

impl RawNote {
    pub fn duration(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// Decoded events of one track chunk (or one channel of a format 0 file)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTrack {
    pub index: usize,
    pub name: Option<String>,
    pub program: Option<u8>,
    pub notes: Vec<RawNote>,
}

impl RawTrack {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn with_notes(mut self, notes: Vec<RawNote>) -> Self {
        self.notes = notes;
        self
    }

    /// Channel used by most notes
    pub fn main_channel(&self) -> Option<u8> {
        let mut counts = [0usize; 16];
        for n in &self.notes {
            counts[(n.channel & 0x0f) as usize] += 1;
        }
        let (channel, count) = counts
            .iter()
            .enumerate()
            .max_by_key(|&(ch, c)| (*c, std::cmp::Reverse(ch)))?;
        (*count > 0).then_some(channel as u8)
    }
}

/// Meta information taken from the earliest matching event in the file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmfMeta {
    /// Microseconds per quarter note
    pub tempo: Option<u32>,
    /// (numerator, denominator)
    pub time_signature: Option<(u8, u8)>,
    /// (sharps or negative flats, minor)
    pub key_signature: Option<(i8, bool)>,
}

/// Everything decoded from one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmfData {
    pub header: SmfHeader,
    pub tracks: Vec<RawTrack>,
    pub meta: SmfMeta,
    pub warnings: Vec<String>,
}

impl SmfData {
    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }

    /// Last note-off tick over all tracks
    pub fn end_tick(&self) -> u64 {
        self.tracks
            .iter()
            .flat_map(|t| t.notes.iter())
            .map(|n| n.end)
            .max()
            .unwrap_or(0)
    }
}

/// True when the buffer starts with the SMF header magic
pub fn is_smf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"MThd")
}

fn read_header(reader: &mut ByteReader<'_>) -> Result<SmfHeader> {
    let magic = reader.read_bytes(4).map_err(|_| MidiError::BadMagic)?;
    if magic != b"MThd" {
        return Err(MidiError::BadMagic);
    }
    let len = reader.read_u32_be()?;
    if len < 6 {
        return Err(MidiError::ShortHeader(len));
    }
    let format = reader.read_u16_be()?;
    let track_count = reader.read_u16_be()?;
    let division = reader.read_u16_be()?;
    reader.read_bytes((len - 6) as usize)?;

    if format > 2 {
        return Err(MidiError::UnsupportedFormat(format));
    }
    if division & 0x8000 != 0 {
        return Err(MidiError::SmpteDivision);
    }
    if division == 0 {
        return Err(MidiError::ZeroDivision);
    }
    Ok(SmfHeader {
        format,
        track_count,
        division,
    })
}

/// Meta event types that are read without comment
const QUIET_META: [u8; 12] = [
    0x00, 0x01, 0x02, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x20, 0x21, 0x54,
];

#[derive(Debug, Default)]
struct TrackDecoder {
    tick: u64,
    running: Option<u8>,
    /// Open notes per (channel, key), oldest first
    open: HashMap<(u8, u8), VecDeque<(u64, u8)>>,
    notes: Vec<RawNote>,
    name: Option<String>,
    program: Option<u8>,
    warnings: Vec<String>,
}

impl TrackDecoder {
    fn note_on(&mut self, channel: u8, key: u8, velocity: u8) {
        self.open
            .entry((channel, key))
            .or_default()
            .push_back((self.tick, velocity));
    }

    fn note_off(&mut self, channel: u8, key: u8) {
        if let Some((start, velocity)) = self
            .open
            .get_mut(&(channel, key))
            .and_then(VecDeque::pop_front)
        {
            self.notes.push(RawNote {
                channel,
                pitch: key,
                velocity,
                start,
                end: self.tick,
            });
        }
    }

    /// Decode events until end-of-track or the data runs out
    fn run(&mut self, reader: &mut ByteReader<'_>, meta: &mut Vec<(u64, MetaValue)>) -> Result<()> {
        while !reader.is_empty() {
            let delta = reader.read_vlq()?;
            self.tick += delta as u64;

            let offset = reader.position();
            let first = reader.read_u8()?;
            let (status, first_data) = if first & 0x80 != 0 {
                (first, None)
            } else {
                let status = self.running.ok_or(MidiError::NoRunningStatus {
                    byte: first,
                    offset,
                })?;
                (status, Some(first))
            };
            let mut pending = first_data;

            match status {
                0x80..=0xEF => {
                    self.running = Some(status);
                    let channel = status & 0x0f;
                    match status & 0xf0 {
                        0x80 => {
                            let key = data_byte(reader, &mut pending)?;
                            data_byte(reader, &mut pending)?;
                            self.note_off(channel, key & 0x7f);
                        }
                        0x90 => {
                            let key = data_byte(reader, &mut pending)? & 0x7f;
                            let velocity = data_byte(reader, &mut pending)? & 0x7f;
                            if velocity == 0 {
                                self.note_off(channel, key);
                            } else {
                                self.note_on(channel, key, velocity);
                            }
                        }
                        0xC0 => {
                            let program = data_byte(reader, &mut pending)? & 0x7f;
                            self.program.get_or_insert(program);
                        }
                        0xD0 => {
                            data_byte(reader, &mut pending)?;
                        }
                        _ => {
                            data_byte(reader, &mut pending)?;
                            data_byte(reader, &mut pending)?;
                        }
                    }
                }
                0xF0 | 0xF7 => {
                    let len = reader.read_vlq()?;
                    reader.read_bytes(len as usize)?;
                }
                0xFF => {
                    let kind = reader.read_u8()?;
                    let len = reader.read_vlq()?;
                    let body = reader.read_bytes(len as usize)?;
                    match kind {
                        0x2F => return Ok(()),
                        0x03 if self.name.is_none() => {
                            let name = String::from_utf8_lossy(body).trim().to_string();
                            if !name.is_empty() {
                                self.name = Some(name);
                            }
                        }
                        0x51 if body.len() == 3 => {
                            let usec = u32::from_be_bytes([0, body[0], body[1], body[2]]);
                            meta.push((self.tick, MetaValue::Tempo(usec)));
                        }
                        0x58 if body.len() >= 2 => {
                            let denominator = 1u8.checked_shl(body[1] as u32).unwrap_or(4);
                            meta.push((self.tick, MetaValue::Time(body[0], denominator)));
                        }
                        0x59 if body.len() == 2 => {
                            meta.push((self.tick, MetaValue::Key(body[0] as i8, body[1] == 1)));
                        }
                        0x03 | 0x51 | 0x58 | 0x59 | 0x7F => {}
                        k if QUIET_META.contains(&k) => {}
                        k => self
                            .warnings
                            .push(format!("unknown meta event {:#04x} skipped", k)),
                    }
                }
                byte => return Err(MidiError::UnexpectedStatus { byte, offset }),
            }
        }
        Ok(())
    }

    /// Close notes that never received a note-off
    fn finish(mut self, index: usize) -> (RawTrack, Vec<String>) {
        let mut dangling: Vec<((u8, u8), (u64, u8))> = self
            .open
            .drain()
            .flat_map(|(key, starts)| starts.into_iter().map(move |s| (key, s)))
            .collect();
        dangling.sort();
        if !dangling.is_empty() {
            self.warnings.push(format!(
                "{} note(s) without note-off closed at end of track",
                dangling.len()
            ));
        }
        for ((channel, pitch), (start, velocity)) in dangling {
            self.notes.push(RawNote {
                channel,
                pitch,
                velocity,
                start,
                end: self.tick.max(start),
            });
        }
        self.notes
            .sort_by_key(|n| (n.start, n.pitch, n.channel, n.end));

        let track = RawTrack {
            index,
            name: self.name,
            program: self.program,
            notes: self.notes,
        };
        (track, self.warnings)
    }
}

/// Next data byte, using the one already read under running status first
fn data_byte(reader: &mut ByteReader<'_>, pending: &mut Option<u8>) -> Result<u8> {
    match pending.take() {
        Some(byte) => Ok(byte),
        None => reader.read_u8(),
    }
}

#[derive(Debug, Clone, Copy)]
enum MetaValue {
    Tempo(u32),
    Time(u8, u8),
    Key(i8, bool),
}

/// Decode a complete SMF byte buffer
pub fn read_smf(bytes: &[u8]) -> Result<SmfData> {
    let mut reader = ByteReader::new(bytes);
    let header = read_header(&mut reader)?;

    let mut tracks = Vec::new();
    let mut warnings = Vec::new();
    let mut meta_events = Vec::new();

    while reader.remaining() >= 8 {
        let id = reader.read_bytes(4)?;
        let declared = reader.read_u32_be()? as usize;
        let len = declared.min(reader.remaining());
        let chunk_index = tracks.len();
        if len < declared {
            warnings.push(format!(
                "chunk {} declares {} bytes but only {} remain",
                chunk_index + 1,
                declared,
                len
            ));
        }
        let body = reader.read_bytes(len)?;

        if id != b"MTrk" {
            warnings.push(format!(
                "unknown chunk '{}' skipped",
                String::from_utf8_lossy(id)
            ));
            continue;
        }

        let mut decoder = TrackDecoder::default();
        let mut chunk = ByteReader::new(body);
        if let Err(e) = decoder.run(&mut chunk, &mut meta_events) {
            warnings.push(format!(
                "track {}: {}; kept {} note(s) decoded before the error",
                chunk_index + 1,
                e,
                decoder.notes.len()
            ));
        }
        let (track, track_warnings) = decoder.finish(chunk_index);
        warnings.extend(
            track_warnings
                .into_iter()
                .map(|w| format!("track {}: {}", chunk_index + 1, w)),
        );
        tracks.push(track);
    }

    if reader.remaining() > 0 {
        warnings.push(format!("{} trailing byte(s) ignored", reader.remaining()));
    }
    if tracks.len() != header.track_count as usize {
        warnings.push(format!(
            "header declares {} track(s) but {} were found",
            header.track_count,
            tracks.len()
        ));
    }

    meta_events.sort_by_key(|(tick, _)| *tick);
    let mut meta = SmfMeta::default();
    for (_, value) in meta_events {
        match value {
            MetaValue::Tempo(usec) if usec > 0 => {
                meta.tempo.get_or_insert(usec);
            }
            MetaValue::Time(n, d) if n > 0 => {
                meta.time_signature.get_or_insert((n, d));
            }
            MetaValue::Key(sf, minor) => {
                meta.key_signature.get_or_insert((sf, minor));
            }
            _ => {}
        }
    }

    if header.format == 0 {
        tracks = split_by_channel(tracks);
    }

    log::debug!(
        "SMF format {} with {} track(s), {} note(s), division {}",
        header.format,
        tracks.len(),
        tracks.iter().map(|t| t.notes.len()).sum::<usize>(),
        header.division
    );

    Ok(SmfData {
        header,
        tracks,
        meta,
        warnings,
    })
}

/// Split single-track (format 0) data into one raw track per channel
pub fn split_by_channel(tracks: Vec<RawTrack>) -> Vec<RawTrack> {
    let mut out = Vec::new();
    for track in tracks {
        let mut channels: Vec<u8> = track.notes.iter().map(|n| n.channel).collect();
        channels.sort_unstable();
        channels.dedup();
        if channels.len() <= 1 {
            out.push(RawTrack {
                index: out.len(),
                ..track
            });
            continue;
        }
        for channel in channels {
            let notes = track
                .notes
                .iter()
                .filter(|n| n.channel == channel)
                .copied()
                .collect();
            let name = match &track.name {
                Some(name) => format!("{} (ch {})", name, channel + 1),
                None => format!("Channel {}", channel + 1),
            };
            out.push(RawTrack {
                index: out.len(),
                name: Some(name),
                program: track.program,
                notes,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smf(format: u16, division: u16, chunks: &[&[u8]]) -> Vec<u8> {
        let mut out = b"MThd".to_vec();
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&format.to_be_bytes());
        out.extend_from_slice(&(chunks.len() as u16).to_be_bytes());
        out.extend_from_slice(&division.to_be_bytes());
        for chunk in chunks {
            out.extend_from_slice(b"MTrk");
            out.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
            out.extend_from_slice(chunk);
        }
        out
    }

    #[test]
    fn test_vlq_decoding() {
        assert_eq!(read_vlq(&[0x00]), Ok((0, 1)));
        assert_eq!(read_vlq(&[0x7f]), Ok((127, 1)));
        assert_eq!(read_vlq(&[0x81, 0x00]), Ok((128, 2)));
        assert_eq!(read_vlq(&[0xff, 0x7f, 0x55]), Ok((16383, 2)));
        assert_eq!(read_vlq(&[0x8f, 0xff, 0xff, 0x7f]), Ok((0x0fff_ffff, 4)));
    }

    #[test]
    fn test_vlq_without_terminator_is_fatal() {
        assert!(matches!(read_vlq(&[0x81, 0x80]), Err(MidiError::UnexpectedEof(_))));
        assert!(read_vlq(&[]).is_err());
        assert!(matches!(
            read_vlq(&[0x81, 0x81, 0x81, 0x81, 0x01]),
            Err(MidiError::VlqTooLong(_))
        ));
    }

    #[test]
    fn test_header_errors_are_fatal() {
        assert_eq!(read_smf(b"RIFF0000"), Err(MidiError::BadMagic));
        assert_eq!(read_smf(b"MTh"), Err(MidiError::BadMagic));
        assert_eq!(read_smf(&smf(1, 0, &[])), Err(MidiError::ZeroDivision));
        assert_eq!(read_smf(&smf(1, 0xE250, &[])), Err(MidiError::SmpteDivision));

        let mut short = b"MThd".to_vec();
        short.extend_from_slice(&6u32.to_be_bytes());
        short.extend_from_slice(&[0, 1]);
        assert!(matches!(read_smf(&short), Err(MidiError::UnexpectedEof(_))));
    }

    #[test]
    fn test_running_status_and_note_pairing() {
        let track: &[u8] = &[
            0x00, 0xFF, 0x03, 0x04, b'L', b'e', b'a', b'd', // name
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // 500000 usec
            0x00, 0x90, 60, 100, // C on
            0x00, 64, 90, // E on, running status
            0x83, 0x60, 60, 0, // C off via velocity 0 after 480 ticks
            0x00, 64, 0, // E off
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let data = read_smf(&smf(1, 480, &[track])).unwrap();
        assert!(data.warnings.is_empty(), "{:?}", data.warnings);
        assert_eq!(data.meta.tempo, Some(500_000));
        let t = &data.tracks[0];
        assert_eq!(t.name.as_deref(), Some("Lead"));
        assert_eq!(t.notes.len(), 2);
        assert_eq!(t.notes[0].pitch, 60);
        assert_eq!(t.notes[0].end, 480);
        assert_eq!(t.notes[1].velocity, 90);
    }

    #[test]
    fn test_truncated_track_keeps_partial_result() {
        let track: &[u8] = &[
            0x00, 0x90, 60, 100, //
            0x83, 0x60, 0x80, 60, 0, //
            0x00, 0x90, 62, // cut off mid-event
        ];
        let data = read_smf(&smf(1, 480, &[track])).unwrap();
        assert_eq!(data.tracks[0].notes.len(), 1);
        assert_eq!(data.warnings.len(), 1);
    }

    #[test]
    fn test_unterminated_notes_are_closed() {
        let track: &[u8] = &[0x00, 0x90, 60, 100, 0x60, 0x80, 62, 0];
        let data = read_smf(&smf(1, 96, &[track])).unwrap();
        assert_eq!(data.tracks[0].notes[0].end, 96);
        assert!(data.warnings.iter().any(|w| w.contains("without note-off")));
    }

    #[test]
    fn test_format_zero_splits_by_channel() {
        let track: &[u8] = &[
            0x00, 0x90, 72, 80, //
            0x00, 0x91, 48, 80, //
            0x60, 0x80, 72, 0, //
            0x00, 0x81, 48, 0, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let data = read_smf(&smf(0, 96, &[track])).unwrap();
        assert_eq!(data.tracks.len(), 2);
        assert_eq!(data.tracks[0].main_channel(), Some(0));
        assert_eq!(data.tracks[1].notes[0].pitch, 48);
    }

    #[test]
    fn test_unknown_chunk_and_meta_warn() {
        let track: &[u8] = &[0x00, 0xFF, 0x60, 0x01, 0x00, 0x00, 0xFF, 0x2F, 0x00];
        let mut bytes = smf(1, 96, &[track]);
        bytes.extend_from_slice(b"XFIH");
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&[1, 2]);
        let data = read_smf(&bytes).unwrap();
        assert_eq!(data.tracks.len(), 1);
        assert_eq!(data.warnings.len(), 2);
    }
}
