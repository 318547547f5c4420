//! Wire protocol: record framing and the in-band seek directive.
//!
//! Clients send an arbitrary byte stream in which records are delimited by
//! the line terminator `0x0A`. One chunk shape is special: a received chunk
//! whose contents exactly match
//!
//! ```text
//! AESDCHAR_IOCSEEKTO:<decimal>,<decimal>
//! ```
//!
//! (single comma, optional single trailing newline, no other bytes) is an
//! out-of-band seek directive repositioning the replay cursor, and is not
//! appended to the log. Recognition is per received chunk, not per line: a
//! chunk that carries any additional bytes around the directive is ordinary
//! payload.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a whole chunk carrying exactly one seek directive.
#[allow(clippy::expect_used)]
static SEEK_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\AAESDCHAR_IOCSEEKTO:(\d+),(\d+)\n?\z").expect("seek directive pattern")
});

/// A parsed seek directive: record index (zero-referenced from the oldest
/// retained record) and byte offset within that record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekTo {
    pub write_cmd: u32,
    pub write_cmd_offset: u32,
}

/// What a received chunk means to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkAction {
    /// Ordinary payload to append. `terminated` is true when the chunk ends
    /// in the line terminator, completing the current record.
    Payload { terminated: bool },
    /// A whole-chunk seek directive; nothing is appended.
    Seek(SeekTo),
}

/// Classifies one received chunk.
pub fn classify_chunk(chunk: &[u8]) -> ChunkAction {
    if let Some(seek) = parse_seek_directive(chunk) {
        return ChunkAction::Seek(seek);
    }
    ChunkAction::Payload {
        terminated: chunk.last() == Some(&b'\n'),
    }
}

/// Parses a chunk that is exactly one seek directive, or returns `None`.
///
/// Values must fit an unsigned 32-bit integer; anything else (including a
/// directive glued to further payload, or one split across chunks) is not a
/// directive.
pub fn parse_seek_directive(chunk: &[u8]) -> Option<SeekTo> {
    let text = std::str::from_utf8(chunk).ok()?;
    let captures = SEEK_DIRECTIVE.captures(text)?;
    let write_cmd = captures[1].parse().ok()?;
    let write_cmd_offset = captures[2].parse().ok()?;
    Some(SeekTo {
        write_cmd,
        write_cmd_offset,
    })
}
