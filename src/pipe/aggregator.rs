//! Streaming line-group codec for worker stdout.
//!
//! [`LineGroupCodec`] turns an arbitrarily chunked byte stream into groups of
//! `group_size` text lines. A separator is `\r\n`, a lone `\n`, or a lone
//! `\r`; `\r\n` always counts as one separator, even when the two bytes arrive
//! in different chunks. Separators inside a group are kept verbatim, the
//! group's own closing separator is stripped.
//!
//! Separators are ASCII, so a group boundary can never fall inside a UTF-8
//! multi-byte sequence: an incomplete character at the end of a chunk simply
//! stays in the buffer until the rest of its group arrives. Text is decoded
//! once per emitted group.
//!
//! # Usage
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//! use watershed_relay::pipe::aggregator::line_groups;
//!
//! let mut groups = line_groups(child_stdout, NonZeroUsize::MIN);
//! while let Some(group) = groups.next().await { /* … */ }
//! ```

use std::num::NonZeroUsize;

use bytes::{Buf, BytesMut};
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::warn;

use crate::{AppError, Result};

/// Largest pending group the codec buffers before discarding it: 1 MiB.
pub const MAX_GROUP_BYTES: usize = 1_048_576;

/// Line-group decoder for worker output.
///
/// Never fails on content: invalid UTF-8 is replaced with U+FFFD and an
/// oversized group is dropped up to its closing boundary, both with a `warn`
/// log. Only I/O errors from the underlying reader surface as
/// [`AppError::Io`].
#[derive(Debug, Clone)]
pub struct LineGroupCodec {
    group_size: NonZeroUsize,
    max_length: usize,
    /// Buffer offset where the next separator scan resumes.
    next_index: usize,
    /// Separators consumed in the current group.
    lines_in_group: usize,
    /// Set while skipping the rest of an oversized group.
    discarding: bool,
}

impl LineGroupCodec {
    /// Codec emitting groups of `group_size` lines, capped at [`MAX_GROUP_BYTES`].
    #[must_use]
    pub fn new(group_size: NonZeroUsize) -> Self {
        Self::with_max_length(group_size, MAX_GROUP_BYTES)
    }

    /// Codec with an explicit cap on the buffered size of one group.
    #[must_use]
    pub fn with_max_length(group_size: NonZeroUsize, max_length: usize) -> Self {
        Self {
            group_size,
            max_length,
            next_index: 0,
            lines_in_group: 0,
            discarding: false,
        }
    }

    /// Lines per emitted group.
    #[must_use]
    pub fn group_size(&self) -> NonZeroUsize {
        self.group_size
    }

    fn reset(&mut self) {
        self.next_index = 0;
        self.lines_in_group = 0;
        self.discarding = false;
    }
}

impl Decoder for LineGroupCodec {
    type Item = String;
    type Error = AppError;

    /// Emit the next complete group, or `Ok(None)` while more bytes are needed.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            match find_separator(src, self.next_index) {
                Scan::Found { at, len } => {
                    self.lines_in_group += 1;
                    if self.lines_in_group < self.group_size.get() {
                        self.next_index = at + len;
                        continue;
                    }

                    let mut group = src.split_to(at + len);
                    group.truncate(at);
                    self.next_index = 0;
                    self.lines_in_group = 0;

                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    return Ok(Some(decode_text(&group)));
                }
                Scan::Pending { resume } => {
                    self.next_index = resume;
                    if !self.discarding && src.len() > self.max_length {
                        warn!(
                            buffered = src.len(),
                            max = self.max_length,
                            "line group too long, discarding until its boundary"
                        );
                        self.discarding = true;
                    }
                    if self.discarding {
                        // Scanned bytes are no longer needed; keep only the
                        // undecided tail (a trailing `\r`).
                        src.advance(resume);
                        self.next_index = 0;
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Flush the remainder at end of stream as a final, possibly short, group.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(group) = self.decode(src)? {
            return Ok(Some(group));
        }
        if src.is_empty() {
            self.reset();
            return Ok(None);
        }

        let mut rest = src.split();
        let discarding = self.discarding;
        self.reset();
        if discarding {
            return Ok(None);
        }

        strip_trailing_separator(&mut rest);
        Ok(Some(decode_text(&rest)))
    }
}

/// Wrap `reader` in a lazy stream of line groups.
#[must_use]
pub fn line_groups<R: AsyncRead>(
    reader: R,
    group_size: NonZeroUsize,
) -> FramedRead<R, LineGroupCodec> {
    FramedRead::new(reader, LineGroupCodec::new(group_size))
}

// ── Private helpers ───────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Scan {
    /// Separator starting at `at`, `len` bytes long.
    Found { at: usize, len: usize },
    /// No decidable separator; resume scanning at `resume` once more bytes arrive.
    Pending { resume: usize },
}

fn find_separator(buf: &[u8], from: usize) -> Scan {
    let Some(offset) = buf[from..]
        .iter()
        .position(|&byte| byte == b'\n' || byte == b'\r')
    else {
        return Scan::Pending { resume: buf.len() };
    };

    let at = from + offset;
    if buf[at] == b'\n' {
        return Scan::Found { at, len: 1 };
    }
    match buf.get(at + 1) {
        Some(b'\n') => Scan::Found { at, len: 2 },
        Some(_) => Scan::Found { at, len: 1 },
        // A trailing `\r` may be the first half of `\r\n`.
        None => Scan::Pending { resume: at },
    }
}

fn strip_trailing_separator(buf: &mut BytesMut) {
    if buf.ends_with(b"\r\n") {
        buf.truncate(buf.len() - 2);
    } else if buf.ends_with(b"\n") || buf.ends_with(b"\r") {
        buf.truncate(buf.len() - 1);
    }
}

fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(err) => {
            warn!(%err, "invalid utf-8 in worker output, replacing");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
