//! Chunked framing of LYB subtrees.
//!
//! Every subtree is written as one or more chunks. A chunk starts with a
//! 4-byte meta record `(size: u16, inner_chunks: u16)`. `size` counts the
//! payload bytes of the chunk; a chunk of the maximum size is followed, once
//! drained, by another meta record of the same subtree. `inner_chunks`
//! counts the meta records of nested subtrees that lie inside the chunk, so
//! a reader can skip a subtree without understanding it.
//!
//! Accounting rules shared by [`LybReader`] and [`LybWriter`]:
//!
//! - payload bytes count towards every open frame; meta records count
//!   towards none;
//! - a frame that reaches the maximum chunk size is closed at once and its
//!   next meta record follows directly; when several frames fill at the
//!   same byte, the innermost one goes first;
//! - a meta record counts as nested in the current chunk of every frame
//!   enclosing the one it opens or continues. The reader counts these off as
//!   it reads them.

use crate::codec::primitives::{Reader, Writer, checked_u16_len};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{CHUNK_SIZE_MAX, INNER_CHUNKS_MAX, META_RECORD_SIZE};

/// State of one open framing level while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkFrame {
    /// Payload bytes left in the current chunk.
    pub remaining: u16,
    /// Nested meta records of the current chunk not read yet.
    pub inner_chunks: u16,
    /// The current chunk has the maximum size and another one follows.
    pub continuation: bool,
}

impl ChunkFrame {
    /// True once the frame's last chunk is fully read.
    pub fn is_terminal(&self) -> bool {
        self.remaining == 0 && !self.continuation
    }
}

// =============================================================================
// DECODING
// =============================================================================

/// Reader that resolves chunk framing transparently.
///
/// Outside any frame reads go straight to the input.
#[derive(Debug, Clone)]
pub struct LybReader<'a> {
    input: Reader<'a>,
    frames: Vec<ChunkFrame>,
    chunk_max: u16,
}

/// Whether an enclosing continuation boundary splits `inner` from its nested
/// metas. A full inner chunk closes before its parents, so an equal boundary
/// is only a problem for a final chunk.
fn boundary_inside(outer: &ChunkFrame, inner: &ChunkFrame) -> bool {
    outer.remaining < inner.remaining
        || (outer.remaining == inner.remaining && !inner.continuation)
}

impl<'a> LybReader<'a> {
    /// Creates a reader over a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_chunk_max(data, CHUNK_SIZE_MAX)
    }

    pub(crate) fn with_chunk_max(data: &'a [u8], chunk_max: u16) -> Self {
        Self {
            input: Reader::new(data),
            frames: Vec::new(),
            chunk_max,
        }
    }

    /// Returns the position in the input.
    pub fn position(&self) -> usize {
        self.input.position()
    }

    /// Returns the number of unread input bytes.
    pub fn remaining_len(&self) -> usize {
        self.input.remaining_len()
    }

    /// Returns the next input byte without consuming it.
    pub fn peek_byte(&self) -> Option<u8> {
        self.input.peek_byte()
    }

    /// Returns the number of open frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns the innermost open frame.
    pub fn top(&self) -> Option<&ChunkFrame> {
        self.frames.last()
    }

    /// True if the innermost frame has no payload left.
    pub fn top_exhausted(&self) -> bool {
        self.frames.last().is_some_and(ChunkFrame::is_terminal)
    }

    // =========================================================================
    // Frames
    // =========================================================================

    /// Reads a meta record and opens a frame for it.
    pub fn push_frame(&mut self) -> Result<(), DecodeError> {
        let frame = self.read_meta()?;
        let depth = self.frames.len();
        self.count_nested(depth, 1);
        tracing::trace!(
            depth = self.frames.len() + 1,
            size = frame.remaining,
            inner_chunks = frame.inner_chunks,
            "push chunk frame"
        );
        self.frames.push(frame);
        Ok(())
    }

    /// Closes the innermost frame, which must be fully read.
    pub fn pop_frame(&mut self) -> Result<(), DecodeError> {
        let top = self.frames.last().ok_or(DecodeError::Internal {
            context: "pop of an empty chunk frame stack",
        })?;
        if !top.is_terminal() {
            return Err(DecodeError::UnterminatedChunk {
                remaining: top.remaining,
            });
        }
        self.frames.pop();
        tracing::trace!(depth = self.frames.len(), "pop chunk frame");
        Ok(())
    }

    /// Discards the rest of the innermost frame without interpreting it.
    ///
    /// Nested meta records are skipped as a block before the payload. That
    /// is only sound while no enclosing chunk boundary lies inside the
    /// skipped chunk. A boundary at the end of the data of a final chunk
    /// counts as inside, since the nested metas then follow the enclosing
    /// meta. Either case returns [`DecodeError::AmbiguousSkip`].
    pub fn skip_subtree(&mut self) -> Result<(), DecodeError> {
        loop {
            let top = *self.frames.last().ok_or(DecodeError::Internal {
                context: "skip without an open chunk frame",
            })?;
            if top.inner_chunks > 0 {
                let outer = &self.frames[..self.frames.len() - 1];
                if outer
                    .iter()
                    .any(|f| f.continuation && boundary_inside(f, &top))
                {
                    return Err(DecodeError::AmbiguousSkip {
                        inner_chunks: top.inner_chunks,
                    });
                }
                self.input.skip(
                    top.inner_chunks as usize * META_RECORD_SIZE,
                    "nested chunk meta",
                )?;
                let depth = self.frames.len();
                self.count_nested(depth, top.inner_chunks);
            }
            if top.is_terminal() {
                return Ok(());
            }
            self.skip(top.remaining as usize, "skipped subtree")?;
        }
    }

    /// Counts `n` nested meta records as read in the first `outer` frames.
    fn count_nested(&mut self, outer: usize, n: u16) {
        for frame in &mut self.frames[..outer] {
            frame.inner_chunks = frame.inner_chunks.saturating_sub(n);
        }
    }

    fn read_meta(&mut self) -> Result<ChunkFrame, DecodeError> {
        let remaining = self.input.read_u16("chunk size")?;
        let inner_chunks = self.input.read_u16("chunk inner count")?;
        Ok(ChunkFrame {
            remaining,
            inner_chunks,
            continuation: remaining == self.chunk_max,
        })
    }

    fn refill(&mut self, index: usize) -> Result<(), DecodeError> {
        let frame = self.read_meta()?;
        self.count_nested(index, 1);
        tracing::trace!(depth = index + 1, size = frame.remaining, "refill chunk frame");
        self.frames[index] = frame;
        Ok(())
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Consumes `count` payload bytes, handing each contiguous run to `sink`.
    ///
    /// Exhausted continuation frames are refilled from the next meta record,
    /// innermost first. Terminal frames are never refilled.
    fn consume<F>(&mut self, mut count: usize, context: &'static str, mut sink: F) -> Result<(), DecodeError>
    where
        F: FnMut(&'a [u8]) -> Result<(), DecodeError>,
    {
        loop {
            let mut to_read = count;
            let mut refill = None;
            for (i, frame) in self.frames.iter().enumerate() {
                if frame.continuation && frame.remaining as usize <= to_read {
                    to_read = frame.remaining as usize;
                    refill = Some(i);
                }
            }

            if refill.is_none() && count == 0 {
                return Ok(());
            }

            if to_read > 0 {
                if let Some(frame) = self
                    .frames
                    .iter()
                    .find(|f| !f.continuation && (f.remaining as usize) < to_read)
                {
                    return Err(DecodeError::ChunkOverrun {
                        requested: count,
                        available: frame.remaining,
                    });
                }
                let bytes = self.input.read_bytes(to_read, context)?;
                sink(bytes)?;
                for frame in &mut self.frames {
                    frame.remaining -= to_read as u16;
                }
                count -= to_read;
            }

            if let Some(index) = refill {
                self.refill(index)?;
            }
        }
    }

    /// Skips `count` payload bytes.
    pub fn skip(&mut self, count: usize, context: &'static str) -> Result<(), DecodeError> {
        self.consume(count, context, |_| Ok(()))
    }

    /// Reads exactly `buf.len()` payload bytes into `buf`.
    pub fn read_exact(&mut self, buf: &mut [u8], context: &'static str) -> Result<(), DecodeError> {
        let mut filled = 0;
        self.consume(buf.len(), context, |bytes| {
            buf[filled..filled + bytes.len()].copy_from_slice(bytes);
            filled += bytes.len();
            Ok(())
        })
    }

    /// Reads `count` payload bytes into a new buffer.
    pub fn read_vec(&mut self, count: usize, context: &'static str) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::new();
        self.read_append(&mut out, count, context)?;
        Ok(out)
    }

    fn read_append(&mut self, out: &mut Vec<u8>, count: usize, context: &'static str) -> Result<(), DecodeError> {
        out.try_reserve(count)
            .map_err(|_| DecodeError::AllocationFailed { context })?;
        self.consume(count, context, |bytes| {
            out.extend_from_slice(bytes);
            Ok(())
        })
    }

    /// Reads a single byte.
    pub fn read_byte(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf, context)?;
        Ok(buf[0])
    }

    /// Reads a little-endian u16.
    pub fn read_u16(&mut self, context: &'static str) -> Result<u16, DecodeError> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf, context)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Reads a u16-length-prefixed UTF-8 string.
    pub fn read_string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let len = self.read_u16(field)? as usize;
        let bytes = self.read_vec(len, field)?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { field })
    }

    /// Skips a u16-length-prefixed string.
    pub fn skip_string(&mut self, field: &'static str) -> Result<(), DecodeError> {
        let len = self.read_u16(field)? as usize;
        self.skip(len, field)
    }

    /// Reads the rest of the innermost frame, across continuation chunks.
    pub fn read_bounded(&mut self, field: &'static str) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::new();
        loop {
            let top = *self.frames.last().ok_or(DecodeError::Internal {
                context: "bounded read without an open chunk frame",
            })?;
            if top.is_terminal() {
                return Ok(out);
            }
            self.read_append(&mut out, top.remaining as usize, field)?;
        }
    }

    /// Reads the rest of the innermost frame as a UTF-8 string.
    pub fn read_bounded_string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let bytes = self.read_bounded(field)?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { field })
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// State of one open framing level while encoding.
#[derive(Debug, Clone, Copy)]
struct WriteFrame {
    /// Output offset of the frame's current meta record.
    position: usize,
    /// Payload bytes in the current chunk.
    written: u16,
    /// Nested meta records reserved inside the current chunk.
    inner_chunks: u16,
}

/// Writer producing chunk-framed output with in-place backpatching.
#[derive(Debug, Clone)]
pub struct LybWriter {
    out: Writer,
    frames: Vec<WriteFrame>,
    chunk_max: u16,
}

impl Default for LybWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl LybWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::with_chunk_max(CHUNK_SIZE_MAX)
    }

    pub(crate) fn with_chunk_max(chunk_max: u16) -> Self {
        debug_assert!(chunk_max > 0);
        Self {
            out: Writer::with_capacity(256),
            frames: Vec::new(),
            chunk_max,
        }
    }

    /// Returns the number of open frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns the output. All frames must be closed.
    pub fn into_bytes(self) -> Result<Vec<u8>, EncodeError> {
        if !self.frames.is_empty() {
            return Err(EncodeError::Internal {
                context: "unclosed chunk frame",
            });
        }
        Ok(self.out.into_bytes())
    }

    /// Opens a nested frame and reserves its meta record.
    pub fn start_subtree(&mut self) -> Result<(), EncodeError> {
        self.count_inner_chunk(self.frames.len())?;
        self.frames.push(WriteFrame {
            position: self.out.len(),
            written: 0,
            inner_chunks: 0,
        });
        self.out.write_bytes(&[0; META_RECORD_SIZE]);
        Ok(())
    }

    /// Closes the innermost frame and fills in its last meta record.
    pub fn stop_subtree(&mut self) -> Result<(), EncodeError> {
        let frame = self.frames.pop().ok_or(EncodeError::Internal {
            context: "stop of an empty chunk frame stack",
        })?;
        self.patch_meta(&frame, frame.written)
    }

    /// Writes payload bytes to every open frame, or straight to the output
    /// when none is open.
    pub fn write(&mut self, mut data: &[u8]) -> Result<(), EncodeError> {
        loop {
            let mut to_write = data.len();
            let mut full = None;
            for (i, frame) in self.frames.iter().enumerate() {
                let room = (self.chunk_max - frame.written) as usize;
                if room <= to_write {
                    to_write = room;
                    full = Some(i);
                }
            }

            if full.is_none() && data.is_empty() {
                return Ok(());
            }

            if to_write > 0 {
                self.out.write_bytes(&data[..to_write]);
                for frame in &mut self.frames {
                    frame.written += to_write as u16;
                }
                data = &data[to_write..];
            }

            if let Some(index) = full {
                self.close_chunk(index)?;
            }
        }
    }

    /// Writes a single byte.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), EncodeError> {
        self.write(&[byte])
    }

    /// Writes a little-endian u16.
    pub fn write_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.write(&value.to_le_bytes())
    }

    /// Writes a u16-length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str, field: &'static str) -> Result<(), EncodeError> {
        let len = checked_u16_len(s.len(), field)?;
        self.write_u16(len)?;
        self.write(s.as_bytes())
    }

    /// Closes a full chunk of frame `index` and starts its next chunk.
    fn close_chunk(&mut self, index: usize) -> Result<(), EncodeError> {
        let frame = self.frames[index];
        self.patch_meta(&frame, self.chunk_max)?;
        self.frames[index] = WriteFrame {
            position: self.out.len(),
            written: 0,
            inner_chunks: 0,
        };
        self.out.write_bytes(&[0; META_RECORD_SIZE]);
        // the new meta record lies inside the chunks of all enclosing frames
        self.count_inner_chunk(index)
    }

    fn count_inner_chunk(&mut self, outer: usize) -> Result<(), EncodeError> {
        for frame in &mut self.frames[..outer] {
            if frame.inner_chunks == INNER_CHUNKS_MAX {
                return Err(EncodeError::TooManyInnerChunks);
            }
            frame.inner_chunks += 1;
        }
        Ok(())
    }

    fn patch_meta(&mut self, frame: &WriteFrame, size: u16) -> Result<(), EncodeError> {
        let mut meta = [0u8; META_RECORD_SIZE];
        meta[..2].copy_from_slice(&size.to_le_bytes());
        meta[2..].copy_from_slice(&frame.inner_chunks.to_le_bytes());
        self.out.patch(frame.position, &meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn meta(size: u16, inner: u16) -> [u8; 4] {
        let s = size.to_le_bytes();
        let i = inner.to_le_bytes();
        [s[0], s[1], i[0], i[1]]
    }

    #[test]
    fn test_exact_read_does_not_refill() {
        let mut data = meta(3, 0).to_vec();
        data.extend_from_slice(b"abc");
        data.extend_from_slice(&meta(9, 9)); // must stay unread

        let mut reader = LybReader::new(&data);
        reader.push_frame().unwrap();
        assert_eq!(reader.read_vec(3, "test").unwrap(), b"abc");
        let top = *reader.top().unwrap();
        assert_eq!(top.remaining, 0);
        assert!(!top.continuation);
        assert_eq!(reader.position(), 7);
        reader.pop_frame().unwrap();
    }

    #[test]
    fn test_read_spans_chained_chunks() {
        // chunk maximum of 5: two full chunks then a shorter terminal one
        let mut data = meta(5, 0).to_vec();
        data.extend_from_slice(b"01234");
        data.extend_from_slice(&meta(5, 0));
        data.extend_from_slice(b"56789");
        data.extend_from_slice(&meta(5 - 1, 0));
        data.extend_from_slice(b"abcd");

        let mut reader = LybReader::with_chunk_max(&data, 5);
        reader.push_frame().unwrap();
        assert!(reader.top().unwrap().continuation);
        assert_eq!(reader.read_vec(14, "test").unwrap(), b"0123456789abcd");
        assert!(reader.top_exhausted());
        reader.pop_frame().unwrap();
        assert_eq!(reader.remaining_len(), 0);
    }

    #[test]
    fn test_bounded_read_spans_chunks() {
        let mut writer = LybWriter::with_chunk_max(5);
        writer.start_subtree().unwrap();
        writer.write(b"fifteen bytes!!").unwrap();
        writer.stop_subtree().unwrap();
        let bytes = writer.into_bytes().unwrap();
        // 15 bytes = 5 + 5 + 5 + an empty terminal chunk
        assert_eq!(bytes.len(), 15 + 4 * META_RECORD_SIZE);

        let mut reader = LybReader::with_chunk_max(&bytes, 5);
        reader.push_frame().unwrap();
        assert_eq!(reader.read_bounded("test").unwrap(), b"fifteen bytes!!");
        reader.pop_frame().unwrap();
    }

    #[test]
    fn test_overrun_of_terminal_chunk() {
        let mut data = meta(2, 0).to_vec();
        data.extend_from_slice(b"abcdef");
        let mut reader = LybReader::new(&data);
        reader.push_frame().unwrap();
        let err = reader.read_vec(4, "test").unwrap_err();
        assert_eq!(
            err,
            DecodeError::ChunkOverrun {
                requested: 4,
                available: 2
            }
        );
    }

    #[test]
    fn test_pop_requires_drained_frame() {
        let mut data = meta(2, 0).to_vec();
        data.extend_from_slice(b"ab");
        let mut reader = LybReader::new(&data);
        assert!(matches!(
            reader.pop_frame(),
            Err(DecodeError::Internal { .. })
        ));
        reader.push_frame().unwrap();
        assert_eq!(
            reader.pop_frame(),
            Err(DecodeError::UnterminatedChunk { remaining: 2 })
        );
    }

    #[test]
    fn test_nested_frames_and_skip() {
        let mut writer = LybWriter::new();
        writer.start_subtree().unwrap();
        writer.write(b"parent").unwrap();
        writer.start_subtree().unwrap();
        writer.write(b"child").unwrap();
        writer.start_subtree().unwrap();
        writer.write(b"grandchild").unwrap();
        writer.stop_subtree().unwrap();
        writer.stop_subtree().unwrap();
        writer.stop_subtree().unwrap();
        writer.write(b"tail").unwrap();
        let bytes = writer.into_bytes().unwrap();

        // parent chunk counts both nested meta records
        assert_eq!(&bytes[..4], &meta(21, 2));

        let mut reader = LybReader::new(&bytes);
        reader.push_frame().unwrap();
        assert_eq!(reader.read_vec(6, "test").unwrap(), b"parent");
        reader.skip_subtree().unwrap();
        reader.pop_frame().unwrap();
        assert_eq!(reader.read_vec(4, "test").unwrap(), b"tail");
    }

    #[test]
    fn test_skip_across_chained_chunks() {
        let mut writer = LybWriter::with_chunk_max(4);
        writer.start_subtree().unwrap();
        writer.write(b"ab").unwrap();
        writer.start_subtree().unwrap();
        writer.write(b"xyz").unwrap();
        writer.stop_subtree().unwrap();
        writer.write(b"cdefg").unwrap();
        writer.stop_subtree().unwrap();
        writer.write(&[0]).unwrap();
        let bytes = writer.into_bytes().unwrap();

        let mut reader = LybReader::with_chunk_max(&bytes, 4);
        reader.push_frame().unwrap();
        reader.skip_subtree().unwrap();
        reader.pop_frame().unwrap();
        assert_eq!(reader.remaining_len(), 1);
    }

    #[test]
    fn test_ambiguous_skip_reported() {
        // outer chunk boundary falls inside a child chunk holding a nested meta
        let mut writer = LybWriter::with_chunk_max(6);
        writer.start_subtree().unwrap();
        writer.write(b"abcd").unwrap();
        writer.start_subtree().unwrap();
        writer.write(b"e").unwrap();
        writer.start_subtree().unwrap();
        writer.write(b"f").unwrap();
        writer.stop_subtree().unwrap();
        writer.write(b"g").unwrap();
        writer.stop_subtree().unwrap();
        writer.stop_subtree().unwrap();
        let bytes = writer.into_bytes().unwrap();

        let mut reader = LybReader::with_chunk_max(&bytes, 6);
        reader.push_frame().unwrap();
        assert_eq!(reader.read_vec(4, "test").unwrap(), b"abcd");
        reader.push_frame().unwrap();
        assert_eq!(reader.read_vec(1, "test").unwrap(), b"e");
        assert!(matches!(
            reader.skip_subtree(),
            Err(DecodeError::AmbiguousSkip { inner_chunks: 1 })
        ));
    }

    #[test]
    fn test_ambiguous_skip_at_final_chunk_end() {
        // outer boundary coincides with the end of the child's final chunk data
        let mut writer = LybWriter::with_chunk_max(3);
        writer.start_subtree().unwrap();
        writer.write(b"a").unwrap();
        writer.start_subtree().unwrap();
        writer.write(b"bc").unwrap();
        writer.start_subtree().unwrap();
        writer.stop_subtree().unwrap();
        writer.stop_subtree().unwrap();
        writer.write(b"d").unwrap();
        writer.stop_subtree().unwrap();
        let bytes = writer.into_bytes().unwrap();
        assert_eq!(
            bytes,
            [3, 0, 1, 0, b'a', 2, 0, 1, 0, b'b', b'c', 1, 0, 1, 0, 0, 0, 0, 0, b'd']
        );

        let mut reader = LybReader::with_chunk_max(&bytes, 3);
        reader.push_frame().unwrap();
        assert_eq!(reader.read_vec(1, "test").unwrap(), b"a");
        reader.push_frame().unwrap();
        assert!(matches!(
            reader.skip_subtree(),
            Err(DecodeError::AmbiguousSkip { inner_chunks: 1 })
        ));
    }

    #[test]
    fn test_nested_meta_counted_off_when_read() {
        let mut writer = LybWriter::new();
        writer.start_subtree().unwrap();
        writer.write(b"p").unwrap();
        writer.start_subtree().unwrap();
        writer.write(b"c").unwrap();
        writer.start_subtree().unwrap();
        writer.stop_subtree().unwrap();
        writer.stop_subtree().unwrap();
        writer.stop_subtree().unwrap();
        let bytes = writer.into_bytes().unwrap();

        let mut reader = LybReader::new(&bytes);
        reader.push_frame().unwrap();
        assert_eq!(reader.frames[0].inner_chunks, 2);
        assert_eq!(reader.read_vec(1, "test").unwrap(), b"p");
        reader.push_frame().unwrap();
        assert_eq!(reader.frames[0].inner_chunks, 1);
        assert_eq!(reader.frames[1].inner_chunks, 1);
        assert_eq!(reader.read_vec(1, "test").unwrap(), b"c");
        reader.push_frame().unwrap();
        assert_eq!(reader.frames[0].inner_chunks, 0);
        assert_eq!(reader.frames[1].inner_chunks, 0);
        for _ in 0..3 {
            reader.pop_frame().unwrap();
        }
        assert_eq!(reader.remaining_len(), 0);
    }

    #[test]
    fn test_walking_skip_where_block_skip_is_ambiguous() {
        // same layout as test_ambiguous_skip_reported, without trailing data
        let mut writer = LybWriter::with_chunk_max(6);
        writer.start_subtree().unwrap();
        writer.write(b"abcd").unwrap();
        writer.start_subtree().unwrap();
        writer.write(b"e").unwrap();
        writer.start_subtree().unwrap();
        writer.write(b"f").unwrap();
        writer.stop_subtree().unwrap();
        writer.stop_subtree().unwrap();
        writer.stop_subtree().unwrap();
        writer.write(b"end").unwrap();
        let bytes = writer.into_bytes().unwrap();

        let mut reader = LybReader::with_chunk_max(&bytes, 6);
        reader.push_frame().unwrap();
        assert_eq!(reader.read_vec(4, "test").unwrap(), b"abcd");
        let skipped = Node::Inner(b"e".to_vec(), vec![Node::Leaf(b"f".to_vec())]);
        walk_skip(&mut reader, &skipped);
        assert!(reader.top_exhausted());
        reader.pop_frame().unwrap();
        assert_eq!(reader.read_vec(3, "test").unwrap(), b"end");
    }

    #[test]
    fn test_eof_inside_frame() {
        let mut data = meta(10, 0).to_vec();
        data.extend_from_slice(b"abc");
        let mut reader = LybReader::new(&data);
        reader.push_frame().unwrap();
        assert!(matches!(
            reader.read_vec(10, "test"),
            Err(DecodeError::UnexpectedEof { .. })
        ));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Data(Vec<u8>),
        Nested(Vec<Op>),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let leaf = proptest::collection::vec(any::<u8>(), 0..20).prop_map(Op::Data);
        leaf.prop_recursive(3, 24, 4, |inner| {
            proptest::collection::vec(inner, 0..4).prop_map(Op::Nested)
        })
    }

    fn write_ops(writer: &mut LybWriter, ops: &[Op]) {
        for op in ops {
            match op {
                Op::Data(bytes) => writer.write(bytes).unwrap(),
                Op::Nested(children) => {
                    writer.start_subtree().unwrap();
                    write_ops(writer, children);
                    writer.stop_subtree().unwrap();
                }
            }
        }
    }

    fn read_ops(reader: &mut LybReader<'_>, ops: &[Op]) {
        for op in ops {
            match op {
                Op::Data(bytes) => {
                    assert_eq!(&reader.read_vec(bytes.len(), "test").unwrap(), bytes)
                }
                Op::Nested(children) => {
                    reader.push_frame().unwrap();
                    read_ops(reader, children);
                    assert!(reader.top_exhausted());
                    reader.pop_frame().unwrap();
                }
            }
        }
    }

    /// Reads `ops`, skipping the nested op at `target` (an index into a
    /// depth-first count of nested ops). Returns false if the skip was
    /// reported as ambiguous.
    fn read_ops_skipping(reader: &mut LybReader<'_>, ops: &[Op], target: usize, seen: &mut usize) -> bool {
        for op in ops {
            match op {
                Op::Data(bytes) => {
                    assert_eq!(&reader.read_vec(bytes.len(), "test").unwrap(), bytes)
                }
                Op::Nested(children) => {
                    reader.push_frame().unwrap();
                    let index = *seen;
                    *seen += 1;
                    if index == target {
                        match reader.skip_subtree() {
                            Ok(()) => {}
                            Err(DecodeError::AmbiguousSkip { .. }) => return false,
                            Err(e) => panic!("skip failed: {e}"),
                        }
                    } else if !read_ops_skipping(reader, children, target, seen) {
                        return false;
                    }
                    assert!(reader.top_exhausted());
                    reader.pop_frame().unwrap();
                }
            }
        }
        true
    }

    /// A subtree whose only payload after its header is its children.
    #[derive(Debug, Clone)]
    enum Node {
        Leaf(Vec<u8>),
        Inner(Vec<u8>, Vec<Node>),
    }

    fn node_strategy() -> impl Strategy<Value = Node> {
        let leaf = proptest::collection::vec(any::<u8>(), 0..20).prop_map(Node::Leaf);
        leaf.prop_recursive(3, 24, 4, |inner| {
            (
                proptest::collection::vec(any::<u8>(), 0..6),
                proptest::collection::vec(inner, 0..4),
            )
                .prop_map(|(header, children)| Node::Inner(header, children))
        })
    }

    fn write_node(writer: &mut LybWriter, node: &Node) {
        writer.start_subtree().unwrap();
        match node {
            Node::Leaf(bytes) => writer.write(bytes).unwrap(),
            Node::Inner(header, children) => {
                writer.write(header).unwrap();
                for child in children {
                    write_node(writer, child);
                }
            }
        }
        writer.stop_subtree().unwrap();
    }

    /// Skips a subtree knowing only its header lengths, the way an unknown
    /// data node is skipped.
    fn walk_skip(reader: &mut LybReader<'_>, node: &Node) {
        reader.push_frame().unwrap();
        walk_rest(reader, node);
        reader.pop_frame().unwrap();
    }

    fn walk_rest(reader: &mut LybReader<'_>, node: &Node) {
        let children = match node {
            Node::Leaf(_) => &[][..],
            Node::Inner(header, children) => {
                assert_eq!(&reader.read_vec(header.len(), "test").unwrap(), header);
                &children[..]
            }
        };
        if reader.top().unwrap().inner_chunks > 0 {
            let mut walked = 0;
            while !reader.top_exhausted() {
                walk_skip(reader, &children[walked]);
                walked += 1;
            }
            assert_eq!(walked, children.len());
        } else {
            assert!(children.is_empty());
            reader.skip_subtree().unwrap();
        }
    }

    proptest! {
        #[test]
        fn prop_nested_skip_is_exact_or_reported(children in proptest::collection::vec(op_strategy(), 0..4), chunk_max in 1u16..8, target in 0usize..8) {
            let root = vec![Op::Nested(children)];
            let mut writer = LybWriter::with_chunk_max(chunk_max);
            write_ops(&mut writer, &root);
            writer.write(b"end").unwrap();
            let bytes = writer.into_bytes().unwrap();

            let mut reader = LybReader::with_chunk_max(&bytes, chunk_max);
            let mut seen = 0;
            if read_ops_skipping(&mut reader, &root, target, &mut seen) {
                prop_assert_eq!(reader.read_vec(3, "test").unwrap(), b"end".to_vec());
            }
        }

        #[test]
        fn prop_writer_reader_agree(children in proptest::collection::vec(op_strategy(), 0..4), chunk_max in 1u16..8) {
            let root = vec![Op::Nested(children)];
            let mut writer = LybWriter::with_chunk_max(chunk_max);
            write_ops(&mut writer, &root);
            let bytes = writer.into_bytes().unwrap();

            let mut reader = LybReader::with_chunk_max(&bytes, chunk_max);
            read_ops(&mut reader, &root);
            prop_assert_eq!(reader.remaining_len(), 0);
        }

        #[test]
        fn prop_walking_skip_stays_in_sync(root in node_strategy(), chunk_max in 1u16..8) {
            let mut writer = LybWriter::with_chunk_max(chunk_max);
            writer.start_subtree().unwrap();
            writer.write(b"pre").unwrap();
            write_node(&mut writer, &root);
            writer.stop_subtree().unwrap();
            writer.write(b"end").unwrap();
            let bytes = writer.into_bytes().unwrap();

            let mut reader = LybReader::with_chunk_max(&bytes, chunk_max);
            reader.push_frame().unwrap();
            prop_assert_eq!(reader.read_vec(3, "test").unwrap(), b"pre".to_vec());
            walk_skip(&mut reader, &root);
            prop_assert!(reader.top_exhausted());
            reader.pop_frame().unwrap();
            prop_assert_eq!(reader.read_vec(3, "test").unwrap(), b"end".to_vec());
            prop_assert_eq!(reader.remaining_len(), 0);
        }

        #[test]
        fn prop_skip_leaves_reader_synchronized(payload in proptest::collection::vec(any::<u8>(), 0..40), chunk_max in 1u16..8) {
            let mut writer = LybWriter::with_chunk_max(chunk_max);
            writer.start_subtree().unwrap();
            writer.write(&payload).unwrap();
            writer.stop_subtree().unwrap();
            writer.write(b"end").unwrap();
            let bytes = writer.into_bytes().unwrap();

            let mut reader = LybReader::with_chunk_max(&bytes, chunk_max);
            reader.push_frame().unwrap();
            reader.skip_subtree().unwrap();
            reader.pop_frame().unwrap();
            prop_assert_eq!(reader.read_vec(3, "test").unwrap(), b"end".to_vec());
        }
    }
}
