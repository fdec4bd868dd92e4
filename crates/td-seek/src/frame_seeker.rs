//! Timestamp probe for streams made of self-delimiting frames that start with
//! a sync pattern, such as elementary audio streams.
//!
//! A probe peeks a bounded window from the probe position, locates the first
//! frame whose header validates, and walks the chain of consecutive frames
//! from there. If the window reaches the end of the stream without the chain
//! landing exactly on it, a linear scan of the trailing window looks for the
//! chain of fully validated frames that does.

use td_core::config::SeekConfig;
use td_core::Result;

use crate::binary_search::{TimestampSearchResult, TimestampSeeker};
use crate::input::ExtractorInput;

/// Fields of a validated frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub timestamp_us: i64,
    /// Total frame size including the header.
    pub size: u32,
}

/// Stream-specific frame recognition.
pub trait FrameParser {
    /// Bytes needed by [`parse`](Self::parse).
    fn header_len(&self) -> usize;

    /// Cheap test for a sync pattern at the start of `bytes`.
    fn is_sync(&self, bytes: &[u8]) -> bool;

    /// Fully validate and decode the header at the start of `header`, which
    /// holds at least [`header_len`](Self::header_len) bytes.
    fn parse(&self, header: &[u8]) -> Option<FrameHeader>;
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    position: u64,
    header: FrameHeader,
}

impl Frame {
    fn end(&self) -> u64 {
        self.position + self.header.size as u64
    }
}

/// [`TimestampSeeker`] over a [`FrameParser`].
#[derive(Debug)]
pub struct FrameScanSeeker<P> {
    parser: P,
    scan_window: usize,
    trailing_scan_window: u64,
    buffer: Vec<u8>,
}

impl<P: FrameParser> FrameScanSeeker<P> {
    pub fn new(parser: P, config: &SeekConfig) -> Self {
        Self {
            parser,
            scan_window: config.scan_window as usize,
            trailing_scan_window: config.trailing_scan_window,
            buffer: Vec::new(),
        }
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// Validate a frame header at `offset` in `window`.
    fn frame_at(&self, window: &[u8], offset: usize) -> Option<FrameHeader> {
        let header = window.get(offset..offset + self.parser.header_len())?;
        if !self.parser.is_sync(header) {
            return None;
        }
        self.parser.parse(header).filter(|h| h.size > 0)
    }

    /// Follow frames from `offset` while headers fit in the window and validate.
    /// Returns the chain and whether it ended at an invalid header.
    fn walk_chain(&self, window: &[u8], base: u64, mut offset: usize) -> (Vec<Frame>, bool) {
        let mut frames = Vec::new();
        while offset + self.parser.header_len() <= window.len() {
            let Some(header) = self.frame_at(window, offset) else {
                return (frames, true);
            };
            frames.push(Frame {
                position: base + offset as u64,
                header,
            });
            offset += header.size as usize;
        }
        (frames, false)
    }

    /// Linear scan of the last `trailing_scan_window` bytes for a chain of
    /// validated frames that ends exactly at `length`.
    fn trailing_chain(&self, window: &[u8], base: u64, length: u64) -> Vec<Frame> {
        let from = length
            .saturating_sub(self.trailing_scan_window)
            .saturating_sub(base) as usize;
        for offset in from..window.len() {
            if self.frame_at(window, offset).is_none() {
                continue;
            }
            let (chain, _) = self.walk_chain(window, base, offset);
            if chain.last().is_some_and(|last| last.end() == length) {
                return chain;
            }
        }
        Vec::new()
    }

    fn resolve_at_end(
        &self,
        window: &[u8],
        base: u64,
        length: u64,
        target_time_us: i64,
        fallback: Option<Frame>,
    ) -> TimestampSearchResult {
        let chain = self.trailing_chain(window, base, length);
        if let Some(frame) = chain
            .iter()
            .rev()
            .find(|f| f.header.timestamp_us <= target_time_us)
        {
            return TimestampSearchResult::TargetFound {
                byte_position: frame.position,
            };
        }
        if let Some(frame) = fallback {
            tracing::debug!(
                position = frame.position,
                "no trailing frame at or before target; using last chained frame"
            );
            return TimestampSearchResult::TargetFound {
                byte_position: frame.position,
            };
        }
        match chain.first() {
            Some(first) => TimestampSearchResult::Overestimated {
                timestamp_us: first.header.timestamp_us,
                byte_position: base,
            },
            None => TimestampSearchResult::NoTimestamp,
        }
    }
}

impl<P: FrameParser> TimestampSeeker for FrameScanSeeker<P> {
    fn search_for_timestamp(
        &mut self,
        input: &mut dyn ExtractorInput,
        target_time_us: i64,
    ) -> Result<TimestampSearchResult> {
        let base = input.position();
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.resize(self.scan_window, 0);
        let mut peeked = 0;
        while peeked < buffer.len() {
            let n = input.peek(&mut buffer[peeked..])?;
            if n == 0 {
                break;
            }
            peeked += n;
        }
        let window = &buffer[..peeked];
        let length = input.length();
        let at_end = length.is_some_and(|len| base + peeked as u64 >= len);

        let result = self.probe(window, base, length.filter(|_| at_end), target_time_us);
        self.buffer = buffer;
        Ok(result)
    }
}

impl<P: FrameParser> FrameScanSeeker<P> {
    /// `end_length` is the stream length when the window reaches it.
    fn probe(
        &self,
        window: &[u8],
        base: u64,
        end_length: Option<u64>,
        target_time_us: i64,
    ) -> TimestampSearchResult {
        let first = (0..window.len()).find(|&offset| self.frame_at(window, offset).is_some());
        let Some(first) = first else {
            return match end_length {
                Some(length) => self.resolve_at_end(window, base, length, target_time_us, None),
                None => TimestampSearchResult::NoTimestamp,
            };
        };

        let (frames, broken) = self.walk_chain(window, base, first);
        let Some(&head) = frames.first() else {
            return TimestampSearchResult::NoTimestamp;
        };
        if head.header.timestamp_us > target_time_us {
            return TimestampSearchResult::Overestimated {
                timestamp_us: head.header.timestamp_us,
                byte_position: base,
            };
        }
        for pair in frames.windows(2) {
            let (left, right) = (pair[0], pair[1]);
            if left.header.timestamp_us <= target_time_us
                && target_time_us < right.header.timestamp_us
            {
                return TimestampSearchResult::TargetFound {
                    byte_position: left.position,
                };
            }
        }

        let last = frames[frames.len() - 1];
        if let Some(length) = end_length {
            if last.end() >= length {
                return TimestampSearchResult::TargetFound {
                    byte_position: last.position,
                };
            }
            // The chain stopped short of the end: trailing bytes or a broken header.
            return self.resolve_at_end(window, base, length, target_time_us, Some(last));
        }
        if broken {
            tracing::debug!(
                position = last.end(),
                "frame chain broken inside scan window"
            );
        }
        TimestampSearchResult::Underestimated {
            timestamp_us: last.header.timestamp_us,
            byte_position: last.position,
        }
    }
}
