//! NDJSON codec for the agent's stdio streams.
//!
//! Inbound, the codec yields raw UTF-8 lines (without the `\n`) so the
//! driver can echo and, on parse failure, log exactly what the agent wrote.
//! An over-long line is yielded as [`DecodedLine::TooLong`] rather than an
//! error: `FramedRead` ends the stream after the first decoder error, and a
//! single bad line must not cost the rest of the run.
//! Outbound, it takes a [`serde_json::Value`] and writes its compact,
//! single-line encoding followed by `\n`.
//!
//! ```rust,ignore
//! use tokio_util::codec::{FramedRead, FramedWrite};
//! use acp_harness::acp::codec::AcpCodec;
//!
//! let lines = FramedRead::new(child_stdout, AcpCodec::new());
//! let frames = FramedWrite::new(child_stdin, AcpCodec::new());
//! ```

use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum inbound line length: 1 MiB.
///
/// Longer lines are reported as [`DecodedLine::TooLong`] and discarded up to
/// the next newline; the stream stays usable afterwards.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One inbound line as framed by [`AcpCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedLine {
    /// A complete line, without its terminator.
    Line(String),
    /// A line longer than [`MAX_LINE_BYTES`]; its bytes are being skipped.
    TooLong,
}

/// Line-delimited JSON codec for the ACP stdio transport.
#[derive(Debug)]
pub struct AcpCodec(LinesCodec);

impl AcpCodec {
    /// Create a codec enforcing the [`MAX_LINE_BYTES`] inbound limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for AcpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AcpCodec {
    type Item = DecodedLine;
    type Error = AppError;

    /// Yield the next complete line, or `Ok(None)` while still buffering.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        lift(self.0.decode(src))
    }

    /// Yield a trailing unterminated line once the agent closes stdout.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        lift(self.0.decode_eof(src))
    }
}

impl Encoder<Value> for AcpCodec {
    type Error = AppError;

    /// Encode `frame` as one compact JSON line terminated by `\n`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] if the value cannot be serialised.
    fn encode(&mut self, frame: Value, dst: &mut BytesMut) -> Result<()> {
        let line = serde_json::to_string(&frame)
            .map_err(|e| AppError::Acp(format!("failed to serialise frame: {e}")))?;
        self.0.encode(line, dst).map_err(map_codec_error)
    }
}

/// Turn the length-limit error into an item; only I/O failures stay errors.
fn lift(
    decoded: std::result::Result<Option<String>, LinesCodecError>,
) -> Result<Option<DecodedLine>> {
    match decoded {
        Ok(line) => Ok(line.map(DecodedLine::Line)),
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(DecodedLine::TooLong)),
        Err(e) => Err(map_codec_error(e)),
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Acp(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
