//! Length-prefixed message framing.
//!
//! Every message on a forkrpc connection is
//!
//! ```text
//! [4-byte length as u32 big-endian] [payload of exactly that many bytes]
//! ```
//!
//! The [`Framer`] owns an accumulation buffer for one direction of one
//! connection. Bytes are fed in as they arrive from the socket, in whatever
//! chunks the kernel hands out, and complete payloads come out in order. A
//! trailing partial message stays buffered until the rest of it arrives.
//!
//! The prefix is always big-endian. Peers built from a different codebase that
//! packs the prefix in host order will only interoperate on big-endian hosts.

use bytes::{Buf, Bytes, BytesMut};

use crate::protocol::error::{ForkrpcError, Result};

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default application-level bound on a single payload (100 MB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// Prepends the length prefix to `payload`.
///
/// Fails only if the payload does not fit the prefix's numeric range.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    let len = u32::try_from(payload.len()).map_err(|_| ForkrpcError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame.freeze())
}

/// Stream-framing state machine.
///
/// # Example
///
/// ```
/// use forkrpc_common::transport::Framer;
///
/// let mut framer = Framer::new();
/// let frame = framer.encode(b"hello").unwrap();
///
/// // The prefix arrives on its own, then the body.
/// assert!(framer.feed(&frame[..4]).unwrap().is_empty());
/// let frames = framer.feed(&frame[4..]).unwrap();
/// assert_eq!(frames, vec![bytes::Bytes::from_static(b"hello")]);
/// ```
#[derive(Debug)]
pub struct Framer {
    buf: BytesMut,
    max_frame_len: usize,
}

impl Framer {
    /// Creates a framer bounded only by the prefix's numeric range.
    pub fn new() -> Self {
        Self::with_max_frame_len(u32::MAX as usize)
    }

    /// Creates a framer that rejects payloads longer than `max_frame_len`.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_len,
        }
    }

    /// Maximum payload length this framer accepts.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Encodes one payload, enforcing this framer's bound.
    pub fn encode(&self, payload: &[u8]) -> Result<Bytes> {
        if payload.len() > self.max_frame_len {
            return Err(ForkrpcError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame_len,
            });
        }
        encode_frame(payload)
    }

    /// Appends `data` to the buffer without extracting anything.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Appends `data` to the buffer and extracts every complete payload.
    ///
    /// Returns an empty vector when no message is complete yet. That is a
    /// normal condition, the caller should read more and feed again.
    ///
    /// # Errors
    ///
    /// Returns [`ForkrpcError::FrameTooLarge`] if a prefix announces a payload
    /// above the configured bound. The stream is out of sync at that point and
    /// the connection should be dropped. Payloads completed ahead of the bad
    /// prefix are returned first; the error comes from the following call.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.push(data);

        let mut frames = Vec::new();
        loop {
            match self.next_frame() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return Ok(frames),
                // The bad prefix stays buffered and is reported again.
                Err(_) if !frames.is_empty() => return Ok(frames),
                Err(e) => return Err(e),
            }
        }
    }

    /// Extracts the next complete payload, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.buf.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&self.buf[..LENGTH_PREFIX_LEN]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len > self.max_frame_len {
            return Err(ForkrpcError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        if self.buf.len() - LENGTH_PREFIX_LEN < len {
            return Ok(None);
        }

        self.buf.advance(LENGTH_PREFIX_LEN);
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    /// Number of bytes buffered that do not yet form a complete message.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_prefix_is_big_endian() {
        let frame = encode_frame(b"ab").unwrap();
        assert_eq!(&frame[..], &[0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn test_round_trip_empty_small_and_large() {
        for len in [0usize, 1, 17, 64 * 1024 + 3] {
            let data = payload(len);
            let mut framer = Framer::new();
            let frame = framer.encode(&data).unwrap();
            let frames = framer.feed(&frame).unwrap();
            assert_eq!(frames.len(), 1, "len {}", len);
            assert_eq!(&frames[0][..], &data[..]);
            assert_eq!(framer.buffered_len(), 0);
        }
    }

    #[test]
    fn test_two_messages_in_one_read() {
        let mut stream = encode_frame(b"first").unwrap().to_vec();
        stream.extend_from_slice(&encode_frame(b"second").unwrap());

        let mut framer = Framer::new();
        let frames = framer.feed(&stream).unwrap();
        assert_eq!(frames, vec![Bytes::from("first"), Bytes::from("second")]);
    }

    #[test]
    fn test_every_two_way_split_yields_both_messages_in_order() {
        let p1 = payload(13);
        let p2 = payload(300);
        let mut stream = encode_frame(&p1).unwrap().to_vec();
        stream.extend_from_slice(&encode_frame(&p2).unwrap());

        for cut in 0..=stream.len() {
            let mut framer = Framer::new();
            let mut frames = framer.feed(&stream[..cut]).unwrap();
            frames.extend(framer.feed(&stream[cut..]).unwrap());
            assert_eq!(frames.len(), 2, "cut at {}", cut);
            assert_eq!(&frames[0][..], &p1[..]);
            assert_eq!(&frames[1][..], &p2[..]);
            assert_eq!(framer.buffered_len(), 0);
        }
    }

    #[test]
    fn test_uneven_chunks_yield_both_messages_in_order() {
        let p1 = payload(1000);
        let p2 = Vec::new();
        let mut stream = encode_frame(&p1).unwrap().to_vec();
        stream.extend_from_slice(&encode_frame(&p2).unwrap());

        for chunk in [1usize, 2, 3, 5, 7, 64, 1003] {
            let mut framer = Framer::new();
            let mut frames = Vec::new();
            for piece in stream.chunks(chunk) {
                frames.extend(framer.feed(piece).unwrap());
            }
            assert_eq!(frames.len(), 2, "chunk size {}", chunk);
            assert_eq!(&frames[0][..], &p1[..]);
            assert!(frames[1].is_empty());
        }
    }

    #[test]
    fn test_partial_body_stays_buffered() {
        let frame = encode_frame(b"hello world").unwrap();
        let mut framer = Framer::new();

        assert!(framer.feed(&frame[..2]).unwrap().is_empty());
        assert_eq!(framer.buffered_len(), 2);
        assert!(framer.feed(&frame[2..9]).unwrap().is_empty());
        assert_eq!(framer.buffered_len(), 9);

        let frames = framer.feed(&frame[9..]).unwrap();
        assert_eq!(frames, vec![Bytes::from("hello world")]);
    }

    #[test]
    fn test_next_frame_without_input_is_incomplete() {
        let mut framer = Framer::new();
        assert!(framer.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_oversized_prefix_is_rejected() {
        let mut framer = Framer::with_max_frame_len(8);
        let result = framer.feed(&16u32.to_be_bytes());
        match result {
            Err(ForkrpcError::FrameTooLarge { len, max }) => {
                assert_eq!(len, 16);
                assert_eq!(max, 8);
            }
            other => panic!("expected FrameTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_frames_ahead_of_oversized_prefix_are_kept() {
        let mut stream = encode_frame(b"ok").unwrap().to_vec();
        stream.extend_from_slice(&64u32.to_be_bytes());

        let mut framer = Framer::with_max_frame_len(8);
        let frames = framer.feed(&stream).unwrap();
        assert_eq!(frames, vec![Bytes::from("ok")]);

        assert!(matches!(
            framer.feed(&[]),
            Err(ForkrpcError::FrameTooLarge { len: 64, max: 8 })
        ));
    }

    #[test]
    fn test_encode_respects_bound() {
        let framer = Framer::with_max_frame_len(4);
        assert!(framer.encode(b"1234").is_ok());
        assert!(matches!(
            framer.encode(b"12345"),
            Err(ForkrpcError::FrameTooLarge { len: 5, max: 4 })
        ));
    }
}
