//! Unit tests for the length-prefixed frame codec.
//!
//! Covers frame round-tripping, size-bound enforcement on both paths, and
//! EOF classification behaviour.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use rstest::rstest;

use super::*;

#[test]
fn clamps_max_frame_length() {
    let codec = FrameCodec::new(MAX_FRAME_LENGTH.saturating_add(1));
    assert_eq!(codec.max_frame_length(), MAX_FRAME_LENGTH);

    let codec = FrameCodec::new(0);
    assert_eq!(codec.max_frame_length(), MIN_FRAME_LENGTH);
}

#[test]
fn round_trips_payload() {
    let mut codec = FrameCodec::default();
    let payload = Bytes::from_static(b"hello room");

    let mut buf = BytesMut::new();
    codec
        .encode(payload.clone(), &mut buf)
        .expect("encode should succeed");
    assert_eq!(&buf[..LENGTH_HEADER_SIZE], &10_u32.to_be_bytes()[..]);

    let decoded = codec
        .decode(&mut buf)
        .expect("decode should succeed")
        .expect("expected a frame");
    assert_eq!(decoded, payload);
    assert!(buf.is_empty());
}

#[test]
fn rejects_oversized_encode_without_partial_write() {
    let mut codec = FrameCodec::new(MIN_FRAME_LENGTH);
    let payload = Bytes::from(vec![0_u8; MIN_FRAME_LENGTH + 1]);
    let mut buf = BytesMut::new();

    let error = codec
        .encode(payload, &mut buf)
        .expect_err("oversized payload must be rejected");
    assert!(matches!(
        error,
        CodecError::SizeExceeded { size, max }
            if size == MIN_FRAME_LENGTH + 1 && max == MIN_FRAME_LENGTH
    ));
    assert!(buf.is_empty(), "no partial frame may be written");
}

#[test]
fn rejects_oversized_prefix_before_consuming_payload() {
    let mut codec = FrameCodec::new(MIN_FRAME_LENGTH);
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&u32::try_from(MIN_FRAME_LENGTH + 1).expect("fits u32").to_be_bytes());
    buf.extend_from_slice(&[1, 2, 3]);

    let error = codec
        .decode(&mut buf)
        .expect_err("oversized frame must be rejected");
    assert!(matches!(error, CodecError::SizeExceeded { .. }));
}

#[test]
fn incomplete_frame_decodes_to_none() {
    let mut codec = FrameCodec::default();
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&8_u32.to_be_bytes());
    buf.extend_from_slice(b"1234");

    assert!(codec.decode(&mut buf).expect("decode should succeed").is_none());
}

#[test]
fn clean_close_at_frame_boundary_is_not_an_error() {
    let mut codec = FrameCodec::default();
    let mut buf = BytesMut::new();

    let result = codec.decode_eof(&mut buf);
    assert!(
        matches!(result, Ok(None)),
        "clean close should return Ok(None), got {result:?}"
    );
}

#[rstest]
#[case::mid_header(&[0x00, 0x10][..], 2)]
#[case::mid_frame(&[0x00, 0x00, 0x00, 0x10, 0x01, 0x02][..], 2)]
fn truncated_stream_is_reported(#[case] bytes: &[u8], #[case] bytes_received: usize) {
    let mut codec = FrameCodec::default();
    let mut buf = BytesMut::from(bytes);

    let error = codec.decode_eof(&mut buf).expect_err("truncation must surface");
    assert!(!error.is_clean_close());
    match error {
        CodecError::Closed(
            CloseReason::MidHeader {
                bytes_received: got,
                ..
            }
            | CloseReason::MidFrame {
                bytes_received: got,
                ..
            },
        ) => assert_eq!(got, bytes_received),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn complete_frame_at_eof_is_decoded() {
    let mut codec = FrameCodec::default();
    let payload = Bytes::from_static(b"bye");

    let mut buf = BytesMut::new();
    codec
        .encode(payload.clone(), &mut buf)
        .expect("encode should succeed");

    let decoded = codec
        .decode_eof(&mut buf)
        .expect("decode should succeed")
        .expect("expected a frame");
    assert_eq!(decoded, payload);
}

proptest! {
    #[test]
    fn frame_round_trip(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::from(payload.clone()), &mut buf)
            .expect("encode should succeed");

        let decoded = codec
            .decode(&mut buf)
            .expect("decode should succeed")
            .expect("expected a frame");
        prop_assert_eq!(decoded.as_ref(), payload.as_slice());
        prop_assert!(buf.is_empty());
    }
}
