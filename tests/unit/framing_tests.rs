//! Unit tests for stdout framing and the output codec.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use console_host::framing::codec::{OutputCodec, MAX_LINE_BYTES};
use console_host::framing::{
    Frame, LineMarkerFraming, OutputFraming, PlainFraming, COMPLETION_MARKER, ESCAPE,
};

fn decode_all(codec: &mut OutputCodec, input: &str) -> Vec<Frame> {
    let mut buf = BytesMut::from(input);
    let mut frames = Vec::new();
    while let Some(frame) = codec.decode(&mut buf).expect("decode") {
        frames.push(frame);
    }
    frames
}

#[test]
fn marker_line_decodes_as_complete() {
    let framing = LineMarkerFraming;
    assert_eq!(framing.decode(COMPLETION_MARKER.to_owned()), Frame::Complete);
}

#[test]
fn ordinary_output_passes_through_unchanged() {
    let framing = LineMarkerFraming;
    assert_eq!(framing.encode_output("hello"), "hello");
    assert_eq!(
        framing.decode("hello".to_owned()),
        Frame::Output("hello".to_owned())
    );
}

/// Program output that spells the marker exactly must never be taken for it.
#[test]
fn output_equal_to_marker_is_not_a_marker() {
    let framing = LineMarkerFraming;
    let encoded = framing.encode_output(COMPLETION_MARKER);
    assert_ne!(encoded, COMPLETION_MARKER);
    assert_eq!(
        framing.decode(encoded),
        Frame::Output(COMPLETION_MARKER.to_owned())
    );
}

#[test]
fn output_starting_with_escape_is_restored() {
    let framing = LineMarkerFraming;
    let line = format!("{ESCAPE}{ESCAPE}x");
    let encoded = framing.encode_output(&line);
    assert!(encoded.starts_with(&format!("{ESCAPE}{ESCAPE}{ESCAPE}")));
    assert_eq!(framing.decode(encoded), Frame::Output(line));
}

/// A marker smuggled in after an embedded newline is escaped like any
/// other line.
#[test]
fn embedded_newline_cannot_forge_a_marker() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::new();
    codec
        .encode(
            Frame::Output(format!("ok\n{COMPLETION_MARKER}")),
            &mut buf,
        )
        .expect("encode");

    let wire = String::from_utf8(buf.to_vec()).expect("utf8");
    let frames = decode_all(&mut codec, &wire);
    assert_eq!(
        frames,
        vec![
            Frame::Output("ok".into()),
            Frame::Output(COMPLETION_MARKER.into()),
        ]
    );
}

#[test]
fn plain_framing_never_yields_markers() {
    let framing = PlainFraming;
    assert_eq!(
        framing.decode(COMPLETION_MARKER.to_owned()),
        Frame::Output(COMPLETION_MARKER.to_owned())
    );
}

#[test]
fn codec_splits_interleaved_output_and_markers() {
    let mut codec = OutputCodec::new();
    let input = format!("one\ntwo\n{COMPLETION_MARKER}\nthree\n");
    let frames = decode_all(&mut codec, &input);
    assert_eq!(
        frames,
        vec![
            Frame::Output("one".into()),
            Frame::Output("two".into()),
            Frame::Complete,
            Frame::Output("three".into()),
        ]
    );
}

#[test]
fn codec_buffers_partial_lines() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from("partial");
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);
    buf.extend_from_slice(b" line\n");
    assert_eq!(
        codec.decode(&mut buf).expect("decode"),
        Some(Frame::Output("partial line".into()))
    );
}

#[test]
fn codec_encodes_marker_and_escaped_output() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::new();
    codec
        .encode(Frame::Output(COMPLETION_MARKER.to_owned()), &mut buf)
        .expect("encode output");
    codec.encode(Frame::Complete, &mut buf).expect("encode marker");

    let frames = decode_all(&mut OutputCodec::new(), std::str::from_utf8(&buf).expect("utf8"));
    assert_eq!(
        frames,
        vec![Frame::Output(COMPLETION_MARKER.to_owned()), Frame::Complete]
    );
}

/// An oversized line is replaced, and the stream keeps decoding afterwards.
#[test]
fn oversized_line_is_replaced_and_stream_resynchronises() {
    let mut codec = OutputCodec::new();
    let mut input = "x".repeat(MAX_LINE_BYTES + 10);
    input.push('\n');
    input.push_str(COMPLETION_MARKER);
    input.push('\n');

    let frames = decode_all(&mut codec, &input);
    assert_eq!(frames.len(), 2, "frames: {frames:?}");
    match &frames[0] {
        Frame::Output(text) => assert!(text.contains("line dropped"), "got {text}"),
        Frame::Complete => panic!("oversized line decoded as marker"),
    }
    assert_eq!(frames[1], Frame::Complete);
}
