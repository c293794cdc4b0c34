//! Unit tests for the line-group codec.
//!
//! Covers chunk-boundary invariance (split `\r\n`, split multi-byte
//! characters), group counting, unterminated final groups, separator-only
//! streams, lossy UTF-8 replacement, and oversized-group discarding.

use std::num::NonZeroUsize;

use bytes::BytesMut;
use futures_util::StreamExt;
use tokio_util::codec::Decoder;

use watershed_relay::pipe::aggregator::{line_groups, LineGroupCodec};

fn size(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).expect("group size must be non-zero")
}

/// Feed `chunks` one at a time, draining groups after each, then flush EOF.
fn run_codec(mut codec: LineGroupCodec, chunks: &[&[u8]]) -> Vec<String> {
    let mut buf = BytesMut::new();
    let mut groups = Vec::new();

    for chunk in chunks {
        buf.extend_from_slice(chunk);
        while let Some(group) = codec.decode(&mut buf).expect("decode must not fail") {
            groups.push(group);
        }
    }
    while let Some(group) = codec.decode_eof(&mut buf).expect("decode_eof must not fail") {
        groups.push(group);
    }

    groups
}

fn decode_chunks(chunks: &[&[u8]], group_size: usize) -> Vec<String> {
    run_codec(LineGroupCodec::new(size(group_size)), chunks)
}

// ── Worked examples ─────────────────────────────────────────────────────────

#[test]
fn mixed_separators_across_chunks_split_into_lines() {
    let groups = decode_chunks(&[b"line1\r\n", b"li", b"ne2\nline3"], 1);
    assert_eq!(groups, vec!["line1", "line2", "line3"]);
}

#[test]
fn pairs_keep_inner_separator_and_flush_short_tail() {
    let groups = decode_chunks(&[b"a\n", b"b\n", b"c"], 2);
    assert_eq!(groups, vec!["a\nb", "c"]);
}

// ── Edge cases ──────────────────────────────────────────────────────────────

#[test]
fn empty_stream_yields_nothing() {
    assert!(decode_chunks(&[], 1).is_empty());
    assert!(decode_chunks(&[b""], 3).is_empty());
}

#[test]
fn separator_only_stream_yields_empty_groups() {
    assert_eq!(decode_chunks(&[b"\n\n"], 1), vec!["", ""]);
    assert_eq!(decode_chunks(&[b"\r\n\r\n"], 1), vec!["", ""]);
    assert_eq!(decode_chunks(&[b"\r"], 1), vec![""]);
}

#[test]
fn lone_cr_separates_lines() {
    assert_eq!(decode_chunks(&[b"a\rb\rc"], 1), vec!["a", "b", "c"]);
}

#[test]
fn crlf_split_across_chunks_is_one_separator() {
    let split = decode_chunks(&[b"a\r", b"\nb\n"], 1);
    let whole = decode_chunks(&[b"a\r\nb\n"], 1);
    assert_eq!(split, vec!["a", "b"]);
    assert_eq!(split, whole);
}

#[test]
fn trailing_cr_waits_for_next_chunk() {
    let mut codec = LineGroupCodec::new(size(1));
    let mut buf = BytesMut::from("a\r");

    assert_eq!(codec.decode(&mut buf).expect("decode"), None);

    buf.extend_from_slice(b"\n");
    assert_eq!(codec.decode(&mut buf).expect("decode"), Some("a".to_owned()));
    assert!(buf.is_empty(), "the whole \\r\\n pair must be consumed");
}

#[test]
fn multibyte_character_split_across_chunks_is_preserved() {
    let text = "héllo\nwörld\n".as_bytes();
    // Byte 2 is the middle of the two-byte `é`.
    let groups = decode_chunks(&[&text[..2], &text[2..9], &text[9..]], 1);
    assert_eq!(groups, vec!["héllo", "wörld"]);
}

#[test]
fn unterminated_final_group_is_always_emitted() {
    assert_eq!(decode_chunks(&[b"a\nb\nc"], 5), vec!["a\nb\nc"]);
    assert_eq!(decode_chunks(&[b"solo"], 1), vec!["solo"]);
}

#[test]
fn short_final_group_drops_only_its_trailing_separator() {
    assert_eq!(decode_chunks(&[b"a\n"], 2), vec!["a"]);
    assert_eq!(decode_chunks(&[b"a\r\nb\r\n"], 3), vec!["a\r\nb"]);
}

// ── Group-count property ────────────────────────────────────────────────────

#[test]
fn terminated_stream_yields_ceil_m_over_k_groups() {
    let lines: Vec<String> = (1..=7).map(|i| format!("line{i}")).collect();
    let mut input = lines.join("\n");
    input.push('\n');

    for k in 1..=8 {
        let groups = decode_chunks(&[input.as_bytes()], k);
        let expected: Vec<String> = lines.chunks(k).map(|chunk| chunk.join("\n")).collect();
        assert_eq!(groups.len(), lines.len().div_ceil(k), "k = {k}");
        assert_eq!(groups, expected, "k = {k}");
    }
}

#[test]
fn group_text_is_the_literal_span_of_its_lines() {
    let groups = decode_chunks(&[b"a\r\nb\rc\nd\r\n"], 2);
    assert_eq!(groups, vec!["a\r\nb", "c\nd"]);
}

// ── Chunk-boundary invariance ───────────────────────────────────────────────

#[test]
fn every_split_point_matches_single_chunk_decode() {
    let input = "α\r\nβ\rγ\n\r\nδ\r\n€end".as_bytes();

    for k in 1..=3 {
        let whole = decode_chunks(&[input], k);
        for cut in 0..=input.len() {
            let split = decode_chunks(&[&input[..cut], &input[cut..]], k);
            assert_eq!(split, whole, "k = {k}, cut = {cut}");
        }
    }
}

#[test]
fn byte_at_a_time_matches_single_chunk_decode() {
    let input = "{\"name\":\"Río Grande\"}\r\n{\"name\":\"Ñandú\"}\r\n".as_bytes();
    let single_bytes: Vec<&[u8]> = input.chunks(1).collect();

    for k in 1..=2 {
        assert_eq!(
            decode_chunks(&single_bytes, k),
            decode_chunks(&[input], k),
            "k = {k}"
        );
    }
}

// ── Anomalies ───────────────────────────────────────────────────────────────

#[test]
fn invalid_utf8_is_replaced_not_fatal() {
    let groups = decode_chunks(&[b"ok\xff\n", b"next\n"], 1);
    assert_eq!(groups, vec!["ok\u{FFFD}", "next"]);
}

#[test]
fn oversized_group_is_discarded_up_to_its_boundary() {
    let codec = LineGroupCodec::with_max_length(size(1), 8);
    let groups = run_codec(codec, &[b"0123456789", b"abc\nnext\n"]);
    assert_eq!(groups, vec!["next"]);
}

#[test]
fn oversized_unterminated_tail_is_dropped_at_eof() {
    let codec = LineGroupCodec::with_max_length(size(1), 4);
    let groups = run_codec(codec, &[b"ok\n", b"far too long"]);
    assert_eq!(groups, vec!["ok"]);
}

// ── Stream adapter ──────────────────────────────────────────────────────────

#[tokio::test]
async fn line_groups_streams_over_async_read() {
    let input: &[u8] = b"x\ny\nz";
    let groups: Vec<String> = line_groups(input, size(2))
        .map(|item| item.expect("read must succeed"))
        .collect()
        .await;
    assert_eq!(groups, vec!["x\ny", "z"]);
}
