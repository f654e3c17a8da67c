//! Property tests for frame reassembly across arbitrary read boundaries.

use proptest::prelude::*;
use ustrouter_connector::wire::{FrameReader, encode_long, encode_short, encode_short_fields};

/// Split `bytes` at the given cut points (taken modulo the length).
fn chunk(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts
        .iter()
        .map(|cut| if bytes.is_empty() { 0 } else { cut % bytes.len() })
        .collect();
    points.push(0);
    points.push(bytes.len());
    points.sort_unstable();
    points.dedup();
    points
        .windows(2)
        .map(|w| bytes[w[0]..w[1]].to_vec())
        .collect()
}

fn field() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _./-]{0,24}"
}

proptest! {
    #[test]
    fn short_frames_survive_any_chunking(
        frames in prop::collection::vec(prop::collection::vec(field(), 1..5), 1..8),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let mut stream = Vec::new();
        for fields in &frames {
            stream.extend(encode_short_fields(fields).expect("fits"));
        }

        let mut reader = FrameReader::short();
        let mut decoded = Vec::new();
        for piece in chunk(&stream, &cuts) {
            reader.push(&piece);
            while let Some(fields) = reader.next_fields() {
                decoded.push(fields);
            }
        }

        prop_assert_eq!(decoded, frames);
        prop_assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn long_frames_survive_any_chunking(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..300), 1..6),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let mut stream = Vec::new();
        for payload in &payloads {
            stream.extend(encode_long(payload).expect("fits"));
        }

        let mut reader = FrameReader::long();
        let mut decoded = Vec::new();
        for piece in chunk(&stream, &cuts) {
            reader.push(&piece);
            while let Some(payload) = reader.next_payload() {
                decoded.push(payload);
            }
        }

        prop_assert_eq!(decoded, payloads);
    }

    #[test]
    fn incomplete_frames_are_held_back(payload in prop::collection::vec(any::<u8>(), 1..200)) {
        let framed = encode_short(&payload).expect("fits");
        let mut reader = FrameReader::short();
        reader.push(&framed[..framed.len() - 1]);
        prop_assert!(reader.next_payload().is_none());
        prop_assert_eq!(reader.bytes_needed(), 1);
        reader.push(&framed[framed.len() - 1..]);
        prop_assert_eq!(reader.next_payload(), Some(payload));
    }
}
