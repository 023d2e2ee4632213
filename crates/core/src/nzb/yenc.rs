//! Bounded yEnc decoding.
//!
//! A small state machine over the raw article body: skip lines until
//! `=ybegin` (and an optional `=ypart`), decode until `=yend` or the
//! output bound is reached. Line endings are transparent.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum YencError {
    #[error("No =ybegin header found")]
    MissingHeader,

    #[error("Decode produced no bytes")]
    EmptyOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    LookingForBegin,
    Decoding,
    Done,
}

/// Decode a yEnc-encoded article body, bounded by `max_output_bytes`.
///
/// Decoding stops at `=yend`, at end of input, or once the bound is
/// reached; whichever comes first. A decode that yields zero bytes is
/// an error.
pub fn decode_yenc(input: &[u8], max_output_bytes: usize) -> Result<Vec<u8>, YencError> {
    let mut state = State::LookingForBegin;
    let mut output = Vec::with_capacity(max_output_bytes.min(input.len()));
    let mut i = 0;

    while i < input.len() && state != State::Done {
        match state {
            State::LookingForBegin => {
                if rest_starts_with(input, i, b"=ybegin") {
                    i = skip_line(input, i);
                    // An optional =ypart line follows for multi-part posts.
                    if rest_starts_with(input, i, b"=ypart") {
                        i = skip_line(input, i);
                    }
                    state = State::Decoding;
                } else {
                    i = skip_line(input, i);
                }
            }
            State::Decoding => {
                let b = input[i];
                if b == b'=' {
                    if rest_starts_with(input, i, b"=yend") {
                        state = State::Done;
                        continue;
                    }
                    // Escape sequence: the next byte is offset by 64.
                    i += 1;
                    if i >= input.len() {
                        break;
                    }
                    output.push(input[i].wrapping_sub(64).wrapping_sub(42));
                } else if b != b'\r' && b != b'\n' {
                    output.push(b.wrapping_sub(42));
                }
                i += 1;

                if output.len() >= max_output_bytes {
                    state = State::Done;
                }
            }
            State::Done => {}
        }
    }

    if state == State::LookingForBegin {
        return Err(YencError::MissingHeader);
    }
    if output.is_empty() {
        return Err(YencError::EmptyOutput);
    }

    output.truncate(max_output_bytes);
    Ok(output)
}

fn rest_starts_with(input: &[u8], at: usize, needle: &[u8]) -> bool {
    input.len() >= at + needle.len() && &input[at..at + needle.len()] == needle
}

/// Advance past the current line's newline.
fn skip_line(input: &[u8], at: usize) -> usize {
    match input[at..].iter().position(|&b| b == b'\n') {
        Some(pos) => at + pos + 1,
        None => input.len(),
    }
}

/// Encode bytes as yEnc (test helper for round trips).
#[cfg(test)]
pub fn encode_yenc(name: &str, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(
        format!("=ybegin line=128 size={} name={}\r\n", data.len(), name).as_bytes(),
    );
    for &b in data {
        let enc = b.wrapping_add(42);
        // NUL, CR, LF and the escape char itself must be escaped.
        if enc == 0x00 || enc == b'\r' || enc == b'\n' || enc == b'=' {
            out.push(b'=');
            out.push(enc.wrapping_add(64));
        } else {
            out.push(enc);
        }
    }
    out.extend_from_slice(format!("\r\n=yend size={}\r\n", data.len()).as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let data: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        let encoded = encode_yenc("test.bin", &data);
        let decoded = decode_yenc(&encoded, 10_000).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_multipart_header_skipped() {
        let mut encoded = Vec::new();
        encoded.extend_from_slice(b"=ybegin part=1 total=2 line=128 size=4 name=a.bin\r\n");
        encoded.extend_from_slice(b"=ypart begin=1 end=4\r\n");
        // "ABCD" encoded: each byte + 42.
        for b in b"ABCD" {
            encoded.push(b.wrapping_add(42));
        }
        encoded.extend_from_slice(b"\r\n=yend size=4 part=1\r\n");

        let decoded = decode_yenc(&encoded, 100).unwrap();
        assert_eq!(decoded, b"ABCD");
    }

    #[test]
    fn test_output_bound_enforced() {
        let data = vec![7u8; 5000];
        let encoded = encode_yenc("big.bin", &data);
        let decoded = decode_yenc(&encoded, 256).unwrap();
        assert_eq!(decoded.len(), 256);
        assert!(decoded.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_missing_header_is_error() {
        assert_eq!(
            decode_yenc(b"plain text, no yenc here\r\n", 100),
            Err(YencError::MissingHeader)
        );
    }

    #[test]
    fn test_empty_payload_is_error() {
        let encoded = b"=ybegin line=128 size=0 name=empty.bin\r\n=yend size=0\r\n";
        assert_eq!(decode_yenc(encoded, 100), Err(YencError::EmptyOutput));
    }

    #[test]
    fn test_leading_garbage_lines_skipped() {
        let mut encoded = Vec::new();
        encoded.extend_from_slice(b"X-Header: something\r\n\r\n");
        encoded.extend_from_slice(&encode_yenc("x.bin", b"payload"));
        let decoded = decode_yenc(&encoded, 100).unwrap();
        assert_eq!(decoded, b"payload");
    }

    #[test]
    fn test_escaped_bytes_round_trip() {
        // Bytes whose encoded form collides with control characters.
        let tricky: Vec<u8> = vec![
            0u8.wrapping_sub(42),
            b'\r'.wrapping_sub(42),
            b'\n'.wrapping_sub(42),
            b'='.wrapping_sub(42),
        ];
        let encoded = encode_yenc("tricky.bin", &tricky);
        let decoded = decode_yenc(&encoded, 100).unwrap();
        assert_eq!(decoded, tricky);
    }
}
