//! Name-value pair encoding used by `PARAMS` and `GET_VALUES`.
//!
//! Each length is one byte when below 128, otherwise four bytes Big Endian
//! with the high bit set.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

/// Decode name-value pairs.
///
/// Decoding stops at the first truncated pair; the pairs before it are kept.
/// Invalid UTF-8 is replaced.
pub fn decode_pairs(mut buf: &[u8]) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    while !buf.is_empty() {
        let Some((name_len, rest)) = read_length(buf) else { break };
        let Some((value_len, rest)) = read_length(rest) else { break };
        if rest.len() < name_len + value_len {
            tracing::warn!("Truncated name-value pair, dropping {} bytes", buf.len());
            break;
        }

        let (name, rest) = rest.split_at(name_len);
        let (value, rest) = rest.split_at(value_len);
        pairs.insert(
            String::from_utf8_lossy(name).into_owned(),
            String::from_utf8_lossy(value).into_owned(),
        );
        buf = rest;
    }
    pairs
}

fn read_length(buf: &[u8]) -> Option<(usize, &[u8])> {
    match buf.first()? {
        b if b & 0x80 == 0 => Some((*b as usize, &buf[1..])),
        _ if buf.len() >= 4 => {
            let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) & 0x7fff_ffff;
            Some((len as usize, &buf[4..]))
        }
        _ => None,
    }
}

/// Encode name-value pairs in the given order.
pub fn encode_pairs<'a, I>(pairs: I) -> Bytes
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut buf = BytesMut::new();
    for (name, value) in pairs {
        write_length(&mut buf, name.len());
        write_length(&mut buf, value.len());
        buf.put_slice(name.as_bytes());
        buf.put_slice(value.as_bytes());
    }
    buf.freeze()
}

fn write_length(buf: &mut BytesMut, len: usize) {
    if len < 0x80 {
        buf.put_u8(len as u8);
    } else {
        buf.put_u32(len as u32 | 0x8000_0000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_lengths() {
        let encoded = encode_pairs([("A", "xy")]);
        assert_eq!(&encoded[..], &[1, 2, b'A', b'x', b'y']);
    }

    #[test]
    fn test_long_value_uses_four_bytes() {
        let value = "v".repeat(200);
        let encoded = encode_pairs([("NAME", value.as_str())]);
        assert_eq!(&encoded[..5], &[4, 0x80, 0, 0, 200]);

        let decoded = decode_pairs(&encoded);
        assert_eq!(decoded["NAME"].len(), 200);
    }

    #[test]
    fn test_decode_several_pairs() {
        let encoded = encode_pairs([
            ("REQUEST_METHOD", "POST"),
            ("REQUEST_URI", "/invoke"),
            ("EMPTY", ""),
        ]);
        let decoded = decode_pairs(&encoded);

        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded["REQUEST_METHOD"], "POST");
        assert_eq!(decoded["REQUEST_URI"], "/invoke");
        assert_eq!(decoded["EMPTY"], "");
    }

    #[test]
    fn test_truncated_pair_keeps_earlier_ones() {
        let mut encoded = encode_pairs([("A", "1"), ("B", "22")]).to_vec();
        encoded.truncate(encoded.len() - 1);

        let decoded = decode_pairs(&encoded);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded["A"], "1");
    }

    #[test]
    fn test_truncated_long_length() {
        assert!(decode_pairs(&[0x80, 0]).is_empty());
    }
}
