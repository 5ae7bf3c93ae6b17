//! Bencode codec: the self-describing dictionary format used by metainfo
//! files and HTTP tracker replies.
use std::collections::BTreeMap;
use thiserror::Error;

pub mod decoder;
pub mod encoder;

/**
 * Represents a Bencode value, which is the core data structure for the Bencode encoding format.
 * Bencode is commonly used in BitTorrent protocol for encoding metadata.
 *
 * The enum contains four variants that represent all possible Bencode data types:
 *
 * 1. String(Vec<u8>):
 *    - Represents a byte string in Bencode
 *    - Stored as raw bytes (Vec<u8>) rather than UTF-8 strings
 *    - Example: "4:spam" in Bencode becomes String(b"spam")
 *
 * 2. Integer(i64):
 *    - Represents a 64-bit signed integer
 *    - Bencode integers are prefixed with 'i' and suffixed with 'e'
 *    - Example: "i42e" in Bencode becomes Integer(42)
 *
 * 3. List(Vec<BencodeValue>):
 *    - Represents an ordered sequence of Bencode values
 *    - Lists are prefixed with 'l' and suffixed with 'e'
 *    - Example: "l4:spami42ee" becomes List([String(b"spam"), Integer(42)])
 *
 * 4. Dict(BTreeMap<Vec<u8>, BencodeValue>):
 *    - Represents a key-value mapping where keys are byte strings
 *    - Dictionaries are prefixed with 'd' and suffixed with 'e'
 *    - Keys must be strings and are stored as Vec<u8>, kept in sorted order
 *      by the map itself so encode never needs a separate sort pass
 *    - Example: "d3:foo3:bare" becomes Dict({b"foo" => String(b"bar")})
 */
#[derive(Debug, PartialEq, Clone)]
pub enum BencodeValue {
    String(Vec<u8>),
    Integer(i64),
    List(Vec<BencodeValue>),
    Dict(BTreeMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, BencodeValue>> {
        match self {
            BencodeValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_str_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BencodeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(l) => Some(l),
            _ => None,
        }
    }
}

/// Custom error type for Bencode operations.
#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid bencode format: {0}")]
    InvalidFormat(String),

    #[error("Invalid integer format")]
    InvalidInteger,

    #[error("Invalid string length")]
    InvalidStringLength,

    #[error("Unexpected end of input")]
    UnexpectedEOI,

    #[error("Cannot encode type: {0}")]
    CannotEncodeType(&'static str),

    #[error("Dictionary keys must be strings")]
    DictKeyNotString,

    #[error("Trailing bytes after top-level value")]
    TrailingBytes,
}

pub type BencodeResult<T> = std::result::Result<T, BencodeError>;

/// Decodes a single bencoded value from a byte slice, requiring the entire
/// slice to be consumed.
pub fn decode(bytes: &[u8]) -> BencodeResult<BencodeValue> {
    let mut reader = bytes
        .iter()
        .copied()
        .map(Ok::<u8, std::io::Error>)
        .peekable();
    let value = decoder::decode_next(&mut reader)?;
    if reader.peek().is_some() {
        return Err(BencodeError::TrailingBytes);
    }
    Ok(value)
}

/// Encodes a value into its canonical bencode byte representation.
pub fn encode(value: &BencodeValue) -> BencodeResult<Vec<u8>> {
    let mut buf = Vec::new();
    encoder::encode(&mut buf, value)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(pairs: Vec<(&[u8], BencodeValue)>) -> BencodeValue {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            map.insert(k.to_vec(), v);
        }
        BencodeValue::Dict(map)
    }

    #[test]
    fn round_trips_string() {
        let v = BencodeValue::String(b"spam".to_vec());
        let enc = encode(&v).unwrap();
        assert_eq!(enc, b"4:spam");
        assert_eq!(decode(&enc).unwrap(), v);
    }

    #[test]
    fn round_trips_integer() {
        for i in [0i64, 42, -1].iter() {
            let v = BencodeValue::Integer(*i);
            let enc = encode(&v).unwrap();
            assert_eq!(decode(&enc).unwrap(), v);
        }
    }

    #[test]
    fn round_trips_list() {
        let v = BencodeValue::List(vec![
            BencodeValue::String(b"spam".to_vec()),
            BencodeValue::Integer(42),
        ]);
        let enc = encode(&v).unwrap();
        assert_eq!(enc, b"l4:spami42ee");
        assert_eq!(decode(&enc).unwrap(), v);
    }

    #[test]
    fn round_trips_dict_sorted() {
        let v = dict(vec![
            (b"spam", BencodeValue::String(b"eggs".to_vec())),
            (b"cow", BencodeValue::String(b"moo".to_vec())),
        ]);
        let enc = encode(&v).unwrap();
        assert_eq!(enc, b"d3:cow3:moo4:spam4:eggse");
        assert_eq!(decode(&enc).unwrap(), v);
    }

    #[test]
    fn rejects_leading_zero_integer() {
        assert!(decode(b"i03e").is_err());
    }

    #[test]
    fn rejects_negative_zero() {
        assert!(decode(b"i-0e").is_err());
    }

    #[test]
    fn rejects_trailing_bytes() {
        assert!(decode(b"i1ee").is_err());
    }

    #[test]
    fn decode_encode_decode_is_stable_for_nested_structures() {
        let v = dict(vec![(
            b"files",
            BencodeValue::List(vec![dict(vec![
                (b"length", BencodeValue::Integer(100)),
                (
                    b"path",
                    BencodeValue::List(vec![BencodeValue::String(b"a.txt".to_vec())]),
                ),
            ])]),
        )]);
        let enc1 = encode(&v).unwrap();
        let decoded = decode(&enc1).unwrap();
        let enc2 = encode(&decoded).unwrap();
        assert_eq!(enc1, enc2);
    }
}
