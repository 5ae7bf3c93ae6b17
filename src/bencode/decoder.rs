use super::BencodeError;
use super::BencodeResult;
use super::BencodeValue;

use std::collections::BTreeMap;
use std::io;
use tracing::instrument;

/// Decodes a bencode string from the input stream.
///
/// This function reads a bencode string in the format `<length>:<data>` where:
/// - `<length>` is a decimal number indicating the length of the string
/// - `<data>` is the actual string data of the specified length
#[instrument(skip(reader), level = "trace")]
pub fn decode_string<I: Iterator<Item = io::Result<u8>>>(
    reader: &mut std::iter::Peekable<I>,
) -> BencodeResult<Vec<u8>> {
    let length_str = read_until(reader, b':')?;
    let length = length_str
        .parse::<usize>()
        .map_err(|_| BencodeError::InvalidStringLength)?;

    let mut string_bytes = vec![0; length];
    for byte in string_bytes.iter_mut() {
        *byte = reader
            .next()
            .ok_or(BencodeError::UnexpectedEOI)?
            .map_err(BencodeError::Io)?;
    }
    Ok(string_bytes)
}

/// Reads bytes from the reader until a specified delimiter is encountered.
///
/// Collects all bytes read (excluding the delimiter) and returns them as a
/// UTF-8 string, since every caller here uses it for a decimal length or
/// integer prefix.
#[instrument(skip(reader), level = "trace")]
pub fn read_until<I: Iterator<Item = io::Result<u8>>>(
    reader: &mut std::iter::Peekable<I>,
    delimiter: u8,
) -> BencodeResult<String> {
    let mut buffer = Vec::new();

    loop {
        let &current_byte = reader
            .peek()
            .ok_or(BencodeError::UnexpectedEOI)?
            .as_ref()
            .map_err(|e| BencodeError::Io(e.kind().into()))?;

        if current_byte == delimiter {
            reader
                .next()
                .ok_or(BencodeError::UnexpectedEOI)?
                .map_err(BencodeError::Io)?;
            break;
        } else {
            buffer.push(
                reader
                    .next()
                    .ok_or(BencodeError::UnexpectedEOI)?
                    .map_err(BencodeError::Io)?,
            );
        }
    }

    String::from_utf8(buffer).map_err(|e| {
        BencodeError::InvalidFormat(format!("non-UTF8 characters in length/integer: {}", e))
    })
}

/// Decodes a bencode integer (`i<number>e`): rejects leading zeros, `-0`,
/// and an empty digit run.
#[instrument(skip(reader), level = "trace")]
pub fn decode_integer<I: Iterator<Item = io::Result<u8>>>(
    reader: &mut std::iter::Peekable<I>,
) -> BencodeResult<i64> {
    let first_byte = reader
        .next()
        .ok_or(BencodeError::UnexpectedEOI)?
        .map_err(BencodeError::Io)?;

    if first_byte != b'i' {
        return Err(BencodeError::InvalidFormat(
            "integer must start with 'i'".to_string(),
        ));
    }

    let num_str = read_until(reader, b'e')?;

    if num_str.is_empty() {
        return Err(BencodeError::InvalidInteger);
    }
    if num_str == "-0" {
        return Err(BencodeError::InvalidInteger);
    }
    let digits = num_str.strip_prefix('-').unwrap_or(&num_str);
    if digits.len() > 1 && digits.starts_with('0') {
        return Err(BencodeError::InvalidInteger);
    }

    num_str
        .parse::<i64>()
        .map_err(|_| BencodeError::InvalidInteger)
}

/// Decodes a bencode list (`l<items>e`), recursively decoding each item.
#[instrument(skip(reader), level = "trace")]
fn decode_list<I: Iterator<Item = io::Result<u8>>>(
    reader: &mut std::iter::Peekable<I>,
) -> BencodeResult<Vec<BencodeValue>> {
    let first_byte = reader
        .next()
        .ok_or(BencodeError::UnexpectedEOI)?
        .map_err(BencodeError::Io)?;
    if first_byte != b'l' {
        return Err(BencodeError::InvalidFormat(
            "list must start with 'l'".to_string(),
        ));
    }

    let mut list = Vec::new();

    loop {
        let &current_byte = reader
            .peek()
            .ok_or(BencodeError::UnexpectedEOI)?
            .as_ref()
            .map_err(|e| BencodeError::Io(e.kind().into()))?;

        if current_byte == b'e' {
            reader
                .next()
                .ok_or(BencodeError::UnexpectedEOI)?
                .map_err(BencodeError::Io)?;
            break;
        }

        list.push(decode_next(reader)?);
    }

    Ok(list)
}

/// Decodes a bencode dictionary (`d<pairs>e`). Keys must be bencode strings;
/// storing them in a `BTreeMap` gives us sorted iteration for free on encode.
#[instrument(skip(reader), level = "trace")]
fn decode_dict<I: Iterator<Item = io::Result<u8>>>(
    reader: &mut std::iter::Peekable<I>,
) -> BencodeResult<BTreeMap<Vec<u8>, BencodeValue>> {
    let first_byte = reader
        .next()
        .ok_or(BencodeError::UnexpectedEOI)?
        .map_err(BencodeError::Io)?;

    if first_byte != b'd' {
        return Err(BencodeError::InvalidFormat(
            "dictionary must start with 'd'".to_string(),
        ));
    }

    let mut dict = BTreeMap::new();

    loop {
        let &current_byte = reader
            .peek()
            .ok_or(BencodeError::UnexpectedEOI)?
            .as_ref()
            .map_err(|e| BencodeError::Io(e.kind().into()))?;

        if current_byte == b'e' {
            reader
                .next()
                .ok_or(BencodeError::UnexpectedEOI)?
                .map_err(BencodeError::Io)?;
            break;
        }

        let key = decode_string(reader)?;
        let value = decode_next(reader)?;
        dict.insert(key, value);
    }

    Ok(dict)
}

#[instrument(skip(reader), level = "trace")]
pub fn decode_next<I: Iterator<Item = io::Result<u8>>>(
    reader: &mut std::iter::Peekable<I>,
) -> BencodeResult<BencodeValue> {
    let &first_byte = reader
        .peek()
        .ok_or(BencodeError::UnexpectedEOI)?
        .as_ref()
        .map_err(|e| BencodeError::Io(e.kind().into()))?;

    match first_byte {
        b'0'..=b'9' => decode_string(reader).map(BencodeValue::String),
        b'i' => decode_integer(reader).map(BencodeValue::Integer),
        b'l' => decode_list(reader).map(BencodeValue::List),
        b'd' => decode_dict(reader).map(BencodeValue::Dict),
        _ => Err(BencodeError::InvalidFormat(format!(
            "unexpected character: {}",
            first_byte as char
        ))),
    }
}
