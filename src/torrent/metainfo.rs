//! Torrent metainfo structure and parsing logic.
//!
//! Defines `Metainfo`, the immutable descriptor produced once at `open` time,
//! and the helpers that parse it out of a decoded bencode dictionary.
use super::TorrentError;
use super::TorrentResult;
use crate::bencode::{self, BencodeValue};
use sha1::Digest;
use std::path::{Path, PathBuf};

/// A single entry of a multi-file torrent's `info.files` list.
#[derive(Debug, PartialEq, Clone)]
pub struct FileEntry {
    pub length: i64,
    pub path: Vec<String>,
}

/// The `info` sub-dictionary, after validation.
#[derive(Debug, PartialEq, Clone)]
pub struct InfoDict {
    pub piece_length: i64,
    pub name: String,
    /// Single-file length; `None` in multi-file mode.
    pub length: Option<i64>,
    /// Non-empty only in multi-file mode.
    pub files: Vec<FileEntry>,
}

impl InfoDict {
    pub fn is_multi_file(&self) -> bool {
        !self.files.is_empty()
    }
}

/// The immutable, fully parsed metainfo descriptor: produced once at `Open`
/// time and lives for the duration of the download.
#[derive(Debug, PartialEq, Clone)]
pub struct Metainfo {
    pub announce: String,
    pub announce_list: Vec<Vec<String>>,
    pub info: InfoDict,
    pub info_hash: [u8; 20],
    pub piece_hashes: Vec<[u8; 20]>,
}

impl Metainfo {
    /// Reads and parses a `.torrent` file from disk.
    #[tracing::instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_path(path: impl AsRef<Path>) -> TorrentResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// Parses a `.torrent` file already held in memory.
    #[tracing::instrument(level = "debug", skip(bytes))]
    pub fn from_bytes(bytes: &[u8]) -> TorrentResult<Self> {
        let value = bencode::decode(bytes)?;
        Self::parse(value)
    }

    /// Sum of all file lengths; equals the payload size.
    pub fn total_length(&self) -> i64 {
        if self.info.is_multi_file() {
            self.info.files.iter().map(|f| f.length).sum()
        } else {
            self.info.length.unwrap_or(0)
        }
    }

    /// Total number of pieces, derived from the hash array length.
    pub fn num_pieces(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Size in bytes of piece `index`: `piece_length` for every piece except
    /// possibly the last, which is trimmed to what remains of `total_length`.
    pub fn piece_size(&self, index: usize) -> i64 {
        if index >= self.num_pieces() {
            return 0;
        }
        if index < self.num_pieces() - 1 {
            self.info.piece_length
        } else {
            self.total_length() - (self.num_pieces() - 1) as i64 * self.info.piece_length
        }
    }

    /// The destination root for this torrent's output: `dest/name`.
    pub fn root_path(&self, dest: impl AsRef<Path>) -> PathBuf {
        dest.as_ref().join(&self.info.name)
    }

    /// Full output path of each file entry, relative to `dest`. Single-file
    /// mode yields exactly one path, `dest/name`.
    pub fn output_paths(&self, dest: impl AsRef<Path>) -> Vec<PathBuf> {
        if self.info.is_multi_file() {
            self.info
                .files
                .iter()
                .map(|f| {
                    let mut p = self.root_path(&dest);
                    for component in &f.path {
                        p.push(component);
                    }
                    p
                })
                .collect()
        } else {
            vec![self.root_path(&dest)]
        }
    }

    /// `(path, offset, length)` for every output file, in the order the
    /// concatenated payload covers them. Used by the writer to scatter a
    /// downloaded piece's byte range across one or more files.
    pub fn file_layout(&self, dest: impl AsRef<Path>) -> Vec<(PathBuf, i64, i64)> {
        let paths = self.output_paths(&dest);
        if self.info.is_multi_file() {
            let mut offset = 0i64;
            paths
                .into_iter()
                .zip(self.info.files.iter())
                .map(|(path, file)| {
                    let entry = (path, offset, file.length);
                    offset += file.length;
                    entry
                })
                .collect()
        } else {
            vec![(paths[0].clone(), 0, self.total_length())]
        }
    }

    fn parse(data: BencodeValue) -> TorrentResult<Metainfo> {
        let mut dict = match data {
            BencodeValue::Dict(d) => d,
            _ => {
                return Err(TorrentError::InvalidFormat(
                    "root is not a dictionary".into(),
                ))
            }
        };

        let announce = match dict.remove(b"announce".as_slice()) {
            Some(BencodeValue::String(s)) => String::from_utf8(s)
                .map_err(|e| TorrentError::InvalidFormat(format!("announce not UTF-8: {e}")))?,
            Some(_) => {
                return Err(TorrentError::InvalidFormat(
                    "announce is not a string".into(),
                ))
            }
            None => String::new(),
        };

        let announce_list = match dict.remove(b"announce-list".as_slice()) {
            Some(v) => parse_announce_list(v)?,
            None => Vec::new(),
        };

        let info_value = dict
            .remove(b"info".as_slice())
            .ok_or_else(|| TorrentError::MissingField("info".into()))?;

        // The info-hash must be computed over the exact bencoded bytes of
        // the `info` value, so we re-encode it canonically (sorted-key
        // dict) before decoding its fields.
        let info_bytes = bencode::encode(&info_value)?;
        let mut hasher = sha1::Sha1::new();
        hasher.update(&info_bytes);
        let info_hash: [u8; 20] = hasher.finalize().into();

        let info = parse_info_dict(info_value)?;
        let piece_hashes = parse_pieces(&info.pieces)?;

        Ok(Metainfo {
            announce,
            announce_list,
            info: info.dict,
            info_hash,
            piece_hashes,
        })
    }
}

/// Intermediate parse result so we can hold onto the raw `pieces` bytes
/// long enough to split them into hashes after building `InfoDict`.
struct RawInfo {
    dict: InfoDict,
    pieces: Vec<u8>,
}

fn parse_info_dict(value: BencodeValue) -> TorrentResult<RawInfo> {
    let dict = match value {
        BencodeValue::Dict(d) => d,
        _ => {
            return Err(TorrentError::InvalidFormat(
                "info is not a dictionary".into(),
            ))
        }
    };

    let piece_length = match dict.get(b"piece length".as_slice()) {
        Some(BencodeValue::Integer(i)) => *i,
        _ => return Err(TorrentError::MissingField("piece length".into())),
    };
    if piece_length <= 0 {
        return Err(TorrentError::InvalidFormat(
            "piece length must be positive".into(),
        ));
    }

    let pieces = match dict.get(b"pieces".as_slice()) {
        Some(BencodeValue::String(s)) => s.clone(),
        _ => return Err(TorrentError::MissingField("pieces".into())),
    };

    let name = match dict.get(b"name".as_slice()) {
        Some(BencodeValue::String(s)) => String::from_utf8(s.clone())
            .map_err(|e| TorrentError::InvalidFormat(format!("name not UTF-8: {e}")))?,
        _ => return Err(TorrentError::MissingField("name".into())),
    };

    let length = match dict.get(b"length".as_slice()) {
        Some(BencodeValue::Integer(i)) => Some(*i),
        _ => None,
    };

    let files = match dict.get(b"files".as_slice()) {
        Some(BencodeValue::List(list)) => {
            let mut files = Vec::with_capacity(list.len());
            for entry in list {
                files.push(parse_file_entry(entry)?);
            }
            files
        }
        _ => Vec::new(),
    };

    if length.is_none() && files.is_empty() {
        return Err(TorrentError::MissingField(
            "length or files (neither present)".into(),
        ));
    }

    Ok(RawInfo {
        dict: InfoDict {
            piece_length,
            name,
            length,
            files,
        },
        pieces,
    })
}

fn parse_file_entry(value: &BencodeValue) -> TorrentResult<FileEntry> {
    let dict = match value {
        BencodeValue::Dict(d) => d,
        _ => {
            return Err(TorrentError::InvalidFormat(
                "file entry is not a dict".into(),
            ))
        }
    };

    let length = match dict.get(b"length".as_slice()) {
        Some(BencodeValue::Integer(i)) => *i,
        _ => return Err(TorrentError::MissingField("file length".into())),
    };

    let path = match dict.get(b"path".as_slice()) {
        Some(BencodeValue::List(parts)) => {
            let mut path = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    BencodeValue::String(s) => {
                        path.push(String::from_utf8(s.clone()).map_err(|e| {
                            TorrentError::InvalidFormat(format!("path component not UTF-8: {e}"))
                        })?)
                    }
                    _ => {
                        return Err(TorrentError::InvalidFormat(
                            "path component is not a string".into(),
                        ))
                    }
                }
            }
            path
        }
        _ => return Err(TorrentError::MissingField("file path".into())),
    };

    Ok(FileEntry { length, path })
}

fn parse_announce_list(value: BencodeValue) -> TorrentResult<Vec<Vec<String>>> {
    let tiers = match value {
        BencodeValue::List(tiers) => tiers,
        _ => {
            return Err(TorrentError::InvalidFormat(
                "announce-list is not a list".into(),
            ))
        }
    };

    let mut result = Vec::with_capacity(tiers.len());
    for tier in tiers {
        let trackers = match tier {
            BencodeValue::List(trackers) => trackers,
            _ => {
                return Err(TorrentError::InvalidFormat(
                    "announce tier is not a list".into(),
                ))
            }
        };
        let mut tier_vec = Vec::with_capacity(trackers.len());
        for tracker in trackers {
            match tracker {
                BencodeValue::String(s) => tier_vec.push(String::from_utf8(s).map_err(|e| {
                    TorrentError::InvalidFormat(format!("tracker URL not UTF-8: {e}"))
                })?),
                _ => {
                    return Err(TorrentError::InvalidFormat(
                        "tracker URL is not a string".into(),
                    ))
                }
            }
        }
        result.push(tier_vec);
    }
    Ok(result)
}

/// Splits the concatenated `pieces` byte string into 20-byte SHA-1 hashes,
/// one per piece, in piece-index order.
fn parse_pieces(pieces: &[u8]) -> TorrentResult<Vec<[u8; 20]>> {
    if !pieces.len().is_multiple_of(20) {
        return Err(TorrentError::InvalidPiecesHashLength);
    }
    Ok(pieces
        .chunks_exact(20)
        .map(|chunk| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::BencodeValue;
    use std::collections::BTreeMap;

    fn bstr(s: &str) -> BencodeValue {
        BencodeValue::String(s.as_bytes().to_vec())
    }

    fn single_file_torrent(piece_length: i64, total_length: i64, piece_hash: [u8; 20]) -> Vec<u8> {
        let mut info = BTreeMap::new();
        info.insert(
            b"piece length".to_vec(),
            BencodeValue::Integer(piece_length),
        );
        info.insert(
            b"pieces".to_vec(),
            BencodeValue::String(piece_hash.to_vec()),
        );
        info.insert(b"name".to_vec(), bstr("file.bin"));
        info.insert(b"length".to_vec(), BencodeValue::Integer(total_length));

        let mut root = BTreeMap::new();
        root.insert(
            b"announce".to_vec(),
            bstr("http://tracker.example/announce"),
        );
        root.insert(b"info".to_vec(), BencodeValue::Dict(info));

        bencode::encode(&BencodeValue::Dict(root)).unwrap()
    }

    #[test]
    fn parses_single_file_torrent_and_hashes_info_dict() {
        let hash = [7u8; 20];
        let bytes = single_file_torrent(16384, 16384, hash);
        let m = Metainfo::from_bytes(&bytes).unwrap();
        assert_eq!(m.announce, "http://tracker.example/announce");
        assert_eq!(m.total_length(), 16384);
        assert_eq!(m.num_pieces(), 1);
        assert_eq!(m.piece_size(0), 16384);
        assert!(!m.info.is_multi_file());
    }

    #[test]
    fn last_piece_is_short() {
        let hashes = [9u8; 40]; // two pieces worth of hash bytes
        let mut info = BTreeMap::new();
        info.insert(b"piece length".to_vec(), BencodeValue::Integer(16384));
        info.insert(b"pieces".to_vec(), BencodeValue::String(hashes.to_vec()));
        info.insert(b"name".to_vec(), bstr("file.bin"));
        info.insert(b"length".to_vec(), BencodeValue::Integer(20000));
        let mut root = BTreeMap::new();
        root.insert(b"announce".to_vec(), bstr("http://t/a"));
        root.insert(b"info".to_vec(), BencodeValue::Dict(info));
        let bytes = bencode::encode(&BencodeValue::Dict(root)).unwrap();

        let m = Metainfo::from_bytes(&bytes).unwrap();
        assert_eq!(m.num_pieces(), 2);
        assert_eq!(m.piece_size(0), 16384);
        assert_eq!(m.piece_size(1), 3616);
    }

    #[test]
    fn parses_multi_file_torrent() {
        let mut file_a = BTreeMap::new();
        file_a.insert(b"length".to_vec(), BencodeValue::Integer(100));
        file_a.insert(b"path".to_vec(), BencodeValue::List(vec![bstr("a")]));
        let mut file_b = BTreeMap::new();
        file_b.insert(b"length".to_vec(), BencodeValue::Integer(50));
        file_b.insert(
            b"path".to_vec(),
            BencodeValue::List(vec![bstr("dir"), bstr("b")]),
        );

        let mut info = BTreeMap::new();
        info.insert(b"piece length".to_vec(), BencodeValue::Integer(128));
        info.insert(b"pieces".to_vec(), BencodeValue::String(vec![1u8; 40]));
        info.insert(b"name".to_vec(), bstr("torrent-root"));
        info.insert(
            b"files".to_vec(),
            BencodeValue::List(vec![BencodeValue::Dict(file_a), BencodeValue::Dict(file_b)]),
        );
        let mut root = BTreeMap::new();
        root.insert(b"announce".to_vec(), bstr("http://t/a"));
        root.insert(b"info".to_vec(), BencodeValue::Dict(info));
        let bytes = bencode::encode(&BencodeValue::Dict(root)).unwrap();

        let m = Metainfo::from_bytes(&bytes).unwrap();
        assert!(m.info.is_multi_file());
        assert_eq!(m.total_length(), 150);
        assert_eq!(m.num_pieces(), 2);
        assert_eq!(m.piece_size(0), 128);
        assert_eq!(m.piece_size(1), 22);
        let paths = m.output_paths("/dest");
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/dest/torrent-root/a"),
                PathBuf::from("/dest/torrent-root/dir/b"),
            ]
        );
    }

    #[test]
    fn rejects_pieces_not_multiple_of_20() {
        let mut info = BTreeMap::new();
        info.insert(b"piece length".to_vec(), BencodeValue::Integer(16384));
        info.insert(b"pieces".to_vec(), BencodeValue::String(vec![1u8; 21]));
        info.insert(b"name".to_vec(), bstr("file.bin"));
        info.insert(b"length".to_vec(), BencodeValue::Integer(16384));
        let mut root = BTreeMap::new();
        root.insert(b"announce".to_vec(), bstr("http://t/a"));
        root.insert(b"info".to_vec(), BencodeValue::Dict(info));
        let bytes = bencode::encode(&BencodeValue::Dict(root)).unwrap();

        assert!(matches!(
            Metainfo::from_bytes(&bytes),
            Err(TorrentError::InvalidPiecesHashLength)
        ));
    }

    #[test]
    fn rejects_missing_info() {
        let mut root = BTreeMap::new();
        root.insert(b"announce".to_vec(), bstr("http://t/a"));
        let bytes = bencode::encode(&BencodeValue::Dict(root)).unwrap();
        assert!(Metainfo::from_bytes(&bytes).is_err());
    }
}
