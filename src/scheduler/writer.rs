//! Scatter-writer: lays out the torrent's output file(s) up front and
//! writes each verified piece's byte range across whichever files it
//! overlaps.
use crate::torrent::Metainfo;
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// One open output file alongside its offset range within the concatenated
/// payload.
struct OutputFile {
    handle: tokio::fs::File,
    start: i64,
    length: i64,
}

pub struct Writer {
    files: Vec<OutputFile>,
    piece_length: i64,
}

impl Writer {
    /// Creates (and preallocates) every output file. Single-file mode
    /// creates `dest/name`; multi-file mode creates `dest/name/` plus each
    /// `dest/name/<path>...`, creating intermediate directories as needed.
    pub async fn create(metainfo: &Metainfo, dest: impl AsRef<Path>) -> std::io::Result<Self> {
        let layout = metainfo.file_layout(&dest);
        let mut files = Vec::with_capacity(layout.len());
        for (path, start, length) in layout {
            create_parent_dirs(&path).await?;
            let handle = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .await?;
            handle.set_len(length as u64).await?;
            files.push(OutputFile {
                handle,
                start,
                length,
            });
        }
        Ok(Self {
            files,
            piece_length: metainfo.info.piece_length,
        })
    }

    /// Writes `data` (a verified piece) at its byte range within the
    /// concatenated payload, splitting the write across every file the
    /// range overlaps.
    pub async fn write_piece(&mut self, index: u32, data: &[u8]) -> std::io::Result<()> {
        let piece_start = index as i64 * self.piece_length;
        let piece_end = piece_start + data.len() as i64;
        let mut consumed = 0usize;

        for file in &mut self.files {
            let file_end = file.start + file.length;
            if file.start >= piece_end || file_end <= piece_start {
                continue;
            }
            let overlap_start = piece_start.max(file.start);
            let overlap_end = piece_end.min(file_end);
            let overlap_len = (overlap_end - overlap_start) as usize;

            file.handle
                .seek(SeekFrom::Start((overlap_start - file.start) as u64))
                .await?;
            file.handle
                .write_all(&data[consumed..consumed + overlap_len])
                .await?;
            consumed += overlap_len;
        }

        Ok(())
    }
}

async fn create_parent_dirs(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::metainfo::{FileEntry, InfoDict};
    use sha1::{Digest, Sha1};

    fn metainfo(piece_length: i64, files: Vec<FileEntry>, total: i64) -> Metainfo {
        Metainfo {
            announce: String::new(),
            announce_list: Vec::new(),
            info: InfoDict {
                piece_length,
                name: "out".to_string(),
                length: if files.is_empty() { Some(total) } else { None },
                files,
            },
            info_hash: [0u8; 20],
            piece_hashes: vec![[0u8; 20]],
        }
    }

    #[tokio::test]
    async fn writes_single_file_piece() {
        let dir = tempfile::tempdir().unwrap();
        let m = metainfo(16, Vec::new(), 16);
        let mut writer = Writer::create(&m, dir.path()).await.unwrap();
        let data = b"0123456789abcdef".to_vec();
        writer.write_piece(0, &data).await.unwrap();

        let written = tokio::fs::read(dir.path().join("out")).await.unwrap();
        assert_eq!(written, data);
    }

    #[tokio::test]
    async fn scatters_piece_across_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            FileEntry {
                length: 10,
                path: vec!["a.bin".to_string()],
            },
            FileEntry {
                length: 10,
                path: vec!["b.bin".to_string()],
            },
        ];
        let m = metainfo(20, files, 20);
        let mut writer = Writer::create(&m, dir.path()).await.unwrap();
        let data: Vec<u8> = (0..20).collect();
        writer.write_piece(0, &data).await.unwrap();

        let a = tokio::fs::read(dir.path().join("out/a.bin")).await.unwrap();
        let b = tokio::fs::read(dir.path().join("out/b.bin")).await.unwrap();
        assert_eq!(a, data[0..10]);
        assert_eq!(b, data[10..20]);
    }

    #[test]
    fn sha1_matches_expected_hash_shape() {
        let mut hasher = Sha1::new();
        hasher.update(b"abc");
        let digest = hasher.finalize();
        assert_eq!(digest.len(), 20);
    }
}
