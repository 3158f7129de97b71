use super::InfoSection;
use std::collections::HashMap;
use std::ops::Range;
use std::path::PathBuf;

/// One contiguous run of bytes shared by a piece and a file: the piece's
/// local range `piece_range` covers exactly the same bytes as the file's
/// local range `file_range` (same length, different coordinate systems).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub piece_index: usize,
    pub piece_range: Range<u64>,
    pub file_path: PathBuf,
    pub file_range: Range<u64>,
}

/// Sweeps a torrent's files in order, laying them end-to-end into
/// fixed-size pieces, and records every piece/file overlap as one
/// [`MappingEntry`]. Keeps the entries in a single `Vec` with two
/// secondary index `Vec<Vec<usize>>`s into it (per piece, per file)
/// rather than cross-owning entries in two places.
pub struct PieceFileMap {
    entries: Vec<MappingEntry>,
    by_piece: Vec<Vec<usize>>,
    by_file: HashMap<PathBuf, Vec<usize>>,
}

impl PieceFileMap {
    pub fn build(info: &InfoSection) -> Self {
        let piece_length = info.piece_length as u64;
        let num_pieces = info.num_pieces();
        let mut entries = Vec::new();
        let mut by_piece: Vec<Vec<usize>> = vec![Vec::new(); num_pieces];
        let mut by_file: HashMap<PathBuf, Vec<usize>> = HashMap::new();

        // Absolute byte offset into the torrent's concatenated content.
        let mut cursor: u64 = 0;

        for (path, length) in info.files() {
            let length = length.max(0) as u64;
            let file_start = cursor;
            let file_end = cursor + length;
            let mut file_offset = file_start;

            while file_offset < file_end {
                let piece_index = (file_offset / piece_length) as usize;
                let piece_start_abs = piece_index as u64 * piece_length;
                let piece_len = info.length_of_piece(piece_index).max(0) as u64;
                let piece_end_abs = piece_start_abs + piece_len;

                let segment_end_abs = file_end.min(piece_end_abs);
                let segment_len = segment_end_abs - file_offset;
                if segment_len == 0 {
                    break;
                }

                let piece_local_start = file_offset - piece_start_abs;
                let file_local_start = file_offset - file_start;

                let entry_index = entries.len();
                entries.push(MappingEntry {
                    piece_index,
                    piece_range: piece_local_start..piece_local_start + segment_len,
                    file_path: path.clone(),
                    file_range: file_local_start..file_local_start + segment_len,
                });
                if let Some(slot) = by_piece.get_mut(piece_index) {
                    slot.push(entry_index);
                }
                by_file.entry(path.clone()).or_default().push(entry_index);

                file_offset += segment_len;
            }

            cursor = file_end;
        }

        PieceFileMap {
            entries,
            by_piece,
            by_file,
        }
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn entries_for_piece(&self, piece_index: usize) -> impl Iterator<Item = &MappingEntry> {
        self.by_piece
            .get(piece_index)
            .into_iter()
            .flatten()
            .map(move |&i| &self.entries[i])
    }

    pub fn entries_for_file(&self, path: &std::path::Path) -> impl Iterator<Item = &MappingEntry> {
        self.by_file
            .get(path)
            .into_iter()
            .flatten()
            .map(move |&i| &self.entries[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::FileLayout;

    fn info(piece_length: i64, total_length: i64) -> InfoSection {
        let num_pieces = (total_length as f64 / piece_length as f64).ceil() as usize;
        InfoSection {
            piece_length,
            pieces: vec![0u8; num_pieces * 20],
            private: false,
            name: "file.bin".to_string(),
            layout: FileLayout::SingleFile { length: total_length },
        }
    }

    #[test]
    fn mapping_covers_every_byte_exactly_once() {
        let info = info(16384, 40000);
        let map = PieceFileMap::build(&info);
        assert_eq!(map.entries().len(), 3);

        for p in 0..info.num_pieces() {
            let mut covered: u64 = 0;
            for entry in map.entries_for_piece(p) {
                covered += entry.piece_range.end - entry.piece_range.start;
            }
            assert_eq!(covered, info.length_of_piece(p) as u64);
        }

        let path = PathBuf::from("file.bin");
        let mut covered: u64 = 0;
        for entry in map.entries_for_file(&path) {
            covered += entry.file_range.end - entry.file_range.start;
        }
        assert_eq!(covered, 40000);
    }

    #[test]
    fn multi_file_mapping_spans_file_boundaries() {
        let info = InfoSection {
            piece_length: 10,
            pieces: vec![0u8; 2 * 20],
            private: false,
            name: "dir".to_string(),
            layout: FileLayout::MultiFile {
                files: vec![
                    super::super::FileEntry { length: 7, path: vec!["a.bin".into()] },
                    super::super::FileEntry { length: 8, path: vec!["b.bin".into()] },
                ],
            },
        };
        let map = PieceFileMap::build(&info);
        // piece 0 covers bytes [0,10): all of a.bin (7) + first 3 of b.bin.
        let piece0: Vec<_> = map.entries_for_piece(0).collect();
        assert_eq!(piece0.len(), 2);
        assert_eq!(piece0[0].file_path, PathBuf::from("a.bin"));
        assert_eq!(piece0[1].file_path, PathBuf::from("b.bin"));
        assert_eq!(piece0[1].file_range, 0..3);
        // piece 1 covers the remaining 5 bytes of b.bin.
        let piece1: Vec<_> = map.entries_for_piece(1).collect();
        assert_eq!(piece1.len(), 1);
        assert_eq!(piece1[0].file_range, 3..8);
    }
}
