//! Parses `.torrent` files into a typed tree, computes the info-hash, and
//! (via [`mapping`]) maps pieces to the files they cover.

mod mapping;

pub use mapping::{MappingEntry, PieceFileMap};

use crate::bencode::{self, HashingSink, Value};
use crate::hash::Sha1Hash;
use std::path::PathBuf;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum MetaInfoError {
    #[error("bencode decoding failed: {0}")]
    Bencode(#[from] bencode::BencodeError),
    #[error("top-level value is not a dictionary")]
    NotADict,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` has the wrong type")]
    WrongType(&'static str),
    #[error("`pieces` length {0} is not a multiple of 20")]
    BadPiecesLength(usize),
    #[error("`piece length` must be positive, got {0}")]
    NonPositivePieceLength(i64),
    #[error("info dictionary declares both `length` and `files`, or neither")]
    AmbiguousFileLayout,
    #[error("path component is not valid UTF-8")]
    InvalidPathEncoding,
}

pub type Result<T> = std::result::Result<T, MetaInfoError>;

/// One entry of a multi-file torrent's `files` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub length: i64,
    pub path: Vec<String>,
}

impl FileEntry {
    pub fn full_path(&self) -> PathBuf {
        self.path.iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLayout {
    SingleFile { length: i64 },
    MultiFile { files: Vec<FileEntry> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoSection {
    pub piece_length: i64,
    pub pieces: Vec<u8>,
    pub private: bool,
    pub name: String,
    pub layout: FileLayout,
}

impl InfoSection {
    pub fn num_pieces(&self) -> usize {
        self.pieces.len() / 20
    }

    pub fn piece_hash(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(20)?;
        self.pieces.get(start..start + 20)
    }

    pub fn total_length(&self) -> i64 {
        match &self.layout {
            FileLayout::SingleFile { length } => *length,
            FileLayout::MultiFile { files } => files.iter().map(|f| f.length).sum(),
        }
    }

    /// Length of piece `index`: `piece_length` for every piece but the
    /// last, whose length is `total_length % piece_length` (or the full
    /// `piece_length` when that remainder is zero, i.e. the torrent's
    /// length is an exact multiple of the piece size).
    pub fn length_of_piece(&self, index: usize) -> i64 {
        let num_pieces = self.num_pieces();
        if num_pieces == 0 || index + 1 < num_pieces {
            return self.piece_length;
        }
        let remainder = self.total_length() % self.piece_length;
        if remainder == 0 {
            self.piece_length
        } else {
            remainder
        }
    }

    /// Base directory files are rooted under: `.` for a single-file
    /// torrent, the torrent's advised `name` for a multi-file one.
    pub fn base_dir(&self) -> PathBuf {
        match &self.layout {
            FileLayout::SingleFile { .. } => PathBuf::from("."),
            FileLayout::MultiFile { .. } => PathBuf::from(&self.name),
        }
    }

    /// `(path relative to base_dir, length)` for every file, in the
    /// order they appear on the wire (which is also byte-offset order).
    pub fn files(&self) -> Vec<(PathBuf, i64)> {
        match &self.layout {
            FileLayout::SingleFile { length } => vec![(PathBuf::from(&self.name), *length)],
            FileLayout::MultiFile { files } => {
                files.iter().map(|f| (f.full_path(), f.length)).collect()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TorrentMetaInfo {
    pub announce: String,
    pub announce_list: Option<Vec<Vec<String>>>,
    pub creation_date: Option<i64>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
    pub info: InfoSection,
    pub info_hash: Sha1Hash,
}

impl TorrentMetaInfo {
    #[instrument(level = "debug")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let value = bencode::decode(bytes)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let dict = value.as_dict().ok_or(MetaInfoError::NotADict)?;

        let announce = required_string(dict, "announce")?;
        let announce_list = optional_announce_list(dict.get(b"announce-list".as_slice()))?;
        let creation_date = match dict.get(b"creation-date".as_slice()) {
            Some(v) => Some(v.as_integer().ok_or(MetaInfoError::WrongType("creation-date"))?),
            None => None,
        };
        let comment = optional_string(dict.get(b"comment".as_slice()))?;
        let created_by = optional_string(dict.get(b"created by".as_slice()))?;

        let info_value = dict
            .get(b"info".as_slice())
            .ok_or(MetaInfoError::MissingField("info"))?;
        let info_hash = compute_info_hash(info_value);
        let info = parse_info(info_value)?;

        Ok(TorrentMetaInfo {
            announce,
            announce_list,
            creation_date,
            comment,
            created_by,
            info,
            info_hash,
        })
    }

    /// Builds the piece<->file mapping for this torrent. Cheap enough
    /// (linear in file + piece count) that callers may call it eagerly
    /// or lazily on first query; both are spec-conformant.
    pub fn mapping(&self) -> PieceFileMap {
        PieceFileMap::build(&self.info)
    }
}

fn required_string(dict: &std::collections::BTreeMap<Vec<u8>, Value>, key: &'static str) -> Result<String> {
    dict.get(key.as_bytes())
        .ok_or(MetaInfoError::MissingField(key))?
        .as_str()
        .map(str::to_owned)
        .ok_or(MetaInfoError::WrongType(key))
}

fn optional_string(value: Option<&Value>) -> Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(v) => Ok(Some(
            v.as_str().ok_or(MetaInfoError::WrongType("comment/created by"))?.to_owned(),
        )),
    }
}

fn optional_announce_list(value: Option<&Value>) -> Result<Option<Vec<Vec<String>>>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let tiers = value.as_list().ok_or(MetaInfoError::WrongType("announce-list"))?;
    let mut result = Vec::with_capacity(tiers.len());
    for tier in tiers {
        let urls = tier.as_list().ok_or(MetaInfoError::WrongType("announce-list"))?;
        let mut tier_urls = Vec::with_capacity(urls.len());
        for url in urls {
            tier_urls.push(url.as_str().ok_or(MetaInfoError::WrongType("announce-list"))?.to_owned());
        }
        result.push(tier_urls);
    }
    Ok(Some(result))
}

/// Re-encodes the info subtree exactly as parsed (canonical, since it was
/// decoded by our dictionary-ordering-enforcing decoder) straight into a
/// SHA-1 sink, never materialising the encoded bytes.
fn compute_info_hash(info_value: &Value) -> Sha1Hash {
    let mut sink = HashingSink::new();
    bencode::encode_to_writer(&mut sink, info_value)
        .expect("writing into a HashingSink cannot fail");
    Sha1Hash::new(sink.finalize())
}

fn parse_info(info_value: &Value) -> Result<InfoSection> {
    let dict = info_value.as_dict().ok_or(MetaInfoError::WrongType("info"))?;

    let piece_length = dict
        .get(b"piece length".as_slice())
        .ok_or(MetaInfoError::MissingField("piece length"))?
        .as_integer()
        .ok_or(MetaInfoError::WrongType("piece length"))?;
    if piece_length <= 0 {
        return Err(MetaInfoError::NonPositivePieceLength(piece_length));
    }

    let pieces = dict
        .get(b"pieces".as_slice())
        .ok_or(MetaInfoError::MissingField("pieces"))?
        .as_bytes()
        .ok_or(MetaInfoError::WrongType("pieces"))?
        .to_vec();
    if pieces.len() % 20 != 0 {
        return Err(MetaInfoError::BadPiecesLength(pieces.len()));
    }

    let private = matches!(
        dict.get(b"private".as_slice()).and_then(Value::as_integer),
        Some(1)
    );

    let name = required_string(dict, "name")?;

    let length = dict.get(b"length".as_slice());
    let files = dict.get(b"files".as_slice());

    let layout = match (length, files) {
        (Some(length_value), None) => {
            let length = length_value.as_integer().ok_or(MetaInfoError::WrongType("length"))?;
            FileLayout::SingleFile { length }
        }
        (None, Some(files_value)) => {
            let entries = files_value.as_list().ok_or(MetaInfoError::WrongType("files"))?;
            let mut parsed = Vec::with_capacity(entries.len());
            for entry in entries {
                parsed.push(parse_file_entry(entry)?);
            }
            FileLayout::MultiFile { files: parsed }
        }
        _ => return Err(MetaInfoError::AmbiguousFileLayout),
    };

    Ok(InfoSection {
        piece_length,
        pieces,
        private,
        name,
        layout,
    })
}

fn parse_file_entry(value: &Value) -> Result<FileEntry> {
    let dict = value.as_dict().ok_or(MetaInfoError::WrongType("files[]"))?;
    let length = dict
        .get(b"length".as_slice())
        .ok_or(MetaInfoError::MissingField("files[].length"))?
        .as_integer()
        .ok_or(MetaInfoError::WrongType("files[].length"))?;
    let path_list = dict
        .get(b"path".as_slice())
        .ok_or(MetaInfoError::MissingField("files[].path"))?
        .as_list()
        .ok_or(MetaInfoError::WrongType("files[].path"))?;
    if path_list.is_empty() {
        return Err(MetaInfoError::MissingField("files[].path"));
    }
    let mut path = Vec::with_capacity(path_list.len());
    for component in path_list {
        path.push(
            component
                .as_str()
                .ok_or(MetaInfoError::InvalidPathEncoding)?
                .to_owned(),
        );
    }
    Ok(FileEntry { length, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::encode;
    use std::collections::BTreeMap;

    fn single_file_torrent(piece_length: i64, length: i64, num_pieces: usize) -> Vec<u8> {
        let mut info = BTreeMap::new();
        info.insert(b"piece length".to_vec(), Value::Integer(piece_length));
        info.insert(b"pieces".to_vec(), Value::String(vec![0u8; num_pieces * 20]));
        info.insert(b"name".to_vec(), Value::string("file.bin"));
        info.insert(b"length".to_vec(), Value::Integer(length));

        let mut root = BTreeMap::new();
        root.insert(b"announce".to_vec(), Value::string("http://tracker.example/announce"));
        root.insert(b"info".to_vec(), Value::Dict(info));
        encode(&Value::Dict(root))
    }

    #[test]
    fn parses_single_file_layout_and_piece_sizes() {
        let bytes = single_file_torrent(16384, 40000, 3);
        let meta = TorrentMetaInfo::from_bytes(&bytes).unwrap();
        assert_eq!(meta.info.num_pieces(), 3);
        assert_eq!(meta.info.length_of_piece(0), 16384);
        assert_eq!(meta.info.length_of_piece(1), 16384);
        assert_eq!(meta.info.length_of_piece(2), 7232);
        assert_eq!(meta.info.total_length(), 40000);
    }

    #[test]
    fn info_hash_is_stable_for_the_same_bytes() {
        let bytes = single_file_torrent(16384, 40000, 3);
        let a = TorrentMetaInfo::from_bytes(&bytes).unwrap();
        let b = TorrentMetaInfo::from_bytes(&bytes).unwrap();
        assert_eq!(a.info_hash.as_bytes(), b.info_hash.as_bytes());
    }

    #[test]
    fn rejects_bad_pieces_length() {
        let mut info = BTreeMap::new();
        info.insert(b"piece length".to_vec(), Value::Integer(16384));
        info.insert(b"pieces".to_vec(), Value::String(vec![0u8; 19]));
        info.insert(b"name".to_vec(), Value::string("file.bin"));
        info.insert(b"length".to_vec(), Value::Integer(1));
        let mut root = BTreeMap::new();
        root.insert(b"announce".to_vec(), Value::string("http://t"));
        root.insert(b"info".to_vec(), Value::Dict(info));
        let err = TorrentMetaInfo::from_value(Value::Dict(root)).unwrap_err();
        assert!(matches!(err, MetaInfoError::BadPiecesLength(19)));
    }
}
