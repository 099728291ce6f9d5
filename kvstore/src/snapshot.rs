//! On-disk snapshot of the whole store.
//!
//! Layout of a snapshot file:
//!
//! ```text
//! KVSNAP1#<crc32>#<count>#<len(key)>#<key bytes><len(value)>#<value bytes>...
//! ```
//!
//! Lengths are decimal byte counts terminated by `#`. Raw key and value bytes
//! are read by length, never scanned for the delimiter, so they may contain
//! `#`, newlines or any other byte. The pair count is informational only: the
//! reader stops at end of file. `<crc32>` covers everything after the header.
//!
//! Files written before the header existed start directly with `<count>#` and
//! are still accepted.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

pub type StringMap = HashMap<String, String>;

const DELIM: u8 = b'#';
const MAGIC: &[u8] = b"KVSNAP1";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt snapshot: {reason}")]
    Corrupt { reason: String },
    #[error("snapshot checksum mismatch: header has {expected}, contents hash to {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

fn corrupt(reason: impl Into<String>) -> SnapshotError {
    SnapshotError::Corrupt {
        reason: reason.into(),
    }
}

/// Writes `map` to `path`, replacing any previous snapshot atomically.
pub fn serialize(map: &StringMap, path: &Path) -> Result<(), SnapshotError> {
    let encoded = encode(map);
    let staging = staging_path(path);
    {
        let mut file = File::create(&staging)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
    }
    fs::rename(&staging, path)?;
    debug!(
        path = %path.display(),
        entries = map.len(),
        bytes = encoded.len(),
        "snapshot written"
    );
    Ok(())
}

/// Reads the snapshot at `path`.
///
/// A file that does not exist or cannot be opened is an empty store, not an
/// error. A file that opens but does not decode is reported.
pub fn deserialize(path: &Path) -> Result<StringMap, SnapshotError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(StringMap::new()),
        Err(err) => {
            warn!(path = %path.display(), error = ?err, "snapshot unreadable, starting empty");
            return Ok(StringMap::new());
        }
    };
    decode(&bytes)
}

pub fn encode(map: &StringMap) -> Vec<u8> {
    let mut body = Vec::new();
    push_len(&mut body, map.len());
    for (key, value) in map {
        push_field(&mut body, key.as_bytes());
        push_field(&mut body, value.as_bytes());
    }

    let checksum = crc32fast::hash(&body);
    let mut encoded = Vec::with_capacity(MAGIC.len() + 12 + body.len());
    encoded.extend_from_slice(MAGIC);
    encoded.push(DELIM);
    encoded.extend_from_slice(checksum.to_string().as_bytes());
    encoded.push(DELIM);
    encoded.extend_from_slice(&body);
    encoded
}

pub fn decode(bytes: &[u8]) -> Result<StringMap, SnapshotError> {
    let body = match bytes.strip_prefix(MAGIC) {
        Some(rest) => verified_body(rest)?,
        None => bytes,
    };

    let mut map = StringMap::new();
    let mut reader = FieldReader::new(body);
    if reader.is_exhausted() {
        return Ok(map);
    }

    let _count = reader.read_len()?;
    while !reader.is_exhausted() {
        let key = reader.read_string()?;
        let value = reader.read_string()?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Strips `#<crc32>#` from the front of `rest` and checks the remainder.
fn verified_body(rest: &[u8]) -> Result<&[u8], SnapshotError> {
    let rest = rest
        .strip_prefix(&[DELIM])
        .ok_or_else(|| corrupt("missing delimiter after header"))?;
    let mut reader = FieldReader::new(rest);
    let expected = reader.read_number::<u32>()?;
    let body = reader.remaining();
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(SnapshotError::ChecksumMismatch { expected, actual });
    }
    Ok(body)
}

fn push_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(len.to_string().as_bytes());
    out.push(DELIM);
}

fn push_field(out: &mut Vec<u8>, bytes: &[u8]) {
    push_len(out, bytes.len());
    out.extend_from_slice(bytes);
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn read_number<T: std::str::FromStr>(&mut self) -> Result<T, SnapshotError> {
        let rest = self.remaining();
        let end = rest
            .iter()
            .position(|&byte| byte == DELIM)
            .ok_or_else(|| corrupt(format!("unterminated length at byte {}", self.pos)))?;
        let digits = std::str::from_utf8(&rest[..end])
            .map_err(|_| corrupt(format!("non-ascii length at byte {}", self.pos)))?;
        let number = digits
            .parse::<T>()
            .map_err(|_| corrupt(format!("invalid length {digits:?} at byte {}", self.pos)))?;
        self.pos += end + 1;
        Ok(number)
    }

    fn read_len(&mut self) -> Result<usize, SnapshotError> {
        self.read_number::<usize>()
    }

    fn read_raw(&mut self, len: usize) -> Result<&'a [u8], SnapshotError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                corrupt(format!(
                    "field of {len} bytes at byte {} runs past end of file",
                    self.pos
                ))
            })?;
        let raw = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(raw)
    }

    fn read_string(&mut self) -> Result<String, SnapshotError> {
        let len = self.read_len()?;
        let start = self.pos;
        let raw = self.read_raw(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| corrupt(format!("field at byte {start} is not valid utf-8")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StringMap {
        StringMap::from([
            ("1 is 1".to_string(), "How are you?".to_string()),
            ("2 is 2".to_string(), "Fine, # thank you.".to_string()),
            (
                "3 is not 3".to_string(),
                "How do you do # ? What are you doing??".to_string(),
            ),
            (
                "this is a string contains many chars".to_string(),
                "\t\n####,,,,".to_string(),
            ),
        ])
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data");
        let map = sample();

        serialize(&map, &path).expect("serialize");
        let restored = deserialize(&path).expect("deserialize");

        assert_eq!(restored, map);
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn missing_file_is_empty_map() {
        let dir = tempfile::tempdir().expect("tempdir");
        let restored = deserialize(&dir.path().join("never-written")).expect("deserialize");
        assert!(restored.is_empty());
    }

    #[test]
    fn empty_strings_and_delimiters_survive() {
        let map = StringMap::from([
            (String::new(), String::new()),
            ("#".to_string(), "12#".to_string()),
            ("line\nbreak".to_string(), "\u{0}\u{7}\r\n".to_string()),
            ("unicode ✓".to_string(), "snow ☃".to_string()),
        ]);
        assert_eq!(decode(&encode(&map)).expect("decode"), map);
    }

    #[test]
    fn empty_map_roundtrips() {
        let map = StringMap::new();
        assert_eq!(decode(&encode(&map)).expect("decode"), map);
    }

    #[test]
    fn reads_headerless_snapshots() {
        let legacy = b"2#1#a3#x#y0#1#b";
        let map = decode(legacy).expect("decode legacy");
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], "x#y");
        assert_eq!(map[""], "b");
    }

    #[test]
    fn count_is_not_authoritative() {
        // Count claims one pair but the file holds two; end of file wins.
        let legacy = b"1#1#a1#x1#b1#y";
        let map = decode(legacy).expect("decode");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn detects_flipped_byte() {
        let map = StringMap::from([("key".to_string(), "value".to_string())]);
        let mut encoded = encode(&map);
        let last = encoded.len() - 1;
        encoded[last] = b'X';

        assert!(matches!(
            decode(&encoded),
            Err(SnapshotError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn truncated_field_is_corrupt() {
        assert!(matches!(
            decode(b"1#5#abc"),
            Err(SnapshotError::Corrupt { .. })
        ));
        assert!(matches!(
            decode(b"1#x#abc"),
            Err(SnapshotError::Corrupt { .. })
        ));
    }

    #[test]
    fn overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data");

        serialize(&sample(), &path).expect("first write");
        let smaller = StringMap::from([("only".to_string(), "one".to_string())]);
        serialize(&smaller, &path).expect("second write");

        assert_eq!(deserialize(&path).expect("deserialize"), smaller);
    }
}
