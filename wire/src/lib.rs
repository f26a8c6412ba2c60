use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bincode::Options;
use serde::{Deserialize, Serialize};

const BATCH_V1_MAGIC: &[u8; 4] = b"OTA1";

/// Upper bound for one forwarded line, terminator included.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("missing argument batch magic")]
    Magic,
    #[error("argument list truncated after {decoded} entries")]
    Truncated { decoded: usize },
}

/// Command-line arguments of one launch, program name first.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ArgumentBatch(Vec<String>);

// Fixed-width integers: u64 element count, then u64 length + bytes per entry.
fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

impl ArgumentBatch {
    pub fn new(args: Vec<String>) -> Self {
        Self(args)
    }

    /// Arguments of the current process. Non UTF-8 arguments are converted lossily.
    pub fn from_env() -> Self {
        Self(
            std::env::args_os()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
        )
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Encode as a single base64 text line, `\n` terminated.
    pub fn to_line(&self) -> String {
        let body = wire_options()
            .serialize(&self.0)
            .expect("serialize argument batch");
        let mut raw = Vec::with_capacity(BATCH_V1_MAGIC.len() + body.len());
        raw.extend_from_slice(BATCH_V1_MAGIC);
        raw.extend_from_slice(&body);

        let mut line = STANDARD.encode(raw);
        line.push('\n');
        line
    }

    /// Strict inverse of [`ArgumentBatch::to_line`].
    pub fn try_from_line(line: &str) -> Result<Self, DecodeError> {
        let payload = decode_payload(line)?;
        match decode_entries(&payload) {
            (entries, None) => Ok(Self(entries)),
            (_, Some(e)) => Err(e),
        }
    }

    /// Tolerant decode: a bad line gives an empty batch, a corrupted entry list
    /// gives the entries decoded before the corruption.
    pub fn from_line_lossy(line: &str) -> Self {
        let payload = match decode_payload(line) {
            Ok(p) => p,
            Err(_) => return Self::default(),
        };
        let (entries, _) = decode_entries(&payload);
        Self(entries)
    }

    /// Like [`ArgumentBatch::from_line_lossy`] but also reports what went wrong.
    pub fn decode_lossy(line: &str) -> (Self, Option<DecodeError>) {
        let payload = match decode_payload(line) {
            Ok(p) => p,
            Err(e) => return (Self::default(), Some(e)),
        };
        let (entries, err) = decode_entries(&payload);
        (Self(entries), err)
    }
}

impl From<Vec<String>> for ArgumentBatch {
    fn from(args: Vec<String>) -> Self {
        Self(args)
    }
}

impl<'a> IntoIterator for &'a ArgumentBatch {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn decode_payload(line: &str) -> Result<Vec<u8>, DecodeError> {
    let raw = STANDARD.decode(line.trim())?;
    match raw.strip_prefix(BATCH_V1_MAGIC.as_slice()) {
        Some(body) => Ok(body.to_vec()),
        None => Err(DecodeError::Magic),
    }
}

fn decode_entries(payload: &[u8]) -> (Vec<String>, Option<DecodeError>) {
    // The limit keeps a corrupted length prefix from allocating past the payload.
    let limit = payload.len() as u64;
    let mut cursor = Cursor::new(payload);

    let count: u64 = match wire_options().with_limit(limit).deserialize_from(&mut cursor) {
        Ok(n) => n,
        Err(_) => return (Vec::new(), Some(DecodeError::Truncated { decoded: 0 })),
    };

    let mut entries = Vec::new();
    for _ in 0..count {
        match wire_options()
            .with_limit(limit)
            .deserialize_from::<_, String>(&mut cursor)
        {
            Ok(s) => entries.push(s),
            Err(_) => {
                let decoded = entries.len();
                return (entries, Some(DecodeError::Truncated { decoded }));
            }
        }
    }
    (entries, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(args: &[&str]) -> ArgumentBatch {
        ArgumentBatch::new(args.iter().map(|s| s.to_string()).collect())
    }

    fn reencode(raw: &[u8]) -> String {
        let mut line = STANDARD.encode(raw);
        line.push('\n');
        line
    }

    #[test]
    fn line_roundtrip_preserves_order_and_content() {
        let b = batch(&[
            "/usr/bin/otter",
            "--privatesession",
            "https://example.org/?q=a b",
            "",
            "zażółć \n gęślą",
        ]);
        let line = b.to_line();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1, "must be a single line: {line:?}");

        assert_eq!(ArgumentBatch::try_from_line(&line).unwrap(), b);
        assert_eq!(ArgumentBatch::from_line_lossy(&line), b);
    }

    #[test]
    fn empty_batch_roundtrips() {
        let line = ArgumentBatch::default().to_line();
        let b = ArgumentBatch::try_from_line(&line).unwrap();
        assert!(b.is_empty());
    }

    #[test]
    fn line_without_terminator_still_decodes() {
        let b = batch(&["otter", "https://example.org"]);
        let line = b.to_line();
        assert_eq!(ArgumentBatch::try_from_line(line.trim_end()).unwrap(), b);
    }

    #[test]
    fn garbage_decodes_to_empty_batch() {
        assert!(ArgumentBatch::from_line_lossy("not base64 at all!!\n").is_empty());
        assert!(matches!(
            ArgumentBatch::try_from_line("%%%"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn missing_magic_is_rejected() {
        let body = bincode::serialize(&vec!["otter".to_string()]).unwrap();
        let line = reencode(&body);
        assert!(matches!(
            ArgumentBatch::try_from_line(&line),
            Err(DecodeError::Magic)
        ));
        assert!(ArgumentBatch::from_line_lossy(&line).is_empty());
    }

    #[test]
    fn truncated_list_keeps_decoded_prefix() {
        let line = batch(&["a", "bb", "ccc"]).to_line();
        let mut raw = STANDARD.decode(line.trim()).unwrap();
        raw.truncate(raw.len() - 2);
        let line = reencode(&raw);

        assert_eq!(ArgumentBatch::from_line_lossy(&line), batch(&["a", "bb"]));
        assert!(matches!(
            ArgumentBatch::try_from_line(&line),
            Err(DecodeError::Truncated { decoded: 2 })
        ));
    }

    #[test]
    fn huge_length_prefix_does_not_allocate() {
        let mut raw = BATCH_V1_MAGIC.to_vec();
        raw.extend_from_slice(&1u64.to_le_bytes());
        raw.extend_from_slice(&u64::MAX.to_le_bytes());
        raw.extend_from_slice(b"abc");
        let (b, err) = ArgumentBatch::decode_lossy(&reencode(&raw));
        assert!(b.is_empty());
        assert!(matches!(err, Some(DecodeError::Truncated { decoded: 0 })));
    }
}
