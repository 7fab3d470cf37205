use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::security::scrub_signed_url;

/// One ordered, immutable chunk of bytes received from the producer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet(Bytes);

impl Packet {
    /// Copy a borrowed read buffer into an owned packet.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(data))
    }

    /// The end-of-stream marker.
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Packet {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<Bytes> for Packet {
    fn from(data: Bytes) -> Self {
        Self(data)
    }
}

/// Where an upload destination lives. Serialized as its integer code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StorageLocation {
    #[default]
    FileSystem,
    ResumableSession,
    Multipart,
}

impl TryFrom<u8> for StorageLocation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StorageLocation::FileSystem),
            1 => Ok(StorageLocation::ResumableSession),
            2 => Ok(StorageLocation::Multipart),
            other => Err(format!("unknown storage location {}", other)),
        }
    }
}

impl From<StorageLocation> for u8 {
    fn from(loc: StorageLocation) -> Self {
        match loc {
            StorageLocation::FileSystem => 0,
            StorageLocation::ResumableSession => 1,
            StorageLocation::Multipart => 2,
        }
    }
}

/// Signed descriptor of where uploaded bytes go.
///
/// Backends may update `url` and `session` as the upload progresses (a
/// negotiated session URI, the endpoint of the next part).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDestination {
    pub url: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub loc: StorageLocation,
}

impl UploadDestination {
    /// Destination for a file on local disk.
    pub fn local(path: &str) -> Self {
        Self {
            url: path.to_string(),
            loc: StorageLocation::FileSystem,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl fmt::Display for UploadDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{url: {}, bucket: {}, session: {}, loc: {}}}",
            scrub_signed_url(&self.url),
            self.bucket,
            scrub_signed_url(&self.session),
            u8::from(self.loc)
        )
    }
}

/// Progress callback: `(download_total, download_now, upload_total, upload_now)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64, u64, u64) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_from_json() {
        let dest = UploadDestination::from_json(
            r#"{"url": "https://storage.example.com/upload", "bucket": "vods", "session": "abc", "loc": 2}"#,
        )
        .unwrap();
        assert_eq!(dest.url, "https://storage.example.com/upload");
        assert_eq!(dest.bucket, "vods");
        assert_eq!(dest.session, "abc");
        assert_eq!(dest.loc, StorageLocation::Multipart);
    }

    #[test]
    fn test_destination_defaults_to_filesystem() {
        let dest = UploadDestination::from_json(r#"{"url": "/tmp/out.ts"}"#).unwrap();
        assert_eq!(dest.loc, StorageLocation::FileSystem);
        assert!(dest.session.is_empty());
    }

    #[test]
    fn test_destination_rejects_unknown_location() {
        assert!(UploadDestination::from_json(r#"{"url": "x", "loc": 7}"#).is_err());
    }

    #[test]
    fn test_location_serializes_as_integer() {
        let dest = UploadDestination {
            url: "u".into(),
            loc: StorageLocation::ResumableSession,
            ..Default::default()
        };
        let json = serde_json::to_value(&dest).unwrap();
        assert_eq!(json["loc"], 1);
    }

    #[test]
    fn test_destination_display_hides_signature() {
        let dest = UploadDestination {
            url: "https://bucket.s3.amazonaws.com/key?partNumber=2&X-Amz-Signature=deadbeef".into(),
            loc: StorageLocation::Multipart,
            ..Default::default()
        };
        let shown = dest.to_string();
        assert!(!shown.contains("deadbeef"));
        assert!(shown.contains("partNumber=2"));
        assert!(shown.contains("loc: 2"));
    }

    #[test]
    fn test_packet_copy_is_owned() {
        let mut source = vec![1u8, 2, 3];
        let packet = Packet::copy_from_slice(&source);
        source[0] = 9;
        assert_eq!(packet.as_bytes(), &[1, 2, 3]);
        assert_eq!(packet.len(), 3);
        assert!(Packet::empty().is_empty());
    }
}
