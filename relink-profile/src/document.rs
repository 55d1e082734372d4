//! In-memory model of a recorded profile document. The wire format is
//! YAML, beginning with a `---` document marker; field spellings follow
//! the profile producer.

use std::fs;
use std::path::Path;

use relink_binary::{HashFunction, ProfileFlags};
use serde::{Deserialize, Serialize};

use crate::{ProfileError, Result};

/// Profile schema version this reader understands.
pub const SUPPORTED_VERSION: u32 = 1;

/// Probe whether a file looks like a YAML profile document.
pub fn is_yaml(path: impl AsRef<Path>) -> Result<bool> {
    let data = fs::read(path)?;
    Ok(data.starts_with(b"---\n"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileHeader {
    #[serde(rename = "profile-version")]
    pub version: u32,

    #[serde(rename = "binary-name", default)]
    pub binary_name: String,

    #[serde(rename = "binary-build-id", default)]
    pub build_id: String,

    /// Bitset over [`ProfileFlags`].
    #[serde(rename = "profile-flags", default)]
    pub flags: u8,

    #[serde(rename = "profile-origin", default)]
    pub origin: String,

    /// Comma-separated event names; multi-event profiles are rejected.
    #[serde(rename = "profile-events", default)]
    pub event_names: String,

    /// Whether block indices refer to DFS pre-order rather than layout
    /// order.
    #[serde(rename = "dfs-order", default)]
    pub is_dfs_order: bool,

    #[serde(rename = "hash-func", default)]
    pub hash_function: HashFunction,
}

impl ProfileHeader {
    pub fn profile_flags(&self) -> ProfileFlags {
        ProfileFlags::from_bits_truncate(self.flags)
    }

    /// Sample-based profile without branch data.
    pub fn is_sample(&self) -> bool {
        self.profile_flags().contains(ProfileFlags::SAMPLE)
    }
}

/// Profile record of a single function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionProfile {
    pub name: String,

    /// Stable identifier, used as a dense key into the reader's result map.
    #[serde(rename = "fid")]
    pub id: u32,

    #[serde(with = "hex64", default)]
    pub hash: u64,

    #[serde(rename = "exec", default)]
    pub exec_count: u64,

    #[serde(rename = "nblocks", default)]
    pub num_basic_blocks: u32,

    #[serde(default)]
    pub blocks: Vec<BlockProfile>,
}

/// Profile record of a single basic block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockProfile {
    /// Position in the producer's block ordering.
    #[serde(rename = "bid")]
    pub index: u32,

    #[serde(rename = "insns", default)]
    pub num_instructions: u32,

    #[serde(with = "hex64", default)]
    pub hash: u64,

    #[serde(rename = "exec", default)]
    pub exec_count: u64,

    /// Sample-mode event count.
    #[serde(rename = "events", default)]
    pub event_count: u64,

    #[serde(rename = "calls", default)]
    pub call_sites: Vec<CallSiteProfile>,

    #[serde(rename = "succ", default)]
    pub successors: Vec<SuccessorProfile>,
}

/// One recorded call site inside a block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallSiteProfile {
    /// Byte offset from the block start.
    #[serde(rename = "off", default)]
    pub offset: u32,

    /// Callee's profile id, or 0 when the callee was not profiled.
    #[serde(rename = "fid", default)]
    pub dest_id: u32,

    /// Entry discriminator for multi-entry callees.
    #[serde(rename = "disc", default)]
    pub entry_discriminator: u32,

    #[serde(rename = "cnt", default)]
    pub count: u64,

    #[serde(rename = "mis", default)]
    pub mispreds: u64,
}

/// One recorded successor edge of a block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessorProfile {
    /// Target block's position in the producer's ordering.
    #[serde(rename = "bid")]
    pub index: u32,

    #[serde(rename = "cnt", default)]
    pub count: u64,

    #[serde(rename = "mis", default)]
    pub mispreds: u64,
}

/// A loaded profile document, read-only after load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub header: ProfileHeader,
    #[serde(default)]
    pub functions: Vec<FunctionProfile>,
}

impl ProfileDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Schema checks beyond syntax: supported version and a single event.
    pub fn validate(&self) -> Result<()> {
        if self.header.version != SUPPORTED_VERSION {
            return Err(ProfileError::UnsupportedVersion(self.header.version));
        }
        if self.header.event_names.contains(',') {
            return Err(ProfileError::MultipleEvents(
                self.header.event_names.clone(),
            ));
        }
        Ok(())
    }
}

/// 64-bit hashes appear in documents both as integers and as `0x…`
/// strings; emit the hex form.
mod hex64 {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    struct Hex64Visitor;

    impl Visitor<'_> for Hex64Visitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "an unsigned integer or a hex string")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value).map_err(de::Error::custom)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
            let digits = value
                .strip_prefix("0x")
                .or_else(|| value.strip_prefix("0X"))
                .unwrap_or(value);
            u64::from_str_radix(digits, 16).map_err(de::Error::custom)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        deserializer.deserialize_any(Hex64Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"---
header:
  profile-version: 1
  binary-name: 'app'
  profile-flags: 1
  profile-events: ''
  dfs-order: false
  hash-func: xxh3
functions:
  - name: 'frob(*2)'
    fid: 1
    hash: '0x1234ABCD'
    exec: 42
    nblocks: 3
    blocks:
      - bid: 0
        insns: 2
        exec: 100
        succ:
          - { bid: 1, cnt: 70, mis: 2 }
          - { bid: 2, cnt: 30 }
      - bid: 1
        exec: 70
        calls:
          - { off: 8, fid: 2, cnt: 7, mis: 1 }
"#;

    #[test]
    fn test_parse_simple_document() {
        let doc = ProfileDocument::parse(SIMPLE).unwrap();
        assert_eq!(doc.header.version, 1);
        assert_eq!(doc.header.hash_function, HashFunction::Xxh3);
        assert!(doc.header.profile_flags().contains(ProfileFlags::LBR));
        assert!(!doc.header.is_sample());

        let func = &doc.functions[0];
        assert_eq!(func.name, "frob(*2)");
        assert_eq!(func.id, 1);
        assert_eq!(func.hash, 0x1234_abcd);
        assert_eq!(func.num_basic_blocks, 3);

        let block = &func.blocks[0];
        assert_eq!(block.exec_count, 100);
        assert_eq!(block.successors.len(), 2);
        assert_eq!(block.successors[0].count, 70);
        assert_eq!(block.successors[0].mispreds, 2);
        assert_eq!(block.successors[1].mispreds, 0);

        let call = &func.blocks[1].call_sites[0];
        assert_eq!(call.offset, 8);
        assert_eq!(call.dest_id, 2);
        assert_eq!(call.entry_discriminator, 0);
        assert_eq!(call.count, 7);
    }

    #[test]
    fn test_hash_accepts_integers() {
        let doc = ProfileDocument::parse(
            "---\nheader:\n  profile-version: 1\nfunctions:\n  - name: f\n    fid: 1\n    hash: 99\n",
        )
        .unwrap();
        assert_eq!(doc.functions[0].hash, 99);
    }

    #[test]
    fn test_round_trip_through_serialization() {
        let doc = ProfileDocument::parse(SIMPLE).unwrap();
        let text = serde_yaml::to_string(&doc).unwrap();
        let again = ProfileDocument::parse(&text).unwrap();
        assert_eq!(again.functions[0].hash, doc.functions[0].hash);
        assert_eq!(again.functions[0].blocks.len(), doc.functions[0].blocks.len());
    }

    #[test]
    fn test_validate_rejects_bad_version() {
        let doc = ProfileDocument::parse("---\nheader:\n  profile-version: 2\n").unwrap();
        assert!(matches!(
            doc.validate(),
            Err(ProfileError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_validate_rejects_multiple_events() {
        let doc = ProfileDocument::parse(
            "---\nheader:\n  profile-version: 1\n  profile-events: 'cycles,branches'\n",
        )
        .unwrap();
        assert!(matches!(doc.validate(), Err(ProfileError::MultipleEvents(_))));
    }
}
