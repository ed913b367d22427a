//! File records and listing order.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Identifier of the account that owns files and quota.
pub type AccountId = i64;

/// Unique identifier for a file record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(Uuid);

impl FileId {
    /// Generate a new random file ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidName(format!("invalid file ID: {e}")))
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a file record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Visible in listings and downloadable.
    Active,
    /// In the trash: hidden, restorable, still charged to quota.
    Deleted,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "deleted" => Ok(Self::Deleted),
            other => Err(crate::Error::InvalidName(format!(
                "unknown file status '{other}'"
            ))),
        }
    }
}

/// Whether a record holds content or groups other records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Folder,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "file" => Ok(Self::File),
            "folder" => Ok(Self::Folder),
            other => Err(crate::Error::InvalidName(format!(
                "unknown file kind '{other}'"
            ))),
        }
    }
}

/// A file or folder as seen by callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub owner_account_id: AccountId,
    /// Display name (last component of `path`).
    pub name: String,
    /// Full virtual path, e.g. `/docs/report.pdf`.
    pub path: String,
    pub kind: FileKind,
    /// Physical location of the content. Folders have none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_key: Option<String>,
    pub content_hash: ContentHash,
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub status: FileStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl FileRecord {
    /// Logical directory containing this record.
    pub fn directory(&self) -> &str {
        crate::path::directory_of(&self.path)
    }

    pub fn is_folder(&self) -> bool {
        self.kind == FileKind::Folder
    }

    pub fn is_active(&self) -> bool {
        self.status == FileStatus::Active
    }
}

/// Listing sort field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    CreatedAt,
    Size,
}

/// Listing sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Sort field and direction, written as `"<key>-<order>"` (e.g. `size-desc`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(key: SortKey, order: SortOrder) -> Self {
        Self { key, order }
    }

    /// Compare two records. Ties fall back to the record id so the order is total.
    pub fn compare(&self, a: &FileRecord, b: &FileRecord) -> Ordering {
        let primary = match self.key {
            SortKey::Name => a.name.cmp(&b.name),
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::Size => a.size_bytes.cmp(&b.size_bytes),
        };
        let ordered = match self.order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        ordered.then_with(|| a.id.cmp(&b.id))
    }

    /// Sort records in place.
    pub fn sort(&self, records: &mut [FileRecord]) {
        records.sort_by(|a, b| self.compare(a, b));
    }
}

impl FromStr for SortSpec {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s.is_empty() {
            return Ok(Self::default());
        }
        let (key, order) = s.split_once('-').unwrap_or((s.as_str(), "asc"));
        let key = match key {
            "name" => SortKey::Name,
            "time" | "created" | "created_at" | "date" => SortKey::CreatedAt,
            "size" => SortKey::Size,
            other => return Err(crate::Error::InvalidSort(format!("unknown key '{other}'"))),
        };
        let order = match order {
            "asc" => SortOrder::Asc,
            "desc" => SortOrder::Desc,
            other => {
                return Err(crate::Error::InvalidSort(format!(
                    "unknown order '{other}'"
                )));
            }
        };
        Ok(Self { key, order })
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self.key {
            SortKey::Name => "name",
            SortKey::CreatedAt => "time",
            SortKey::Size => "size",
        };
        let order = match self.order {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        };
        write!(f, "{key}-{order}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn record(name: &str, size: u64, age_secs: i64) -> FileRecord {
        let created = OffsetDateTime::UNIX_EPOCH + Duration::seconds(1_000_000 - age_secs);
        FileRecord {
            id: FileId::new(),
            owner_account_id: 1,
            name: name.to_string(),
            path: crate::path::join("/", name),
            kind: FileKind::File,
            blob_key: Some(format!("users/user_1/{name}")),
            content_hash: ContentHash::compute(name.as_bytes()),
            size_bytes: size,
            mime_type: None,
            status: FileStatus::Active,
            created_at: created,
            updated_at: created,
            deleted_at: None,
        }
    }

    fn names(records: &[FileRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_sort_spec_parse() {
        assert_eq!("".parse::<SortSpec>().unwrap(), SortSpec::default());
        assert_eq!(
            "name-asc".parse::<SortSpec>().unwrap(),
            SortSpec::new(SortKey::Name, SortOrder::Asc)
        );
        assert_eq!(
            "time-desc".parse::<SortSpec>().unwrap(),
            SortSpec::new(SortKey::CreatedAt, SortOrder::Desc)
        );
        assert_eq!(
            "SIZE".parse::<SortSpec>().unwrap(),
            SortSpec::new(SortKey::Size, SortOrder::Asc)
        );
        assert!("color-asc".parse::<SortSpec>().is_err());
        assert!("name-sideways".parse::<SortSpec>().is_err());
    }

    #[test]
    fn test_sort_spec_display_roundtrips() {
        let spec = SortSpec::new(SortKey::CreatedAt, SortOrder::Desc);
        assert_eq!(spec.to_string().parse::<SortSpec>().unwrap(), spec);
    }

    #[test]
    fn test_sort_by_each_key() {
        let mut records = vec![record("b", 30, 10), record("a", 20, 30), record("c", 10, 20)];

        SortSpec::new(SortKey::Name, SortOrder::Asc).sort(&mut records);
        assert_eq!(names(&records), ["a", "b", "c"]);

        SortSpec::new(SortKey::Name, SortOrder::Desc).sort(&mut records);
        assert_eq!(names(&records), ["c", "b", "a"]);

        SortSpec::new(SortKey::Size, SortOrder::Asc).sort(&mut records);
        assert_eq!(names(&records), ["c", "a", "b"]);

        SortSpec::new(SortKey::CreatedAt, SortOrder::Asc).sort(&mut records);
        assert_eq!(names(&records), ["a", "c", "b"]);

        SortSpec::new(SortKey::CreatedAt, SortOrder::Desc).sort(&mut records);
        assert_eq!(names(&records), ["b", "c", "a"]);
    }

    #[test]
    fn test_status_and_kind_roundtrip() {
        for status in [FileStatus::Active, FileStatus::Deleted] {
            assert_eq!(FileStatus::parse(status.as_str()).unwrap(), status);
        }
        for kind in [FileKind::File, FileKind::Folder] {
            assert_eq!(FileKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(FileStatus::parse("purged").is_err());
    }

    #[test]
    fn test_record_serializes_hash_and_timestamps() {
        let r = record("a.txt", 5, 0);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["kind"], "file");
        assert!(json["created_at"].as_str().unwrap().ends_with('Z'));
    }
}
