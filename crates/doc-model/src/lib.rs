use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Maximum number of entries kept in the recent files list.
pub const MAX_RECENT_FILES: usize = 10;

/// Size display used when the file size cannot be read.
pub const UNKNOWN_FILE_SIZE: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid entry id `{input}`")]
pub struct ParseEntryIdError {
    input: String,
}

impl FromStr for EntryId {
    type Err = ParseEntryIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ParseEntryIdError { input: s.to_owned() })
    }
}

/// Opaque, durable capability that resolves back to a readable file.
///
/// Persisted as a base64 string. A JSON byte array is accepted on read so
/// lists written by older builds still decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessToken(Vec<u8>);

impl AccessToken {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for AccessToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for AccessToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Encoded(String),
            Raw(Vec<u8>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Encoded(text) => STANDARD
                .decode(text.as_bytes())
                .map(Self)
                .map_err(serde::de::Error::custom),
            Repr::Raw(bytes) => Ok(Self(bytes)),
        }
    }
}

mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|value| value.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Everything known about a freshly opened file while its access grant is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedFile {
    pub name: String,
    pub access_token: AccessToken,
    pub file_size: String,
    pub total_pages: u32,
    pub file_identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFileEntry {
    pub id: EntryId,
    pub name: String,
    #[serde(rename = "bookmarkData")]
    pub access_token: AccessToken,
    #[serde(with = "iso8601")]
    pub date_added: DateTime<Utc>,
    pub file_size: String,
    pub last_page_number: u32,
    pub total_pages: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_identity: Option<String>,
}

impl RecentFileEntry {
    pub fn from_opened(opened: OpenedFile, date_added: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::new(),
            name: opened.name,
            access_token: opened.access_token,
            date_added,
            file_size: opened.file_size,
            last_page_number: 0,
            total_pages: opened.total_pages,
            file_identity: opened.file_identity,
        }
    }

    fn same_file(&self, other: &RecentFileEntry, key: DedupKey) -> bool {
        match (key, &self.file_identity, &other.file_identity) {
            (DedupKey::FileIdentity, Some(a), Some(b)) => a == b,
            _ => self.name == other.name,
        }
    }
}

/// How re-opening a file is matched against existing entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupKey {
    /// Same display name replaces the older entry.
    #[default]
    Name,
    /// Same canonical path replaces the older entry; falls back to the name
    /// when either entry was saved without an identity.
    FileIdentity,
}

/// Bounded list of recently opened files, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentFiles {
    entries: Vec<RecentFileEntry>,
}

impl RecentFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(mut entries: Vec<RecentFileEntry>) -> Self {
        entries.truncate(MAX_RECENT_FILES);
        Self { entries }
    }

    pub fn entries(&self) -> &[RecentFileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> Option<&RecentFileEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&RecentFileEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Prepends `entry`, dropping any entry that refers to the same file and
    /// anything past [`MAX_RECENT_FILES`]. Returns the displaced entries.
    pub fn insert_front(&mut self, entry: RecentFileEntry, key: DedupKey) -> Vec<RecentFileEntry> {
        let mut displaced = Vec::new();

        let mut index = 0;
        while index < self.entries.len() {
            if self.entries[index].same_file(&entry, key) {
                displaced.push(self.entries.remove(index));
            } else {
                index += 1;
            }
        }

        self.entries.insert(0, entry);

        if self.entries.len() > MAX_RECENT_FILES {
            displaced.extend(self.entries.drain(MAX_RECENT_FILES..));
        }

        displaced
    }

    /// Returns `false` when no entry has `id`.
    pub fn record_progress(&mut self, id: EntryId, page: u32) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) else {
            return false;
        };

        entry.last_page_number = page;
        true
    }

    pub fn remove(&mut self, id: EntryId) -> Option<RecentFileEntry> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(index))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub autosave_interval_secs: u64,
    pub dedup_key: DedupKey,
}

impl Default for Preferences {
    fn default() -> Self {
        Self { autosave_interval_secs: 5, dedup_key: DedupKey::Name }
    }
}

impl Preferences {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }
}

/// Formats a byte count with decimal units, the way file browsers show sizes.
pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1_000.0;
    const MB: f64 = 1_000_000.0;
    const GB: f64 = 1_000_000_000.0;

    match bytes {
        0 => "Zero KB".to_owned(),
        1 => "1 byte".to_owned(),
        2..=999 => format!("{bytes} bytes"),
        _ => {
            let value = bytes as f64;
            if value < MB {
                let kb = (value / KB).round();
                if kb < 1_000.0 {
                    return format!("{kb:.0} KB");
                }
                return format!("{:.1} MB", value / MB);
            }
            if value < GB {
                return format!("{:.1} MB", value / MB);
            }
            format!("{:.2} GB", value / GB)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(name: &str) -> RecentFileEntry {
        RecentFileEntry::from_opened(
            OpenedFile {
                name: name.to_owned(),
                access_token: AccessToken::new(name.as_bytes().to_vec()),
                file_size: "1 KB".to_owned(),
                total_pages: 4,
                file_identity: None,
            },
            Utc::now(),
        )
    }

    fn names(list: &RecentFiles) -> Vec<&str> {
        list.entries().iter().map(|entry| entry.name.as_str()).collect()
    }

    #[test]
    fn eleventh_insert_evicts_oldest() {
        let mut list = RecentFiles::new();
        for i in 0..10 {
            list.insert_front(entry(&format!("file{i}.pdf")), DedupKey::Name);
        }

        let displaced = list.insert_front(entry("file10.pdf"), DedupKey::Name);

        assert_eq!(list.len(), MAX_RECENT_FILES);
        assert_eq!(list.entries()[0].name, "file10.pdf");
        assert!(list.find_by_name("file0.pdf").is_none());
        assert_eq!(displaced.len(), 1);
        assert_eq!(displaced[0].name, "file0.pdf");
    }

    #[test]
    fn same_name_moves_to_front_without_duplicating() {
        let mut list = RecentFiles::new();
        list.insert_front(entry("a.pdf"), DedupKey::Name);
        list.insert_front(entry("b.pdf"), DedupKey::Name);
        list.insert_front(entry("c.pdf"), DedupKey::Name);

        let replacement = entry("a.pdf");
        let replacement_id = replacement.id;
        let displaced = list.insert_front(replacement, DedupKey::Name);

        assert_eq!(names(&list), vec!["a.pdf", "c.pdf", "b.pdf"]);
        assert_eq!(list.entries()[0].id, replacement_id);
        assert_eq!(displaced.len(), 1);
    }

    #[test]
    fn identity_dedup_keeps_distinct_files_sharing_a_name() {
        let mut first = entry("report.pdf");
        first.file_identity = Some("/docs/2024/report.pdf".to_owned());
        let mut second = entry("report.pdf");
        second.file_identity = Some("/docs/2025/report.pdf".to_owned());

        let mut list = RecentFiles::new();
        list.insert_front(first, DedupKey::FileIdentity);
        list.insert_front(second, DedupKey::FileIdentity);
        assert_eq!(list.len(), 2);

        let mut again = entry("report.pdf");
        again.file_identity = Some("/docs/2024/report.pdf".to_owned());
        list.insert_front(again, DedupKey::FileIdentity);

        assert_eq!(list.len(), 2);
        assert_eq!(list.entries()[0].file_identity.as_deref(), Some("/docs/2024/report.pdf"));
    }

    #[test]
    fn identity_dedup_falls_back_to_name_without_identity() {
        let mut list = RecentFiles::new();
        list.insert_front(entry("notes.pdf"), DedupKey::FileIdentity);

        let mut with_identity = entry("notes.pdf");
        with_identity.file_identity = Some("/tmp/notes.pdf".to_owned());
        list.insert_front(with_identity, DedupKey::FileIdentity);

        assert_eq!(list.len(), 1);
    }

    #[test]
    fn record_progress_on_unknown_id_is_noop() {
        let mut list = RecentFiles::new();
        list.insert_front(entry("a.pdf"), DedupKey::Name);
        let before = list.clone();

        assert!(!list.record_progress(EntryId::new(), 7));
        assert_eq!(list, before);
    }

    #[test]
    fn record_progress_updates_page() {
        let mut list = RecentFiles::new();
        let first = entry("a.pdf");
        let id = first.id;
        list.insert_front(first, DedupKey::Name);

        assert!(list.record_progress(id, 3));
        assert_eq!(list.get(id).map(|entry| entry.last_page_number), Some(3));
    }

    #[test]
    fn remove_drops_entry() {
        let mut list = RecentFiles::new();
        let first = entry("a.pdf");
        let id = first.id;
        list.insert_front(first, DedupKey::Name);
        list.insert_front(entry("b.pdf"), DedupKey::Name);

        assert_eq!(list.remove(id).map(|entry| entry.name), Some("a.pdf".to_owned()));
        assert_eq!(names(&list), vec!["b.pdf"]);
        assert!(list.remove(id).is_none());
    }

    #[test]
    fn json_uses_persisted_field_names() {
        let mut item = entry("report.pdf");
        item.date_added = Utc.with_ymd_and_hms(2025, 8, 7, 10, 30, 0).unwrap();
        item.access_token = AccessToken::new(vec![1, 2, 3]);

        let value = serde_json::to_value(&item).expect("entry should serialize");

        assert_eq!(value["name"], "report.pdf");
        assert_eq!(value["bookmarkData"], "AQID");
        assert_eq!(value["dateAdded"], "2025-08-07T10:30:00Z");
        assert_eq!(value["fileSize"], "1 KB");
        assert_eq!(value["lastPageNumber"], 0);
        assert_eq!(value["totalPages"], 4);
        assert!(value.get("fileIdentity").is_none());
    }

    #[test]
    fn token_accepts_raw_byte_array() {
        let json = r#"{
            "id": "0F1E2D3C-4B5A-6978-8796-A5B4C3D2E1F0",
            "name": "old.pdf",
            "bookmarkData": [104, 105],
            "dateAdded": "2025-08-07T10:30:00Z",
            "fileSize": "2 KB",
            "lastPageNumber": 1,
            "totalPages": 9
        }"#;

        let decoded: RecentFileEntry = serde_json::from_str(json).expect("entry should decode");

        assert_eq!(decoded.access_token.as_bytes(), b"hi");
        assert_eq!(decoded.last_page_number, 1);
        assert_eq!(decoded.file_identity, None);
    }

    #[test]
    fn dates_are_written_with_second_precision() {
        let mut item = entry("a.pdf");
        item.date_added = Utc.timestamp_opt(1_754_562_600, 987_654_321).unwrap();

        let json = serde_json::to_string(&item).expect("entry should serialize");
        let decoded: RecentFileEntry = serde_json::from_str(&json).expect("entry should decode");

        assert_eq!(decoded.date_added.timestamp(), 1_754_562_600);
        assert_eq!(decoded.date_added.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn entry_id_parses_from_display() {
        let id = EntryId::new();
        let parsed: EntryId = id.to_string().parse().expect("id should parse");
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<EntryId>().is_err());
    }

    #[test]
    fn file_sizes_use_decimal_units() {
        assert_eq!(format_file_size(0), "Zero KB");
        assert_eq!(format_file_size(1), "1 byte");
        assert_eq!(format_file_size(999), "999 bytes");
        assert_eq!(format_file_size(1_000), "1 KB");
        assert_eq!(format_file_size(48_213), "48 KB");
        assert_eq!(format_file_size(2_345_678), "2.3 MB");
        assert_eq!(format_file_size(3_210_000_000), "3.21 GB");
    }

    #[test]
    fn preferences_fill_missing_fields_with_defaults() {
        let prefs: Preferences =
            serde_json::from_str(r#"{"dedup_key":"file_identity"}"#).expect("prefs should decode");

        assert_eq!(prefs.autosave_interval_secs, 5);
        assert_eq!(prefs.dedup_key, DedupKey::FileIdentity);
        assert_eq!(Preferences { autosave_interval_secs: 0, ..prefs }.autosave_interval(), Duration::from_secs(1));
    }
}
