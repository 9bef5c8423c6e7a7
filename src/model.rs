//! Catalog entities and the user-data records kept in sync with the server.

use serde::{Deserialize, Serialize};

/// Kind of liked content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Artist,
    Album,
    Track,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [ContentType::Album, ContentType::Artist, ContentType::Track];
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Artist => write!(f, "artist"),
            ContentType::Album => write!(f, "album"),
            ContentType::Track => write!(f, "track"),
        }
    }
}

/// Whether a local record has round-tripped through the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    PendingSync,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikedContent {
    pub content_id: String,
    pub content_type: ContentType,
    pub liked: bool,
    /// Server timestamp (seconds) of the change that produced this record.
    pub modified_at: i64,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    AccessCatalog,
    LikeContent,
    OwnPlaylists,
    EditCatalog,
    ManagePermissions,
    ServerAdmin,
    ViewAnalytics,
    RequestContent,
    DownloadManagerAdmin,
    /// A permission this client does not know about. Never stored.
    #[serde(other)]
    Unknown,
}

impl Permission {
    /// `permissions` without the ones this client cannot interpret.
    pub fn known(permissions: &[Permission]) -> Vec<Permission> {
        permissions
            .iter()
            .copied()
            .filter(|p| *p != Permission::Unknown)
            .collect()
    }
}

/// A single typed user setting as carried by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "key", content = "value", try_from = "RawSetting")]
pub enum UserSetting {
    #[serde(rename = "enable_external_search")]
    ExternalSearchEnabled(bool),
    #[serde(rename = "notify_whatsnew")]
    NotifyWhatsNew(bool),
    /// A setting key this client does not know; carries the key.
    #[serde(skip_serializing)]
    Unknown(String),
}

#[derive(Deserialize)]
struct RawSetting {
    key: String,
    #[serde(default)]
    value: serde_json::Value,
}

impl TryFrom<RawSetting> for UserSetting {
    type Error = serde_json::Error;

    fn try_from(raw: RawSetting) -> Result<Self, Self::Error> {
        Ok(match raw.key.as_str() {
            "enable_external_search" => UserSetting::ExternalSearchEnabled(serde_json::from_value(raw.value)?),
            "notify_whatsnew" => UserSetting::NotifyWhatsNew(serde_json::from_value(raw.value)?),
            _ => UserSetting::Unknown(raw.key),
        })
    }
}

/// Local view of all settings; each [`UserSetting`] maps to one field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub external_search_enabled: bool,
    pub notify_whatsnew: bool,
}

impl UserSettings {
    pub fn apply(&mut self, setting: &UserSetting) {
        match setting {
            UserSetting::ExternalSearchEnabled(enabled) => self.external_search_enabled = *enabled,
            UserSetting::NotifyWhatsNew(enabled) => self.notify_whatsnew = *enabled,
            UserSetting::Unknown(key) => tracing::debug!("Ignoring unknown setting {}", key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub track_ids: Vec<String>,
    pub sync_status: SyncStatus,
}

impl Playlist {
    pub fn from_server(id: impl Into<String>, name: impl Into<String>, track_ids: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            track_ids,
            sync_status: SyncStatus::Synced,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.sync_status == SyncStatus::PendingSync
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    DownloadCompleted,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub notification_type: NotificationType,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub read_at: Option<i64>,
    /// Seconds since the epoch.
    pub created_at: i64,
}

impl Notification {
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }

    /// Decode the payload of a `download_completed` notification.
    pub fn download_completed_data(&self) -> serde_json::Result<DownloadCompletedData> {
        serde_json::from_value(self.data.clone())
    }
}

/// Payload carried by `download_completed` notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadCompletedData {
    pub album_id: String,
    pub album_name: String,
    pub artist_name: String,
    #[serde(default)]
    pub image_id: Option<String>,
    pub request_id: String,
}

// ── Catalog ──────────────────────────────────────────────────────────

/// Catalog item kinds the fetch scheduler can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Artist,
    Album,
    Track,
    Discography,
}

impl ItemType {
    /// Artists, albums and tracks go through the batch endpoint;
    /// discographies are paginated per artist.
    pub fn is_batchable(self) -> bool {
        !matches!(self, ItemType::Discography)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Artist => "artist",
            ItemType::Album => "album",
            ItemType::Track => "track",
            ItemType::Discography => "discography",
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "artist" => Ok(ItemType::Artist),
            "album" => Ok(ItemType::Album),
            "track" => Ok(ItemType::Track),
            "discography" => Ok(ItemType::Discography),
            _ => Err(anyhow::anyhow!("Unknown item type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub image_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artist_ids: Vec<String>,
    #[serde(default)]
    pub track_ids: Vec<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub image_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub album_id: String,
    #[serde(default)]
    pub artist_ids: Vec<String>,
    #[serde(default)]
    pub duration_secs: u32,
}

/// Artist → album edges of the catalog graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discography {
    pub artist_id: String,
    pub album_ids: Vec<String>,
}

/// Anything the content cache can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CatalogEntity {
    Artist(Artist),
    Album(Album),
    Track(Track),
    Discography(Discography),
}

impl CatalogEntity {
    pub fn item_type(&self) -> ItemType {
        match self {
            CatalogEntity::Artist(_) => ItemType::Artist,
            CatalogEntity::Album(_) => ItemType::Album,
            CatalogEntity::Track(_) => ItemType::Track,
            CatalogEntity::Discography(_) => ItemType::Discography,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            CatalogEntity::Artist(a) => &a.id,
            CatalogEntity::Album(a) => &a.id,
            CatalogEntity::Track(t) => &t.id,
            CatalogEntity::Discography(d) => &d.artist_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_setting_wire_format() {
        let json = serde_json::to_string(&UserSetting::NotifyWhatsNew(true)).unwrap();
        assert_eq!(json, r#"{"key":"notify_whatsnew","value":true}"#);

        let parsed: UserSetting =
            serde_json::from_str(r#"{"key":"enable_external_search","value":false}"#).unwrap();
        assert_eq!(parsed, UserSetting::ExternalSearchEnabled(false));
    }

    #[test]
    fn test_unknown_setting_and_permission_decode() {
        let parsed: Vec<UserSetting> = serde_json::from_str(
            r#"[{"key":"theme","value":{"dark":true}},{"key":"notify_whatsnew","value":true}]"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            vec![UserSetting::Unknown("theme".to_string()), UserSetting::NotifyWhatsNew(true)]
        );

        let mut settings = UserSettings::default();
        settings.apply(&parsed[0]);
        assert_eq!(settings, UserSettings::default());

        // Known key with the wrong value type is still an error.
        assert!(serde_json::from_str::<UserSetting>(r#"{"key":"notify_whatsnew","value":"yes"}"#).is_err());

        let permissions: Vec<Permission> =
            serde_json::from_str(r#"["AccessCatalog","ManageRadio","LikeContent"]"#).unwrap();
        assert_eq!(permissions[1], Permission::Unknown);
        assert_eq!(
            Permission::known(&permissions),
            vec![Permission::AccessCatalog, Permission::LikeContent]
        );
    }

    #[test]
    fn test_settings_apply_maps_to_fields() {
        let mut settings = UserSettings::default();
        settings.apply(&UserSetting::NotifyWhatsNew(true));
        assert!(settings.notify_whatsnew);
        assert!(!settings.external_search_enabled);

        settings.apply(&UserSetting::ExternalSearchEnabled(true));
        settings.apply(&UserSetting::NotifyWhatsNew(false));
        assert!(settings.external_search_enabled);
        assert!(!settings.notify_whatsnew);
    }

    #[test]
    fn test_unknown_notification_type_decodes_as_other() {
        let json = r#"{"id":"n1","notification_type":"new_release","title":"t","created_at":1}"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.notification_type, NotificationType::Other);
        assert!(n.is_unread());
        assert!(n.data.is_null());
    }

    #[test]
    fn test_download_completed_data_decoding() {
        let n = Notification {
            id: "n1".to_string(),
            notification_type: NotificationType::DownloadCompleted,
            title: "Album ready".to_string(),
            body: None,
            data: serde_json::json!({
                "album_id": "al1",
                "album_name": "Blue",
                "artist_name": "Joni",
                "request_id": "r1"
            }),
            read_at: None,
            created_at: 0,
        };
        let data = n.download_completed_data().unwrap();
        assert_eq!(data.album_id, "al1");
        assert!(data.image_id.is_none());

        let broken = Notification {
            data: serde_json::json!({"album_id": 3}),
            ..n
        };
        assert!(broken.download_completed_data().is_err());
    }

    #[test]
    fn test_item_type_parse() {
        assert_eq!("discography".parse::<ItemType>().unwrap(), ItemType::Discography);
        assert!("playlist".parse::<ItemType>().is_err());
        assert!(ItemType::Track.is_batchable());
        assert!(!ItemType::Discography.is_batchable());
    }

    #[test]
    fn test_entity_identity() {
        let d = CatalogEntity::Discography(Discography {
            artist_id: "ar1".to_string(),
            album_ids: vec![],
        });
        assert_eq!(d.item_type(), ItemType::Discography);
        assert_eq!(d.id(), "ar1");
    }
}
