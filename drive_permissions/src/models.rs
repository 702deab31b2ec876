//! Data models for Google Drive API responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of the `files.list` response.
///
/// Only the fields the audit relies on are typed. The full object is kept in
/// `fields`, in response order, so the raw listing can be written out again
/// without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub mime_type: Option<String>,
    fields: Map<String, Value>,
}

impl FileRecord {
    /// Every field the API returned, typed ones included, in response order.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl TryFrom<Map<String, Value>> for FileRecord {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);

        let id = text("id").ok_or_else(|| "file entry without a string \"id\"".to_string())?;
        let name = text("name").unwrap_or_default();
        let mime_type = text("mimeType");

        Ok(Self {
            id,
            name,
            mime_type,
            fields,
        })
    }
}

impl From<FileRecord> for Map<String, Value> {
    fn from(record: FileRecord) -> Self {
        record.fields
    }
}

/// Response from the files.list API endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Sharing details for a single file, as returned by files.get.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDetail {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

/// A permission resource exactly as the API sends it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Access level carried by a grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Reader,
    Commenter,
    Writer,
    Other(String),
}

impl Role {
    pub fn parse(role: &str) -> Self {
        match role {
            "reader" => Role::Reader,
            "commenter" => Role::Commenter,
            "writer" => Role::Writer,
            other => Role::Other(other.to_string()),
        }
    }

    /// Human label used in the report. Unknown roles are shown verbatim.
    pub fn label(&self) -> &str {
        match self {
            Role::Reader => "Read",
            Role::Commenter => "Comment",
            Role::Writer => "Write",
            Role::Other(raw) => raw,
        }
    }
}

/// Permission identifiers Drive uses for link and public grants.
pub const ANYONE_WITH_LINK_ID: &str = "anyoneWithLink";
pub const ANYONE_ID: &str = "anyone";

/// Typed view of a [`Permission`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionEntry {
    User { display_name: String, email: String },
    AnyoneWithLink { role: Role },
    Public { role: Role },
    /// Groups, domains and anything else the report does not list.
    Other,
}

impl From<&Permission> for PermissionEntry {
    fn from(permission: &Permission) -> Self {
        let role = || Role::parse(permission.role.as_deref().unwrap_or_default());

        match (permission.kind.as_str(), permission.id.as_deref()) {
            ("user", _) => match &permission.email_address {
                Some(email) => PermissionEntry::User {
                    display_name: permission.display_name.clone().unwrap_or_default(),
                    email: email.clone(),
                },
                None => PermissionEntry::Other,
            },
            ("anyone", Some(ANYONE_WITH_LINK_ID)) => PermissionEntry::AnyoneWithLink { role: role() },
            ("anyone", Some(ANYONE_ID)) => PermissionEntry::Public { role: role() },
            _ => PermissionEntry::Other,
        }
    }
}

/// User information from the about API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email_address: Option<String>,
    pub display_name: Option<String>,
}

/// About response from the Drive API.
#[derive(Debug, Deserialize)]
pub struct About {
    pub user: User,
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ApiErrorReason>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorReason {
    #[serde(default)]
    pub reason: String,
}

/// Service account credentials from JSON file.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: Option<String>,
}

/// OAuth client registration, the `installed` (or `web`) section of
/// `client_secret.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub auth_uri: String,
    pub token_uri: String,
}

/// Layout of the file downloaded from the Google Cloud console.
#[derive(Debug, Deserialize)]
pub struct ClientSecretsFile {
    pub installed: Option<ClientSecrets>,
    pub web: Option<ClientSecrets>,
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_record_keeps_fields_in_response_order() {
        let json = r#"{
            "kind": "drive#file",
            "mimeType": "text/plain",
            "id": "abc123",
            "name": "test.txt",
            "resourceKey": "rk"
        }"#;

        let record: FileRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "abc123");
        assert_eq!(record.name, "test.txt");
        assert_eq!(record.mime_type.as_deref(), Some("text/plain"));

        let keys: Vec<&str> = record.fields().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["kind", "mimeType", "id", "name", "resourceKey"]);

        let back = serde_json::to_string(&record).unwrap();
        assert!(back.starts_with(r#"{"kind":"drive#file","mimeType":"text/plain","id""#));
    }

    #[test]
    fn test_file_record_requires_id() {
        let result = serde_json::from_str::<FileRecord>(r#"{"name": "orphan"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_client_secrets_web_section_without_redirects() {
        let json = r#"{"web": {
            "client_id": "id",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "javascript_origins": ["http://localhost"]
        }}"#;

        let file: ClientSecretsFile = serde_json::from_str(json).unwrap();
        let web = file.web.unwrap();
        assert_eq!(web.client_id, "id");
        assert!(web.client_secret.is_none());
        assert!(file.installed.is_none());
    }

    #[test]
    fn test_file_detail_without_permissions() {
        let json = r#"{"name": "notes", "mimeType": "text/plain"}"#;

        let detail: FileDetail = serde_json::from_str(json).unwrap();
        assert!(detail.permissions.is_empty());
        assert!(!detail.shared);
    }

    #[test]
    fn test_role_labels() {
        assert_eq!(Role::parse("reader").label(), "Read");
        assert_eq!(Role::parse("commenter").label(), "Comment");
        assert_eq!(Role::parse("writer").label(), "Write");
        assert_eq!(Role::parse("owner").label(), "owner");
    }

    #[test]
    fn test_permission_entry_kinds() {
        let user = Permission {
            kind: "user".into(),
            email_address: Some("a@b.com".into()),
            display_name: Some("A".into()),
            ..Default::default()
        };
        assert_eq!(
            PermissionEntry::from(&user),
            PermissionEntry::User {
                display_name: "A".into(),
                email: "a@b.com".into()
            }
        );

        let link = Permission {
            kind: "anyone".into(),
            id: Some("anyoneWithLink".into()),
            role: Some("reader".into()),
            ..Default::default()
        };
        assert_eq!(
            PermissionEntry::from(&link),
            PermissionEntry::AnyoneWithLink { role: Role::Reader }
        );

        let public = Permission {
            kind: "anyone".into(),
            id: Some("anyone".into()),
            role: Some("writer".into()),
            ..Default::default()
        };
        assert_eq!(
            PermissionEntry::from(&public),
            PermissionEntry::Public { role: Role::Writer }
        );

        let group = Permission {
            kind: "group".into(),
            email_address: Some("team@b.com".into()),
            ..Default::default()
        };
        assert_eq!(PermissionEntry::from(&group), PermissionEntry::Other);
    }

    #[test]
    fn test_user_permission_without_email_is_ignored() {
        let deleted = Permission {
            kind: "user".into(),
            display_name: Some("Deleted".into()),
            ..Default::default()
        };
        assert_eq!(PermissionEntry::from(&deleted), PermissionEntry::Other);
    }
}
