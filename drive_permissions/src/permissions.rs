//! Reduces a file's permission list to the one-line summary used in the report.

use std::fmt;

use serde::Serialize;

use crate::models::{FileDetail, PermissionEntry};

/// Substring of the mime type that marks a folder.
pub const FOLDER_MARKER: &str = ".folder";

/// Separator between entries of the `SharedUsers` column.
const SEPARATOR: &str = ",";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemType {
    File,
    Folder,
}

impl ItemType {
    pub fn from_mime_type(mime_type: &str) -> Self {
        if mime_type.contains(FOLDER_MARKER) {
            ItemType::Folder
        } else {
            ItemType::File
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::File => write!(f, "File"),
            ItemType::Folder => write!(f, "Folder"),
        }
    }
}

/// One row of `FilePermissions.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    #[serde(rename = "FileType")]
    pub item_type: ItemType,
    #[serde(rename = "FileName")]
    pub file_name: String,
    #[serde(rename = "SharedUsers")]
    pub shared_users: String,
}

/// Format a single grant, or `None` if it does not belong in the summary.
///
/// Grants to `current_email` are the account's own access and are skipped.
pub fn format_grant(entry: &PermissionEntry, current_email: &str) -> Option<String> {
    match entry {
        PermissionEntry::User {
            display_name,
            email,
        } if email != current_email => Some(format!("{} ({})", display_name, email)),
        PermissionEntry::AnyoneWithLink { role } => {
            Some(format!("Shareable Link ({})", role.label()))
        }
        PermissionEntry::Public { role } => Some(format!("Public Link ({})", role.label())),
        _ => None,
    }
}

/// Build the report row for one file.
pub fn summarize(detail: &FileDetail, current_email: &str) -> FileSummary {
    let shared_users = detail
        .permissions
        .iter()
        .map(PermissionEntry::from)
        .filter_map(|entry| format_grant(&entry, current_email))
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    FileSummary {
        item_type: ItemType::from_mime_type(&detail.mime_type),
        file_name: detail.name.clone(),
        shared_users,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Permission, Role};

    fn permission(kind: &str, id: &str, role: &str, email: &str, name: &str) -> Permission {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Permission {
            kind: kind.to_string(),
            id: opt(id),
            role: opt(role),
            email_address: opt(email),
            display_name: opt(name),
        }
    }

    fn detail(mime_type: &str, permissions: Vec<Permission>) -> FileDetail {
        FileDetail {
            name: "Budget".to_string(),
            shared: !permissions.is_empty(),
            mime_type: mime_type.to_string(),
            permissions,
        }
    }

    #[test]
    fn test_item_type_from_mime_type() {
        assert_eq!(
            ItemType::from_mime_type("application/vnd.google-apps.folder"),
            ItemType::Folder
        );
        assert_eq!(
            ItemType::from_mime_type("application/vnd.google-apps.spreadsheet"),
            ItemType::File
        );
        assert_eq!(ItemType::from_mime_type(""), ItemType::File);
    }

    #[test]
    fn test_own_grant_is_excluded() {
        let entry = PermissionEntry::User {
            display_name: "Me".into(),
            email: "me@x.com".into(),
        };
        assert_eq!(format_grant(&entry, "me@x.com"), None);
    }

    #[test]
    fn test_link_grants() {
        let link = PermissionEntry::AnyoneWithLink { role: Role::Reader };
        assert_eq!(
            format_grant(&link, "me@x.com").as_deref(),
            Some("Shareable Link (Read)")
        );

        let public = PermissionEntry::Public { role: Role::Commenter };
        assert_eq!(
            format_grant(&public, "me@x.com").as_deref(),
            Some("Public Link (Comment)")
        );

        let odd = PermissionEntry::Public {
            role: Role::Other("fileOrganizer".into()),
        };
        assert_eq!(
            format_grant(&odd, "me@x.com").as_deref(),
            Some("Public Link (fileOrganizer)")
        );
    }

    #[test]
    fn test_summary_mixed_grants() {
        let detail = detail(
            "application/pdf",
            vec![
                permission("user", "1", "owner", "me@x.com", "Me"),
                permission("user", "2", "reader", "a@b.com", "A"),
                permission("anyone", "anyoneWithLink", "writer", "", ""),
            ],
        );

        let summary = summarize(&detail, "me@x.com");
        assert_eq!(summary.item_type, ItemType::File);
        assert_eq!(summary.file_name, "Budget");
        assert_eq!(summary.shared_users, "A (a@b.com),Shareable Link (Write)");
    }

    #[test]
    fn test_summary_without_permissions_is_empty() {
        let summary = summarize(&detail("application/vnd.google-apps.folder", vec![]), "me@x.com");
        assert_eq!(summary.item_type, ItemType::Folder);
        assert_eq!(summary.shared_users, "");
    }

    #[test]
    fn test_summary_ignores_groups_and_domains() {
        let detail = detail(
            "text/plain",
            vec![
                permission("group", "g", "reader", "team@b.com", "Team"),
                permission("domain", "d", "reader", "", ""),
                permission("anyone", "anyone", "reader", "", ""),
            ],
        );

        assert_eq!(summarize(&detail, "me@x.com").shared_users, "Public Link (Read)");
    }

    #[test]
    fn test_summary_has_no_trailing_separator() {
        let detail = detail(
            "text/plain",
            vec![
                permission("user", "2", "reader", "a@b.com", "A"),
                permission("user", "1", "owner", "me@x.com", "Me"),
            ],
        );

        let summary = summarize(&detail, "me@x.com");
        assert_eq!(summary.shared_users, "A (a@b.com)");
        assert!(!summary.shared_users.ends_with(','));
    }
}
