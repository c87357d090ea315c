use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

pub mod level_program;
pub mod messaging;
pub mod task;
pub mod user;
pub mod voter;

pub use level_program::*;
pub use messaging::*;
pub use task::*;
pub use user::*;
pub use voter::*;

/// Raised when a stored or submitted string is not a member of its enum.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid {kind} value: {value}")]
pub struct InvalidValue {
    pub kind: &'static str,
    pub value: String,
}

/// Declares an enum persisted as TEXT under a fixed CHECK constraint.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident : $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::InvalidValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::models::InvalidValue {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::models::InvalidValue;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use text_enum;

/// Reads an optional value, treating `""` as absent. Form-driven clients
/// send empty strings for untouched inputs.
pub(crate) fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Keeps a missing key apart from a cleared one: absent stays `None`, while
/// `null` or a blank string becomes `Some(None)`.
pub(crate) fn blank_as_cleared<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    blank_as_none(deserializer).map(Some)
}

text_enum! {
    /// Position in the party hierarchy; gates most admin routes.
    Role: "role" {
        SuperAdmin => "Super Admin",
        Admin => "Admin",
        Supervisor => "Supervisor",
        Karyakarta => "Karyakarta",
    }
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }

    /// Super Admins manage everyone; Admins manage field roles only.
    pub fn can_manage(&self, target: Role) -> bool {
        match self {
            Role::SuperAdmin => true,
            Role::Admin => matches!(target, Role::Supervisor | Role::Karyakarta),
            Role::Supervisor | Role::Karyakarta => false,
        }
    }
}

text_enum! {
    CustomFieldType: "field_type" {
        Text => "text",
        Number => "number",
        Date => "date",
        Select => "select",
        Textarea => "textarea",
        Checkbox => "checkbox",
    }
}

text_enum! {
    EntityType: "entity_type" {
        Voter => "voter",
        User => "user",
        Task => "task",
    }
}

text_enum! {
    BackupKind: "backup type" {
        Manual => "manual",
        Automatic => "automatic",
    }
}

text_enum! {
    BackupStatus: "backup status" {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub table_name: Option<String>,
    pub record_id: Option<String>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub user_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct CustomField {
    pub id: Uuid,
    pub label: String,
    #[sqlx(try_from = "String")]
    pub field_type: CustomFieldType,
    pub is_required: bool,
    pub options: Vec<String>,
    #[sqlx(try_from = "String")]
    pub applies_to: EntityType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCustomFieldRequest {
    pub label: String,
    pub field_type: CustomFieldType,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub options: Vec<String>,
    pub applies_to: EntityType,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomFieldRequest {
    pub label: Option<String>,
    pub field_type: Option<CustomFieldType>,
    pub is_required: Option<bool>,
    pub options: Option<Vec<String>>,
    pub applies_to: Option<EntityType>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub comment: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub created_by_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub comment: String,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Backup {
    pub id: Uuid,
    pub filename: String,
    pub size: Option<i64>,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub kind: BackupKind,
    pub checksum: Option<String>,
    pub error: Option<String>,
    pub created_by: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub status: BackupStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub created_by_name: Option<String>,
}
