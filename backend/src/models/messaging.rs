use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::text_enum;

text_enum! {
    SmsKind: "sms type" {
        Manual => "manual",
        Birthday => "birthday",
        Reminder => "reminder",
        Announcement => "announcement",
    }
}

impl Default for SmsKind {
    fn default() -> Self {
        SmsKind::Manual
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct SmsLog {
    pub id: Uuid,
    pub message: String,
    pub recipients: Vec<String>,
    pub sent_by: Option<Uuid>,
    pub success_count: i32,
    pub failure_count: i32,
    pub total_count: i32,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub kind: SmsKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub sent_by_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendSmsRequest {
    pub message: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: SmsKind,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsResponse {
    pub message: String,
    pub success_count: i32,
    pub failure_count: i32,
    pub total_count: i32,
}

#[derive(Debug, Serialize, FromRow)]
pub struct SmsStats {
    pub total_campaigns: i64,
    pub total_sent: i64,
    pub total_success: i64,
    pub total_failure: i64,
    pub today_campaigns: i64,
    pub today_sent: i64,
}

/// Serialized in camelCase; the notification UI predates the rest of the API.
#[derive(Debug, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub recipients: Vec<Uuid>,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_by: Option<Uuid>,
    pub read_by: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub recipients: Vec<Uuid>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct NotificationStats {
    pub total_notifications: i64,
    pub total_reads: i64,
    pub unread_notifications: i64,
}
