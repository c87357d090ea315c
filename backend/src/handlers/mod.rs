pub mod analytics;
pub mod audit_logs;
pub mod auth;
pub mod backup;
pub mod comments;
pub mod custom_fields;
pub mod level_program;
pub mod notifications;
pub mod settings;
pub mod sms;
pub mod tasks;
pub mod users;
pub mod voters;

use serde::Serialize;

/// `{"message": ...}` acknowledgement used by most mutating routes.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
