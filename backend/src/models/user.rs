use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Role;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub mobile: String,
    pub age: Option<i32>,
    pub address: Option<String>,
    pub id_number: Option<String>,
    pub dob: Option<NaiveDate>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub photo: Option<String>,
    pub designation: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub booth_access: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact projection used by role lookups and area summaries.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct UserSummary {
    pub id: Uuid,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub mobile: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub mobile: String,
    pub age: Option<i32>,
    pub address: Option<String>,
    pub id_number: Option<String>,
    pub dob: Option<NaiveDate>,
    pub password: String,
    pub designation: Option<String>,
    pub role: Option<Role>,
    pub booth_access: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub age: Option<i32>,
    pub address: Option<String>,
    pub id_number: Option<String>,
    pub dob: Option<NaiveDate>,
    pub password: Option<String>,
    pub photo: Option<String>,
    pub designation: Option<String>,
    pub role: Option<Role>,
    pub booth_access: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_never_leaves_the_server() {
        let user = User {
            id: Uuid::new_v4(),
            username: "admin".into(),
            full_name: "System Administrator".into(),
            email: "admin@system.com".into(),
            mobile: "1234567890".into(),
            age: None,
            address: None,
            id_number: None,
            dob: None,
            password_hash: "$argon2id$secret".into(),
            photo: None,
            designation: None,
            role: Role::SuperAdmin,
            booth_access: None,
            last_login: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "Super Admin");
    }

    #[test]
    fn create_request_accepts_missing_role() {
        let req: CreateUserRequest = serde_json::from_str(
            r#"{"username":"k1","full_name":"K One","email":"k1@x.org","mobile":"99","password":"pw"}"#,
        )
        .unwrap();
        assert!(req.role.is_none());
        assert!(req.dob.is_none());
    }
}
