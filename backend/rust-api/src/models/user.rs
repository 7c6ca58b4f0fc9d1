use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Account record in the "users" collection. Students and admins share
/// the collection; the role decides which route trees accept the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: UserRole,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(rename = "createdAt", with = "crate::utils::time::chrono_bson")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "crate::utils::time::chrono_bson")]
    pub updated_at: DateTime<Utc>,
    #[serde(
        rename = "lastLoginAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::utils::time::chrono_bson_opt"
    )]
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Student,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Student => "student",
            UserRole::Admin => "admin",
        }
    }
}

/// What the client gets to see about an account. Never carries the
/// password hash.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            email: user.email,
            name: user.name,
            role: user.role,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(
        min = 3,
        max = 100,
        message = "Name must be between 3 and 100 characters"
    ))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,

    /// Extends the refresh token from one day to thirty.
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    /// Travels only as an HTTP-only cookie, never in the JSON body.
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub user: UserProfile,
}

/// Display name shown on the leaderboard.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 3, max = 100, message = "Name must be at least 3 characters"))]
    pub full_name: String,
}

/// Hashed refresh token in the "refresh_tokens" collection. Only the
/// SHA-256 of the token ever touches the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(rename = "userId")]
    pub user_id: ObjectId,
    pub token_hash: String,
    #[serde(rename = "createdAt", with = "crate::utils::time::chrono_bson")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "expiresAt", with = "crate::utils::time::chrono_bson")]
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, DateTime as BsonDateTime};

    #[test]
    fn role_names() {
        assert_eq!(UserRole::Student.as_str(), "student");
        assert_eq!(UserRole::Admin.as_str(), "admin");
    }

    #[test]
    fn user_deserializes_from_store_shape() {
        let now = BsonDateTime::now();
        let doc = doc! {
            "email": "student@example.com",
            "password_hash": "$2b$12$hash",
            "name": "Student",
            "role": "student",
            "createdAt": now,
            "updatedAt": now,
        };

        let parsed: User = mongodb::bson::from_document(doc).expect("user should deserialize");
        assert_eq!(parsed.role, UserRole::Student);
        assert!(!parsed.is_blocked);
        assert!(parsed.last_login_at.is_none());
    }

    #[test]
    fn profile_hides_password_hash() {
        let user = User {
            id: Some(ObjectId::new()),
            email: "a@b.co".into(),
            password_hash: "secret".into(),
            name: "A".into(),
            role: UserRole::Student,
            is_blocked: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        };

        let profile = UserProfile::from(user);
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("secret"));
    }
}
