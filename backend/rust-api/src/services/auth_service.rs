use anyhow::{anyhow, Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::{Collection, Database};
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::user::{
    AuthResponse, LoginRequest, RefreshToken, RegisterRequest, User, UserProfile, UserRole,
};

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 3600;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 30 * 86400;
const SHORT_REFRESH_TOKEN_TTL_SECONDS: i64 = 86400;

const LOCKOUT_THRESHOLD: u32 = 5;
const LOCKOUT_WINDOW_SECONDS: u64 = 900;

/// Registration, login and token lifecycle. Refresh tokens are stored
/// hashed; failed logins count against a Redis lockout window.
pub struct AuthService {
    mongo: Database,
    redis: ConnectionManager,
    jwt_service: JwtService,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(mongo: Database, redis: ConnectionManager, jwt_service: JwtService) -> Self {
        let access_token_ttl_seconds = ttl_from_env(
            "JWT_ACCESS_TOKEN_TTL_SECONDS",
            DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
        );
        let refresh_token_ttl_seconds = ttl_from_env(
            "JWT_REFRESH_TOKEN_TTL_SECONDS",
            DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
        );

        Self {
            mongo,
            redis,
            jwt_service,
            access_token_ttl_seconds,
            refresh_token_ttl_seconds,
        }
    }

    fn users(&self) -> Collection<User> {
        self.mongo.collection("users")
    }

    fn refresh_tokens(&self) -> Collection<RefreshToken> {
        self.mongo.collection("refresh_tokens")
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        hash(password, DEFAULT_COST).context("Failed to hash password")
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        verify(password, hash).context("Failed to verify password")
    }

    /// New accounts always start as students; admins are promoted in the
    /// store directly.
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse> {
        let existing = self
            .users()
            .find_one(doc! { "email": &req.email })
            .await
            .context("Failed to check existing user")?;
        if existing.is_some() {
            return Err(anyhow!("User with this email already exists"));
        }

        let now = Utc::now();
        let mut user = User {
            id: None,
            email: req.email,
            password_hash: self.hash_password(&req.password)?,
            name: req.name,
            role: UserRole::Student,
            is_blocked: false,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };

        let inserted = self
            .users()
            .insert_one(&user)
            .await
            .context("Failed to insert user")?;
        let user_id = inserted
            .inserted_id
            .as_object_id()
            .ok_or_else(|| anyhow!("Failed to get inserted user ID"))?;
        user.id = Some(user_id);

        tracing::info!(user_id = %user_id.to_hex(), "Account registered");
        self.issue_tokens(user, true).await
    }

    /// Login with email and password. Accounts lock for 15 minutes after
    /// 5 failed attempts.
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse> {
        if self.check_failed_attempts(&req.email).await.unwrap_or(false) {
            tracing::warn!("Login blocked for {}: too many failed attempts", req.email);
            return Err(anyhow!(
                "Account temporarily locked due to too many failed attempts"
            ));
        }

        let user = self
            .users()
            .find_one(doc! { "email": &req.email })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| anyhow!("Invalid email or password"))?;

        if user.is_blocked {
            return Err(anyhow!("User account is blocked"));
        }

        if !self.verify_password(&req.password, &user.password_hash)? {
            let attempts = self.increment_failed_attempts(&req.email).await.unwrap_or(0);
            tracing::warn!(
                email = %req.email,
                attempts,
                "Failed login attempt: invalid password"
            );
            return Err(anyhow!("Invalid email or password"));
        }
        self.clear_failed_attempts(&req.email).await.ok();

        let user_id = user.id.ok_or_else(|| anyhow!("User ID not found"))?;
        self.users()
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "lastLoginAt": mongodb::bson::DateTime::now() } },
            )
            .await
            .context("Failed to update last login timestamp")?;

        tracing::info!(user_id = %user_id.to_hex(), "Successful login");
        self.issue_tokens(user, req.remember_me).await
    }

    async fn issue_tokens(&self, user: User, remember_me: bool) -> Result<AuthResponse> {
        let user_id = user.id.ok_or_else(|| anyhow!("User ID not found"))?;
        let access_token = self.generate_access_token(&user_id, &user.role)?;
        let refresh_token = self.create_refresh_token(&user_id, remember_me).await?;

        Ok(AuthResponse {
            access_token,
            refresh_token,
            user: UserProfile::from(user),
        })
    }

    fn generate_access_token(&self, user_id: &ObjectId, role: &UserRole) -> Result<String> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id.to_hex(),
            role: role.as_str().to_string(),
            exp: (now + Duration::seconds(self.access_token_ttl_seconds)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        self.jwt_service
            .generate_token(claims)
            .map_err(|err| anyhow!("Failed to generate token: {}", err))
    }

    async fn create_refresh_token(&self, user_id: &ObjectId, remember_me: bool) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        let ttl = if remember_me {
            self.refresh_token_ttl_seconds
        } else {
            SHORT_REFRESH_TOKEN_TTL_SECONDS
        };

        let now = Utc::now();
        let record = RefreshToken {
            id: None,
            user_id: *user_id,
            token_hash: hash_token(&token),
            created_at: now,
            expires_at: now + Duration::seconds(ttl),
            revoked: false,
        };
        self.refresh_tokens()
            .insert_one(&record)
            .await
            .context("Failed to insert refresh token")?;

        Ok(token)
    }

    /// Exchange a refresh token for a fresh access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<String> {
        let record = self
            .refresh_tokens()
            .find_one(doc! { "token_hash": hash_token(refresh_token), "revoked": false })
            .await
            .context("Failed to query refresh token")?
            .ok_or_else(|| anyhow!("Invalid or expired refresh token"))?;

        if record.expires_at < Utc::now() {
            return Err(anyhow!("Refresh token has expired"));
        }

        let user = self
            .users()
            .find_one(doc! { "_id": record.user_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| anyhow!("User not found"))?;
        if user.is_blocked {
            return Err(anyhow!("User account is blocked"));
        }

        let user_id = user.id.ok_or_else(|| anyhow!("User ID not found"))?;
        self.generate_access_token(&user_id, &user.role)
    }

    /// Logout revokes the refresh token; the access token simply ages out.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        self.refresh_tokens()
            .update_one(
                doc! { "token_hash": hash_token(refresh_token) },
                doc! { "$set": { "revoked": true } },
            )
            .await
            .context("Failed to revoke refresh token")?;
        Ok(())
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<User> {
        let object_id = ObjectId::parse_str(user_id).context("Invalid user ID format")?;

        self.users()
            .find_one(doc! { "_id": object_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| anyhow!("User not found"))
    }

    /// Update the display name shown on the leaderboard.
    pub async fn update_profile_name(&self, user_id: &ObjectId, full_name: &str) -> Result<()> {
        self.users()
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": {
                    "name": full_name,
                    "updatedAt": mongodb::bson::DateTime::now(),
                } },
            )
            .await
            .context("Failed to update profile")?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Failed-login lockout counters (Redis)
    // -----------------------------------------------------------------

    async fn check_failed_attempts(&self, email: &str) -> Result<bool> {
        let mut conn = self.redis.clone();
        let count: Option<u32> = redis::cmd("GET")
            .arg(lockout_key(email))
            .query_async(&mut conn)
            .await
            .context("Failed to query failed login attempts")?;

        Ok(count.unwrap_or(0) >= LOCKOUT_THRESHOLD)
    }

    /// The window starts at the first failure.
    async fn increment_failed_attempts(&self, email: &str) -> Result<u32> {
        let key = lockout_key(email);
        let mut conn = self.redis.clone();

        let count: u32 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .context("Failed to increment failed login attempts")?;

        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(LOCKOUT_WINDOW_SECONDS)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to set TTL for failed login attempts")?;
        }

        Ok(count)
    }

    async fn clear_failed_attempts(&self, email: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        redis::cmd("DEL")
            .arg(lockout_key(email))
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to clear failed login attempts")?;
        Ok(())
    }
}

fn lockout_key(email: &str) -> String {
    format!("failed_login:{}", email)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn ttl_from_env(name: &str, fallback: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hashing_is_stable_and_hex() {
        let first = hash_token("refresh-abc");
        let second = hash_token("refresh-abc");

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_ne!(first, hash_token("refresh-def"));
    }

    #[test]
    fn ttl_from_env_uses_the_fallback() {
        assert_eq!(ttl_from_env("JWT_TTL_TEST_UNSET_KEY", 1234), 1234);
    }
}
