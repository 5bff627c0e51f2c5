//! Authentication and role checks for the admin surfaces.
//!
//! The search and suggestion endpoints are public. Index administration,
//! site management and analytics require a bearer token obtained from
//! `POST /auth/login`.
//!
//! # Tokens
//!
//! ```text
//! base64url(payload_json) "." hex(hmac_sha256(secret, base64url(payload_json)))
//! payload = { "sub": user id, "username", "role", "exp": unix seconds }
//! ```
//!
//! Verification checks the signature in constant time, the expiry, and that
//! the user still exists, so deleting a user revokes their tokens.
//!
//! # Passwords
//!
//! Stored as bcrypt hashes (`$2b$<cost>$...`). The work factor comes from
//! `[auth].password_cost` and defaults to 12. Hashing and verification run
//! on the blocking pool.
//!
//! # Roles
//!
//! | Capability | Roles |
//! |------------|-------|
//! | [`Capability::ManageSites`] | `technical`, `admin` |
//! | [`Capability::ViewAnalytics`] | `admin` |

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::db::now_ts;
use crate::error::{PortalError, PortalResult};

type HmacSha256 = Hmac<Sha256>;

pub const ADMIN_PASSWORD_ENV: &str = "PORTAL_ADMIN_PASSWORD";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Technical,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Technical => "technical",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "technical" => Ok(Role::Technical),
            other => Err(format!("Unknown role '{}'. Must be admin or technical.", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageSites,
    ViewAnalytics,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: String,
    pub username: String,
    pub role: Role,
}

pub fn has_role(principal: &Principal, capability: Capability) -> bool {
    match capability {
        Capability::ManageSites => matches!(principal.role, Role::Technical | Role::Admin),
        Capability::ViewAnalytics => principal.role == Role::Admin,
    }
}

/// Resolves an opaque credential to a caller.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credential: &str) -> Option<Principal>;
}

// ============ Passwords ============

pub const DEFAULT_PASSWORD_COST: u32 = 12;
pub const MIN_PASSWORD_COST: u32 = 4;
pub const MAX_PASSWORD_COST: u32 = 31;

pub fn hash_password(password: &str, cost: u32) -> PortalResult<String> {
    bcrypt::hash(password, cost).map_err(|e| PortalError::upstream("Failed to hash password", e))
}

/// False for a mismatch and for anything that is not a bcrypt hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

async fn hash_blocking(password: &str, cost: u32) -> PortalResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| PortalError::upstream("Failed to hash password", e))?
}

async fn verify_blocking(password: &str, stored: String) -> bool {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .unwrap_or(false)
}

// ============ Tokens ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub exp: i64,
}

/// Signs and verifies bearer tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>, ttl_hours: u64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs: (ttl_hours as i64) * 3600,
        }
    }

    /// A signer with a random per-process secret. Tokens do not survive a
    /// restart.
    pub fn ephemeral(ttl_hours: u64) -> Self {
        let mut secret = Uuid::new_v4().as_bytes().to_vec();
        secret.extend_from_slice(Uuid::new_v4().as_bytes());
        Self::new(secret, ttl_hours)
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }

    pub fn sign(&self, principal: &Principal) -> String {
        self.sign_claims(&Claims {
            sub: principal.id.clone(),
            username: principal.username.clone(),
            role: principal.role,
            exp: now_ts() + self.ttl_secs,
        })
    }

    fn sign_claims(&self, claims: &Claims) -> String {
        // Claims are plain strings and numbers; serialization cannot fail.
        let json = serde_json::to_vec(claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        format!("{}.{}", payload, hex::encode(mac.finalize().into_bytes()))
    }

    /// Signature and expiry check. Does not consult the user table.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        let (payload, signature) = token.split_once('.')?;
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let claims: Claims = serde_json::from_slice(&json).ok()?;
        if claims.exp <= now_ts() {
            return None;
        }
        Some(claims)
    }
}

/// Bearer-token authenticator backed by the `users` table.
#[derive(Clone)]
pub struct TokenAuthenticator {
    pool: SqlitePool,
    signer: TokenSigner,
}

impl TokenAuthenticator {
    pub fn new(pool: SqlitePool, signer: TokenSigner) -> Self {
        Self { pool, signer }
    }

    /// Check a username/password pair and issue a token.
    pub async fn login(&self, username: &str, password: &str) -> PortalResult<(String, Principal)> {
        let row = sqlx::query("SELECT id, username, password_hash, role FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(PortalError::Unauthorized);
        };
        let stored: String = row.get("password_hash");
        if !verify_blocking(password, stored).await {
            return Err(PortalError::Unauthorized);
        }

        let principal = principal_from_row(&row).ok_or(PortalError::Unauthorized)?;
        let token = self.signer.sign(&principal);
        tracing::info!(username = %principal.username, "user logged in");
        Ok((token, principal))
    }
}

fn principal_from_row(row: &sqlx::sqlite::SqliteRow) -> Option<Principal> {
    let role: String = row.get("role");
    Some(Principal {
        id: row.get("id"),
        username: row.get("username"),
        role: role.parse().ok()?,
    })
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, credential: &str) -> Option<Principal> {
        let claims = self.signer.verify(credential)?;

        let row = match sqlx::query("SELECT id, username, role FROM users WHERE id = ?")
            .bind(&claims.sub)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => row?,
            Err(e) => {
                tracing::warn!(error = %e, "user lookup failed during authentication");
                return None;
            }
        };
        principal_from_row(&row)
    }
}

// ============ Users ============

/// Insert a user. Fails with a conflict when the username is taken.
pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    role: Role,
    cost: u32,
) -> PortalResult<Principal> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(PortalError::validation("Username and password are required"));
    }

    let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM users WHERE username = ?")
        .bind(username)
        .fetch_one(pool)
        .await?;
    if exists {
        return Err(PortalError::Conflict(format!(
            "User '{}' already exists",
            username
        )));
    }

    let password_hash = hash_blocking(password, cost).await?;
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO users (id, username, password_hash, role, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(username)
    .bind(&password_hash)
    .bind(role.as_str())
    .bind(now_ts())
    .execute(pool)
    .await?;

    Ok(Principal {
        id,
        username: username.to_string(),
        role,
    })
}

/// Create the default admin account unless that username already exists.
///
/// Returns whether a user was created.
pub async fn ensure_admin(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    cost: u32,
) -> PortalResult<bool> {
    match create_user(pool, username, password, Role::Admin, cost).await {
        Ok(_) => Ok(true),
        Err(PortalError::Conflict(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            id: "u1".into(),
            username: "dana".into(),
            role,
        }
    }

    #[test]
    fn test_password_hash_round_trip() {
        let stored = hash_password("s3cret", MIN_PASSWORD_COST).unwrap();
        assert!(stored.starts_with("$2b$04$"));
        assert!(verify_password("s3cret", &stored));
        assert!(!verify_password("S3cret", &stored));
        assert!(!verify_password("s3cret", "garbage"));
        // Fresh salt every time
        assert_ne!(stored, hash_password("s3cret", MIN_PASSWORD_COST).unwrap());
    }

    #[test]
    fn test_password_hash_uses_requested_cost() {
        let stored = hash_password("s3cret", 5).unwrap();
        assert!(stored.starts_with("$2b$05$"));
        assert!(!stored.contains("s3cret"));
    }

    #[test]
    fn test_legacy_sha256_hash_is_rejected() {
        let legacy = "00112233445566778899aabbccddeeff$9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
        assert!(!verify_password("test", legacy));
    }

    #[tokio::test]
    async fn test_login_with_bcrypt_user() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = crate::db::connect(&crate::config::DbConfig {
            path: tmp.path().join("auth.sqlite"),
        })
        .await
        .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();

        assert!(ensure_admin(&pool, "root", "pw", MIN_PASSWORD_COST).await.unwrap());
        assert!(!ensure_admin(&pool, "root", "pw", MIN_PASSWORD_COST).await.unwrap());

        let stored: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE username = 'root'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(stored.starts_with("$2b$"));

        let auth = TokenAuthenticator::new(pool, TokenSigner::new("secret", 1));
        let (token, user) = auth.login("root", "pw").await.unwrap();
        assert_eq!(user.role, Role::Admin);
        assert_eq!(auth.authenticate(&token).await.unwrap().username, "root");
        assert!(matches!(
            auth.login("root", "wrong").await,
            Err(PortalError::Unauthorized)
        ));
    }

    #[test]
    fn test_token_round_trip() {
        let signer = TokenSigner::new("secret", 24);
        let token = signer.sign(&principal(Role::Technical));
        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, Role::Technical);
    }

    #[test]
    fn test_token_rejects_tampering_and_wrong_secret() {
        let signer = TokenSigner::new("secret", 24);
        let token = signer.sign(&principal(Role::Technical));

        let forged = signer.sign_claims(&Claims {
            sub: "u1".into(),
            username: "dana".into(),
            role: Role::Admin,
            exp: now_ts() + 60,
        });
        let (forged_payload, _) = forged.split_once('.').unwrap();
        let (_, real_sig) = token.split_once('.').unwrap();
        assert!(signer.verify(&format!("{}.{}", forged_payload, real_sig)).is_none());

        assert!(TokenSigner::new("other", 24).verify(&token).is_none());
        assert!(signer.verify("not-a-token").is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = TokenSigner::new("secret", 24);
        let token = signer.sign_claims(&Claims {
            sub: "u1".into(),
            username: "dana".into(),
            role: Role::Admin,
            exp: now_ts() - 1,
        });
        assert!(signer.verify(&token).is_none());
    }

    #[test]
    fn test_capabilities() {
        assert!(has_role(&principal(Role::Technical), Capability::ManageSites));
        assert!(!has_role(&principal(Role::Technical), Capability::ViewAnalytics));
        assert!(has_role(&principal(Role::Admin), Capability::ManageSites));
        assert!(has_role(&principal(Role::Admin), Capability::ViewAnalytics));
    }
}
