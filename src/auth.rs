//! Caller identity: password hashing and HTTP Basic credential checks.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::{ArchiveError, Result};
use crate::slug;
use crate::store::{StoreError, UserRecord, UserStore};

/// The authenticated user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    user: UserRecord,
}

impl Caller {
    pub fn new(user: UserRecord) -> Self {
        Self { user }
    }

    pub fn id(&self) -> u64 {
        self.user.id
    }

    pub fn name(&self) -> &str {
        &self.user.name
    }

    pub fn path(&self) -> String {
        slug::user_path(&self.user.name)
    }

    pub fn user(&self) -> &UserRecord {
        &self.user
    }
}

/// Hashes `password` into a PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ArchiveError::internal(format!("hash password: {err}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("stored password hash is not a PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Splits an `Authorization: Basic ...` header value into name and password.
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (name, password) = decoded.split_once(':')?;
    Some((name.to_owned(), password.to_owned()))
}

/// Resolves the caller from an `Authorization` header.
pub async fn authenticate(users: &dyn UserStore, header: Option<&str>) -> Result<Caller> {
    let header = header.ok_or_else(|| ArchiveError::unauthenticated("missing credentials"))?;
    let (name, password) =
        parse_basic(header).ok_or_else(|| ArchiveError::unauthenticated("malformed credentials"))?;

    let user = match users.get_user_by_name(&name).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            return Err(ArchiveError::unauthenticated("invalid credentials"));
        }
        Err(err) => return Err(err.into()),
    };

    let hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|err| ArchiveError::internal(format!("verify password: {err}")))?;
    if !verified {
        tracing::debug!(user = %name, "password mismatch");
        return Err(ArchiveError::unauthenticated("invalid credentials"));
    }
    Ok(Caller::new(user))
}
