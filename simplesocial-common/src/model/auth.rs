use crate::{
    model::{Id, user::UserMarker},
    util::PositiveDuration,
};
use argon2::{
    Argon2, Params,
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use base64::{DecodeError, Engine, display::Base64Display, prelude::BASE64_URL_SAFE_NO_PAD};
use std::{
    fmt::{Debug, Formatter},
    num::ParseIntError,
    str::FromStr,
    sync::LazyLock,
};
use thiserror::Error;
use time::UtcDateTime;

pub const AUTH_TOKEN_SECRET_LEN: usize = 24;
pub const AUTH_TOKEN_SALT_LEN: usize = 18;
pub const AUTH_TOKEN_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_SALT_LEN: usize = 16;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing auth token failed: {0}")]
pub struct AuthTokenHashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum AuthTokenDecodeError {
    #[error("Expected three parts separated by ':'")]
    MissingPart,
    #[error("Invalid user id: {0}")]
    InvalidUserId(#[from] ParseIntError),
    #[error("Invalid base64: {0}")]
    Base64(#[from] DecodeError),
    #[error("The {0} part has the wrong length")]
    WrongLength(&'static str),
}

/// Bearer credential handed out on login, `{user_id}:{secret}:{salt}` on the wire
/// with both byte strings in unpadded url-safe base64. Only its hash is ever stored.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthToken {
    pub user_id: Id<UserMarker>,
    secret: [u8; AUTH_TOKEN_SECRET_LEN],
    salt: [u8; AUTH_TOKEN_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthTokenHash([u8; AUTH_TOKEN_HASH_LEN]);

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Authentication {
    pub user: Id<UserMarker>,
    pub token_hash: AuthTokenHash,
    pub created_at: UtcDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl Authentication {
    /// Record of `token` being handed out at `now`.
    pub fn issue(
        token: &AuthToken,
        now: UtcDateTime,
        lifetime: Option<PositiveDuration>,
    ) -> Result<Self, AuthTokenHashError> {
        Ok(Self {
            user: token.user_id,
            token_hash: token.hash()?,
            created_at: now,
            expires_after: lifetime,
        })
    }

    /// A lifetime reaching past the representable range never expires.
    #[must_use]
    pub fn is_expired_at(&self, now: UtcDateTime) -> bool {
        self.expires_after.is_some_and(|lifetime| {
            self.created_at
                .checked_add(lifetime.get())
                .is_some_and(|expiry| expiry < now)
        })
    }
}

impl AuthToken {
    #[must_use]
    pub fn generate_random(user_id: Id<UserMarker>) -> Self {
        Self {
            user_id,
            secret: rand::random(),
            salt: rand::random(),
        }
    }

    #[must_use]
    pub fn as_token_str(&self) -> String {
        format!(
            "{}:{}:{}",
            self.user_id,
            Base64Display::new(&self.secret, &BASE64_URL_SAFE_NO_PAD),
            Base64Display::new(&self.salt, &BASE64_URL_SAFE_NO_PAD),
        )
    }

    pub fn hash(&self) -> Result<AuthTokenHash, AuthTokenHashError> {
        let mut hash = [0; AUTH_TOKEN_HASH_LEN];
        Argon2::default()
            .hash_password_into(&self.secret, &self.salt, &mut hash)
            .map_err(AuthTokenHashError)?;

        Ok(AuthTokenHash(hash))
    }
}

fn decode_part<const LEN: usize>(
    part: &str,
    name: &'static str,
) -> Result<[u8; LEN], AuthTokenDecodeError> {
    BASE64_URL_SAFE_NO_PAD
        .decode(part)?
        .try_into()
        .map_err(|_| AuthTokenDecodeError::WrongLength(name))
}

impl FromStr for AuthToken {
    type Err = AuthTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user_id, rest) = s.split_once(':').ok_or(Self::Err::MissingPart)?;
        let (secret, salt) = rest.split_once(':').ok_or(Self::Err::MissingPart)?;

        Ok(Self {
            user_id: user_id.parse::<u64>()?.into(),
            secret: decode_part(secret, "secret")?,
            salt: decode_part(salt, "salt")?,
        })
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl AuthTokenHash {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for AuthTokenHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthTokenHash(..)")
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Stored auth token hash is {0} bytes instead of {expected}", expected = AUTH_TOKEN_HASH_LEN)]
pub struct InvalidAuthTokenHashError(usize);

impl TryFrom<Vec<u8>> for AuthTokenHash {
    type Error = InvalidAuthTokenHashError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        let len = bytes.len();
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| InvalidAuthTokenHashError(len))
    }
}

#[derive(Clone, Debug, Error)]
#[error("Password hashing failed: {0}")]
pub struct PasswordHashError(password_hash::Error);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum WeakPasswordError {
    #[error("Password must be at least {min} characters long", min = PASSWORD_MIN_LEN)]
    TooShort,
    #[error("Password must not be entirely numeric")]
    EntirelyNumeric,
}

/// A plaintext password that passed the signup policy.
#[derive(Clone, Eq, PartialEq)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Result<Self, WeakPasswordError> {
        if password.chars().count() < PASSWORD_MIN_LEN {
            return Err(WeakPasswordError::TooShort);
        }
        if password.chars().all(|c| c.is_ascii_digit()) {
            return Err(WeakPasswordError::EntirelyNumeric);
        }
        Ok(Self(password))
    }

    pub fn hash(&self) -> Result<HashedPassword, PasswordHashError> {
        let salt = SaltString::encode_b64(&rand::random::<[u8; PASSWORD_SALT_LEN]>())
            .map_err(PasswordHashError)?;

        let hash = Argon2::default()
            .hash_password(self.0.as_bytes(), &salt)
            .map_err(PasswordHashError)?;

        Ok(HashedPassword(hash.to_string()))
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Password").field(&"[redacted]").finish()
    }
}

/// PHC string of an argon2 password hash.
#[derive(Clone, Eq, PartialEq)]
pub struct HashedPassword(String);

impl HashedPassword {
    /// Wraps a hash read back from storage.
    #[must_use]
    pub fn from_phc(phc: String) -> Self {
        Self(phc)
    }

    #[must_use]
    pub fn as_phc(&self) -> &str {
        &self.0
    }

    pub fn verify(&self, candidate: &str) -> Result<bool, PasswordHashError> {
        let parsed = PasswordHash::new(&self.0).map_err(PasswordHashError)?;

        match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(PasswordHashError(err)),
        }
    }

    /// Runs a verification of `candidate` against a throwaway hash, so that logins
    /// for unknown handles cost as much as logins with a wrong password.
    pub fn verify_unknown(candidate: &str) {
        if let Some(dummy) = dummy_hash() {
            let _ = dummy.verify(candidate);
        }
    }
}

fn dummy_hash() -> Option<&'static HashedPassword> {
    static DUMMY: LazyLock<Option<HashedPassword>> =
        LazyLock::new(|| Password("no account has this password".to_owned()).hash().ok());

    DUMMY.as_ref()
}

impl Debug for HashedPassword {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HashedPassword").field(&"[redacted]").finish()
    }
}
