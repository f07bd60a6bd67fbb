use rand::{distributions::Uniform, Rng};
use time::{Duration, OffsetDateTime};

use crate::error::ApiError;

/// One issued code with its expiry. Used for both the email-verification
/// OTP and the password-reset token; the two differ only in which columns
/// hold them and which preconditions the handlers enforce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePair {
    pub code: String,
    pub expires_at: OffsetDateTime,
}

impl CodePair {
    /// Rebuild the optional pair from its two nullable columns. The store
    /// guarantees both-or-neither, so a lone half collapses to `None`.
    pub fn from_columns(
        code: Option<String>,
        expires_at: Option<OffsetDateTime>,
    ) -> Option<Self> {
        code.zip(expires_at)
            .map(|(code, expires_at)| Self { code, expires_at })
    }

    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }
}

/// Uniformly random 6-digit numeric code.
pub fn generate_code() -> String {
    rand::thread_rng()
        .sample_iter(&Uniform::new(0u32, 10))
        .take(6)
        .map(|d| d.to_string())
        .collect()
}

/// Whole minutes until `expires_at`, rounded up; 0 once passed.
pub fn remaining_minutes(expires_at: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let ms = (expires_at - now).whole_milliseconds();
    if ms <= 0 {
        0
    } else {
        ((ms + 59_999) / 60_000) as i64
    }
}

/// Issue a fresh pair, refused while an unexpired one exists.
pub fn issue(
    current: Option<&CodePair>,
    now: OffsetDateTime,
    ttl_minutes: i64,
) -> Result<CodePair, ApiError> {
    if let Some(pair) = current {
        if pair.is_active(now) {
            return Err(ApiError::RateLimited {
                remaining_minutes: remaining_minutes(pair.expires_at, now),
            });
        }
    }
    Ok(CodePair {
        code: generate_code(),
        expires_at: now + Duration::minutes(ttl_minutes),
    })
}

/// Full verification step for the email flow. An already-verified account
/// is refused before the code is even looked at, so a repeat attempt after
/// success (with the pair long cleared) reports that instead of a mismatch.
pub fn verify(
    verified: bool,
    current: Option<&CodePair>,
    submitted: &str,
    now: OffsetDateTime,
) -> Result<(), ApiError> {
    if verified {
        return Err(ApiError::AlreadyVerified);
    }
    check(current, submitted, now)
}

/// Compare a submitted code against the pending pair. A mismatch wins over
/// expiry; a correct code is still rejected once `now >= expires_at`.
pub fn check(
    current: Option<&CodePair>,
    submitted: &str,
    now: OffsetDateTime,
) -> Result<(), ApiError> {
    let pair = current.ok_or(ApiError::InvalidOtp)?;
    if pair.code != submitted {
        return Err(ApiError::InvalidOtp);
    }
    if now >= pair.expires_at {
        return Err(ApiError::ExpiredOtp);
    }
    Ok(())
}
