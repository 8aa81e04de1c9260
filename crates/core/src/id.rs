//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a user (actor identity).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for UserId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for UserId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| DomainError::invalid_id(format!("UserId: {}", e)))?;
        Ok(Self(uuid))
    }
}

/// Caller-unguessable identifier of a generation job.
///
/// Rendered as `gen_<epoch-millis>_<9 alphanumeric chars>`; the suffix is
/// derived from a random UUID so ids are not enumerable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(String);

const SUFFIX_LEN: usize = 9;

impl GenerationId {
    /// Generate a fresh identifier from the current time plus a random suffix.
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let hex = Uuid::new_v4().simple().to_string();
        let suffix = &hex[..SUFFIX_LEN];
        Self(format!("gen_{millis}_{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for GenerationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GenerationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("gen_")
            .ok_or_else(|| DomainError::invalid_id("GenerationId: missing gen_ prefix"))?;
        let (millis, suffix) = rest
            .split_once('_')
            .ok_or_else(|| DomainError::invalid_id("GenerationId: missing suffix separator"))?;
        if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::invalid_id(
                "GenerationId: timestamp must be decimal digits",
            ));
        }
        if suffix.len() != SUFFIX_LEN || !suffix.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(DomainError::invalid_id(format!(
                "GenerationId: suffix must be {SUFFIX_LEN} alphanumeric chars"
            )));
        }
        Ok(Self(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_matches_expected_shape() {
        let id = GenerationId::generate();
        let parsed: GenerationId = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = GenerationId::generate();
        let b = GenerationId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!("job_123_abcdefghi".parse::<GenerationId>().is_err());
        assert!("gen_123".parse::<GenerationId>().is_err());
        assert!("gen_abc_abcdefghi".parse::<GenerationId>().is_err());
        assert!("gen_123_short".parse::<GenerationId>().is_err());
        assert!("gen_123_abc-efghi".parse::<GenerationId>().is_err());
    }

    #[test]
    fn accepts_well_formed_ids() {
        assert!("gen_1756300000000_a1b2c3d4e".parse::<GenerationId>().is_ok());
    }
}
