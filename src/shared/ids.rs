use getrandom::getrandom;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const GENERATED_SUFFIX_SPACE: u32 = 36 * 36 * 36 * 36;
pub const GENERATED_KEY_MAX_ATTEMPTS: usize = 16;

pub fn validate_session_key_value(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("session key must be non-empty".to_string());
    }
    if value.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err("session key must not contain whitespace".to_string());
    }
    Ok(())
}

/// Opaque handle of one entity in the host model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityHandle(i64);

impl EntityHandle {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<i64>().ok().map(Self)
    }
}

impl std::fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

macro_rules! define_key_type {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, String> {
                let trimmed = raw.trim();
                validate_session_key_value(trimmed)
                    .map_err(|err| format!("invalid {} `{}`: {}", $kind, raw, err))?;
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(D::Error::custom)
            }
        }
    };
}

define_key_type!(SessionKey, "session key");

fn base36_encode_fixed_u32(mut value: u32, width: usize) -> String {
    let mut chars = vec!['0'; width];
    for idx in (0..width).rev() {
        chars[idx] = BASE36_ALPHABET[(value % 36) as usize] as char;
        value /= 36;
    }
    chars.into_iter().collect()
}

/// Builds `<prefix>_<4 base36 chars>`, e.g. `$q_0k3z`.
pub fn generate_session_key(prefix: &str) -> Result<SessionKey, String> {
    let mut bytes = [0_u8; 4];
    getrandom(&mut bytes)
        .map_err(|err| format!("failed to generate session key randomness: {err}"))?;
    let sample = u32::from_le_bytes(bytes) % GENERATED_SUFFIX_SPACE;
    SessionKey::parse(&format!(
        "{prefix}_{}",
        base36_encode_fixed_u32(sample, 4)
    ))
}
