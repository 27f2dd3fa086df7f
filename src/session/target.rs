use crate::shared::ids::{EntityHandle, SessionKey};

/// Where an operation should act, before resolution against the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    Key(SessionKey),
    Handle(EntityHandle),
    Selection,
}

impl TargetRef {
    /// Classifies raw target text: a prefixed key, then a bare integer
    /// handle, then any other non-blank text as a plain key. Blank or
    /// absent text means the current selection.
    pub fn classify(raw: Option<&str>, prefixes: &[&str]) -> Result<Self, String> {
        let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(Self::Selection);
        };
        if prefixes.iter().any(|prefix| raw.starts_with(prefix)) {
            return SessionKey::parse(raw).map(Self::Key);
        }
        if let Some(handle) = EntityHandle::parse(raw) {
            return Ok(Self::Handle(handle));
        }
        SessionKey::parse(raw).map(Self::Key)
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Key(key) => key.to_string(),
            Self::Handle(handle) => format!("#{handle}"),
            Self::Selection => "current selection".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIXES: &[&str] = &["$q", "$f"];

    #[test]
    fn blank_means_selection() {
        assert_eq!(TargetRef::classify(None, PREFIXES), Ok(TargetRef::Selection));
        assert_eq!(
            TargetRef::classify(Some("  "), PREFIXES),
            Ok(TargetRef::Selection)
        );
    }

    #[test]
    fn prefixed_keys_win_over_handles() {
        assert_eq!(
            TargetRef::classify(Some("$q1"), PREFIXES),
            Ok(TargetRef::Key(SessionKey::parse("$q1").expect("key")))
        );
        assert_eq!(
            TargetRef::classify(Some(" 311 "), PREFIXES),
            Ok(TargetRef::Handle(EntityHandle::new(311)))
        );
    }

    #[test]
    fn other_text_is_a_plain_key() {
        assert_eq!(
            TargetRef::classify(Some("walls"), PREFIXES),
            Ok(TargetRef::Key(SessionKey::parse("walls").expect("key")))
        );
        assert!(TargetRef::classify(Some("two words"), PREFIXES).is_err());
    }
}
