use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel-family entity kinds, matching the platform's numeric type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Plain text channel (code 0)
    Text,
    /// Direct message channel (code 1)
    Dm,
    /// Voice channel (code 2)
    Voice,
    /// Group direct message (code 3)
    GroupDm,
    /// Channel category (code 4)
    Category,
    /// Announcement channel (code 5)
    News,
    /// Thread under an announcement channel (code 10)
    NewsThread,
    /// Public thread (code 11)
    PublicThread,
    /// Private thread (code 12)
    PrivateThread,
    /// Stage voice channel (code 13)
    Stage,
    /// Forum channel (code 15)
    Forum,
}

impl EntityKind {
    /// The platform's numeric type code for this kind
    pub fn code(&self) -> u8 {
        match self {
            Self::Text => 0,
            Self::Dm => 1,
            Self::Voice => 2,
            Self::GroupDm => 3,
            Self::Category => 4,
            Self::News => 5,
            Self::NewsThread => 10,
            Self::PublicThread => 11,
            Self::PrivateThread => 12,
            Self::Stage => 13,
            Self::Forum => 15,
        }
    }

    /// Decode a platform type code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Text),
            1 => Some(Self::Dm),
            2 => Some(Self::Voice),
            3 => Some(Self::GroupDm),
            4 => Some(Self::Category),
            5 => Some(Self::News),
            10 => Some(Self::NewsThread),
            11 => Some(Self::PublicThread),
            12 => Some(Self::PrivateThread),
            13 => Some(Self::Stage),
            15 => Some(Self::Forum),
            _ => None,
        }
    }

    /// Whether this kind is one of the thread variants (codes 10-12)
    pub fn is_thread(&self) -> bool {
        matches!(
            self,
            Self::NewsThread | Self::PublicThread | Self::PrivateThread
        )
    }

    /// Whether an existing mirror entity of kind `other` can stand in for
    /// this kind.
    ///
    /// Text and announcement channels are interchangeable, any two thread
    /// variants are interchangeable, every other pairing requires exact
    /// equality.
    pub fn is_compatible_with(&self, other: EntityKind) -> bool {
        if *self == other {
            return true;
        }
        if matches!(self, Self::Text | Self::News) && matches!(other, Self::Text | Self::News) {
            return true;
        }
        self.is_thread() && other.is_thread()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Dm => write!(f, "dm"),
            Self::Voice => write!(f, "voice"),
            Self::GroupDm => write!(f, "group_dm"),
            Self::Category => write!(f, "category"),
            Self::News => write!(f, "news"),
            Self::NewsThread => write!(f, "news_thread"),
            Self::PublicThread => write!(f, "public_thread"),
            Self::PrivateThread => write!(f, "private_thread"),
            Self::Stage => write!(f, "stage"),
            Self::Forum => write!(f, "forum"),
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "dm" => Ok(Self::Dm),
            "voice" => Ok(Self::Voice),
            "group_dm" => Ok(Self::GroupDm),
            "category" => Ok(Self::Category),
            "news" => Ok(Self::News),
            "news_thread" => Ok(Self::NewsThread),
            "public_thread" => Ok(Self::PublicThread),
            "private_thread" => Ok(Self::PrivateThread),
            "stage" => Ok(Self::Stage),
            "forum" => Ok(Self::Forum),
            _ => Err(format!("Invalid entity kind: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for code in [0u8, 1, 2, 3, 4, 5, 10, 11, 12, 13, 15] {
            let kind = EntityKind::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert!(EntityKind::from_code(6).is_none());
        assert!(EntityKind::from_code(14).is_none());
    }

    #[test]
    fn test_text_and_news_are_interchangeable() {
        assert!(EntityKind::Text.is_compatible_with(EntityKind::News));
        assert!(EntityKind::News.is_compatible_with(EntityKind::Text));
    }

    #[test]
    fn test_thread_variants_are_interchangeable() {
        let threads = [
            EntityKind::NewsThread,
            EntityKind::PublicThread,
            EntityKind::PrivateThread,
        ];
        for a in threads {
            for b in threads {
                assert!(a.is_compatible_with(b), "{a} should accept {b}");
            }
        }
    }

    #[test]
    fn test_other_pairs_require_exact_equality() {
        assert!(!EntityKind::Voice.is_compatible_with(EntityKind::Stage));
        assert!(!EntityKind::Text.is_compatible_with(EntityKind::Forum));
        assert!(!EntityKind::Forum.is_compatible_with(EntityKind::PublicThread));
        assert!(!EntityKind::Category.is_compatible_with(EntityKind::Text));
        assert!(EntityKind::Forum.is_compatible_with(EntityKind::Forum));
    }
}
