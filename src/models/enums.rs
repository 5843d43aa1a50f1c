use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DocumentStatus {
    Uploading => "uploading",
    Processing => "processing",
    Ready => "ready",
    Failed => "failed",
});

str_enum!(ProcessingStage {
    None => "none",
    Ocr => "ocr",
    AiAnalysis => "ai_analysis",
    Completed => "completed",
});

str_enum!(MessageRole {
    User => "user",
    Assistant => "assistant",
    System => "system",
});

impl DocumentStatus {
    /// Lifecycle rank: transitions never move to a lower rank.
    /// `Ready` and `Failed` are both terminal.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Uploading => 0,
            Self::Processing => 1,
            Self::Ready | Self::Failed => 2,
        }
    }
}
