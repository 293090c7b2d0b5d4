use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
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

str_enum!(TurnRole {
    User => "user",
    Assistant => "assistant",
    System => "system",
});

str_enum!(Provenance {
    Internal => "internal",
    ExternalVoice => "external_voice",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn turn_role_round_trip() {
        for (variant, s) in [
            (TurnRole::User, "user"),
            (TurnRole::Assistant, "assistant"),
            (TurnRole::System, "system"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(TurnRole::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn provenance_round_trip() {
        for (variant, s) in [
            (Provenance::Internal, "internal"),
            (Provenance::ExternalVoice, "external_voice"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(Provenance::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(TurnRole::from_str("bot").is_err());
        assert!(Provenance::from_str("").is_err());
    }
}
