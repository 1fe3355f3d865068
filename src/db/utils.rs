use thiserror::Error;

use super::StoreError;

#[derive(Debug, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// text <-> enum mapping for columns stored as TEXT
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::db::utils::UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::db::utils::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use string_enum;

pub fn parse_column<T>(value: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = UnknownVariant>,
{
    value
        .parse::<T>()
        .map_err(|err| StoreError::Corrupt(err.to_string()))
}

pub fn rating_from_column(value: Option<i16>) -> Result<Option<u8>, StoreError> {
    value
        .map(|rating| {
            u8::try_from(rating).map_err(|_| StoreError::Corrupt(format!("rating out of range: {rating}")))
        })
        .transpose()
}
