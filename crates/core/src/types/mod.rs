//! Shared type definitions and newtypes
//!
//! Snowflake ids are 64-bit on the server but travel as JSON strings so they
//! survive JavaScript clients. Deserialization accepts either form.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Deserialize an id that can be either a string or a number
fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdValue {
        String(String),
        Unsigned(u64),
        Signed(i64),
    }

    match IdValue::deserialize(deserializer)? {
        IdValue::String(s) => Ok(s),
        IdValue::Unsigned(n) => Ok(n.to_string()),
        IdValue::Signed(n) => Ok(n.to_string()),
    }
}

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserialize_id(deserializer).map($name)
            }
        }
    };
}

id_newtype!(
    /// Server-assigned message id
    MessageId
);

id_newtype!(
    /// Channel id (text or voice)
    ChannelId
);

id_newtype!(
    /// User id
    UserId
);
