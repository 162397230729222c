//! Identifier newtypes

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Project identifier, chosen by the project author
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

macro_rules! uuid_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse either the bare UUID or the prefixed display form
            pub fn parse(value: &str) -> Option<Self> {
                let raw = value
                    .strip_prefix(concat!($prefix, ":"))
                    .unwrap_or(value);
                Uuid::parse_str(raw).ok().map(Self)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(BuildId, "build");
uuid_id!(RunId, "run");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_prefixed_form() {
        let id = BuildId::generate();
        let prefixed = format!("build:{}", id);
        assert_eq!(BuildId::parse(&prefixed), Some(id));
        assert_eq!(BuildId::parse(&id.to_string()), Some(id));
        assert_eq!(RunId::parse("not-a-uuid"), None);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let project = ProjectId::new("survival");
        assert_eq!(serde_json::to_string(&project).unwrap(), "\"survival\"");
    }
}
