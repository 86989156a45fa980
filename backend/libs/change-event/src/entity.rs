use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity types with a dedicated handler.
///
/// Closed on purpose: a new entity type is added here and registered with the
/// consumer's router. Tables without a tag are routed to the generic handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTag {
    Todos,
    Users,
    UserTokens,
}

impl EntityTag {
    pub const ALL: [EntityTag; 3] = [EntityTag::Todos, EntityTag::Users, EntityTag::UserTokens];

    /// Exact match on the source table name.
    pub fn from_table(table: &str) -> Option<Self> {
        match table {
            "todos" => Some(EntityTag::Todos),
            "users" => Some(EntityTag::Users),
            "user_tokens" => Some(EntityTag::UserTokens),
            _ => None,
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            EntityTag::Todos => "todos",
            EntityTag::Users => "users",
            EntityTag::UserTokens => "user_tokens",
        }
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}
