use serde::{Deserialize, Serialize};

/// Who authored a message. This is the only role domain the store knows about;
/// it is persisted with the labels `"human"` and `"ai"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "human")]
    Human,
    #[serde(rename = "ai")]
    Assistant,
}

impl Role {
    /// Label used inside the store (SQLite column, JSON files).
    pub fn as_storage_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Assistant => "ai",
        }
    }

    pub fn from_storage_str(s: &str) -> Option<Self> {
        match s {
            "human" => Some(Self::Human),
            "ai" => Some(Self::Assistant),
            _ => None,
        }
    }

    /// Accept either vocabulary. Used where payloads from older exports or
    /// other tools may carry storage labels instead of API labels.
    pub fn parse_any(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" | "user" => Some(Self::Human),
            "ai" | "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_storage_str())
    }
}

/// Role vocabulary spoken by HTTP callers, the CLI and export files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiRole {
    User,
    Assistant,
}

impl ApiRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for ApiRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApiRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

impl From<Role> for ApiRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Human => Self::User,
            Role::Assistant => Self::Assistant,
        }
    }
}

impl From<ApiRole> for Role {
    fn from(role: ApiRole) -> Self {
        match role {
            ApiRole::User => Self::Human,
            ApiRole::Assistant => Self::Assistant,
        }
    }
}
