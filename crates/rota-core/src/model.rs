use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }

    /// Unknown values read back as inactive so they never enter the rotation.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => UserStatus::Active,
            _ => UserStatus::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, UserStatus::Active)
    }
}

/// Missions written by the assigner are always `Ok`. Other values can show up
/// when a collaborator edits the table; those rows never anchor the rotation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(into = "String", from = "String")]
pub enum MissionStatus {
    Ok,
    Other(String),
}

impl MissionStatus {
    pub const OK: &'static str = "ok";

    pub fn as_str(&self) -> &str {
        match self {
            MissionStatus::Ok => Self::OK,
            MissionStatus::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            Self::OK => MissionStatus::Ok,
            other => MissionStatus::Other(other.to_string()),
        }
    }
}

impl From<MissionStatus> for String {
    fn from(s: MissionStatus) -> Self {
        match s {
            MissionStatus::Ok => MissionStatus::OK.to_string(),
            MissionStatus::Other(other) => other,
        }
    }
}

impl From<String> for MissionStatus {
    fn from(s: String) -> Self {
        MissionStatus::parse(&s)
    }
}
