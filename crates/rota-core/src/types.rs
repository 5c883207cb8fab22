use serde::{Deserialize, Serialize};

use crate::{ids::*, model::*};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub status: UserStatus,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub batch: String,
    pub customer: String,
    pub user_name: String,
    pub status: MissionStatus,
    pub created_at_micros: i64,
    pub updated_at_micros: i64,
}

/// Fields the assigner supplies when recording an assignment. The store fills
/// in id, status and timestamps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMission {
    pub batch: String,
    pub customer: String,
    pub user_name: String,
}

/// One imported row: the batch label and the customer it names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRow {
    pub batch: String,
    pub customer: String,
}

impl BatchRow {
    pub fn new(batch: impl Into<String>, customer: impl Into<String>) -> Self {
        Self { batch: batch.into(), customer: customer.into() }
    }
}

/// One line of the result set, in the order the batch was shuffled into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub batch: String,
    pub customer: String,
    pub user_name: String,
}

impl Assignment {
    pub const HEADER: [&'static str; 3] = ["batch", "customer", "assignee"];

    pub fn to_record(&self) -> [&str; 3] {
        [self.batch.as_str(), self.customer.as_str(), self.user_name.as_str()]
    }
}

/// Exact-match mission search. Unset fields do not constrain the result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MissionFilter {
    pub batch: Option<String>,
    pub customer: Option<String>,
    pub user_name: Option<String>,
}

impl MissionFilter {
    pub fn matches(&self, m: &Mission) -> bool {
        self.batch.as_deref().map_or(true, |b| b == m.batch)
            && self.customer.as_deref().map_or(true, |c| c == m.customer)
            && self.user_name.as_deref().map_or(true, |u| u == m.user_name)
    }
}
