use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use rota_core::{Mission, MissionFilter, MissionId, MissionStatus, NewMission, User, UserId, UserStatus};

use crate::{next_user, now_unix_micros, RotationView, Storage, StorageError};

/// In-memory storage for tests. Not durable, but follows the same query rules
/// as the SQLite store.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: BTreeMap<i64, User>,
    missions: Vec<Mission>,
    last_user_id: i64,
    last_mission_id: i64,
    frozen_micros: Option<i64>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mission gets the same timestamp, so ordering falls to the id
    /// tie-break.
    pub fn with_frozen_clock(micros: i64) -> Self {
        Self { inner: Mutex::new(Inner { frozen_micros: Some(micros), ..Default::default() }) }
    }

    /// Insert a mission row verbatim, the way an external editor of the
    /// table would.
    pub fn insert_raw_mission(&self, mission: Mission) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        inner.last_mission_id = inner.last_mission_id.max(mission.id.get());
        inner.missions.push(mission);
        Ok(())
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| anyhow!("in-memory storage lock poisoned"))
    }
}

impl Inner {
    fn name_taken(&self, name: &str, except: Option<UserId>) -> bool {
        self.users.values().any(|u| u.name == name && Some(u.id) != except)
    }

    fn insert_mission(&mut self, mission: NewMission) -> Mission {
        let now = self.frozen_micros.unwrap_or_else(now_unix_micros);
        self.last_mission_id += 1;
        let m = Mission {
            id: MissionId(self.last_mission_id),
            batch: mission.batch,
            customer: mission.customer,
            user_name: mission.user_name,
            status: MissionStatus::Ok,
            created_at_micros: now,
            updated_at_micros: now,
        };
        self.missions.push(m.clone());
        m
    }
}

/// Reads against an already-locked state, so `assign_next` can run the
/// selector and the insert under one guard.
impl RotationView for Inner {
    fn first_active_user(&self) -> anyhow::Result<Option<User>> {
        Ok(self.users.values().find(|u| u.is_active()).cloned())
    }

    fn first_active_user_after(&self, id: UserId) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .range(id.get().saturating_add(1)..)
            .map(|(_, u)| u)
            .find(|u| u.is_active())
            .cloned())
    }

    fn user_by_name(&self, name: &str) -> anyhow::Result<Option<User>> {
        Ok(self.users.values().find(|u| u.name == name).cloned())
    }

    fn most_recent_assignment(&self) -> anyhow::Result<Option<Mission>> {
        Ok(self
            .missions
            .iter()
            .filter(|m| m.status == MissionStatus::Ok)
            .max_by_key(|m| (m.updated_at_micros, m.id))
            .cloned())
    }
}

fn check_name(name: &str) -> anyhow::Result<()> {
    if name.trim().is_empty() {
        return Err(StorageError::EmptyUserName.into());
    }
    Ok(())
}

impl RotationView for InMemoryStorage {
    fn first_active_user(&self) -> anyhow::Result<Option<User>> {
        self.lock()?.first_active_user()
    }

    fn first_active_user_after(&self, id: UserId) -> anyhow::Result<Option<User>> {
        self.lock()?.first_active_user_after(id)
    }

    fn user_by_name(&self, name: &str) -> anyhow::Result<Option<User>> {
        self.lock()?.user_by_name(name)
    }

    fn most_recent_assignment(&self) -> anyhow::Result<Option<Mission>> {
        self.lock()?.most_recent_assignment()
    }
}

impl Storage for InMemoryStorage {
    fn active_users(&self) -> anyhow::Result<Vec<User>> {
        let inner = self.lock()?;
        Ok(inner.users.values().filter(|u| u.is_active()).cloned().collect())
    }

    fn create_mission(&self, mission: NewMission) -> anyhow::Result<Mission> {
        Ok(self.lock()?.insert_mission(mission))
    }

    fn assign_next(&self, batch: &str, customer: &str) -> anyhow::Result<Option<Mission>> {
        let mut inner = self.lock()?;
        let Some(user) = next_user(&*inner)? else {
            return Ok(None);
        };
        Ok(Some(inner.insert_mission(NewMission {
            batch: batch.to_string(),
            customer: customer.to_string(),
            user_name: user.name,
        })))
    }

    fn add_user(&self, name: &str, status: UserStatus) -> anyhow::Result<User> {
        check_name(name)?;
        let mut inner = self.lock()?;
        if inner.name_taken(name, None) {
            return Err(StorageError::DuplicateUserName(name.to_string()).into());
        }
        inner.last_user_id += 1;
        let user = User { id: UserId(inner.last_user_id), name: name.to_string(), status };
        inner.users.insert(user.id.get(), user.clone());
        Ok(user)
    }

    fn update_user(&self, id: UserId, name: &str, status: UserStatus) -> anyhow::Result<User> {
        check_name(name)?;
        let mut inner = self.lock()?;
        if inner.name_taken(name, Some(id)) {
            return Err(StorageError::DuplicateUserName(name.to_string()).into());
        }
        let user = inner.users.get_mut(&id.get()).ok_or(StorageError::UserNotFound(id))?;
        user.name = name.to_string();
        user.status = status;
        Ok(user.clone())
    }

    fn remove_user(&self, id: UserId) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        Ok(inner.users.remove(&id.get()).is_some())
    }

    fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let inner = self.lock()?;
        Ok(inner.users.values().cloned().collect())
    }

    fn find_missions(&self, filter: &MissionFilter) -> anyhow::Result<Vec<Mission>> {
        let inner = self.lock()?;
        let mut out: Vec<Mission> = inner.missions.iter().filter(|m| filter.matches(m)).cloned().collect();
        out.sort_by_key(|m| m.id);
        Ok(out)
    }
}
