use rota_core::{Mission, MissionFilter, NewMission, User, UserId, UserStatus};

/// The reads the rotation is derived from. Lookups that find nothing return
/// `Ok(None)`; errors are reserved for the store itself failing.
pub trait RotationView {
    fn first_active_user(&self) -> anyhow::Result<Option<User>>;
    /// First active user with an id strictly greater than `id`.
    fn first_active_user_after(&self, id: UserId) -> anyhow::Result<Option<User>>;
    /// Lowest-id user carrying `name`, whatever its status.
    fn user_by_name(&self, name: &str) -> anyhow::Result<Option<User>>;
    /// `ok` mission with the latest update time; ties go to the highest id.
    fn most_recent_assignment(&self) -> anyhow::Result<Option<Mission>>;
}

/// Durable users and missions.
pub trait Storage: RotationView + Send + Sync {
    /// Active users, ascending by id.
    fn active_users(&self) -> anyhow::Result<Vec<User>>;
    fn create_mission(&self, mission: NewMission) -> anyhow::Result<Mission>;

    /// Pick the next user in rotation and record a mission for them as one
    /// atomic step, so writers on other handles or processes cannot read the
    /// same last assignee in between. `None` when no user is active.
    fn assign_next(&self, batch: &str, customer: &str) -> anyhow::Result<Option<Mission>>;

    fn add_user(&self, name: &str, status: UserStatus) -> anyhow::Result<User>;
    fn update_user(&self, id: UserId, name: &str, status: UserStatus) -> anyhow::Result<User>;
    /// Returns whether a row was removed.
    fn remove_user(&self, id: UserId) -> anyhow::Result<bool>;
    fn list_users(&self) -> anyhow::Result<Vec<User>>;

    fn find_missions(&self, filter: &MissionFilter) -> anyhow::Result<Vec<Mission>>;
}
