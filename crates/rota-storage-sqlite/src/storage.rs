use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rota_core::{Mission, MissionFilter, MissionId, MissionStatus, NewMission, User, UserId, UserStatus};
use rota_storage::{next_user, now_unix_micros, RotationView, Storage, StorageError};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const USER_COLS: &str = "id, name, status";
const MISSION_COLS: &str = "id, batch, customer, user_name, status, created_at, updated_at";

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::open_with_timeout(db_path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Another process holding the write lock is waited on for up to
    /// `busy_timeout` before a write fails.
    pub fn open_with_timeout(db_path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        conn.busy_timeout(busy_timeout)?;
        debug!(path = %db_path.display(), "opened mission database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).context("apply schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }

    fn user_from_row(r: &Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: UserId(r.get(0)?),
            name: r.get(1)?,
            status: UserStatus::parse(&r.get::<_, String>(2)?),
        })
    }

    fn mission_from_row(r: &Row<'_>) -> rusqlite::Result<Mission> {
        Ok(Mission {
            id: MissionId(r.get(0)?),
            batch: r.get(1)?,
            customer: r.get(2)?,
            user_name: r.get(3)?,
            status: MissionStatus::parse(&r.get::<_, String>(4)?),
            created_at_micros: r.get(5)?,
            updated_at_micros: r.get(6)?,
        })
    }

    fn query_users(conn: &Connection, where_sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLS} FROM users {where_sql} ORDER BY id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(args, Self::user_from_row)?;
        let mut users = vec![];
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    fn query_user(conn: &Connection, where_sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLS} FROM users {where_sql} ORDER BY id ASC LIMIT 1");
        Ok(conn.query_row(&sql, args, Self::user_from_row).optional()?)
    }

    fn insert_mission(conn: &Connection, mission: NewMission) -> Result<Mission> {
        let now = now_unix_micros();
        conn.execute(
            "INSERT INTO missions(batch, customer, user_name, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![mission.batch, mission.customer, mission.user_name, MissionStatus::OK, now],
        )
        .context("insert mission")?;
        Ok(Mission {
            id: MissionId(conn.last_insert_rowid()),
            batch: mission.batch,
            customer: mission.customer,
            user_name: mission.user_name,
            status: MissionStatus::Ok,
            created_at_micros: now,
            updated_at_micros: now,
        })
    }

    fn name_taken(conn: &Connection, name: &str, except: Option<UserId>) -> Result<bool> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(1) FROM users WHERE name=?1 AND id IS NOT ?2",
            params![name, except.map(UserId::get)],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StorageError::EmptyUserName.into());
    }
    Ok(())
}

/// Rotation reads over a borrowed connection, usable inside an open
/// transaction.
struct ConnView<'a>(&'a Connection);

impl RotationView for ConnView<'_> {
    fn first_active_user(&self) -> Result<Option<User>> {
        SqliteStorage::query_user(self.0, "WHERE status=?1", &[&UserStatus::Active.as_str()])
    }

    fn first_active_user_after(&self, id: UserId) -> Result<Option<User>> {
        SqliteStorage::query_user(self.0, "WHERE status=?1 AND id > ?2", &[&UserStatus::Active.as_str(), &id.get()])
    }

    fn user_by_name(&self, name: &str) -> Result<Option<User>> {
        SqliteStorage::query_user(self.0, "WHERE name=?1", &[&name])
    }

    fn most_recent_assignment(&self) -> Result<Option<Mission>> {
        let sql = format!(
            "SELECT {MISSION_COLS} FROM missions WHERE status=?1 ORDER BY updated_at DESC, id DESC LIMIT 1"
        );
        Ok(self.0.query_row(&sql, params![MissionStatus::OK], SqliteStorage::mission_from_row).optional()?)
    }
}

impl RotationView for SqliteStorage {
    fn first_active_user(&self) -> Result<Option<User>> {
        let conn = self.lock()?;
        ConnView(&conn).first_active_user()
    }

    fn first_active_user_after(&self, id: UserId) -> Result<Option<User>> {
        let conn = self.lock()?;
        ConnView(&conn).first_active_user_after(id)
    }

    fn user_by_name(&self, name: &str) -> Result<Option<User>> {
        let conn = self.lock()?;
        ConnView(&conn).user_by_name(name)
    }

    fn most_recent_assignment(&self) -> Result<Option<Mission>> {
        let conn = self.lock()?;
        ConnView(&conn).most_recent_assignment()
    }
}

impl Storage for SqliteStorage {
    fn active_users(&self) -> Result<Vec<User>> {
        let conn = self.lock()?;
        Self::query_users(&conn, "WHERE status=?1", &[&UserStatus::Active.as_str()])
    }

    fn create_mission(&self, mission: NewMission) -> Result<Mission> {
        let conn = self.lock()?;
        Self::insert_mission(&conn, mission)
    }

    /// `BEGIN IMMEDIATE` takes the database write lock before the selector
    /// reads, so a second process queues on the busy timeout instead of
    /// reading the same last assignee.
    fn assign_next(&self, batch: &str, customer: &str) -> Result<Option<Mission>> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("begin assignment transaction")?;
        let Some(user) = next_user(&ConnView(&tx))? else {
            return Ok(None);
        };
        let mission = Self::insert_mission(
            &tx,
            NewMission { batch: batch.to_string(), customer: customer.to_string(), user_name: user.name },
        )?;
        tx.commit().context("commit assignment")?;
        Ok(Some(mission))
    }

    fn add_user(&self, name: &str, status: UserStatus) -> Result<User> {
        check_name(name)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if Self::name_taken(&tx, name, None)? {
            return Err(StorageError::DuplicateUserName(name.to_string()).into());
        }
        let now = now_unix_micros();
        tx.execute(
            "INSERT INTO users(name, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![name, status.as_str(), now],
        )?;
        let id = UserId(tx.last_insert_rowid());
        tx.commit()?;
        Ok(User { id, name: name.to_string(), status })
    }

    fn update_user(&self, id: UserId, name: &str, status: UserStatus) -> Result<User> {
        check_name(name)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if Self::name_taken(&tx, name, Some(id))? {
            return Err(StorageError::DuplicateUserName(name.to_string()).into());
        }
        let changed = tx.execute(
            "UPDATE users SET name=?1, status=?2, updated_at=?3 WHERE id=?4",
            params![name, status.as_str(), now_unix_micros(), id.get()],
        )?;
        if changed == 0 {
            return Err(StorageError::UserNotFound(id).into());
        }
        tx.commit()?;
        Ok(User { id, name: name.to_string(), status })
    }

    fn remove_user(&self, id: UserId) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM users WHERE id=?1", params![id.get()])?;
        Ok(n > 0)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.lock()?;
        Self::query_users(&conn, "", &[])
    }

    fn find_missions(&self, filter: &MissionFilter) -> Result<Vec<Mission>> {
        let conn = self.lock()?;
        let mut clauses = vec![];
        let mut args: Vec<&str> = vec![];
        if let Some(b) = filter.batch.as_deref() {
            clauses.push("batch = ?");
            args.push(b);
        }
        if let Some(c) = filter.customer.as_deref() {
            clauses.push("customer = ?");
            args.push(c);
        }
        if let Some(u) = filter.user_name.as_deref() {
            clauses.push("user_name = ?");
            args.push(u);
        }

        let mut sql = format!("SELECT {MISSION_COLS} FROM missions");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id ASC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), Self::mission_from_row)?;
        let mut missions = vec![];
        for row in rows {
            missions.push(row?);
        }
        Ok(missions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_mission(customer: &str, user: &str) -> NewMission {
        NewMission { batch: "B1".into(), customer: customer.into(), user_name: user.into() }
    }

    #[test]
    fn sqlite_open_and_migrate() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("mission.db");
        let _ = SqliteStorage::open(&db_path).unwrap();
        // schema is idempotent
        let _ = SqliteStorage::open(&db_path).unwrap();
    }

    #[test]
    fn users_survive_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("mission.db");
        {
            let store = SqliteStorage::open(&db_path).unwrap();
            store.add_user("WU", UserStatus::Active).unwrap();
            store.add_user("LI", UserStatus::Inactive).unwrap();
        }
        let store = SqliteStorage::open(&db_path).unwrap();
        let users = store.list_users().unwrap();
        assert_eq!(users.iter().map(|u| u.name.as_str()).collect::<Vec<_>>(), vec!["WU", "LI"]);
        assert_eq!(store.active_users().unwrap().len(), 1);
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let a = store.add_user("A", UserStatus::Active).unwrap();
        let b = store.add_user("B", UserStatus::Active).unwrap();
        assert!(store.remove_user(b.id).unwrap());
        assert!(!store.remove_user(b.id).unwrap());
        let c = store.add_user("C", UserStatus::Active).unwrap();
        assert!(a.id < b.id && b.id < c.id);
    }

    #[test]
    fn first_active_after_is_strict() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let a = store.add_user("A", UserStatus::Active).unwrap();
        let b = store.add_user("B", UserStatus::Inactive).unwrap();
        let c = store.add_user("C", UserStatus::Active).unwrap();

        assert_eq!(store.first_active_user().unwrap(), Some(a.clone()));
        assert_eq!(store.first_active_user_after(a.id).unwrap(), Some(c.clone()));
        assert_eq!(store.first_active_user_after(b.id).unwrap(), Some(c.clone()));
        assert_eq!(store.first_active_user_after(c.id).unwrap(), None);
    }

    #[test]
    fn user_by_name_sees_inactive_users() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let li = store.add_user("LI", UserStatus::Inactive).unwrap();
        assert_eq!(store.user_by_name("LI").unwrap(), Some(li));
        assert_eq!(store.user_by_name("NOBODY").unwrap(), None);
    }

    #[test]
    fn duplicate_and_missing_users_are_rejected() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let wu = store.add_user("WU", UserStatus::Active).unwrap();
        let li = store.add_user("LI", UserStatus::Active).unwrap();

        let err = store.add_user("WU", UserStatus::Active).unwrap_err();
        assert_eq!(
            err.downcast_ref::<StorageError>(),
            Some(&StorageError::DuplicateUserName("WU".into()))
        );
        let err = store.update_user(li.id, "WU", UserStatus::Active).unwrap_err();
        assert!(matches!(err.downcast_ref::<StorageError>(), Some(StorageError::DuplicateUserName(_))));
        let err = store.update_user(UserId(404), "X", UserStatus::Active).unwrap_err();
        assert_eq!(err.downcast_ref::<StorageError>(), Some(&StorageError::UserNotFound(UserId(404))));
        let err = store.add_user("  ", UserStatus::Active).unwrap_err();
        assert_eq!(err.downcast_ref::<StorageError>(), Some(&StorageError::EmptyUserName));

        let wu = store.update_user(wu.id, "WU", UserStatus::Inactive).unwrap();
        assert_eq!(store.user_by_name("WU").unwrap(), Some(wu));
    }

    #[test]
    fn most_recent_prefers_latest_then_highest_id() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let m1 = store.create_mission(new_mission("C1", "WU")).unwrap();
        let m2 = store.create_mission(new_mission("C2", "LI")).unwrap();
        let m3 = store.create_mission(new_mission("C3", "WANG")).unwrap();
        {
            let conn = store.conn.lock().unwrap();
            // m1 newest on its own, then m2/m3 tie below it
            conn.execute("UPDATE missions SET updated_at=100 WHERE id IN (?1, ?2)", params![m2.id.get(), m3.id.get()])
                .unwrap();
            conn.execute("UPDATE missions SET updated_at=200 WHERE id=?1", params![m1.id.get()]).unwrap();
        }
        assert_eq!(store.most_recent_assignment().unwrap().map(|m| m.id), Some(m1.id));

        {
            let conn = store.conn.lock().unwrap();
            conn.execute("UPDATE missions SET updated_at=100", []).unwrap();
        }
        assert_eq!(store.most_recent_assignment().unwrap().map(|m| m.id), Some(m3.id));
    }

    #[test]
    fn most_recent_ignores_non_ok_rows() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let m1 = store.create_mission(new_mission("C1", "WU")).unwrap();
        let m2 = store.create_mission(new_mission("C2", "LI")).unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute("UPDATE missions SET status='void', updated_at=?1 WHERE id=?2", params![i64::MAX, m2.id.get()])
                .unwrap();
        }
        assert_eq!(store.most_recent_assignment().unwrap().map(|m| m.id), Some(m1.id));
        let all = store.find_missions(&MissionFilter::default()).unwrap();
        assert_eq!(all[1].status, MissionStatus::Other("void".into()));
    }

    #[test]
    fn find_missions_combines_filters() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store.create_mission(new_mission("C1", "WU")).unwrap();
        store.create_mission(new_mission("C2", "LI")).unwrap();
        store
            .create_mission(NewMission { batch: "B2".into(), customer: "C1".into(), user_name: "WU".into() })
            .unwrap();

        let f = MissionFilter { customer: Some("C1".into()), ..Default::default() };
        assert_eq!(store.find_missions(&f).unwrap().len(), 2);

        let f = MissionFilter { batch: Some("B2".into()), user_name: Some("WU".into()), ..Default::default() };
        let found = store.find_missions(&f).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].batch, "B2");

        let f = MissionFilter { user_name: Some("NOBODY".into()), ..Default::default() };
        assert!(store.find_missions(&f).unwrap().is_empty());
    }

    #[test]
    fn assign_next_is_atomic_across_handles() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("mission.db");
        {
            let store = SqliteStorage::open(&db_path).unwrap();
            for name in ["A", "B", "C"] {
                store.add_user(name, UserStatus::Active).unwrap();
            }
        }

        let workers: Vec<_> = (0..2)
            .map(|t| {
                let db_path = db_path.clone();
                std::thread::spawn(move || {
                    let store = SqliteStorage::open(&db_path).unwrap();
                    for i in 0..40 {
                        store.assign_next("B1", &format!("T{t}-{i}")).unwrap().unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let store = SqliteStorage::open(&db_path).unwrap();
        let missions = store.find_missions(&MissionFilter::default()).unwrap();
        assert_eq!(missions.len(), 80);
        let users = ["A", "B", "C"];
        for (k, m) in missions.iter().enumerate() {
            assert_eq!(m.user_name, users[k % 3], "mission {}", m.id);
        }
    }

    #[test]
    fn assign_next_without_active_users_writes_nothing() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store.add_user("A", UserStatus::Inactive).unwrap();
        assert_eq!(store.assign_next("B1", "C1").unwrap(), None);
        assert!(store.find_missions(&MissionFilter::default()).unwrap().is_empty());
    }
}
