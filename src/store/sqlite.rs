use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params, params_from_iter};
use rusqlite_migration::{M, Migrations};

use super::{
    ResourceRecord, ResourceStore, Snowflake, StoreError, UserRecord, UserStore, valid_username,
};

/// SQLite parameter limit is 999 on older builds; stay well under it.
const PATHS_PER_QUERY: usize = 500;

/// SQLite-backed store. Every statement runs on the blocking pool against a
/// single shared connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    ids: Arc<Snowflake>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and migrates it.
    /// `:memory:` opens a private in-memory database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if path.as_os_str() == ":memory:" {
            return Self::in_memory();
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(mut conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);
        migrations.to_latest(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ids: Arc::new(Snowflake::random()),
        })
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &Snowflake) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let ids = Arc::clone(&self.ids);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut conn, &ids)
        })
        .await?
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> Option<String> {
    time.map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn parse_time(value: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|err| StoreError::Corrupt(format!("timestamp {s:?}: {err}")))
        })
        .transpose()
}

fn to_sql_id(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::Corrupt(format!("id {id} exceeds 63 bits")))
}

fn from_sql_id(id: i64) -> Result<u64, StoreError> {
    u64::try_from(id).map_err(|_| StoreError::Corrupt(format!("negative id {id}")))
}

type RawResource = (i64, String, bool, bool, Option<String>, Option<String>);

fn raw_resource(row: &Row<'_>) -> rusqlite::Result<RawResource> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn resource_from_raw(raw: RawResource) -> Result<ResourceRecord, StoreError> {
    let (user_id, path, hidden, starred, view_time, read_time) = raw;
    Ok(ResourceRecord {
        user_id: from_sql_id(user_id)?,
        path,
        hidden,
        starred,
        view_time: parse_time(view_time)?,
        read_time: parse_time(read_time)?,
    })
}

fn raw_user(row: &Row<'_>) -> rusqlite::Result<(i64, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn user_from_raw((id, name, password_hash): (i64, String, String)) -> Result<UserRecord, StoreError> {
    Ok(UserRecord {
        id: from_sql_id(id)?,
        name,
        password_hash,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

const RESOURCE_COLUMNS: &str = "user_id, path, hidden, starred, view_time, read_time";
const USER_COLUMNS: &str = "id, name, password_hash";

#[async_trait]
impl ResourceStore for SqliteStore {
    async fn list_resources(
        &self,
        user_id: u64,
        paths: &[String],
    ) -> Result<Vec<ResourceRecord>, StoreError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let user_id = to_sql_id(user_id)?;
        let paths = paths.to_vec();
        self.run(move |conn, _| {
            let mut out = Vec::with_capacity(paths.len());
            for chunk in paths.chunks(PATHS_PER_QUERY) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let sql = format!(
                    "SELECT {RESOURCE_COLUMNS} FROM resources WHERE user_id = ? AND path IN ({placeholders})"
                );
                let mut values = Vec::with_capacity(chunk.len() + 1);
                values.push(Value::Integer(user_id));
                values.extend(chunk.iter().cloned().map(Value::Text));

                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(params_from_iter(values), raw_resource)?;
                for row in rows {
                    out.push(resource_from_raw(row?)?);
                }
            }
            Ok(out)
        })
        .await
    }

    async fn get_resource(&self, user_id: u64, path: &str) -> Result<ResourceRecord, StoreError> {
        let user_id = to_sql_id(user_id)?;
        let path = path.to_owned();
        self.run(move |conn, _| {
            let raw = conn
                .query_row(
                    &format!(
                        "SELECT {RESOURCE_COLUMNS} FROM resources WHERE user_id = ?1 AND path = ?2"
                    ),
                    params![user_id, path],
                    raw_resource,
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;
            resource_from_raw(raw)
        })
        .await
    }

    async fn upsert_resource(&self, resource: &ResourceRecord) -> Result<(), StoreError> {
        let user_id = to_sql_id(resource.user_id)?;
        let resource = resource.clone();
        self.run(move |conn, _| {
            conn.execute(
                "INSERT INTO resources (user_id, path, hidden, starred, view_time, read_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (user_id, path) DO UPDATE SET
                    hidden = excluded.hidden,
                    starred = excluded.starred,
                    view_time = excluded.view_time,
                    read_time = excluded.read_time",
                params![
                    user_id,
                    resource.path,
                    resource.hidden,
                    resource.starred,
                    format_time(resource.view_time),
                    format_time(resource.read_time),
                ],
            )
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    // Foreign key: the user does not exist.
                    StoreError::NotFound
                } else {
                    err.into()
                }
            })?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn list_users(&self, after_name: &str, limit: u32) -> Result<Vec<UserRecord>, StoreError> {
        let after_name = after_name.to_owned();
        self.run(move |conn, _| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE name > ?1 ORDER BY name LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![after_name, limit], raw_user)?;
            rows.map(|row| user_from_raw(row?)).collect()
        })
        .await
    }

    async fn get_user(&self, user_id: u64) -> Result<UserRecord, StoreError> {
        let user_id = to_sql_id(user_id)?;
        self.run(move |conn, _| {
            let raw = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                    params![user_id],
                    raw_user,
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;
            user_from_raw(raw)
        })
        .await
    }

    async fn get_user_by_name(&self, name: &str) -> Result<UserRecord, StoreError> {
        let name = name.to_owned();
        self.run(move |conn, _| {
            let raw = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE name = ?1"),
                    params![name],
                    raw_user,
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;
            user_from_raw(raw)
        })
        .await
    }

    async fn upsert_user(&self, user: &UserRecord) -> Result<UserRecord, StoreError> {
        if !valid_username(&user.name) {
            return Err(StoreError::InvalidUsername);
        }
        let mut user = user.clone();
        self.run(move |conn, ids| {
            if user.id == 0 {
                user.id = ids.next_id();
            }
            conn.execute(
                "INSERT INTO users (id, name, password_hash) VALUES (?1, ?2, ?3)
                 ON CONFLICT (id) DO UPDATE SET
                    name = excluded.name,
                    password_hash = excluded.password_hash",
                params![to_sql_id(user.id)?, user.name, user.password_hash],
            )
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    StoreError::AlreadyExists
                } else {
                    err.into()
                }
            })?;
            Ok(user)
        })
        .await
    }

    async fn delete_user(&self, user_id: u64) -> Result<(), StoreError> {
        let user_id = to_sql_id(user_id)?;
        self.run(move |conn, _| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
            if deleted == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }
}
