//! SQLite persistence for users, SSH connections, target forwards, and
//! firewall rules. A single writer connection serializes all writes; the
//! store itself guarantees per-statement atomicity.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::info;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use crate::models::{Connection, FirewallRule, RuleKind, Statistics, TargetConnection, User};

// Timestamps are stored as TEXT in this format; reads fall back to RFC 3339
// for rows written by SQLite's CURRENT_TIMESTAMP or older builds.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT) {
        return Ok(parsed.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .with_context(|| format!("Unparseable timestamp '{value}'"))
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and create if needed) the store at `path`, then apply schema
    /// creation and idempotent column migrations.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| "Error creating database directory")?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .pragma("cache_size", "1000000");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| "Error opening database")?;
        let database = Database { pool };
        database.create_tables().await?;
        database.migrate_tables().await?;
        info!("Database initialized at {}", path.display());
        Ok(database)
    }

    async fn create_tables(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                username TEXT UNIQUE NOT NULL,
                password TEXT NOT NULL,
                created DATETIME DEFAULT CURRENT_TIMESTAMP,
                active BOOLEAN DEFAULT TRUE
            )",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                ip TEXT NOT NULL,
                connected_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                disconnected_at DATETIME,
                session_id TEXT UNIQUE,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS target_connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                connection_id INTEGER NOT NULL,
                target TEXT NOT NULL,
                connected_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                disconnected_at DATETIME,
                bytes_up INTEGER DEFAULT 0,
                bytes_down INTEGER DEFAULT 0,
                FOREIGN KEY (connection_id) REFERENCES connections(id)
            )",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS firewall_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                pattern TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT 1
            )",
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    // Bring older stores up to the current layout. Columns are added
    // check-then-add so reruns are no-ops, and legacy bytes_in/bytes_out
    // values are promoted into bytes_up/bytes_down where those are still zero.
    async fn migrate_tables(&self) -> Result<()> {
        self.add_column_if_missing("connections", "target", "TEXT NOT NULL DEFAULT ''")
            .await?;
        self.add_column_if_missing("connections", "bytes_up", "INTEGER DEFAULT 0")
            .await?;
        self.add_column_if_missing("connections", "bytes_down", "INTEGER DEFAULT 0")
            .await?;
        if self.column_exists("connections", "bytes_in").await? {
            sqlx::query("UPDATE connections SET bytes_up = bytes_in WHERE bytes_up = 0")
                .execute(&self.pool)
                .await?;
        }
        if self.column_exists("connections", "bytes_out").await? {
            sqlx::query("UPDATE connections SET bytes_down = bytes_out WHERE bytes_down = 0")
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
                .bind(table)
                .bind(column)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn add_column_if_missing(
        &self,
        table: &str,
        column: &str,
        definition: &str,
    ) -> Result<()> {
        if !self.column_exists(table, column).await? {
            sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))
                .execute(&self.pool)
                .await?;
            info!("Added column {column} to table {table}");
        }
        Ok(())
    }

    /// Insert a user unless the username is already taken. Returns whether a
    /// row was inserted; an existing username is not an error.
    pub async fn add_user(&self, user: &User) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(&user.username)
            .fetch_one(&mut *tx)
            .await?;
        if count > 0 {
            tx.commit().await?;
            return Ok(false);
        }
        sqlx::query(
            "INSERT INTO users (name, username, password, active, created) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.password)
        .bind(user.active)
        .bind(format_timestamp(user.created))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Create the bootstrap administrator when no such row exists yet.
    pub async fn ensure_default_user(&self) -> Result<()> {
        let default_user = User {
            id: 0,
            name: "Admin User".into(),
            username: "admin".into(),
            password: "admin123".into(),
            created: Utc::now(),
            active: true,
        };
        if self.add_user(&default_user).await? {
            info!("Default admin user created");
        }
        Ok(())
    }

    pub async fn get_user_by_name(&self, username: &str) -> Result<Option<User>> {
        sqlx::query(
            "SELECT id, name, username, password, created, active FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| "Failed to fetch user by name")?
        .map(|row| user_from_row(&row))
        .transpose()
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        sqlx::query("SELECT id, name, username, password, created, active FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| "Failed to fetch user by id")?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    /// Overwrite a user's mutable fields. The row is expected to exist.
    pub async fn update_user(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET name = ?, username = ?, password = ?, active = ? WHERE id = ?",
        )
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.password)
        .bind(user.active)
        .bind(user.id)
        .execute(&self.pool)
        .await
        .with_context(|| "Failed to update user")?;
        anyhow::ensure!(result.rows_affected() > 0, "User {} not found", user.id);
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        sqlx::query("SELECT id, name, username, password, created, active FROM users")
            .fetch_all(&self.pool)
            .await
            .with_context(|| "Failed to list users")?
            .iter()
            .map(user_from_row)
            .collect()
    }

    /// Insert an SSH connection record, returning the assigned id.
    pub async fn record_connection(&self, connection: &Connection) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO connections (user_id, username, ip, connected_at, session_id)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(connection.user_id)
        .bind(&connection.username)
        .bind(&connection.remote_addr)
        .bind(format_timestamp(connection.connected_at))
        .bind(&connection.session_id)
        .execute(&mut *tx)
        .await
        .with_context(|| "Failed to record connection")?;
        let id = result.last_insert_rowid();
        tx.commit().await?;
        Ok(id)
    }

    pub async fn connection_by_session_id(&self, session_id: &str) -> Result<Option<Connection>> {
        sqlx::query(
            "SELECT id, user_id, username, ip, connected_at, disconnected_at, session_id
             FROM connections WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| "Failed to fetch connection by session id")?
        .map(|row| connection_from_row(&row))
        .transpose()
    }

    /// Stamp the disconnect time for a session. Only a still-null column is
    /// written, so repeated calls keep the first timestamp.
    pub async fn update_connection_disconnect(
        &self,
        session_id: &str,
        disconnected_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE connections SET disconnected_at = ?
             WHERE session_id = ? AND disconnected_at IS NULL",
        )
        .bind(format_timestamp(disconnected_at))
        .bind(session_id)
        .execute(&self.pool)
        .await
        .with_context(|| "Failed to record connection disconnect")?;
        Ok(())
    }

    pub async fn list_connections(&self) -> Result<Vec<Connection>> {
        sqlx::query(
            "SELECT id, user_id, username, ip, connected_at, disconnected_at, session_id
             FROM connections ORDER BY connected_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .with_context(|| "Failed to list connections")?
        .iter()
        .map(connection_from_row)
        .collect()
    }

    pub async fn connections_by_user(&self, user_id: i64) -> Result<Vec<Connection>> {
        sqlx::query(
            "SELECT id, user_id, username, ip, connected_at, disconnected_at, session_id
             FROM connections WHERE user_id = ? ORDER BY connected_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| "Failed to list connections by user")?
        .iter()
        .map(connection_from_row)
        .collect()
    }

    /// Insert a target connection record, returning the assigned id.
    pub async fn record_target_connection(&self, target: &TargetConnection) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO target_connections (connection_id, target, connected_at, bytes_up, bytes_down)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(target.connection_id)
        .bind(&target.target)
        .bind(format_timestamp(target.connected_at))
        .bind(target.bytes_up)
        .bind(target.bytes_down)
        .execute(&mut *tx)
        .await
        .with_context(|| "Failed to record target connection")?;
        let id = result.last_insert_rowid();
        tx.commit().await?;
        Ok(id)
    }

    /// Overwrite the traffic counters with the supplied totals.
    pub async fn update_target_traffic(
        &self,
        target_id: i64,
        bytes_up: i64,
        bytes_down: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE target_connections SET bytes_up = ?, bytes_down = ? WHERE id = ?")
            .bind(bytes_up)
            .bind(bytes_down)
            .bind(target_id)
            .execute(&self.pool)
            .await
            .with_context(|| "Failed to update target traffic")?;
        Ok(())
    }

    pub async fn update_target_disconnect(
        &self,
        target_id: i64,
        disconnected_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE target_connections SET disconnected_at = ? WHERE id = ?")
            .bind(format_timestamp(disconnected_at))
            .bind(target_id)
            .execute(&self.pool)
            .await
            .with_context(|| "Failed to record target disconnect")?;
        Ok(())
    }

    pub async fn list_target_connections(&self) -> Result<Vec<TargetConnection>> {
        sqlx::query(
            "SELECT id, connection_id, target, connected_at, disconnected_at, bytes_up, bytes_down
             FROM target_connections ORDER BY connected_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .with_context(|| "Failed to list target connections")?
        .iter()
        .map(target_from_row)
        .collect()
    }

    pub async fn target_connections_by_user(&self, user_id: i64) -> Result<Vec<TargetConnection>> {
        sqlx::query(
            "SELECT tc.id, tc.connection_id, tc.target, tc.connected_at, tc.disconnected_at,
                    tc.bytes_up, tc.bytes_down
             FROM target_connections tc
             JOIN connections c ON tc.connection_id = c.id
             WHERE c.user_id = ?
             ORDER BY tc.connected_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| "Failed to list target connections by user")?
        .iter()
        .map(target_from_row)
        .collect()
    }

    pub async fn active_firewall_rules(&self) -> Result<Vec<FirewallRule>> {
        let rows = sqlx::query(
            "SELECT id, type, pattern, active FROM firewall_rules WHERE active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .with_context(|| "Failed to list firewall rules")?;
        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.try_get("type")?;
            let Some(kind) = RuleKind::parse(&kind) else {
                continue;
            };
            rules.push(FirewallRule {
                id: row.try_get("id")?,
                kind,
                pattern: row.try_get("pattern")?,
                active: row.try_get("active")?,
            });
        }
        Ok(rules)
    }

    pub async fn add_firewall_rule(&self, kind: RuleKind, pattern: &str) -> Result<()> {
        sqlx::query("INSERT INTO firewall_rules (type, pattern, active) VALUES (?, ?, 1)")
            .bind(kind.as_str())
            .bind(pattern)
            .execute(&self.pool)
            .await
            .with_context(|| "Failed to add firewall rule")?;
        Ok(())
    }

    pub async fn delete_firewall_rule(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM firewall_rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| "Failed to delete firewall rule")?;
        Ok(())
    }

    /// Totals for the stats page: all-time connection count, active users,
    /// and the traffic sums across every target connection.
    pub async fn statistics(&self) -> Result<Statistics> {
        let total_connections: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM connections")
            .fetch_one(&self.pool)
            .await?;
        let active_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE active = 1")
            .fetch_one(&self.pool)
            .await?;
        let total_traffic_up: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(bytes_up), 0) FROM target_connections")
                .fetch_one(&self.pool)
                .await?;
        let total_traffic_down: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(bytes_down), 0) FROM target_connections")
                .fetch_one(&self.pool)
                .await?;
        Ok(Statistics {
            total_connections,
            active_users,
            total_traffic_up,
            total_traffic_down,
        })
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        created: parse_timestamp(&row.try_get::<String, _>("created")?)?,
        active: row.try_get("active")?,
    })
}

fn connection_from_row(row: &SqliteRow) -> Result<Connection> {
    Ok(Connection {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        remote_addr: row.try_get("ip")?,
        connected_at: parse_timestamp(&row.try_get::<String, _>("connected_at")?)?,
        disconnected_at: parse_optional_timestamp(row.try_get("disconnected_at")?)?,
        session_id: row.try_get::<Option<String>, _>("session_id")?.unwrap_or_default(),
    })
}

fn target_from_row(row: &SqliteRow) -> Result<TargetConnection> {
    Ok(TargetConnection {
        id: row.try_get("id")?,
        connection_id: row.try_get("connection_id")?,
        target: row.try_get("target")?,
        connected_at: parse_timestamp(&row.try_get::<String, _>("connected_at")?)?,
        disconnected_at: parse_optional_timestamp(row.try_get("disconnected_at")?)?,
        bytes_up: row.try_get("bytes_up")?,
        bytes_down: row.try_get("bytes_down")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::SqlitePool;

    use super::{Database, parse_timestamp};
    use crate::models::{Connection, RuleKind, TargetConnection, User};

    fn sample_user(username: &str) -> User {
        User {
            id: 0,
            name: "Sample".into(),
            username: username.into(),
            password: "secret".into(),
            created: Utc::now(),
            active: true,
        }
    }

    fn sample_connection(user_id: i64, session_id: &str) -> Connection {
        Connection {
            id: 0,
            user_id,
            username: "sample".into(),
            remote_addr: "127.0.0.1:50000".into(),
            connected_at: Utc::now(),
            disconnected_at: None,
            session_id: session_id.into(),
        }
    }

    async fn open_database(dir: &tempfile::TempDir) -> Database {
        Database::connect(&dir.path().join("test.db"))
            .await
            .expect("database setup failed")
    }

    #[tokio::test]
    async fn add_user_is_idempotent_on_username() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_database(&dir).await;
        assert!(db.add_user(&sample_user("alice")).await.unwrap());
        assert!(!db.add_user(&sample_user("alice")).await.unwrap());
        let users = db.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "alice");
    }

    #[tokio::test]
    async fn fetches_and_updates_users() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_database(&dir).await;
        db.add_user(&sample_user("bob")).await.unwrap();
        let mut user = db.get_user_by_name("bob").await.unwrap().expect("bob exists");
        assert!(user.active);
        user.active = false;
        db.update_user(&user).await.unwrap();
        let reread = db.get_user_by_id(user.id).await.unwrap().unwrap();
        assert!(!reread.active);
        assert!(db.get_user_by_name("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disconnect_stamp_keeps_first_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_database(&dir).await;
        db.add_user(&sample_user("carol")).await.unwrap();
        let user = db.get_user_by_name("carol").await.unwrap().unwrap();
        let id = db
            .record_connection(&sample_connection(user.id, "session-1"))
            .await
            .unwrap();
        assert!(id > 0);

        let first = Utc::now();
        db.update_connection_disconnect("session-1", first).await.unwrap();
        db.update_connection_disconnect("session-1", first + Duration::hours(1))
            .await
            .unwrap();
        let connection = db
            .connection_by_session_id("session-1")
            .await
            .unwrap()
            .unwrap();
        let stamped = connection.disconnected_at.expect("disconnect stamped");
        assert_eq!(stamped.timestamp(), first.timestamp());
    }

    #[tokio::test]
    async fn records_target_traffic_and_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_database(&dir).await;
        db.add_user(&sample_user("dave")).await.unwrap();
        let user = db.get_user_by_name("dave").await.unwrap().unwrap();
        let connection_id = db
            .record_connection(&sample_connection(user.id, "session-2"))
            .await
            .unwrap();

        let target = TargetConnection {
            id: 0,
            connection_id,
            target: "example.com:443".into(),
            connected_at: Utc::now(),
            disconnected_at: None,
            bytes_up: 0,
            bytes_down: 0,
        };
        let target_id = db.record_target_connection(&target).await.unwrap();
        db.update_target_traffic(target_id, 100, 200).await.unwrap();
        db.update_target_disconnect(target_id, Utc::now()).await.unwrap();

        let targets = db.target_connections_by_user(user.id).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].bytes_up, 100);
        assert_eq!(targets[0].bytes_down, 200);
        assert!(targets[0].disconnected_at.is_some());

        let stats = db.statistics().await.unwrap();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.active_users, 1);
        assert_eq!(stats.total_traffic_up, 100);
        assert_eq!(stats.total_traffic_down, 200);
    }

    #[tokio::test]
    async fn migration_promotes_legacy_traffic_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let options = SqliteConnectOptions::new()
                .filename(&path)
                .create_if_missing(true);
            let pool = SqlitePool::connect_with(options).await.unwrap();
            sqlx::query(
                "CREATE TABLE connections (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    username TEXT NOT NULL,
                    ip TEXT NOT NULL,
                    connected_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    disconnected_at DATETIME,
                    session_id TEXT UNIQUE,
                    bytes_in INTEGER DEFAULT 0,
                    bytes_out INTEGER DEFAULT 0
                )",
            )
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query(
                "INSERT INTO connections (user_id, username, ip, session_id, bytes_in, bytes_out)
                 VALUES (1, 'legacy', '10.0.0.1:4', 'legacy-session', 5, 7)",
            )
            .execute(&pool)
            .await
            .unwrap();
            pool.close().await;
        }

        let db = Database::connect(&path).await.unwrap();
        assert!(db.column_exists("connections", "bytes_up").await.unwrap());
        let (bytes_up, bytes_down): (i64, i64) = sqlx::query_as(
            "SELECT bytes_up, bytes_down FROM connections WHERE session_id = 'legacy-session'",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(bytes_up, 5);
        assert_eq!(bytes_down, 7);
    }

    #[tokio::test]
    async fn firewall_rules_filter_inactive_and_parse_legacy_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_database(&dir).await;
        db.add_firewall_rule(RuleKind::Allow, "^example\\.com:443$")
            .await
            .unwrap();
        sqlx::query("INSERT INTO firewall_rules (type, pattern, active) VALUES ('blacklist', ':22$', 1)")
            .execute(&db.pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO firewall_rules (type, pattern, active) VALUES ('deny', ':23$', 0)")
            .execute(&db.pool)
            .await
            .unwrap();

        let rules = db.active_firewall_rules().await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].kind, RuleKind::Allow);
        assert_eq!(rules[1].kind, RuleKind::Deny);

        db.delete_firewall_rule(rules[0].id).await.unwrap();
        assert_eq!(db.active_firewall_rules().await.unwrap().len(), 1);
    }

    #[test]
    fn parses_both_timestamp_formats() {
        let primary = parse_timestamp("2024-03-05 10:20:30").unwrap();
        assert_eq!(primary.to_rfc3339(), "2024-03-05T10:20:30+00:00");
        let fallback = parse_timestamp("2024-03-05T10:20:30Z").unwrap();
        assert_eq!(primary, fallback);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
