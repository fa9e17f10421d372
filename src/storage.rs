use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::models::{Session, User};
use crate::error::ChatError;

pub const TOKEN_KEY: &str = "authToken";
pub const USER_KEY: &str = "currentUser";

fn default_db_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "imtt", "IMTT")?;
    Some(proj.data_dir().join("session.sqlite"))
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Durable key-value storage for the login token and the cached user profile.
#[derive(Debug, Clone)]
pub struct SessionStorage {
    path: PathBuf,
}

impl SessionStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ChatError> {
        let storage = Self { path: path.into() };
        storage.init()?;
        Ok(storage)
    }

    /// Storage in the platform data directory.
    pub fn open_default() -> Result<Self, ChatError> {
        let path = default_db_path().ok_or_else(|| rusqlite::Error::InvalidPath("no data dir".into()))?;
        Self::open(path)
    }

    fn open_conn(&self) -> rusqlite::Result<Connection> {
        let _ = ensure_dir(&self.path);
        Connection::open(&self.path)
    }

    fn init(&self) -> rusqlite::Result<()> {
        let conn = self.open_conn()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, ChatError> {
        let conn = self.open_conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), ChatError> {
        let now: DateTime<Utc> = Utc::now();
        let conn = self.open_conn()?;
        conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value=excluded.value,
                updated_at=excluded.updated_at
            "#,
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), ChatError> {
        let conn = self.open_conn()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn save_session(&self, session: &Session) -> Result<(), ChatError> {
        self.set(TOKEN_KEY, &session.token)?;
        self.save_user(&session.user)
    }

    pub fn save_user(&self, user: &User) -> Result<(), ChatError> {
        self.set(USER_KEY, &serde_json::to_string(user)?)
    }

    pub fn token(&self) -> Result<Option<String>, ChatError> {
        self.get(TOKEN_KEY)
    }

    /// The cached profile. A corrupt entry reads as absent.
    pub fn user(&self) -> Result<Option<User>, ChatError> {
        Ok(self.get(USER_KEY)?.and_then(|raw| serde_json::from_str(&raw).ok()))
    }

    pub fn clear(&self) -> Result<(), ChatError> {
        self.remove(TOKEN_KEY)?;
        self.remove(USER_KEY)
    }
}
