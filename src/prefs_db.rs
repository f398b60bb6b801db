use std::error::Error;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Transaction};

/* Small local settings store. Everything user-data lives in the hosted
backend; the only thing kept on device is a handful of preferences that must
survive app restarts (voice mute, guardian display mode). */

fn open_db_and_run_migration(
    support_dir: &str,
    file_name: &str,
    migrations: &[&dyn Fn(&Transaction) -> Result<()>],
) -> Result<Connection> {
    debug!("open and run migration for {}", file_name);
    let mut conn = Connection::open(Path::new(support_dir).join(file_name))?;
    let tx = conn.transaction()?;

    tx.execute(
        "CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY NOT NULL UNIQUE, value TEXT);",
        (),
    )?;
    let version: usize = tx
        .query_row(
            "SELECT value FROM metadata WHERE key = 'version';",
            (),
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .map(|v| v.parse())
        .transpose()?
        .unwrap_or(0);

    let target_version = migrations.len();
    if version > target_version {
        bail!(
            "version too high: current version = {}, target_version = {}",
            version,
            target_version
        );
    }
    for (i, migration) in migrations.iter().enumerate().skip(version) {
        info!("running migration for version: {}", i + 1);
        migration(&tx)?;
    }
    tx.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('version', ?1);",
        (target_version.to_string(),),
    )?;
    tx.commit()?;
    Ok(conn)
}

pub struct PrefsDb {
    conn: Connection,
}

impl PrefsDb {
    pub fn open(support_dir: &str) -> Result<PrefsDb> {
        let conn = open_db_and_run_migration(
            support_dir,
            "prefs.db",
            &[&|tx| {
                tx.execute(
                    "CREATE TABLE setting (
                        key   TEXT PRIMARY KEY NOT NULL UNIQUE,
                        value TEXT
                    );",
                    (),
                )?;
                Ok(())
            }],
        )?;
        Ok(PrefsDb { conn })
    }

    fn get_setting<T: FromStr>(&mut self, setting: Setting) -> Result<Option<T>>
    where
        <T as FromStr>::Err: Error + Send + Sync + 'static,
    {
        let result: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM setting WHERE key = ?1;",
                [setting.to_db_key()],
                |row| row.get(0),
            )
            .optional()?;
        match result {
            None => Ok(None),
            Some(s) => {
                let v = FromStr::from_str(&s)?;
                Ok(Some(v))
            }
        }
    }

    pub fn get_setting_with_default<T: FromStr>(&mut self, setting: Setting, default: T) -> T
    where
        <T as FromStr>::Err: Error + Send + Sync + 'static,
    {
        match self.get_setting(setting) {
            Ok(v) => v,
            Err(error) => {
                warn!(
                    "[prefs_db.get_setting_with_default] setting:{:?}, error:{}",
                    setting, error
                );
                None
            }
        }
        .unwrap_or(default)
    }

    pub fn set_setting<T: ToString>(&mut self, setting: Setting, value: T) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO setting (key, value) VALUES (?1, ?2);",
            (setting.to_db_key(), value.to_string()),
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Setting {
    VoiceMuted,
    DisplayMode,
}

impl Setting {
    fn to_db_key(self) -> &'static str {
        match self {
            Self::VoiceMuted => "VOICE_MUTED",
            Self::DisplayMode => "DISPLAY_MODE",
        }
    }
}
