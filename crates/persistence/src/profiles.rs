//! Voice profile store
//!
//! Named pitch/speed/model presets. A "Default" profile is created on first
//! use so the app always has an active voice.

use async_trait::async_trait;
use note_reader_core::VoiceProfile;

use crate::{LocalDatabase, PersistenceError};

/// Voice profile store
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn save(&self, profile: &VoiceProfile) -> Result<i64, PersistenceError>;
    async fn get_by_name(&self, name: &str) -> Result<Option<VoiceProfile>, PersistenceError>;
    async fn update(&self, profile: &VoiceProfile) -> Result<(), PersistenceError>;
    async fn list(&self) -> Result<Vec<VoiceProfile>, PersistenceError>;
    async fn delete(&self, id: i64) -> Result<(), PersistenceError>;

    /// Load a profile by name, creating the default profile if it is
    /// missing
    async fn load_or_default(&self, name: &str) -> Result<VoiceProfile, PersistenceError>;
}

/// SQLite-backed profile store
#[derive(Clone)]
pub struct LibsqlProfiles {
    db: LocalDatabase,
}

impl LibsqlProfiles {
    pub fn new(db: LocalDatabase) -> Self {
        Self { db }
    }

    fn profile_from_row(row: &libsql::Row) -> Result<VoiceProfile, PersistenceError> {
        Ok(VoiceProfile {
            id: row.get::<i64>(0)?,
            name: row.get::<String>(1)?,
            pitch: row.get::<f64>(2)?,
            speed: row.get::<f64>(3)?,
            model: row.get::<String>(4)?,
        })
    }
}

#[async_trait]
impl ProfileStore for LibsqlProfiles {
    async fn save(&self, profile: &VoiceProfile) -> Result<i64, PersistenceError> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO profiles (profile_name, pitch, speed, model) VALUES (?, ?, ?, ?)",
            libsql::params![
                profile.name.as_str(),
                profile.pitch,
                profile.speed,
                profile.model.as_str(),
            ],
        )
        .await?;
        let id = conn.last_insert_rowid();
        tracing::debug!(id, name = %profile.name, "voice profile saved");
        Ok(id)
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<VoiceProfile>, PersistenceError> {
        let conn = self.db.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, profile_name, pitch, speed, model FROM profiles WHERE profile_name = ?",
                libsql::params![name],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::profile_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, profile: &VoiceProfile) -> Result<(), PersistenceError> {
        let conn = self.db.conn()?;
        let changed = conn
            .execute(
                "UPDATE profiles SET profile_name = ?, pitch = ?, speed = ?, model = ? WHERE id = ?",
                libsql::params![
                    profile.name.as_str(),
                    profile.pitch,
                    profile.speed,
                    profile.model.as_str(),
                    profile.id,
                ],
            )
            .await?;
        if changed == 0 {
            return Err(PersistenceError::NotFound(profile.id));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<VoiceProfile>, PersistenceError> {
        let conn = self.db.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, profile_name, pitch, speed, model FROM profiles ORDER BY profile_name",
                (),
            )
            .await?;
        let mut profiles = Vec::new();
        while let Some(row) = rows.next().await? {
            profiles.push(Self::profile_from_row(&row)?);
        }
        Ok(profiles)
    }

    async fn delete(&self, id: i64) -> Result<(), PersistenceError> {
        let conn = self.db.conn()?;
        let changed = conn
            .execute("DELETE FROM profiles WHERE id = ?", libsql::params![id])
            .await?;
        if changed == 0 {
            return Err(PersistenceError::NotFound(id));
        }
        Ok(())
    }

    async fn load_or_default(&self, name: &str) -> Result<VoiceProfile, PersistenceError> {
        if let Some(profile) = self.get_by_name(name).await? {
            return Ok(profile);
        }
        let mut profile = VoiceProfile::default_profile();
        tracing::info!(name = %profile.name, "creating default voice profile");
        profile.id = self.save(&profile).await?;
        Ok(profile)
    }
}
