//! Append-only JSONL session history

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::types::Session;
use crate::common::errors::{DcaError, Result};
use crate::common::traits::SessionStore;

/// One `sessions-YYYY-MM-DD.jsonl` file per UTC day, one session per line
#[derive(Debug, Clone)]
pub struct JsonlSessionStore {
    dir: PathBuf,
}

impl JsonlSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("sessions-{}.jsonl", day.format("%Y-%m-%d")))
    }

    /// Every session recorded on `day`, oldest first
    ///
    /// Unparseable lines are skipped with a warning.
    pub async fn read_day(&self, day: NaiveDate) -> Result<Vec<Session>> {
        let path = self.path_for(day);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        for (line_no, line) in raw.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            match serde_json::from_str::<Session>(line) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!("Skipping {}:{}: {}", path.display(), line_no + 1, e),
            }
        }
        Ok(sessions)
    }

    /// Plan text of the most recent session that reached a decision
    ///
    /// Looks at today's and yesterday's files only.
    pub async fn latest_plan(&self) -> Result<Option<String>> {
        let today = Utc::now().date_naive();
        for day in [today, today - Duration::days(1)] {
            let sessions = self.read_day(day).await?;
            if let Some(plan) = sessions
                .iter()
                .rev()
                .find_map(|s| s.decision.as_ref().map(|d| d.plan.clone()))
            {
                return Ok(Some(plan));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl SessionStore for JsonlSessionStore {
    async fn append(&self, session: &Session) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(session.timestamp.date_naive());
        let mut line = serde_json::to_string(session)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| DcaError::Persistence(format!("{}: {}", path.display(), e)))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Session {} appended to {}", session.id, path.display());
        Ok(())
    }
}
