use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;

pub const MAX_HISTORY_ENTRIES: usize = 500;

/// One evaluated telemetry sample; the latest is what `/state` serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub temperature: f32,
    pub presence: bool,
    pub fan: bool,
    pub light: bool,
    pub current_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSettings {
    pub user_temp: f32,
    pub user_light: String,
    pub light_time_off: String,
}

#[derive(Clone)]
pub struct AppStore {
    history_path: Arc<PathBuf>,
    settings_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl AppStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            history_path: Arc::new(data_dir.join("history.json")),
            settings_path: Arc::new(data_dir.join("settings.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load_history(&self) -> anyhow::Result<Vec<StateEntry>> {
        let _guard = self.lock.lock().await;
        Ok(read_json(&self.history_path).await?.unwrap_or_default())
    }

    pub async fn save_history(&self, history: &[StateEntry]) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        write_json(&self.history_path, history).await
    }

    pub async fn load_settings(&self) -> anyhow::Result<Option<StoredSettings>> {
        let _guard = self.lock.lock().await;
        read_json(&self.settings_path).await
    }

    pub async fn save_settings(&self, settings: &StoredSettings) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        write_json(&self.settings_path, settings).await
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(Some(serde_json::from_slice::<T>(&raw)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, payload).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("smarthub-store-{name}-{}", std::process::id()))
    }

    #[tokio::test]
    async fn missing_files_load_as_empty() {
        let store = AppStore::new(&scratch_dir("empty"));

        assert!(store.load_history().await.unwrap().is_empty());
        assert_eq!(store.load_settings().await.unwrap(), None);
    }

    #[tokio::test]
    async fn persists_settings_and_history() {
        let dir = scratch_dir("persist");
        let store = AppStore::new(&dir);
        let settings = StoredSettings {
            user_temp: 27.0,
            user_light: "18:00:00".to_string(),
            light_time_off: "22:00:00".to_string(),
        };
        let entry = StateEntry {
            temperature: 29.5,
            presence: true,
            fan: true,
            light: false,
            current_time: "2026-01-05 08:00:00.000000".to_string(),
        };

        store.save_settings(&settings).await.unwrap();
        store.save_history(&[entry.clone()]).await.unwrap();

        let reopened = AppStore::new(&dir);
        assert_eq!(reopened.load_settings().await.unwrap(), Some(settings));
        assert_eq!(reopened.load_history().await.unwrap(), vec![entry]);

        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
