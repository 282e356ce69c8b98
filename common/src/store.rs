use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    error::StoreError,
    settings::{DeviceSettings, SettingsField},
};

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Persistent storage the configuration document lives on.
pub trait StorageVolume {
    fn mount(&mut self) -> Result<(), StoreError>;

    fn exists(&self, path: &str) -> bool;

    fn read_all(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Replaces the whole file. On error the previous contents are left intact.
    fn write_all(&mut self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// A directory on the host filesystem.
#[derive(Debug, Clone)]
pub struct DirVolume {
    root: PathBuf,
    mounted: bool,
}

impl DirVolume {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounted: false,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl StorageVolume for DirVolume {
    fn mount(&mut self) -> Result<(), StoreError> {
        if self.mounted {
            return Ok(());
        }

        fs::create_dir_all(&self.root).map_err(|source| StoreError::Mount {
            root: self.root.display().to_string(),
            source,
        })?;
        self.mounted = true;
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.mounted && self.resolve(path).is_file()
    }

    fn read_all(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        if !self.mounted {
            return Err(StoreError::NotMounted);
        }

        let target = self.resolve(path);
        fs::read(&target).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
            _ => Self::io_error(&target, err),
        })
    }

    fn write_all(&mut self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        if !self.mounted {
            return Err(StoreError::NotMounted);
        }

        let target = self.resolve(path);
        let staging = target.with_extension("tmp");

        if let Err(err) = fs::write(&staging, bytes) {
            let _ = fs::remove_file(&staging);
            return Err(Self::io_error(&staging, err));
        }

        fs::rename(&staging, &target).map_err(|err| {
            let _ = fs::remove_file(&staging);
            Self::io_error(&target, err)
        })
    }
}

/// In-memory volume with injectable failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryVolume {
    files: BTreeMap<String, Vec<u8>>,
    mounted: bool,
    fail_mount: bool,
    fail_writes: bool,
    writes: usize,
}

impl MemoryVolume {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.to_string(), bytes.into());
        self
    }

    pub fn failing_mount(mut self) -> Self {
        self.fail_mount = true;
        self
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl StorageVolume for MemoryVolume {
    fn mount(&mut self) -> Result<(), StoreError> {
        if self.fail_mount {
            return Err(StoreError::Mount {
                root: "memory".to_string(),
                source: std::io::Error::other("mount refused"),
            });
        }
        self.mounted = true;
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.mounted && self.files.contains_key(path)
    }

    fn read_all(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        if !self.mounted {
            return Err(StoreError::NotMounted);
        }
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn write_all(&mut self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        if !self.mounted {
            return Err(StoreError::NotMounted);
        }
        if self.fail_writes {
            return Err(StoreError::Io {
                path: path.to_string(),
                source: std::io::Error::other("write refused"),
            });
        }
        self.files.insert(path.to_string(), bytes.to_vec());
        self.writes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigurationStore<V> {
    volume: V,
    path: String,
}

impl<V: StorageVolume> ConfigurationStore<V> {
    pub fn new(volume: V) -> Self {
        Self::with_path(volume, CONFIG_FILE_NAME)
    }

    pub fn with_path(volume: V, path: impl Into<String>) -> Self {
        Self {
            volume,
            path: path.into(),
        }
    }

    pub fn volume(&self) -> &V {
        &self.volume
    }

    pub fn volume_mut(&mut self) -> &mut V {
        &mut self.volume
    }

    pub fn into_volume(self) -> V {
        self.volume
    }

    /// Compiled-in defaults refined by the stored document, if any.
    pub fn load(&mut self) -> DeviceSettings {
        let mut settings = DeviceSettings::default();
        self.load_into(&mut settings);
        settings
    }

    /// Overlays the stored document onto `settings`. Any failure is logged
    /// and leaves `settings` untouched. Returns whether a document was applied.
    pub fn load_into(&mut self, settings: &mut DeviceSettings) -> bool {
        match self.try_load_into(settings) {
            Ok(applied) => applied,
            Err(err) => {
                warn!("keeping current settings, configuration load failed: {err}");
                false
            }
        }
    }

    pub fn try_load_into(&mut self, settings: &mut DeviceSettings) -> Result<bool, StoreError> {
        self.volume.mount()?;
        debug!("storage volume mounted");

        if !self.volume.exists(&self.path) {
            info!("no configuration document at `{}`; using defaults", self.path);
            return Ok(false);
        }

        let raw = self.volume.read_all(&self.path)?;
        let document = parse_document(&raw)?;
        apply_document(&document, settings);

        info!("configuration loaded from `{}`", self.path);
        Ok(true)
    }

    /// Best-effort persistence. Failures are logged and reported as `false`.
    pub fn save(&mut self, settings: &DeviceSettings) -> bool {
        match self.try_save(settings) {
            Ok(()) => true,
            Err(err) => {
                warn!("failed to save configuration: {err}");
                false
            }
        }
    }

    pub fn try_save(&mut self, settings: &DeviceSettings) -> Result<(), StoreError> {
        info!("saving configuration to `{}`", self.path);
        self.volume.mount()?;

        let payload = serde_json::to_vec_pretty(&Value::Object(to_document(settings)))
            .map_err(StoreError::Serialize)?;
        self.volume.write_all(&self.path, &payload)?;

        info!("configuration saved");
        Ok(())
    }
}

fn parse_document(raw: &[u8]) -> Result<Map<String, Value>, StoreError> {
    match serde_json::from_slice::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject),
    }
}

fn apply_document(document: &Map<String, Value>, settings: &mut DeviceSettings) {
    for field in SettingsField::ALL {
        match document.get(field.key()) {
            Some(Value::String(value)) => {
                settings.set(field, value);
            }
            Some(_) => debug!("ignoring non-text value for `{}`", field.key()),
            None => debug!("`{}` missing from document; keeping current value", field.key()),
        }
    }
}

fn to_document(settings: &DeviceSettings) -> Map<String, Value> {
    SettingsField::ALL
        .into_iter()
        .map(|field| (field.key().to_string(), Value::String(settings.get(field).to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::settings::MODE_KEY;

    fn custom_settings() -> DeviceSettings {
        let mut settings = DeviceSettings::default();
        settings.set(SettingsField::MqttServer, "broker.local");
        settings.set(SettingsField::MqttPort, "8883");
        settings.set(SettingsField::MqttClientId, "LivingRoom");
        settings.set(SettingsField::MqttUser, "fancoil");
        settings.set(SettingsField::MqttPass, "s3cret");
        settings.set(SettingsField::BaseTopic, "home/living/fancoil");
        settings.set(SettingsField::Mode, "Heat");
        settings.set(SettingsField::DeviceState, "Off");
        settings.set(SettingsField::DesiredTemperature, "21.5");
        settings
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut store = ConfigurationStore::new(MemoryVolume::new());
        let settings = custom_settings();

        assert!(store.save(&settings));

        assert_eq!(store.load(), settings);
    }

    #[test]
    fn oversized_values_are_truncated_on_both_paths() {
        let long_topic = format!("home/{}", "x".repeat(200));
        let document = format!(r#"{{"base_topic":"{long_topic}"}}"#);
        let mut store =
            ConfigurationStore::new(MemoryVolume::new().with_file(CONFIG_FILE_NAME, document));

        let loaded = store.load();
        let max_len = SettingsField::BaseTopic.max_len();
        assert_eq!(loaded.base_topic(), &long_topic[..max_len]);

        assert!(store.save(&loaded));
        assert_eq!(store.load().base_topic(), &long_topic[..max_len]);
    }

    #[test]
    fn missing_key_keeps_prior_value() {
        let mut document = to_document(&custom_settings());
        document.remove(MODE_KEY);
        let raw = serde_json::to_vec(&Value::Object(document)).unwrap();
        let mut store = ConfigurationStore::new(MemoryVolume::new().with_file(CONFIG_FILE_NAME, raw));

        let mut settings = DeviceSettings::default();
        settings.set(SettingsField::Mode, "Cool");
        assert!(store.load_into(&mut settings));

        let mut expected = custom_settings();
        expected.set(SettingsField::Mode, "Cool");
        assert_eq!(settings, expected);
    }

    #[test]
    fn malformed_document_keeps_defaults() {
        let mut store = ConfigurationStore::new(
            MemoryVolume::new().with_file(CONFIG_FILE_NAME, r#"{"mqtt_server": "half"#),
        );
        let mut settings = custom_settings();

        assert!(!store.load_into(&mut settings));
        assert_eq!(settings, custom_settings());
    }

    #[test]
    fn non_object_document_is_rejected() {
        let mut store =
            ConfigurationStore::new(MemoryVolume::new().with_file(CONFIG_FILE_NAME, "[1, 2]"));
        let mut settings = DeviceSettings::default();

        assert!(matches!(
            store.try_load_into(&mut settings),
            Err(StoreError::NotAnObject)
        ));
    }

    #[test]
    fn non_text_values_are_ignored() {
        let raw = r#"{"mqtt_port": 1884, "base_topic": null, "mode": "Fan"}"#;
        let mut store = ConfigurationStore::new(MemoryVolume::new().with_file(CONFIG_FILE_NAME, raw));

        let loaded = store.load();

        assert_eq!(loaded.mqtt_port(), Some(1883));
        assert_eq!(loaded.base_topic(), "flat/FanCoil");
        assert_eq!(loaded.mode(), "Fan");
    }

    #[test]
    fn unmountable_volume_falls_back_to_defaults() {
        let mut store = ConfigurationStore::new(MemoryVolume::new().failing_mount());

        assert_eq!(store.load(), DeviceSettings::default());
        assert!(!store.save(&custom_settings()));
    }

    #[test]
    fn failed_write_leaves_previous_document() {
        let mut store = ConfigurationStore::new(MemoryVolume::new());
        assert!(store.save(&custom_settings()));
        let before = store.volume().file(CONFIG_FILE_NAME).unwrap().to_vec();

        store.volume_mut().set_fail_writes(true);
        assert!(!store.save(&DeviceSettings::default()));

        assert_eq!(store.volume().file(CONFIG_FILE_NAME).unwrap(), &before[..]);
        assert_eq!(store.volume().writes(), 1);
    }

    #[test]
    fn document_holds_all_keys_as_text() {
        let document = to_document(&DeviceSettings::default());

        assert_eq!(document.len(), SettingsField::ALL.len());
        assert!(document.values().all(Value::is_string));
    }

    #[test]
    fn dir_volume_replaces_document_atomically() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let root = std::env::temp_dir().join(format!("fancoil-store-{}-{nanos}", std::process::id()));
        let mut store = ConfigurationStore::new(DirVolume::new(&root));

        assert_eq!(store.load(), DeviceSettings::default());
        assert!(store.save(&custom_settings()));
        assert!(root.join(CONFIG_FILE_NAME).is_file());
        assert!(!root.join("config.tmp").exists());

        let mut reopened = ConfigurationStore::new(DirVolume::new(&root));
        assert_eq!(reopened.load(), custom_settings());

        let _ = fs::remove_dir_all(&root);
    }
}
