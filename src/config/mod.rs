//! On-disk configuration for the voice service.
//!
//! Two files live under the configuration root: the device-identification
//! JSON (credentials for the cloud speech service) and the siren tuning
//! JSON consumed by the wake-word engine itself. Credentials are replayed
//! into the speech client on every connect; an incomplete credential set
//! makes [`VoiceConfig::apply`] fail so the connect is silently skipped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Device-identification file name under the configuration root.
pub const DEVICE_INFO_FILE: &str = "device_info.json";
/// Siren tuning file name under the configuration root.
pub const SIREN_TUNING_FILE: &str = "siren_tuning.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Contents of the device-identification file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_type_id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub secret: String,
    /// Unrecognized entries, forwarded opaquely to the speech client.
    #[serde(flatten)]
    pub extras: HashMap<String, String>,
}

impl DeviceInfo {
    /// All four credential fields are required for a connect to proceed.
    pub fn is_complete(&self) -> bool {
        !self.device_id.is_empty()
            && !self.device_type_id.is_empty()
            && !self.key.is_empty()
            && !self.secret.is_empty()
    }
}

/// Configuration store rooted in a per-locale working directory.
pub struct VoiceConfig {
    root: PathBuf,
    device: parking_lot::RwLock<DeviceInfo>,
    cloud_vad: AtomicBool,
}

impl VoiceConfig {
    /// Opens the configuration root and loads the device file when present.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let config = Self {
            root: root.into(),
            device: parking_lot::RwLock::new(DeviceInfo::default()),
            cloud_vad: AtomicBool::new(false),
        };
        if config.device_file().exists()
            && let Err(e) = config.load()
        {
            warn!(error = %e, "device config unreadable, starting unconfigured");
        }
        config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn device_file(&self) -> PathBuf {
        self.root.join(DEVICE_INFO_FILE)
    }

    /// Path of the siren tuning file, handed to the wake-word engine.
    pub fn siren_tuning_file(&self) -> PathBuf {
        self.root.join(SIREN_TUNING_FILE)
    }

    /// Re-reads the device file.
    pub fn load(&self) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(self.device_file())?;
        let info: DeviceInfo = serde_json::from_str(&raw)?;
        self.cloud_vad
            .store(truthy(info.extras.get("cloud_vad")), Ordering::Release);
        *self.device.write() = info;
        debug!("device config loaded");
        Ok(())
    }

    /// Persists new credentials, preserving unrecognized entries. Returns
    /// false when the file cannot be written.
    pub fn save_config(
        &self,
        device_id: &str,
        device_type_id: &str,
        key: &str,
        secret: &str,
    ) -> bool {
        let mut device = self.device.write();
        device.device_id = device_id.to_string();
        device.device_type_id = device_type_id.to_string();
        device.key = key.to_string();
        device.secret = secret.to_string();
        let serialized = match serde_json::to_string_pretty(&*device) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "device config not serializable");
                return false;
            }
        };
        if let Err(e) = std::fs::create_dir_all(&self.root) {
            warn!(error = %e, "config root not writable");
            return false;
        }
        if let Err(e) = std::fs::write(self.device_file(), serialized) {
            warn!(error = %e, "device config not persisted");
            return false;
        }
        debug!("device config saved");
        true
    }

    /// Replays credentials and extra entries through `f`. Returns false
    /// without calling `f` when the credential set is incomplete.
    pub fn apply<F: FnMut(&str, &str)>(&self, mut f: F) -> bool {
        let device = self.device.read().clone();
        if !device.is_complete() {
            debug!("credentials incomplete, nothing applied");
            return false;
        }
        f("device_id", &device.device_id);
        f("device_type_id", &device.device_type_id);
        f("key", &device.key);
        f("secret", &device.secret);
        for (key, value) in &device.extras {
            f(key, value);
        }
        true
    }

    /// Whether utterance segmentation happens server-side. When enabled the
    /// session manager does not close voice sessions on local VAD end.
    pub fn cloud_vad_enabled(&self) -> bool {
        self.cloud_vad.load(Ordering::Acquire)
    }

    pub fn set_cloud_vad(&self, enabled: bool) {
        self.cloud_vad.store(enabled, Ordering::Release);
    }
}

fn truthy(value: Option<&String>) -> bool {
    matches!(value.map(String::as_str), Some("1" | "true" | "enable"))
}
