//! Device attributes reported with the user state.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Static and slowly-changing facts about the device and host app.
///
/// Supplied by the host platform when the SDK is initialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// Device type code (1 = Android/FCM, 2 = Amazon/ADM).
    pub device_type: i32,
    pub device_os: String,
    pub device_model: String,
    pub language: String,
    /// UTC offset in seconds, including DST.
    pub timezone_offset: i32,
    pub package_name: String,
    pub app_version: Option<i64>,
    pub ad_id: Option<String>,
    pub net_type: Option<i32>,
    pub carrier: Option<String>,
    pub rooted: bool,
    /// Installed package names; only fingerprints on the remote allow-list are reported.
    #[serde(skip)]
    pub installed_packages: Vec<String>,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            device_type: 1,
            device_os: String::new(),
            device_model: String::new(),
            language: "en".to_string(),
            timezone_offset: 0,
            package_name: String::new(),
            app_version: None,
            ad_id: None,
            net_type: None,
            carrier: None,
            rooted: false,
            installed_packages: Vec::new(),
        }
    }
}

/// Fingerprint a package name the way the allow-list keys are computed
/// (base64 of the SHA-256 digest).
pub fn package_fingerprint(package_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(package_name.as_bytes());
    STANDARD.encode(hasher.finalize())
}
