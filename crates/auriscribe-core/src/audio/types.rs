//! Core audio types used throughout the audio module.

use serde::{Deserialize, Serialize};

/// Information about an available audio input device.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    /// Device name as reported by the system (used for lookup via cpal).
    pub name: String,
    /// Whether this is the default input device.
    pub is_default: bool,
}
