//! GATT identifiers exposed by the device
//!
//! UUIDs are fixed by the firmware; nothing is negotiated at runtime.

use serde::{Deserialize, Serialize};
use uuid::{uuid, Uuid};

/// A characteristic within a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Characteristic {
    pub service: Uuid,
    pub uuid: Uuid,
}

impl Characteristic {
    /// Compressed audio stream (notify)
    pub const AUDIO: Characteristic = Characteristic {
        service: uuid!("19b10000-e8f2-537e-4f6c-d104768a1214"),
        uuid: uuid!("19b10001-e8f2-537e-4f6c-d104768a1214"),
    };

    /// Button trigger stream (notify)
    pub const BUTTON: Characteristic = Characteristic {
        service: uuid!("23ba7924-0000-1000-7450-346eac492e92"),
        uuid: uuid!("23ba7925-0000-1000-7450-346eac492e92"),
    };

    /// Speaker / haptic motor (write)
    pub const SPEAKER: Characteristic = Characteristic {
        service: uuid!("cab1ab95-2ea5-4f4d-bb56-874b72cfc984"),
        uuid: uuid!("cab1ab96-2ea5-4f4d-bb56-874b72cfc984"),
    };

    /// Short name for logs
    pub fn label(&self) -> &'static str {
        if *self == Characteristic::AUDIO {
            "audio"
        } else if *self == Characteristic::BUTTON {
            "button"
        } else if *self == Characteristic::SPEAKER {
            "speaker"
        } else {
            "other"
        }
    }
}

impl std::fmt::Display for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label(), self.uuid)
    }
}

/// A notification pushed by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub characteristic: Characteristic,
    pub data: Vec<u8>,
}

impl Notification {
    pub fn new(characteristic: Characteristic, data: impl Into<Vec<u8>>) -> Self {
        Self {
            characteristic,
            data: data.into(),
        }
    }
}
