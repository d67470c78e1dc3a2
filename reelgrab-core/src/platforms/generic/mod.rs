use crate::platforms::traits::{Capabilities, Platform, PlatformDescriptor};
use crate::platforms::PlatformKind;

const PATTERNS: &[&str] = &[r"^https?://[^\s/]+\.[^\s/]+(?:/\S*)?$"];

/// Anything yt-dlp might know. Registered last.
pub struct Generic {
    descriptor: PlatformDescriptor,
}

impl Default for Generic {
    fn default() -> Self {
        Self::new()
    }
}

impl Generic {
    pub fn new() -> Self {
        Self {
            descriptor: PlatformDescriptor::new(
                PlatformKind::Generic,
                PATTERNS,
                Capabilities {
                    has_live_streams: true,
                    ..Capabilities::default()
                },
            ),
        }
    }
}

impl Platform for Generic {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }
}
