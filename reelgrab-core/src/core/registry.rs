use std::sync::Arc;

use crate::platforms::bilibili::Bilibili;
use crate::platforms::generic::Generic;
use crate::platforms::instagram::Instagram;
use crate::platforms::reddit::Reddit;
use crate::platforms::soundcloud::SoundCloud;
use crate::platforms::tiktok::TikTok;
use crate::platforms::traits::Platform;
use crate::platforms::twitch::Twitch;
use crate::platforms::twitter::Twitter;
use crate::platforms::vimeo::Vimeo;
use crate::platforms::youtube::YouTube;
use crate::platforms::PlatformKind;

/// Ordered platform list. The first platform that accepts a URL wins.
pub struct PlatformRegistry {
    platforms: Vec<Arc<dyn Platform>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self {
            platforms: Vec::new(),
        }
    }

    /// Built-in sites, catch-all last.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(YouTube::new()));
        registry.register(Arc::new(Vimeo::new()));
        registry.register(Arc::new(TikTok::new()));
        registry.register(Arc::new(Instagram::new()));
        registry.register(Arc::new(Twitter::new()));
        registry.register(Arc::new(Twitch::new()));
        registry.register(Arc::new(Reddit::new()));
        registry.register(Arc::new(Bilibili::new()));
        registry.register(Arc::new(SoundCloud::new()));
        registry.register(Arc::new(Generic::new()));
        registry
    }

    pub fn register(&mut self, platform: Arc<dyn Platform>) {
        tracing::debug!("registered platform {}", platform.kind());
        self.platforms.push(platform);
    }

    pub fn resolve(&self, url: &str) -> Option<Arc<dyn Platform>> {
        self.platforms.iter().find(|p| p.is_valid_url(url)).cloned()
    }

    pub fn get(&self, kind: PlatformKind) -> Option<Arc<dyn Platform>> {
        self.platforms.iter().find(|p| p.kind() == kind).cloned()
    }

    pub fn names(&self) -> Vec<PlatformKind> {
        self.platforms.iter().map(|p| p.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::new()
    }
}
