//! Request identity types

use serde::{Deserialize, Serialize};

use crate::key;

/// Prefix marking a location as an embedded asset.
pub const ASSET_SCHEME: &str = "asset://";

/// Where the bytes of an image come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaOrigin {
    /// Bundled with the application, resolved against the asset root
    Asset,
    /// A file on local storage
    LocalFile,
    /// An HTTP(S) URL
    #[default]
    Network,
}

impl MediaOrigin {
    /// Get the display name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::LocalFile => "file",
            Self::Network => "network",
        }
    }

    /// Guess the origin from the shape of a location string.
    pub fn infer(location: &str) -> Self {
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Network
        } else if lower.starts_with(ASSET_SCHEME) {
            Self::Asset
        } else {
            Self::LocalFile
        }
    }
}

impl std::fmt::Display for MediaOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A location plus the origin it should be read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ImageSource {
    /// Path, asset name or URL
    pub location: String,
    /// How to read `location`
    pub origin: MediaOrigin,
}

impl ImageSource {
    /// Create a source with an explicit origin
    pub fn new(location: impl Into<String>, origin: MediaOrigin) -> Self {
        Self {
            location: location.into(),
            origin,
        }
    }

    /// Create a source whose origin is inferred from the location
    pub fn parse(location: impl Into<String>) -> Self {
        let location = location.into();
        let origin = MediaOrigin::infer(&location);
        Self { location, origin }
    }

    /// Create a network source
    pub fn network(url: impl Into<String>) -> Self {
        Self::new(url, MediaOrigin::Network)
    }

    /// Create a local file source
    pub fn file(path: impl Into<String>) -> Self {
        Self::new(path, MediaOrigin::LocalFile)
    }

    /// Create an embedded asset source
    pub fn asset(name: impl Into<String>) -> Self {
        Self::new(name, MediaOrigin::Asset)
    }

    /// Content key used by the memory and disk caches
    pub fn cache_key(&self) -> String {
        key::generate(&self.location)
    }
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.origin, self.location)
    }
}

/// Presentation target for the decoded pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Target {
    /// Requested width, 0 = unconstrained
    pub width: u32,
    /// Requested height, 0 = unconstrained
    pub height: u32,
    /// Clockwise rotation in degrees
    pub rotation: i32,
}

impl Target {
    /// Create a target
    pub const fn new(width: u32, height: u32, rotation: i32) -> Self {
        Self {
            width,
            height,
            rotation,
        }
    }

    /// Largest edge the decoded image may have, if constrained
    pub fn max_dimension(&self) -> Option<u32> {
        let edge = self.width.max(self.height);
        (edge > 0).then_some(edge)
    }

    /// Rotation snapped to the nearest quarter turn, in `0..360`
    pub const fn quarter_turns(&self) -> u32 {
        let degrees = self.rotation.rem_euclid(360);
        (((degrees + 45) / 90) % 4) as u32
    }
}

/// Everything that determines what a task produces.
///
/// Immutable for the lifetime of one task activation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RequestIdentity {
    /// What to load
    pub source: ImageSource,
    /// How to present it
    pub target: Target,
    /// Whether the request may be served from the caches
    pub cache_enabled: bool,
}

impl RequestIdentity {
    /// Create an identity
    pub const fn new(source: ImageSource, target: Target, cache_enabled: bool) -> Self {
        Self {
            source,
            target,
            cache_enabled,
        }
    }

    /// Content key used by the memory and disk caches
    pub fn cache_key(&self) -> String {
        self.source.cache_key()
    }
}
