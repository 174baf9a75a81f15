use serde::{Deserialize, Serialize};

/// Source platform of a VOD link. Ordering is the deterministic output
/// order for a run's final VOD list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum VodKind {
    Twitch,
    Youtube,
    Other,
}

impl std::fmt::Display for VodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VodKind::Twitch => write!(f, "TWITCH"),
            VodKind::Youtube => write!(f, "YOUTUBE"),
            VodKind::Other => write!(f, "OTHER"),
        }
    }
}

/// A video-on-demand link associated with a run.
///
/// Equality is semantic: same kind and same trimmed URL. Community VOD
/// lists frequently carry stray whitespace around otherwise identical links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vod {
    #[serde(rename = "type")]
    pub kind: VodKind,
    pub url: String,
}

impl Vod {
    pub fn new(kind: VodKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }
}

impl PartialEq for Vod {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.url.trim() == other.url.trim()
    }
}

impl Eq for Vod {}

/// Sort a VOD list by kind, then URL, for deterministic output.
pub fn sort_vods(vods: &mut [Vod]) {
    vods.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.url.cmp(&b.url)));
}
