use url::Url;

/// A url that names an ordered collection of child items.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeRef {
    /// Stable collection id; the resolution cache is keyed by it.
    pub composite_id: String,
    pub url: String,
}

const PLAYLIST_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

// Auto-generated mixes and the "watch later" list cannot be enumerated.
const UNRESOLVABLE_PREFIXES: &[&str] = &["RD", "UL", "WL", "LL"];

/// Detect a known composite locator. Single-item urls return `None`.
pub fn detect_composite(raw_url: &str) -> Option<CompositeRef> {
    let parsed = Url::parse(raw_url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();
    if !PLAYLIST_HOSTS.contains(&host.as_str()) {
        return None;
    }
    let list_id = parsed
        .query_pairs()
        .find(|(key, _)| key == "list")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())?;
    if UNRESOLVABLE_PREFIXES
        .iter()
        .any(|prefix| list_id.starts_with(prefix))
    {
        return None;
    }
    Some(CompositeRef {
        url: format!("https://www.youtube.com/playlist?list={list_id}"),
        composite_id: list_id,
    })
}
