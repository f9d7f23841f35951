use std::cmp::Ordering;

use chrono::NaiveDate;
use serde_json::Value;

use crate::config::Config;
use crate::http::{RetryPolicy, get_text};

/// One published episode. Supplied by the content source and immutable here.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Episode {
    pub(crate) id: u32,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) category: String,
    /// Empty when the audio has not been published yet ("coming soon").
    pub(crate) media_url: String,
    /// `YYYY-MM-DD`; kept raw so unparseable dates still display.
    pub(crate) published_at: String,
    pub(crate) assessment_url: String,
}

impl Episode {
    pub(crate) fn has_media(&self) -> bool {
        !self.media_url.trim().is_empty()
    }

    pub(crate) fn has_assessment(&self) -> bool {
        !self.assessment_url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SortKey {
    NewestFirst,
    OldestFirst,
    TitleAscending,
}

impl SortKey {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::NewestFirst => "newest",
            Self::OldestFirst => "oldest",
            Self::TitleAscending => "title",
        }
    }

    pub(crate) fn next(self) -> Self {
        match self {
            Self::NewestFirst => Self::OldestFirst,
            Self::OldestFirst => Self::TitleAscending,
            Self::TitleAscending => Self::NewestFirst,
        }
    }
}

/// Pure filter + sort over the catalog. An empty query matches everything;
/// no matches is an empty Vec, not an error.
pub(crate) fn filter_episodes(episodes: &[Episode], query: &str, sort: SortKey) -> Vec<Episode> {
    let needle = query.trim().to_lowercase();
    let mut matched: Vec<Episode> = episodes
        .iter()
        .filter(|episode| {
            needle.is_empty()
                || episode.title.to_lowercase().contains(&needle)
                || episode.description.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect();

    matched.sort_by(|left, right| match sort {
        SortKey::NewestFirst => compare_published(&right.published_at, &left.published_at),
        SortKey::OldestFirst => compare_published(&left.published_at, &right.published_at),
        SortKey::TitleAscending => left.title.to_lowercase().cmp(&right.title.to_lowercase()),
    });
    matched
}

fn compare_published(a: &str, b: &str) -> Ordering {
    match (parse_published_date(a), parse_published_date(b)) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

pub(crate) fn parse_published_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

pub(crate) fn format_published_display(raw: &str) -> String {
    parse_published_date(raw)
        .map(|date| date.format("%b %-d, %Y").to_string())
        .unwrap_or_else(|| raw.to_string())
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}

#[derive(Debug)]
pub(crate) struct CatalogLoad {
    pub(crate) episodes: Vec<Episode>,
    pub(crate) warnings: Vec<String>,
}

/// Fetches the remote catalog when configured, falling back to the built-in
/// one on any fetch or parse failure. The fallback is silent apart from a
/// warning; the caller still gets a usable catalog.
pub(crate) fn load_catalog(config: &Config) -> CatalogLoad {
    let Some(url) = config.catalog_url.as_deref() else {
        return CatalogLoad {
            episodes: builtin_catalog(),
            warnings: Vec::new(),
        };
    };

    match get_text(url, RetryPolicy::default()) {
        Ok(raw) => match parse_catalog(&raw) {
            Some(parsed) => CatalogLoad {
                episodes: parsed.episodes,
                warnings: parsed.warnings,
            },
            None => CatalogLoad {
                episodes: builtin_catalog(),
                warnings: vec![format!(
                    "catalog at {url} had no usable entries; using the built-in catalog"
                )],
            },
        },
        Err(err) => CatalogLoad {
            episodes: builtin_catalog(),
            warnings: vec![format!(
                "catalog fetch failed ({err}); using the built-in catalog"
            )],
        },
    }
}

#[derive(Debug)]
pub(crate) struct ParsedCatalog {
    pub(crate) episodes: Vec<Episode>,
    pub(crate) warnings: Vec<String>,
}

/// Lenient catalog parse: entries missing an id or title are skipped and
/// counted, everything else falls back to empty strings.
pub(crate) fn parse_catalog(raw: &str) -> Option<ParsedCatalog> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let items = value
        .as_array()
        .or_else(|| value.pointer("/episodes").and_then(Value::as_array))?;

    let mut episodes = Vec::new();
    let mut skipped = 0_usize;
    for item in items {
        match parse_catalog_entry(item) {
            Some(episode) => episodes.push(episode),
            None => skipped += 1,
        }
    }
    if episodes.is_empty() {
        return None;
    }

    episodes.sort_by_key(|episode| episode.id);
    episodes.dedup_by_key(|episode| episode.id);

    let mut warnings = Vec::new();
    if skipped > 0 {
        warnings.push(format!("skipped {skipped} malformed catalog entries"));
    }
    Some(ParsedCatalog { episodes, warnings })
}

fn parse_catalog_entry(item: &Value) -> Option<Episode> {
    let id = item.get("id").and_then(Value::as_u64)?;
    if id == 0 || id > u64::from(u32::MAX) {
        return None;
    }
    let title = non_empty_field(item, &["title"])?;

    Some(Episode {
        id: id as u32,
        title,
        description: string_field(item, &["description"]),
        category: string_field(item, &["category"]),
        media_url: string_field(item, &["content", "media_url"]),
        published_at: string_field(item, &["created_at", "date", "published_at"]),
        assessment_url: string_field(item, &["assessment_link", "assessment_url"]),
    })
}

fn non_empty_field(item: &Value, keys: &[&str]) -> Option<String> {
    let value = string_field(item, keys);
    if value.is_empty() { None } else { Some(value) }
}

fn string_field(item: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .unwrap_or("")
        .to_string()
}

/// Bundled episode list used whenever no remote catalog is configured or
/// reachable. Mirrors the published series.
pub(crate) fn builtin_catalog() -> Vec<Episode> {
    vec![
        Episode {
            id: 1,
            title: "EP 1 — Ang Ebolusyon ng Anyong-Buhay sa Kasaysayan ng Mundo".to_string(),
            description: "Talakayan patungkol sa kasaysayan at sinaunang takbo ng buhay."
                .to_string(),
            category: "Evolution".to_string(),
            media_url: "https://cdn.example.com/podtrack/ep1.mp3".to_string(),
            published_at: "2025-01-20".to_string(),
            assessment_url: "https://example.com/assessment/episode1".to_string(),
        },
        Episode {
            id: 2,
            title: "EP 2 — Ang Mekanismo ng Ebolusyon: Paghubog ng Buhay sa Bawat Nilalang"
                .to_string(),
            description: "Limang magkakaibang uri ng mekanismo ng ebolusyon.".to_string(),
            category: "Evolution".to_string(),
            media_url: "https://cdn.example.com/podtrack/ep2.mp3".to_string(),
            published_at: "2025-01-25".to_string(),
            assessment_url: "https://example.com/assessment/episode2".to_string(),
        },
        Episode {
            id: 3,
            title: "EP 3 — Mga Bakas ng Pagbabago: Ang Ebolusyon ng Buhay Mula sa mga Ninuno"
                .to_string(),
            description: "Talakayan patungkol sa descent with modification.".to_string(),
            category: "Evolution".to_string(),
            media_url: "https://cdn.example.com/podtrack/ep3.mp3".to_string(),
            published_at: "2025-01-30".to_string(),
            assessment_url: "https://example.com/assessment/episode3".to_string(),
        },
        Episode {
            id: 4,
            title: "EP 4 — Evolution 101: Ang Kasaysayan ng Ebolusyon".to_string(),
            description: "Talakayan patungkol sa fixity belief at kung saan nagsimula ang ideya."
                .to_string(),
            category: "Evolution".to_string(),
            media_url: "https://cdn.example.com/podtrack/ep4.mp3".to_string(),
            published_at: "2025-02-05".to_string(),
            assessment_url: "https://example.com/assessment/episode4".to_string(),
        },
        Episode {
            id: 5,
            title: "EP 5 — Ang Susunod na Kabanata".to_string(),
            description: "Paparating pa lamang ang episodyong ito.".to_string(),
            category: "Evolution".to_string(),
            media_url: String::new(),
            published_at: "2025-02-12".to_string(),
            assessment_url: String::new(),
        },
    ]
}
