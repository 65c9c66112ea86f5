//! Standard category taxonomy and per-site category mapping.
//!
//! Tracker sites use arbitrary local category identifiers ("41", "cats_movies",
//! "Apps/PC"). Definitions declare a mapping from those local identifiers onto
//! a closed, Newznab-style standard taxonomy so that callers can query and
//! filter uniformly across unrelated sites.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Closed standard category taxonomy with Newznab-compatible numeric ids.
///
/// Top-level categories are the thousands (2000 Movies, 5000 TV, ...);
/// subcategories live under them (2040 Movies/HD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardCategory {
    Console,
    Movies,
    MoviesForeign,
    MoviesOther,
    MoviesSd,
    MoviesHd,
    MoviesUhd,
    MoviesBluRay,
    MoviesDvd,
    MoviesWebDl,
    Audio,
    AudioMp3,
    AudioVideo,
    AudioAudiobook,
    AudioLossless,
    AudioOther,
    Pc,
    PcIso,
    PcMac,
    PcGames,
    PcMobileIos,
    PcMobileAndroid,
    Tv,
    TvWebDl,
    TvForeign,
    TvSd,
    TvHd,
    TvUhd,
    TvOther,
    TvSport,
    TvAnime,
    TvDocumentary,
    Xxx,
    XxxOther,
    Books,
    BooksMags,
    BooksEbook,
    BooksComics,
    BooksTechnical,
    BooksOther,
    Other,
    OtherMisc,
    OtherHashed,
}

impl StandardCategory {
    /// Newznab-compatible numeric id.
    pub fn id(&self) -> u32 {
        match self {
            Self::Console => 1000,
            Self::Movies => 2000,
            Self::MoviesForeign => 2010,
            Self::MoviesOther => 2020,
            Self::MoviesSd => 2030,
            Self::MoviesHd => 2040,
            Self::MoviesUhd => 2045,
            Self::MoviesBluRay => 2050,
            Self::MoviesDvd => 2070,
            Self::MoviesWebDl => 2080,
            Self::Audio => 3000,
            Self::AudioMp3 => 3010,
            Self::AudioVideo => 3020,
            Self::AudioAudiobook => 3030,
            Self::AudioLossless => 3040,
            Self::AudioOther => 3050,
            Self::Pc => 4000,
            Self::PcIso => 4020,
            Self::PcMac => 4030,
            Self::PcGames => 4050,
            Self::PcMobileIos => 4060,
            Self::PcMobileAndroid => 4070,
            Self::Tv => 5000,
            Self::TvWebDl => 5010,
            Self::TvForeign => 5020,
            Self::TvSd => 5030,
            Self::TvHd => 5040,
            Self::TvUhd => 5045,
            Self::TvOther => 5050,
            Self::TvSport => 5060,
            Self::TvAnime => 5070,
            Self::TvDocumentary => 5080,
            Self::Xxx => 6000,
            Self::XxxOther => 6070,
            Self::Books => 7000,
            Self::BooksMags => 7010,
            Self::BooksEbook => 7020,
            Self::BooksComics => 7030,
            Self::BooksTechnical => 7040,
            Self::BooksOther => 7050,
            Self::Other => 8000,
            Self::OtherMisc => 8010,
            Self::OtherHashed => 8020,
        }
    }

    /// Canonical display name ("Movies/HD", "TV/Anime").
    pub fn name(&self) -> &'static str {
        match self {
            Self::Console => "Console",
            Self::Movies => "Movies",
            Self::MoviesForeign => "Movies/Foreign",
            Self::MoviesOther => "Movies/Other",
            Self::MoviesSd => "Movies/SD",
            Self::MoviesHd => "Movies/HD",
            Self::MoviesUhd => "Movies/UHD",
            Self::MoviesBluRay => "Movies/BluRay",
            Self::MoviesDvd => "Movies/DVD",
            Self::MoviesWebDl => "Movies/WEB-DL",
            Self::Audio => "Audio",
            Self::AudioMp3 => "Audio/MP3",
            Self::AudioVideo => "Audio/Video",
            Self::AudioAudiobook => "Audio/Audiobook",
            Self::AudioLossless => "Audio/Lossless",
            Self::AudioOther => "Audio/Other",
            Self::Pc => "PC",
            Self::PcIso => "PC/ISO",
            Self::PcMac => "PC/Mac",
            Self::PcGames => "PC/Games",
            Self::PcMobileIos => "PC/Mobile-iOS",
            Self::PcMobileAndroid => "PC/Mobile-Android",
            Self::Tv => "TV",
            Self::TvWebDl => "TV/WEB-DL",
            Self::TvForeign => "TV/Foreign",
            Self::TvSd => "TV/SD",
            Self::TvHd => "TV/HD",
            Self::TvUhd => "TV/UHD",
            Self::TvOther => "TV/Other",
            Self::TvSport => "TV/Sport",
            Self::TvAnime => "TV/Anime",
            Self::TvDocumentary => "TV/Documentary",
            Self::Xxx => "XXX",
            Self::XxxOther => "XXX/Other",
            Self::Books => "Books",
            Self::BooksMags => "Books/Mags",
            Self::BooksEbook => "Books/EBook",
            Self::BooksComics => "Books/Comics",
            Self::BooksTechnical => "Books/Technical",
            Self::BooksOther => "Books/Other",
            Self::Other => "Other",
            Self::OtherMisc => "Other/Misc",
            Self::OtherHashed => "Other/Hashed",
        }
    }

    /// The top-level category this belongs to (itself if already top-level).
    pub fn parent(&self) -> StandardCategory {
        match self.id() / 1000 {
            1 => Self::Console,
            2 => Self::Movies,
            3 => Self::Audio,
            4 => Self::Pc,
            5 => Self::Tv,
            6 => Self::Xxx,
            7 => Self::Books,
            _ => Self::Other,
        }
    }

    /// Whether this is a top-level (thousands) category.
    pub fn is_top_level(&self) -> bool {
        self.id() % 1000 == 0
    }

    /// Whether `self` equals `other` or is a subcategory of it.
    pub fn is_within(&self, other: StandardCategory) -> bool {
        *self == other || (other.is_top_level() && self.parent() == other)
    }

    /// Look up by Newznab numeric id.
    pub fn from_id(id: u32) -> Option<StandardCategory> {
        ALL_CATEGORIES.iter().copied().find(|c| c.id() == id)
    }

    /// Look up by name, case-insensitively, ignoring `/`, `-` and spaces.
    ///
    /// Accepts either the canonical name ("Movies/HD") or a numeric id
    /// rendered as a string ("2040").
    pub fn from_name(name: &str) -> Option<StandardCategory> {
        if let Ok(id) = name.trim().parse::<u32>() {
            return Self::from_id(id);
        }
        let wanted = normalize(name);
        ALL_CATEGORIES
            .iter()
            .copied()
            .find(|c| normalize(c.name()) == wanted)
    }
}

/// Every category in the taxonomy, in id order.
pub const ALL_CATEGORIES: &[StandardCategory] = &[
    StandardCategory::Console,
    StandardCategory::Movies,
    StandardCategory::MoviesForeign,
    StandardCategory::MoviesOther,
    StandardCategory::MoviesSd,
    StandardCategory::MoviesHd,
    StandardCategory::MoviesUhd,
    StandardCategory::MoviesBluRay,
    StandardCategory::MoviesDvd,
    StandardCategory::MoviesWebDl,
    StandardCategory::Audio,
    StandardCategory::AudioMp3,
    StandardCategory::AudioVideo,
    StandardCategory::AudioAudiobook,
    StandardCategory::AudioLossless,
    StandardCategory::AudioOther,
    StandardCategory::Pc,
    StandardCategory::PcIso,
    StandardCategory::PcMac,
    StandardCategory::PcGames,
    StandardCategory::PcMobileIos,
    StandardCategory::PcMobileAndroid,
    StandardCategory::Tv,
    StandardCategory::TvWebDl,
    StandardCategory::TvForeign,
    StandardCategory::TvSd,
    StandardCategory::TvHd,
    StandardCategory::TvUhd,
    StandardCategory::TvOther,
    StandardCategory::TvSport,
    StandardCategory::TvAnime,
    StandardCategory::TvDocumentary,
    StandardCategory::Xxx,
    StandardCategory::XxxOther,
    StandardCategory::Books,
    StandardCategory::BooksMags,
    StandardCategory::BooksEbook,
    StandardCategory::BooksComics,
    StandardCategory::BooksTechnical,
    StandardCategory::BooksOther,
    StandardCategory::Other,
    StandardCategory::OtherMisc,
    StandardCategory::OtherHashed,
];

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '/' | '-' | ' ' | '_'))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

impl fmt::Display for StandardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for StandardCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for StandardCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        StandardCategory::from_name(&raw)
            .ok_or_else(|| D::Error::custom(format!("unknown standard category: {raw}")))
    }
}

/// One tracker-category → standard-category association from a Definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryMapping {
    /// Site-local category identifier, exactly as the site uses it.
    pub tracker: String,
    /// Standard category it maps onto.
    pub standard: StandardCategory,
    /// Human-readable description from the Definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

/// Bidirectional, many-to-many category map for one site.
///
/// The same tracker category may map to several standard categories and vice
/// versa. Lookups never produce an empty result silently: the response side
/// falls back to the Definition's declared standard fallback, the request
/// side to its declared default tracker categories.
#[derive(Debug, Clone)]
pub struct CategoryMap {
    mappings: Vec<CategoryMapping>,
    fallback: StandardCategory,
    default_tracker: Vec<String>,
}

impl CategoryMap {
    pub fn new(
        mappings: Vec<CategoryMapping>,
        fallback: StandardCategory,
        default_tracker: Vec<String>,
    ) -> Self {
        Self {
            mappings,
            fallback,
            default_tracker,
        }
    }

    /// Standard categories for a site-local category id (response side).
    ///
    /// Matching is case-insensitive on the tracker id. An unmapped id yields
    /// the fallback category, never an empty set.
    pub fn to_standard(&self, tracker_cat: &str) -> Vec<StandardCategory> {
        let mut out: Vec<StandardCategory> = self
            .mappings
            .iter()
            .filter(|m| m.tracker.eq_ignore_ascii_case(tracker_cat))
            .map(|m| m.standard)
            .collect();
        out.dedup();
        if out.is_empty() {
            out.push(self.fallback);
        }
        out
    }

    /// Site-local categories for a set of standard categories (request side).
    ///
    /// A top-level standard category also selects mappings for its
    /// subcategories. When nothing maps, the Definition's declared default
    /// tracker categories are used instead of failing the search.
    pub fn to_tracker(&self, categories: &[StandardCategory]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for mapping in &self.mappings {
            if categories.iter().any(|c| mapping.standard.is_within(*c)) {
                if !out.iter().any(|t| t.eq_ignore_ascii_case(&mapping.tracker)) {
                    out.push(mapping.tracker.clone());
                }
            }
        }
        if out.is_empty() && !categories.is_empty() {
            out = self.default_tracker.clone();
        }
        out
    }

    /// All standard categories this site supports, deduplicated, in
    /// definition order.
    pub fn supported(&self) -> Vec<StandardCategory> {
        let mut out: Vec<StandardCategory> = Vec::new();
        for mapping in &self.mappings {
            if !out.contains(&mapping.standard) {
                out.push(mapping.standard);
            }
        }
        out
    }

    pub fn fallback(&self) -> StandardCategory {
        self.fallback
    }

    pub fn mappings(&self) -> &[CategoryMapping] {
        &self.mappings
    }
}
