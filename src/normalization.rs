use unicode_normalization::UnicodeNormalization;

use crate::song::Song;

/// Separator between the two halves of an upstream track string.
pub const TITLE_SEPARATOR: &str = " - ";

/// Artist used when an upstream string cannot be split.
pub const UNKNOWN_ARTIST: &str = "Unknown";

/// How the station refers to itself, and which upstream names are
/// filler rather than real artists or titles.
#[derive(Clone, Debug, PartialEq)]
pub struct StationIdentity {
    /// The station's canonical self-name.
    pub name: String,

    /// Cover shown whenever an identity was replaced.
    pub logo_url: String,

    /// Lower-cased placeholder names (DJs, jingles, "unknown").
    pub placeholders: Vec<String>,

    /// Path fragment the upstream uses for "no cover available".
    pub no_cover_marker: String,
}

impl Default for StationIdentity {
    fn default() -> Self {
        StationIdentity {
            name: "Carnaval-Radio.nl".to_owned(),
            logo_url: "https://res.cloudinary.com/dwzn0q9wj/image/upload/c_scale,h_100,w_100/f_webp/logo_square_512_1_78657ec246.jpg".to_owned(),
            placeholders: vec!["unknown".to_owned(), "moritz gimsa".to_owned()],
            no_cover_marker: "nocover.png".to_owned(),
        }
    }
}

impl StationIdentity {
    /// Whether `text` is filler: empty, a placeholder, or the station itself.
    pub fn is_special_case(&self, text: &str) -> bool {
        self.is_placeholder(text) || self.is_station(text)
    }

    /// Whether `text` is empty or one of the placeholder names.
    pub fn is_placeholder(&self, text: &str) -> bool {
        let lowered = text.trim().to_lowercase();

        lowered.is_empty() || self.placeholders.iter().any(|p| *p == lowered)
    }

    /// Whether `text` is the station's own name, ignoring case.
    pub fn is_station(&self, text: &str) -> bool {
        text.trim().to_lowercase() == self.name.to_lowercase()
    }
}

/// Normalizes a name by stripping any whitespace and decomposing it
/// into Unicode Normalization Form D.
///
/// ```
/// use songsync::normalization::normalize_name;
/// assert_eq!(normalize_name(" hï "), "hï");
/// ```
pub fn normalize_name(name: impl AsRef<str>) -> String {
    name.as_ref().trim().nfd().to_string()
}

/// Splits an upstream `"Title - Artist"` string. Anything that is not
/// exactly two halves is kept whole as the title of an unknown artist.
///
/// ```
/// use songsync::normalization::split_title;
/// let song = split_title("Wat n nach - Schintaler");
/// assert_eq!(song.title, "Wat n nach");
/// assert_eq!(song.artist, "Schintaler");
/// ```
pub fn split_title(raw: &str) -> Song {
    let parts: Vec<&str> = raw.split(TITLE_SEPARATOR).collect();

    match parts.as_slice() {
        [title, artist] => Song::new(normalize_name(artist), normalize_name(title)),
        _ => Song::new(UNKNOWN_ARTIST, raw),
    }
}

/// Lower-cases, strips diacritics and punctuation, and joins with hyphens.
///
/// ```
/// use songsync::normalization::slugify;
/// assert_eq!(slugify("Gans D'r Aaf, Pruuf   Mar"), "gans-dr-aaf-pruuf-mar");
/// ```
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());

    for c in text.to_lowercase().nfd() {
        let c = if c.is_whitespace() || c == ',' { '-' } else { c };

        match c {
            '-' if slug.ends_with('-') => {}
            'a'..='z' | '0'..='9' | '-' => slug.push(c),
            _ => {}
        }
    }

    slug
}

/// The join key for a song across polls, sources and restarts.
///
/// ```
/// use songsync::normalization::canonical_id;
/// use songsync::song::Song;
/// assert_eq!(
///     canonical_id(&Song::new("Schintaler", "Sjoenkeldaddy's")),
///     "schintaler-sjoenkeldaddys"
/// );
/// ```
pub fn canonical_id(song: &Song) -> String {
    slugify(&format!("{}-{}", song.artist, song.title))
}

/// Replaces filler artists and titles with the station's own name.
pub fn enrich_identity(song: &Song, station: &StationIdentity) -> Song {
    let replace = |text: &str| {
        if station.is_special_case(text) {
            station.name.clone()
        } else {
            text.to_owned()
        }
    };

    Song::new(replace(&song.artist), replace(&song.title))
}

/// Chooses the cover for `song` as it came from upstream, before
/// `enrich_identity`.
pub fn enrich_cover(url: Option<&str>, song: &Song, station: &StationIdentity) -> String {
    if station.is_placeholder(&song.artist) {
        return station.logo_url.clone();
    }

    match url {
        Some(url) if !url.trim().is_empty() => {
            if station.is_station(&song.artist) && url.contains(&station.no_cover_marker) {
                station.logo_url.clone()
            } else {
                url.to_owned()
            }
        }
        _ => station.logo_url.clone(),
    }
}
