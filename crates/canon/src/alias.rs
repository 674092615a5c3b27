use regex::Regex;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::LazyLock;

/// A path segment carrying a numeric resource ID with a slug on either side:
/// `some-title.12345` (XenForo threads), `12345-some-title`, or both.
static ID_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:(?P<slug>.+)\.)?(?P<id>\d+)(?:-(?P<tail>.*))?$").unwrap());

/// A SQL `LIKE` pattern (`%` and `_` wildcards, `\` escape) matched against
/// canonical URLs in the fetch log.
///
/// Built from a canonical URL with [`from_canonical`](Self::from_canonical),
/// the pattern keeps the resource's numeric ID but wildcards the slug around
/// it, so captures made under an older title still resolve:
///
/// ```
/// use hermes_canon::AliasPattern;
///
/// let pattern = AliasPattern::from_canonical(
///     "https://forums.spacebattles.com/threads/worm-quest.12345/page-3",
/// );
/// assert_eq!(pattern.as_str(), "https://forums.spacebattles.com/threads/%.12345/page-3");
/// ```
///
/// URLs without such a segment produce an escaped literal, which matches the
/// canonical URL exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AliasPattern(String);

impl AliasPattern {
    /// Escape character used by every pattern; queries must declare it
    /// (`LIKE ? ESCAPE '\'`).
    pub const ESCAPE: char = '\\';

    /// Wrap a caller-written pattern verbatim (wildcards are live).
    pub fn raw(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// A pattern matching exactly one (canonical) URL.
    pub fn exact(url: &str) -> Self {
        Self(escape(url))
    }

    /// Derive the alias pattern of a canonical URL.
    ///
    /// The **last** path segment shaped like `slug.ID`, `ID-slug` or
    /// `slug.ID-slug` has its slug parts replaced by `%`; every other part of
    /// the URL is matched literally.
    pub fn from_canonical(url: &str) -> Self {
        let (prefix, path) = split_path(url);
        let segments: Vec<&str> = path.split('/').collect();
        let Some(index) = segments.iter().rposition(|segment| is_id_segment(segment)) else {
            return Self::exact(url);
        };
        let mut pattern = escape(prefix);
        for (i, segment) in segments.iter().enumerate() {
            pattern.push('/');
            if i == index {
                pattern.push_str(&wildcard_segment(segment));
            } else {
                pattern.push_str(&escape(segment));
            }
        }
        Self(pattern)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the pattern can match anything besides a single literal URL.
    pub fn has_wildcards(&self) -> bool {
        let mut chars = self.0.chars();
        while let Some(c) = chars.next() {
            match c {
                Self::ESCAPE => {
                    chars.next();
                },
                '%' | '_' => return true,
                _ => {},
            }
        }
        false
    }
}

impl Display for AliasPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AliasPattern {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Split a canonical URL into `scheme://host` and the path after it (without
/// the separating slash). URLs without a path return an empty path.
fn split_path(url: &str) -> (&str, &str) {
    let authority_start = url.find("://").map_or(0, |i| i + 3);
    match url[authority_start..].find('/') {
        Some(i) => (&url[..authority_start + i], &url[authority_start + i + 1..]),
        None => (url, ""),
    }
}

fn is_id_segment(segment: &str) -> bool {
    ID_SEGMENT
        .captures(segment)
        .is_some_and(|caps| caps.name("slug").is_some() || caps.name("tail").is_some())
}

fn wildcard_segment(segment: &str) -> String {
    let Some(caps) = ID_SEGMENT.captures(segment) else {
        return escape(segment);
    };
    let mut out = String::new();
    if caps.name("slug").is_some() {
        out.push_str("%.");
    }
    out.push_str(&caps["id"]);
    if caps.name("tail").is_some() {
        out.push_str("-%");
    }
    out
}

fn escape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '%' | '_' | AliasPattern::ESCAPE) {
            out.push(AliasPattern::ESCAPE);
        }
        out.push(c);
    }
    out
}
