//! Conversion between upstream slugs (relative URL paths) and archive
//! resource paths such as `categories/fiction/entries/the-long-road`.

use std::sync::LazyLock;

use regex::Regex;

const RESOURCE_ID: &str = "[a-zA-Z0-9](?:[a-z0-9.-]{0,61}[a-z0-9])?";
const COLLECTIONS: [&str; 3] = ["categories", "entries", "chapters"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlugError {
    #[error("slug {slug:?} is not a valid {kind} slug")]
    InvalidSlug { kind: ResourceKind, slug: String },
    #[error("path {path:?} is not a valid {kind} path")]
    InvalidPath { kind: ResourceKind, path: String },
    #[error("path {0:?} is not a valid user path")]
    InvalidUserPath(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Category,
    Entry,
    Chapter,
}

impl ResourceKind {
    fn depth(self) -> usize {
        match self {
            Self::Category => 1,
            Self::Entry => 2,
            Self::Chapter => 3,
        }
    }

    fn index(self) -> usize {
        self.depth() - 1
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Category => "category",
            Self::Entry => "entry",
            Self::Chapter => "chapter",
        })
    }
}

struct Grammar {
    path: Regex,
    slug: Regex,
}

impl Grammar {
    fn build(kind: ResourceKind) -> Self {
        let depth = kind.depth();
        let path = COLLECTIONS[..depth]
            .iter()
            .map(|collection| format!("{collection}/({RESOURCE_ID})"))
            .collect::<Vec<_>>()
            .join("/");
        let mut slug = vec![format!("({RESOURCE_ID})"); depth].join("/");
        // Directory listings link with a trailing slash; chapter pages never do.
        if kind != ResourceKind::Chapter {
            slug.push_str("/?");
        }
        Self {
            path: Regex::new(&format!("^{path}$")).expect("static path pattern"),
            slug: Regex::new(&format!("^{slug}$")).expect("static slug pattern"),
        }
    }
}

static GRAMMARS: LazyLock<[Grammar; 3]> = LazyLock::new(|| {
    [
        Grammar::build(ResourceKind::Category),
        Grammar::build(ResourceKind::Entry),
        Grammar::build(ResourceKind::Chapter),
    ]
});

static USER_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^users/([A-Za-z0-9_]{3,64})$").expect("static user pattern"));

fn captures<'a>(regex: &Regex, input: &'a str) -> Option<Vec<&'a str>> {
    let caps = regex.captures(input)?;
    caps.iter()
        .skip(1)
        .map(|group| group.map(|m| m.as_str()))
        .collect()
}

/// Converts an upstream slug into the resource path for `kind`.
pub fn to_path(kind: ResourceKind, slug: &str) -> Result<String, SlugError> {
    let ids = captures(&GRAMMARS[kind.index()].slug, slug).ok_or_else(|| {
        SlugError::InvalidSlug {
            kind,
            slug: slug.to_owned(),
        }
    })?;
    Ok(COLLECTIONS
        .iter()
        .zip(ids)
        .map(|(collection, id)| format!("{collection}/{id}"))
        .collect::<Vec<_>>()
        .join("/"))
}

/// Converts a resource path of `kind` back into the upstream slug.
pub fn to_slug(kind: ResourceKind, path: &str) -> Result<String, SlugError> {
    let ids = captures(&GRAMMARS[kind.index()].path, path).ok_or_else(|| {
        SlugError::InvalidPath {
            kind,
            path: path.to_owned(),
        }
    })?;
    Ok(ids.join("/"))
}

pub fn is_path(kind: ResourceKind, path: &str) -> bool {
    GRAMMARS[kind.index()].path.is_match(path)
}

pub fn category_path(slug: &str) -> Result<String, SlugError> {
    to_path(ResourceKind::Category, slug)
}

pub fn entry_path(slug: &str) -> Result<String, SlugError> {
    to_path(ResourceKind::Entry, slug)
}

pub fn chapter_path(slug: &str) -> Result<String, SlugError> {
    to_path(ResourceKind::Chapter, slug)
}

pub fn category_slug(path: &str) -> Result<String, SlugError> {
    to_slug(ResourceKind::Category, path)
}

pub fn entry_slug(path: &str) -> Result<String, SlugError> {
    to_slug(ResourceKind::Entry, path)
}

pub fn chapter_slug(path: &str) -> Result<String, SlugError> {
    to_slug(ResourceKind::Chapter, path)
}

/// The category path owning an entry path.
pub fn entry_parent(path: &str) -> String {
    strip_segments(path, 2)
}

/// The entry path owning a chapter path.
pub fn chapter_parent(path: &str) -> String {
    strip_segments(path, 2)
}

fn strip_segments(path: &str, count: usize) -> String {
    let mut rest = path.trim_end_matches('/');
    for _ in 0..count {
        rest = rest.rsplit_once('/').map_or("", |(head, _)| head);
    }
    rest.to_owned()
}

pub fn user_path(name: &str) -> String {
    format!("users/{name}")
}

pub fn user_name(path: &str) -> Result<&str, SlugError> {
    USER_PATH
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| SlugError::InvalidUserPath(path.to_owned()))
}

pub fn is_user_path(path: &str) -> bool {
    USER_PATH.is_match(path)
}

/// Human-readable title derived from the last segment of a slug:
/// `the-long-road.html` becomes `The Long Road`.
pub fn to_title(slug: &str) -> String {
    let base = slug
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let base = base.strip_suffix(".html").unwrap_or(base);
    base.replace('-', " ")
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_slug_round_trips() {
        assert_eq!(category_path("fiction/").unwrap(), "categories/fiction");
        assert_eq!(category_path("fiction").unwrap(), "categories/fiction");
        assert_eq!(category_slug("categories/fiction").unwrap(), "fiction");
    }

    #[test]
    fn entry_and_chapter_paths() {
        assert_eq!(
            entry_path("fiction/the-long-road").unwrap(),
            "categories/fiction/entries/the-long-road"
        );
        assert_eq!(
            chapter_path("fiction/tales/chapter-1.html").unwrap(),
            "categories/fiction/entries/tales/chapters/chapter-1.html"
        );
        assert_eq!(
            chapter_slug("categories/fiction/entries/tales/chapters/chapter-1.html").unwrap(),
            "fiction/tales/chapter-1.html"
        );
    }

    #[test]
    fn chapter_slug_rejects_trailing_slash() {
        assert!(chapter_path("fiction/tales/chapter-1/").is_err());
        assert!(entry_path("fiction/tales/").is_ok());
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(category_path("").is_err());
        assert!(category_path("-fiction").is_err());
        assert!(category_path("Fiction").is_ok());
        assert!(category_path("fiCtion").is_err());
        assert!(entry_slug("categories/fiction").is_err());
        assert!(category_slug("categories/fiction/entries/x").is_err());
        assert!(matches!(
            entry_slug("entries/x"),
            Err(SlugError::InvalidPath { kind: ResourceKind::Entry, .. })
        ));
    }

    #[test]
    fn resource_id_is_bounded() {
        let longest = "a".repeat(63);
        assert!(category_path(&longest).is_ok());
        let too_long = "a".repeat(64);
        assert!(category_path(&too_long).is_err());
    }

    #[test]
    fn parents_strip_two_segments() {
        assert_eq!(
            entry_parent("categories/fiction/entries/tales"),
            "categories/fiction"
        );
        assert_eq!(
            chapter_parent("categories/fiction/entries/tales/chapters/one"),
            "categories/fiction/entries/tales"
        );
    }

    #[test]
    fn titles() {
        assert_eq!(to_title("fiction/the-long-road.html"), "The Long Road");
        assert_eq!(to_title("fiction/tales/"), "Tales");
        assert_eq!(to_title("a--b"), "A B");
    }

    #[test]
    fn user_paths() {
        assert_eq!(user_path("alice"), "users/alice");
        assert_eq!(user_name("users/alice").unwrap(), "alice");
        assert!(user_name("users/al").is_err());
        assert!(!is_user_path("users/alice/x"));
    }
}
