//! Url-safe identifiers derived from display names.

use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Lowercases, keeps unicode letters, digits and `_`, turns runs of
/// whitespace and `-` into a single `-`, and drops everything else.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            // Some lowercase mappings add combining marks, which a slug can't hold.
            slug.extend(c.to_lowercase().filter(|l| l.is_alphanumeric() || *l == '_'));
        } else if c.is_whitespace() || c == '-' {
            pending_separator = true;
        }
    }

    slug.trim_matches(['-', '_']).to_owned()
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct Slug(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum InvalidSlugError {
    #[error("{0:?} contains nothing a slug can be made of")]
    Empty(String),
    #[error("{0:?} is not in slug form")]
    NotNormalized(String),
}

impl Slug {
    pub fn from_name(name: &str) -> Result<Self, InvalidSlugError> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(InvalidSlugError::Empty(name.to_owned()));
        }
        Ok(Self(slug))
    }

    /// Accepts only text that is already a slug, as found in urls.
    pub fn parse(slug: String) -> Result<Self, InvalidSlugError> {
        if slug.is_empty() {
            return Err(InvalidSlugError::Empty(slug));
        }
        if slugify(&slug) != slug {
            return Err(InvalidSlugError::NotNormalized(slug));
        }
        Ok(Self(slug))
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for Slug {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Slug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Slug::parse(inner).map_err(|err| match err {
            InvalidSlugError::Empty(s) | InvalidSlugError::NotNormalized(s) => {
                Error::invalid_value(Unexpected::Str(&s), &"a slug")
            }
        })
    }
}
