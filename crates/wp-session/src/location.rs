//! Deep-link handling: locating and stripping the one-time link credential.
//!
//! The credential may arrive either as a normal query parameter
//! (`/portal?token=T`) or, once the portal is loaded as a single-page app,
//! after the client-side route hash (`/#/wallet?token=T`). The query string
//! is always checked first.

use std::fmt;

use url::Url;
use url::form_urlencoded;

use crate::config::LINK_TOKEN_PARAM;

/// Page location split the way a browser exposes it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLocation {
    /// Path, always starting with `/`
    pub path: String,
    /// Query string without the leading `?`
    pub query: String,
    /// Fragment including the leading `#`, or empty
    pub hash: String,
}

impl PageLocation {
    /// Build a location, normalizing `?`/`#` prefixes
    pub fn new(path: &str, query: &str, hash: &str) -> Self {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let query = query.strip_prefix('?').unwrap_or(query).to_string();
        let hash = match hash.strip_prefix('#').unwrap_or(hash) {
            "" => String::new(),
            fragment => format!("#{fragment}"),
        };

        Self { path, query, hash }
    }

    pub fn from_url(url: &Url) -> Self {
        Self::new(url.path(), url.query().unwrap_or(""), url.fragment().unwrap_or(""))
    }

    pub fn parse(href: &str) -> Result<Self, url::ParseError> {
        Url::parse(href).map(|url| Self::from_url(&url))
    }

    /// Path, query and hash joined back together
    pub fn href(&self) -> String {
        let mut href = self.path.clone();
        if !self.query.is_empty() {
            href.push('?');
            href.push_str(&self.query);
        }
        href.push_str(&self.hash);
        href
    }

    /// True if either channel still carries a link credential
    pub fn has_link_token(&self) -> bool {
        extract_link_token(self).is_some()
    }
}

impl fmt::Display for PageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.href())
    }
}

/// A link credential found in the URL, plus the URL with it removed
#[derive(Clone, PartialEq, Eq)]
pub struct LinkToken {
    pub token: String,
    /// Query string with the credential removed (no leading `?`)
    pub query: String,
    /// Hash with the credential removed (leading `#`, or empty)
    pub hash: String,
    /// In-app route to show once the credential is consumed
    pub target_path: String,
}

impl LinkToken {
    /// Location to navigate to after the credential has been consumed
    pub fn cleaned_location(&self, current: &PageLocation) -> PageLocation {
        PageLocation {
            path: current.path.clone(),
            query: self.query.clone(),
            hash: self.hash.clone(),
        }
    }
}

impl fmt::Debug for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkToken")
            .field("token", &"<redacted>")
            .field("query", &self.query)
            .field("hash", &self.hash)
            .field("target_path", &self.target_path)
            .finish()
    }
}

/// Find the link credential in `location`, query string first.
///
/// Returns `None` when neither channel carries a non-empty `token` parameter.
pub fn extract_link_token(location: &PageLocation) -> Option<LinkToken> {
    if let Some((token, query)) = take_param(&location.query, LINK_TOKEN_PARAM) {
        return Some(LinkToken {
            token,
            query,
            hash: location.hash.clone(),
            target_path: location.path.clone(),
        });
    }

    let fragment = location.hash.strip_prefix('#').unwrap_or(&location.hash);
    let (route, hash_query) = fragment.split_once('?')?;
    let (token, remaining) = take_param(hash_query, LINK_TOKEN_PARAM)?;

    let hash = match (route.is_empty(), remaining.is_empty()) {
        (true, true) => String::new(),
        (_, true) => format!("#{route}"),
        (_, false) => format!("#{route}?{remaining}"),
    };
    let target_path = if route.is_empty() {
        location.path.clone()
    } else if route.starts_with('/') {
        route.to_string()
    } else {
        format!("/{route}")
    };

    Some(LinkToken {
        token,
        query: location.query.clone(),
        hash,
        target_path,
    })
}

/// Remove every `name` pair from a query string, returning the first
/// non-empty value and the re-serialized remainder.
fn take_param(query: &str, name: &str) -> Option<(String, String)> {
    let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    let token = pairs
        .iter()
        .find(|(key, value)| key == name && !value.is_empty())
        .map(|(_, value)| value.clone())?;

    let remaining = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().filter(|(key, _)| key != name))
        .finish();

    Some((token, remaining))
}
