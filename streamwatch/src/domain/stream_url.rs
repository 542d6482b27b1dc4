//! Stream room URL value object.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;

/// Hosts with a known display name. Matched against the host with any
/// leading `www.` / `m.` removed, including subdomains.
const KNOWN_PLATFORMS: &[(&str, &str)] = &[
    ("chaturbate.com", "Chaturbate"),
    ("twitch.tv", "Twitch"),
    ("youtube.com", "YouTube"),
    ("youtu.be", "YouTube"),
    ("kick.com", "Kick"),
    ("stripchat.com", "Stripchat"),
    ("bongacams.com", "BongaCams"),
];

/// A validated, normalized stream room URL.
///
/// The URL is the identity of a monitored stream; platform and streamer
/// name are derived from it and are display-only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamUrl(String);

impl StreamUrl {
    /// Parse and normalize a room URL.
    pub fn new(url: impl AsRef<str>) -> Result<Self, Error> {
        let raw = url.as_ref().trim();
        Self::validate(raw)?;
        Ok(Self(Self::normalize(raw)?))
    }

    /// Wrap a URL that is already normalized (rows read back from the database).
    pub fn from_trusted(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display name of the hosting platform, or the bare host when unknown.
    pub fn platform(&self) -> String {
        let Some(host) = self.host() else {
            return "Unknown".to_string();
        };
        let bare = host
            .strip_prefix("www.")
            .or_else(|| host.strip_prefix("m."))
            .unwrap_or(&host);

        KNOWN_PLATFORMS
            .iter()
            .find(|(domain, _)| bare == *domain || bare.ends_with(&format!(".{domain}")))
            .map(|(_, name)| (*name).to_string())
            .unwrap_or_else(|| bare.to_string())
    }

    /// Streamer (room owner) name: the first non-empty path segment.
    pub fn streamer_username(&self) -> Option<String> {
        let parsed = Url::parse(&self.0).ok()?;
        let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
        let first = segments.next()?;
        // YouTube channel handles live under /@name or /c/name.
        let name = match first {
            "c" | "channel" | "user" => segments.next()?,
            other => other.strip_prefix('@').unwrap_or(other),
        };
        (!name.is_empty()).then(|| name.to_string())
    }

    fn host(&self) -> Option<String> {
        Url::parse(&self.0)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    }

    fn validate(url: &str) -> Result<(), Error> {
        if url.is_empty() {
            return Err(Error::validation("Stream URL required"));
        }

        let web_scheme = url.split_once("://").is_some_and(|(scheme, _)| {
            scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
        });
        if !web_scheme {
            return Err(Error::validation(
                "Stream URL must start with http:// or https://",
            ));
        }

        if url.contains(char::is_whitespace) {
            return Err(Error::validation("Stream URL cannot contain whitespace"));
        }

        Ok(())
    }

    /// Lowercase scheme and host, drop fragments and trailing slashes.
    fn normalize(url: &str) -> Result<String, Error> {
        let mut parsed =
            Url::parse(url).map_err(|e| Error::validation(format!("Invalid stream URL: {e}")))?;
        if parsed.host_str().is_none() {
            return Err(Error::validation("Stream URL must include a host"));
        }
        parsed.set_fragment(None);

        let serialized = parsed.to_string();
        Ok(match parsed.query() {
            Some(_) => serialized,
            None => serialized.trim_end_matches('/').to_string(),
        })
    }
}

impl std::fmt::Display for StreamUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StreamUrl {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StreamUrl> for String {
    fn from(url: StreamUrl) -> Self {
        url.0
    }
}
