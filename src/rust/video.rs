//! YouTube thumbnail derivation for video content.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Tried in order; the first one that matches wins
    static ref VIDEO_ID_PATTERNS: [Regex; 2] = [
        Regex::new(r"(?:v=|/)([0-9A-Za-z_-]{11})(?:\?|&|/|$)").unwrap(),
        Regex::new(r"youtu\.be/([0-9A-Za-z_-]{11})").unwrap(),
    ];
}

/// Extracts the 11-character YouTube video id from a URL, if it has one.
pub fn video_id(url: &str) -> Option<&str> {
    if url.is_empty() {
        return None;
    }
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// The high-quality thumbnail URL for a video, or `None` when no id can be extracted.
pub fn thumbnail_url(url: &str) -> Option<String> {
    video_id(url).map(|id| format!("https://img.youtube.com/vi/{}/hqdefault.jpg", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_url() {
        assert_eq!(video_id("https://www.youtube.com/watch?v=GGDl66NnOoY"), Some("GGDl66NnOoY"));
        assert_eq!(
            thumbnail_url("https://www.youtube.com/watch?v=GGDl66NnOoY").as_deref(),
            Some("https://img.youtube.com/vi/GGDl66NnOoY/hqdefault.jpg")
        );
    }

    #[test]
    fn test_watch_url_with_extra_params() {
        assert_eq!(video_id("https://www.youtube.com/watch?v=GGDl66NnOoY&t=42s"), Some("GGDl66NnOoY"));
    }

    #[test]
    fn test_short_and_embed_urls() {
        assert_eq!(video_id("https://youtu.be/GGDl66NnOoY"), Some("GGDl66NnOoY"));
        assert_eq!(video_id("https://youtu.be/GGDl66NnOoY?si=share"), Some("GGDl66NnOoY"));
        assert_eq!(video_id("https://www.youtube.com/embed/GGDl66NnOoY"), Some("GGDl66NnOoY"));
    }

    #[test]
    fn test_no_id() {
        assert_eq!(video_id(""), None);
        assert_eq!(thumbnail_url("https://vimeo.com/12345"), None);
        assert_eq!(thumbnail_url("https://www.youtube.com/watch?v=short"), None);
    }
}
