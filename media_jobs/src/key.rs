//! Stable, path-safe job keys derived from submitted URLs.

use sha2::{Digest, Sha256};
use url::Url;

/// Identifier a job is stored and polled under.
pub type JobKey = String;

const SEPARATOR: char = '_';
const MAX_KEY_LEN: usize = 255;
const EMPTY_KEY: &str = "job";
/// Hex digits of the input digest appended to keys that had to be cut.
const DIGEST_HEX_LEN: usize = 16;

/// Host markers of platforms whose video id lives in a query parameter.
///
/// Hosts sharing an id collide on purpose; the key is the id alone.
const PLATFORM_ID_PARAMS: &[(&str, &str)] = &[("youtube.", "v"), ("youtube-nocookie.", "v")];

/// Maps any input URL to a job key. Never fails: inputs that do not parse as a
/// URL, or that lack a usable platform id, go through [`sanitize`].
pub fn derive_key(input: &str) -> JobKey {
    platform_video_id(input).unwrap_or_else(|| sanitize(input))
}

fn platform_video_id(input: &str) -> Option<String> {
    let url = Url::parse(input.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let (_, param) = PLATFORM_ID_PARAMS
        .iter()
        .find(|(marker, _)| host.contains(marker))?;

    url.query_pairs()
        .find(|(name, _)| name == param)
        .map(|(_, value)| value.into_owned())
        .filter(|id| is_path_safe(id))
}

fn is_path_safe(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_KEY_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Collapses every run of non-alphanumeric characters into one `_`.
///
/// Results longer than [`MAX_KEY_LEN`] are cut and suffixed with a digest of
/// the whole input, so long URLs that share a prefix still get distinct keys.
fn sanitize(input: &str) -> JobKey {
    let mut out = String::with_capacity(input.len());
    let mut in_run = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push(SEPARATOR);
            in_run = true;
        }
    }

    let trimmed = out.trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        return EMPTY_KEY.to_string();
    }
    if trimmed.len() <= MAX_KEY_LEN {
        return trimmed.to_string();
    }

    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    // ASCII only, so any byte offset is a char boundary.
    let prefix = &trimmed[..MAX_KEY_LEN - DIGEST_HEX_LEN - 1];
    format!(
        "{}{SEPARATOR}{}",
        prefix.trim_end_matches(SEPARATOR),
        &digest[..DIGEST_HEX_LEN]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_path_safe(key: &str) {
        assert!(!key.is_empty());
        assert!(
            key.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
            "unsafe key: {key}"
        );
    }

    #[test]
    fn youtube_watch_url_uses_video_id() {
        assert_eq!(
            derive_key("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s"),
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            derive_key("https://m.youtube.com/watch?feature=share&v=abc-DEF_123"),
            "abc-DEF_123"
        );
        assert_eq!(
            derive_key("https://music.youtube.com/watch?v=XyZ"),
            "XyZ"
        );
    }

    #[test]
    fn youtube_without_id_is_sanitized() {
        assert_eq!(
            derive_key("https://www.youtube.com/feed/trending"),
            "https_www_youtube_com_feed_trending"
        );
    }

    #[test]
    fn unsafe_id_falls_back_to_sanitizing() {
        let key = derive_key("https://www.youtube.com/watch?v=../../etc");
        assert_path_safe(&key);
        assert_eq!(key, "https_www_youtube_com_watch_v_etc");
    }

    #[test]
    fn other_hosts_collapse_separator_runs() {
        assert_eq!(derive_key("https://x.test/v?x=1"), "https_x_test_v_x_1");
        assert_eq!(
            derive_key("http://example.com/a//b--c?d=%20e"),
            "http_example_com_a_b_c_d_20e"
        );
    }

    #[test]
    fn id_param_on_other_host_is_ignored() {
        assert_eq!(
            derive_key("https://vimeo.com/watch?v=abc"),
            "https_vimeo_com_watch_v_abc"
        );
    }

    #[test]
    fn malformed_input_never_panics() {
        for input in ["", "   ", "not a url", "://", "%%%", "日本語のURL", "https://"] {
            assert_path_safe(&derive_key(input));
        }
        assert_eq!(derive_key("///"), "job");
        assert_eq!(derive_key("not a url"), "not_a_url");
    }

    #[test]
    fn key_is_deterministic_and_bounded() {
        let long = format!("https://example.com/{}", "a/".repeat(400));
        let first = derive_key(&long);
        assert_eq!(first, derive_key(&long));
        assert!(first.len() <= MAX_KEY_LEN);
        assert_path_safe(&first);
    }

    #[test]
    fn long_urls_sharing_a_prefix_stay_distinct() {
        let prefix = format!("https://example.com/{}", "segment/".repeat(40));
        let a = derive_key(&format!("{prefix}first"));
        let b = derive_key(&format!("{prefix}second"));

        assert_ne!(a, b);
        for key in [&a, &b] {
            assert!(key.len() <= MAX_KEY_LEN);
            assert_path_safe(key);
        }
        assert!(a.starts_with("https_example_com_segment_segment"));
    }

    #[test]
    fn keys_at_the_limit_are_not_suffixed() {
        let input = "a".repeat(MAX_KEY_LEN);
        assert_eq!(derive_key(&input), input);
    }
}
