// Placeholder title detection
// Decides whether an episode title looks like something a provider filled in
// before the real title was known.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::Episode;

// TBA, T.B.A., to be announced, to be confirmed, TBD
static RE_TBA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(t\.?b\.?a\.?|to be announced|to be confirmed|tbd)$").unwrap()
});
// S01E01, 01E01, 1x01, E01, episode 12
static RE_EPISODE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(s?[0-9]{1,2}e[0-9]{1,2}|[1-9][0-9]?x[0-9]{1,2}|e[0-9]{1,2}|episode [0-9]{1,3})$")
        .unwrap()
});

/// Check whether an episode's title looks like an unset placeholder.
///
/// A title that merely repeats the series name is not a placeholder.
pub fn is_placeholder_title(episode: &Episode) -> bool {
    is_placeholder_title_text(episode.title.as_deref())
}

pub fn is_placeholder_title_text(title: Option<&str>) -> bool {
    let title = match title {
        Some(t) if !t.trim().is_empty() => t.trim().to_lowercase(),
        _ => return true,
    };

    if RE_TBA.is_match(&title) {
        return true;
    }

    if RE_EPISODE_CODE.is_match(&title) {
        return true;
    }

    title.chars().all(|c| c.is_ascii_digit())
}
