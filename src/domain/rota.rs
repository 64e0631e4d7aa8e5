/// Rota rotation over the wiki page's stored markup.
///
/// The release-captain schedule lives in an ordered list directly after a
/// "Release Captain schedule" heading. Rotating moves the first list item
/// (the captain who just ran the release) to the end of the list, leaving
/// every other byte of the page untouched.
use regex::Regex;

const SCHEDULE_PATTERN: &str = concat!(
    "(?s)",                                          // list items may span lines
    "<h[1-6]>Release Captain schedule</h[1-6]>.*?",
    "<ol(\\s[^>]*?)?>",                              // opening tag, attrs allowed
    "(<li>.*?</li>)",                                // first item, current captain
    ".*?(</ol>)",                                    // rest of the list
);

/// Move the current release captain to the end of the schedule.
///
/// Returns the rewritten page body, or `None` when the expected structure
/// (heading followed by an ordered list with at least one item) is not
/// present, in which case the caller degrades to a manual instruction.
pub fn rotate_release_captain(content: &str) -> Option<String> {
    let re = Regex::new(SCHEDULE_PATTERN).expect("schedule pattern is valid");
    let captures = re.captures(content)?;

    let whole = captures.get(0)?;
    let captain = captures.get(2)?.as_str();
    let closing = captures.get(3)?.as_str();

    // drop the first item, then re-insert it just before the closing tag
    let rotated = whole
        .as_str()
        .replacen(captain, "", 1)
        .replacen(closing, captain, 1);

    let mut result = String::with_capacity(content.len());
    result.push_str(&content[..whole.start()]);
    result.push_str(&rotated);
    result.push_str(closing);
    result.push_str(&content[whole.end()..]);
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "<p>intro</p>\
<h2>Release Captain schedule</h2>\
<ol><li>Alice</li><li>Bob</li><li>Carol</li></ol>\
<p>outro</p>";

    #[test]
    fn test_rotate_moves_first_captain_last() {
        let rotated = rotate_release_captain(PAGE).unwrap();
        assert_eq!(
            rotated,
            "<p>intro</p>\
<h2>Release Captain schedule</h2>\
<ol><li>Bob</li><li>Carol</li><li>Alice</li></ol>\
<p>outro</p>"
        );
    }

    #[test]
    fn test_rotate_is_cyclic() {
        let once = rotate_release_captain(PAGE).unwrap();
        let twice = rotate_release_captain(&once).unwrap();
        let thrice = rotate_release_captain(&twice).unwrap();
        assert_eq!(thrice, PAGE);
    }

    #[test]
    fn test_rotate_single_item_is_identity() {
        let page = "<h3>Release Captain schedule</h3><ol><li>Alice</li></ol>";
        assert_eq!(rotate_release_captain(page).unwrap(), page);
    }

    #[test]
    fn test_rotate_preserves_surrounding_content() {
        let page = format!("<p>before</p>{}<p>after &amp; more</p>", PAGE);
        let rotated = rotate_release_captain(&page).unwrap();
        assert!(rotated.starts_with("<p>before</p>"));
        assert!(rotated.ends_with("<p>after &amp; more</p>"));
    }

    #[test]
    fn test_rotate_missing_structure() {
        assert!(rotate_release_captain("<p>no schedule here</p>").is_none());
        assert!(rotate_release_captain("<h2>Release Captain schedule</h2><p>no list</p>").is_none());
        assert!(rotate_release_captain("<h2>Release Captain schedule</h2><ol></ol>").is_none());
    }

    #[test]
    fn test_rotate_list_with_attributes() {
        let page = "<h2>Release Captain schedule</h2>\
<ol start=\"1\"><li>Alice</li><li>Bob</li></ol>";
        let rotated = rotate_release_captain(page).unwrap();
        assert!(rotated.contains("<ol start=\"1\"><li>Bob</li><li>Alice</li></ol>"));
    }
}
