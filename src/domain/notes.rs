/// A resolved issue to be listed in the release notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteIssue {
    /// Issue type used as chapter title (e.g. "Bug", "Task")
    pub issue_type: String,
    /// Tracker key (e.g. "SDK-123")
    pub key: String,
    /// One-line summary
    pub summary: String,
    /// Permalink to the issue
    pub url: String,
}

/// Target surface the notes are rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotesFormat {
    /// Chat markup: bare chapter lines, utf8 bullets, `[<url|KEY>]` links
    Slack,
    /// Git-flavored markdown: `## **Title**` chapters, `-` bullets
    Git,
    /// No markup at all
    Plain,
}

/// Build release notes from resolved issues grouped by issue type.
///
/// Chapters appear in first-seen issue-type order, followed by a final
/// "Target apps" chapter listing the application versions shipping this
/// release. Exact markup per format:
///
/// - `Git`: `## **Bug**` chapter, `- \[[SDK-1](url)\] - summary` bullets
/// - `Slack`: `Bug` chapter, `• [<url|SDK-1>] - summary` bullets
/// - `Plain`: `Bug` chapter, `- [SDK-1] - summary` bullets
pub fn build_notes(
    issues: &[NoteIssue],
    apps: &[String],
    format: NotesFormat,
    include_urls: bool,
) -> String {
    // group by issue type, keeping first-seen chapter order
    let mut chapters: Vec<(&str, Vec<&NoteIssue>)> = Vec::new();
    for issue in issues {
        match chapters.iter_mut().find(|(t, _)| *t == issue.issue_type) {
            Some((_, list)) => list.push(issue),
            None => chapters.push((&issue.issue_type, vec![issue])),
        }
    }

    let bullet = bullet_glyph(format);
    let mut notes = String::new();
    for (title, list) in &chapters {
        notes.push_str(&chapter_heading(title, format));
        for issue in list {
            let url = if include_urls { issue.url.as_str() } else { "" };
            notes.push_str(bullet);
            notes.push(' ');
            notes.push_str(&issue_line(&issue.key, url, &issue.summary, format));
        }
        notes.push('\n');
    }

    notes.push_str(&chapter_heading("Target apps", format));
    for app in apps {
        notes.push_str(&format!("{} {}\n", bullet, app));
    }
    notes
}

fn bullet_glyph(format: NotesFormat) -> &'static str {
    match format {
        NotesFormat::Slack => "\u{2022}",
        _ => "-",
    }
}

fn chapter_heading(title: &str, format: NotesFormat) -> String {
    match format {
        NotesFormat::Slack => format!("{}\n", title),
        NotesFormat::Git => format!("## **{}**\n\n", title),
        NotesFormat::Plain => format!("{}\n\n", title),
    }
}

fn issue_line(key: &str, url: &str, summary: &str, format: NotesFormat) -> String {
    let prefix = if url.is_empty() {
        format!("[{}]", key)
    } else {
        match format {
            NotesFormat::Slack => format!("[<{}|{}>]", url, key),
            NotesFormat::Git => format!("\\[[{}]({})\\]", key, url),
            NotesFormat::Plain => key.to_string(),
        }
    };
    format!("{} - {}\n", prefix, summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bug_issue() -> NoteIssue {
        NoteIssue {
            issue_type: "Bug".to_string(),
            key: "SDK-1".to_string(),
            summary: "Fix crash".to_string(),
            url: "https://tracker.example.com/browse/SDK-1".to_string(),
        }
    }

    #[test]
    fn test_git_format_has_markdown_chapter() {
        let notes = build_notes(&[bug_issue()], &[], NotesFormat::Git, true);
        assert!(notes.contains("## **Bug**"));
        let bullet_line = notes
            .lines()
            .find(|l| l.starts_with('-'))
            .expect("bullet line");
        assert!(bullet_line.contains("SDK-1"));
        assert!(bullet_line.contains("Fix crash"));
        assert!(bullet_line.contains("\\[[SDK-1](https://tracker.example.com/browse/SDK-1)\\]"));
    }

    #[test]
    fn test_slack_format_has_no_heading_markup() {
        let notes = build_notes(&[bug_issue()], &[], NotesFormat::Slack, true);
        assert!(notes.contains("Bug\n"));
        assert!(!notes.contains("##"));
        assert!(notes.contains("\u{2022} [<https://tracker.example.com/browse/SDK-1|SDK-1>]"));
        assert!(!notes.lines().any(|l| l.starts_with('-')));
    }

    #[test]
    fn test_urls_omitted() {
        let notes = build_notes(&[bug_issue()], &[], NotesFormat::Git, false);
        assert!(notes.contains("- [SDK-1] - Fix crash"));
        assert!(!notes.contains("https://"));
    }

    #[test]
    fn test_chapters_group_by_type_in_first_seen_order() {
        let issues = vec![
            NoteIssue {
                issue_type: "Bug".into(),
                key: "SDK-1".into(),
                summary: "Fix crash".into(),
                url: String::new(),
            },
            NoteIssue {
                issue_type: "Task".into(),
                key: "SDK-2".into(),
                summary: "Do chores".into(),
                url: String::new(),
            },
            NoteIssue {
                issue_type: "Bug".into(),
                key: "SDK-3".into(),
                summary: "Fix leak".into(),
                url: String::new(),
            },
        ];
        let notes = build_notes(&issues, &[], NotesFormat::Git, false);
        let bug_pos = notes.find("## **Bug**").unwrap();
        let task_pos = notes.find("## **Task**").unwrap();
        assert!(bug_pos < task_pos);
        // both bugs land in the Bug chapter
        let bug_chapter = &notes[bug_pos..task_pos];
        assert!(bug_chapter.contains("SDK-1"));
        assert!(bug_chapter.contains("SDK-3"));
    }

    #[test]
    fn test_target_apps_chapter() {
        let apps = vec!["iOS 12.1".to_string(), "Android 9.3".to_string()];
        let notes = build_notes(&[], &apps, NotesFormat::Slack, true);
        assert!(notes.contains("Target apps\n"));
        assert!(notes.contains("\u{2022} iOS 12.1\n"));
        assert!(notes.contains("\u{2022} Android 9.3\n"));
    }
}
