use crate::models::Highlight;
use chrono::NaiveDateTime;

pub const BOLD: &str = "**";
/// Largest text run a single rich-text segment may hold.
pub const CHUNK_SIZE: usize = 2000;
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    pub body: String,
    /// Date of the last highlight in iteration order, not the latest by value.
    pub last_date: Option<NaiveDateTime>,
}

/// Renders highlights, in order, into one text body.
///
/// Each highlight becomes a block such as
///
/// ```text
/// **Note: **Some text
/// (Page: 12  Location: 234-235  Date Added: 2021-05-03 22:03:12)
/// ```
///
/// followed by a blank line.
pub fn render_highlights(highlights: &[Highlight], include_date: bool) -> Rendered {
    let mut body = String::new();

    for highlight in highlights {
        if highlight.is_note {
            body.push_str(BOLD);
            body.push_str("Note: ");
            body.push_str(BOLD);
        }

        body.push_str(&highlight.text);
        body.push_str("\n(");
        if !highlight.page.is_empty() {
            body.push_str(&format!("Page: {}  ", highlight.page));
        }
        if !highlight.location.is_empty() {
            body.push_str(&format!("Location: {}  ", highlight.location));
        }
        if include_date {
            if let Some(date) = highlight.date {
                body.push_str(&format!("Date Added: {}", date.format(DATE_FORMAT)));
            }
        }

        body.truncate(body.trim_end().len());
        body.push_str(")\n\n");
    }

    Rendered {
        body,
        last_date: highlights.last().and_then(|h| h.date),
    }
}

/// Splits text into runs of at most `size` characters.
///
/// Counts chars, not bytes, so a multi-byte character is never split.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}
