use crate::library::{AddOutcome, Library};
use crate::models::Highlight;
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const CLIPPING_DELIMITER: &str = "==========";
pub const CLIPPINGS_FILE_NAME: &str = "My Clippings.txt";

const UNKNOWN_AUTHOR: &str = "Unknown";
const BYTE_ORDER_MARK: char = '\u{feff}';
const MIN_CLIPPING_LINES: usize = 3;

static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(.*?\)").expect("valid regex"));

// Tried in order after any leading weekday has been removed.
const DATETIME_FORMATS: &[&str] = &[
    "%B %d, %Y %I:%M:%S %p",
    "%B %d, %Y %I:%M %p",
    "%B %d, %Y %H:%M:%S",
    "%d %B %Y %I:%M:%S %p",
    "%d %B %Y %I:%M %p",
    "%d %B %Y %H:%M:%S",
    "%d %B %Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];
const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%d %B %Y", "%Y-%m-%d"];

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Not a clipping: expected at least 3 lines, found {lines}")]
    InvalidClipping { lines: usize },
    #[error("Failed to read clippings file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseOptions {
    pub include_date: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub page: String,
    pub location: String,
    pub date: Option<NaiveDateTime>,
    pub is_note: bool,
}

/// One valid entry, ready to be folded into a [`Library`].
#[derive(Debug, Clone, PartialEq)]
pub struct Clipping {
    pub title: String,
    pub author: String,
    pub highlight: Highlight,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParseReport {
    pub library: Library,
    /// Every delimiter-separated block seen, malformed ones included.
    pub total_entries: usize,
    /// Bookmarks and other blocks too short to be a clipping.
    pub discarded: usize,
}

impl ParseReport {
    /// Folds one raw clippings export into the report.
    pub fn absorb(&mut self, raw: &str, options: ParseOptions) {
        let blocks = split_entries(raw);
        tracing::info!(entries = blocks.len(), "found notes and highlights");
        self.total_entries += blocks.len();

        for block in blocks {
            let lines = entry_lines(block);
            match parse_clipping(&lines, options) {
                Ok(clipping) => {
                    if let AddOutcome::NewBook =
                        self.library
                            .add_entry(&clipping.title, &clipping.author, clipping.highlight)
                    {
                        tracing::debug!(title = %clipping.title, "new book");
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "skipping entry");
                    self.discarded += 1;
                }
            }
        }
    }
}

pub fn parse_clippings(raw: &str, options: ParseOptions) -> ParseReport {
    let mut report = ParseReport::default();
    report.absorb(raw, options);
    report
}

/// Reads and parses every file into a single report, in the given order.
pub fn parse_clippings_files(
    paths: &[PathBuf],
    options: ParseOptions,
) -> Result<ParseReport, ParseError> {
    let mut report = ParseReport::default();

    for path in paths {
        let raw = fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "parsing clippings");
        report.absorb(&raw, options);
    }

    Ok(report)
}

pub fn split_entries(raw: &str) -> Vec<&str> {
    raw.split(CLIPPING_DELIMITER).collect()
}

pub fn entry_lines(block: &str) -> Vec<&str> {
    block.trim().lines().collect()
}

pub fn parse_clipping(lines: &[&str], options: ParseOptions) -> Result<Clipping, ParseError> {
    if lines.len() < MIN_CLIPPING_LINES {
        return Err(ParseError::InvalidClipping { lines: lines.len() });
    }

    let (author, title) = parse_author_and_title(lines[0]);
    let metadata = parse_metadata_line(lines[1], options.include_date);
    // Three lines means the body line itself is missing.
    let text = lines.get(3).copied().unwrap_or_default();

    Ok(Clipping {
        title,
        author,
        highlight: Highlight {
            text: text.to_string(),
            page: metadata.page,
            location: metadata.location,
            date: metadata.date,
            is_note: metadata.is_note,
        },
    })
}

/// Splits a `Title (Author)` header into `(author, title)`.
pub fn parse_author_and_title(header: &str) -> (String, String) {
    let (author, title) = match PARENTHESIZED.find_iter(header).last() {
        Some(found) => {
            let raw = found.as_str();
            let author = raw.strip_prefix('(').unwrap_or(raw);
            let author = author.strip_suffix(')').unwrap_or(author);
            let title = header
                .replace(author, "")
                .replace(BYTE_ORDER_MARK, "")
                .replace(" ()", "");
            (author.to_string(), title.trim().to_string())
        }
        None => (
            UNKNOWN_AUTHOR.to_string(),
            header.replace(BYTE_ORDER_MARK, "").trim().to_string(),
        ),
    };

    let (author, title) = fix_nested_parenthesis(author, title);
    let author = reorder_last_first(author);
    let title = move_leading_article(title);

    if author.trim().is_empty() {
        return (UNKNOWN_AUTHOR.to_string(), title);
    }
    (author, title)
}

// The lazy match stops at the first `)`, so "Name (Middle)" loses its closing
// paren to the title.
fn fix_nested_parenthesis(mut author: String, title: String) -> (String, String) {
    if author.matches('(').count() > author.matches(')').count() {
        author.push(')');
        let title = title.strip_suffix(')').unwrap_or(&title).trim_end().to_string();
        return (author, title);
    }
    (author, title)
}

fn reorder_last_first(author: String) -> String {
    match author.split_once(", ") {
        Some((last, first)) => format!("{} {}", first, last),
        None => author,
    }
}

fn move_leading_article(title: String) -> String {
    if title.contains(", The") {
        format!("The {}", title.replace(", The", ""))
    } else {
        title
    }
}

/// Parses `- Your Highlight on page X | Location Y | Added on <date>`.
///
/// Tokens are matched case-insensitively and in any order; missing tokens
/// leave their field empty.
pub fn parse_metadata_line(line: &str, include_date: bool) -> Metadata {
    let mut metadata = Metadata {
        is_note: line.contains("Note"),
        ..Default::default()
    };

    for element in line.trim().split(" | ") {
        // ASCII lowering keeps byte offsets valid for slicing the original.
        let lowered = element.to_ascii_lowercase();

        if let Some(page) = value_after(element, &lowered, "page") {
            metadata.page = page.to_string();
        }
        if let Some(location) = value_after(element, &lowered, "location") {
            metadata.location = location.to_string();
        }
        if include_date {
            if let Some(raw) = value_after(element, &lowered, "added on") {
                metadata.date = parse_clipping_date(raw);
                if metadata.date.is_none() {
                    tracing::debug!(date = raw, "unparsable highlight date");
                }
            }
        }
    }

    metadata
}

fn value_after<'a>(element: &'a str, lowered: &str, token: &str) -> Option<&'a str> {
    lowered
        .find(token)
        .map(|i| element[i + token.len()..].trim())
}

/// Parses the date forms Kindle devices write, e.g.
/// `Tuesday, May 1, 2021 10:03:12 PM` or `Monday, 3 May 2021 22:03:12`.
///
/// A leading weekday is dropped before parsing, so it is never checked
/// against the date. Date-only values land at midnight.
pub fn parse_clipping_date(raw: &str) -> Option<NaiveDateTime> {
    let s = strip_weekday(raw.trim());

    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn strip_weekday(s: &str) -> &str {
    match s.split_once([',', ' ']) {
        Some((head, rest)) if head.parse::<Weekday>().is_ok() => rest.trim_start(),
        _ => s,
    }
}

/// Resolves a clippings path: a file is used as-is, a directory (such as a
/// mounted Kindle) is searched for clippings exports.
pub fn find_clippings_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path()
                    .file_name()
                    .map(|n| n.to_string_lossy() == CLIPPINGS_FILE_NAME)
                    .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect()
}
