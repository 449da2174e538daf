use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub highlights: Vec<Highlight>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub text: String,
    pub page: String,
    pub location: String,
    /// `None` when the entry had no date, dates were disabled, or the token
    /// could not be parsed.
    pub date: Option<NaiveDateTime>,
    pub is_note: bool,
}

impl Book {
    pub fn new(title: &str, author: &str) -> Self {
        Book {
            title: title.to_string(),
            author: author.to_string(),
            highlights: Vec::new(),
        }
    }

    pub fn highlight_count(&self) -> i64 {
        self.highlights.len() as i64
    }
}
