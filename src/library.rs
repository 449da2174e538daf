use crate::models::{Book, Highlight};
use std::collections::HashMap;

/// What happened when an entry was folded into the library.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    NewBook,
    Appended,
    /// The title was already known under another author. The latest author
    /// replaces the previous one.
    AuthorReplaced { previous: String },
}

/// Books keyed by title, kept in order of first sighting.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Library {
    books: Vec<Book>,
    index: HashMap<String, usize>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, title: &str, author: &str, highlight: Highlight) -> AddOutcome {
        match self.index.get(title) {
            Some(&i) => {
                let book = &mut self.books[i];
                book.highlights.push(highlight);

                if book.author != author {
                    let previous = std::mem::replace(&mut book.author, author.to_string());
                    tracing::warn!(title, %previous, author, "title seen with a different author");
                    AddOutcome::AuthorReplaced { previous }
                } else {
                    AddOutcome::Appended
                }
            }
            None => {
                let mut book = Book::new(title, author);
                book.highlights.push(highlight);
                self.index.insert(title.to_string(), self.books.len());
                self.books.push(book);
                AddOutcome::NewBook
            }
        }
    }

    pub fn get(&self, title: &str) -> Option<&Book> {
        self.index.get(title).map(|&i| &self.books[i])
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn highlight_count(&self) -> usize {
        self.books.iter().map(|b| b.highlights.len()).sum()
    }
}

impl<'a> IntoIterator for &'a Library {
    type Item = &'a Book;
    type IntoIter = std::slice::Iter<'a, Book>;

    fn into_iter(self) -> Self::IntoIter {
        self.books.iter()
    }
}
