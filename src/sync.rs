use crate::db::StoreError;
use crate::library::Library;
use crate::models::Book;
use crate::render::{chunk_text, render_highlights, CHUNK_SIZE};
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use std::collections::HashMap;

pub type RecordId = i64;
pub type BlockId = i64;

/// A book as the record store last saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteBookRecord {
    pub id: RecordId,
    pub title: String,
    pub author: String,
    pub highlight_count: Option<i64>,
    pub last_highlighted_at: Option<DateTime<FixedOffset>>,
    pub last_synced_at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub title: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub highlight_count: i64,
    pub last_highlighted_at: Option<DateTime<FixedOffset>>,
    pub last_synced_at: DateTime<FixedOffset>,
}

/// The record service books are synchronized into. Every call is treated as
/// atomic and final; retries belong to the implementation, not the caller.
pub trait RecordStore {
    fn list_records(&self) -> Result<Vec<RemoteBookRecord>, StoreError>;

    /// Creates a record with its highlight count seeded at 0.
    fn create_record(&mut self, record: &NewRecord) -> Result<RemoteBookRecord, StoreError>;

    fn list_child_blocks(&self, record_id: RecordId) -> Result<Vec<BlockId>, StoreError>;

    fn delete_child_blocks(
        &mut self,
        record_id: RecordId,
        block_ids: &[BlockId],
    ) -> Result<(), StoreError>;

    /// Appends one text block made of `chunks`, read back as their concatenation.
    fn append_text_block(&mut self, record_id: RecordId, chunks: &[String])
        -> Result<(), StoreError>;

    fn update_record(&mut self, record_id: RecordId, update: &RecordUpdate)
        -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to list records: {0}")]
    Snapshot(#[source] StoreError),
    #[error("Failed to sync '{title}': {source}")]
    Store {
        title: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    Created { diff_count: i64 },
    Updated { diff_count: i64 },
    Unchanged,
}

impl SyncOutcome {
    pub fn record(self, stats: &mut SyncStats) {
        match self {
            SyncOutcome::Created { diff_count } => {
                stats.created += 1;
                stats.highlights_added += diff_count;
            }
            SyncOutcome::Updated { diff_count } => {
                stats.updated += 1;
                stats.highlights_added += diff_count;
            }
            SyncOutcome::Unchanged => stats.unchanged += 1,
        }
    }

    pub fn diff_count(self) -> Option<i64> {
        match self {
            SyncOutcome::Created { diff_count } | SyncOutcome::Updated { diff_count } => {
                Some(diff_count)
            }
            SyncOutcome::Unchanged => None,
        }
    }

    pub fn message(self) -> Option<String> {
        self.diff_count()
            .map(|diff| format!("{} notes / highlights added successfully", diff))
    }
}

/// Progress reported while books are synchronized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncEvent<'a> {
    Checking(&'a Book),
    /// The book will be created or updated. Sent before its first write.
    Changing(&'a Book),
    Finished(&'a Book, SyncOutcome),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncStats {
    pub created: i32,
    pub updated: i32,
    pub unchanged: i32,
    pub highlights_added: i64,
}

/// Reconciles books against one snapshot of the store.
///
/// The snapshot is read once, when the synchronizer is built. Runs against the
/// same store must not overlap: two runs can both miss a title and both create it.
pub struct Synchronizer<'s, S: RecordStore> {
    store: &'s mut S,
    by_title: HashMap<String, RemoteBookRecord>,
    include_date: bool,
    dry_run: bool,
}

impl<'s, S: RecordStore> Synchronizer<'s, S> {
    pub fn new(store: &'s mut S, include_date: bool) -> Result<Self, SyncError> {
        let records = store.list_records().map_err(SyncError::Snapshot)?;
        tracing::info!(records = records.len(), "fetched record snapshot");

        let mut by_title = HashMap::with_capacity(records.len());
        for record in records {
            // first listed wins
            by_title.entry(record.title.clone()).or_insert(record);
        }

        Ok(Synchronizer {
            store,
            by_title,
            include_date,
            dry_run: false,
        })
    }

    /// Decide outcomes without writing anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn sync_library(&mut self, library: &Library) -> Result<SyncStats, SyncError> {
        self.sync_library_with(library, |_| {})
    }

    /// Like [`sync_library`](Self::sync_library), reporting progress to `on_event`.
    pub fn sync_library_with(
        &mut self,
        library: &Library,
        mut on_event: impl FnMut(SyncEvent<'_>),
    ) -> Result<SyncStats, SyncError> {
        let mut stats = SyncStats::default();
        for book in library {
            on_event(SyncEvent::Checking(book));
            let outcome = self.sync_book_with(book, &mut on_event)?;
            on_event(SyncEvent::Finished(book, outcome));
            outcome.record(&mut stats);
        }
        tracing::info!(
            created = stats.created,
            updated = stats.updated,
            unchanged = stats.unchanged,
            "sync finished"
        );
        Ok(stats)
    }

    pub fn sync_book(&mut self, book: &Book) -> Result<SyncOutcome, SyncError> {
        self.sync_book_with(book, &mut |_: SyncEvent<'_>| {})
    }

    fn sync_book_with(
        &mut self,
        book: &Book,
        on_event: &mut impl FnMut(SyncEvent<'_>),
    ) -> Result<SyncOutcome, SyncError> {
        let count = book.highlight_count();
        let existing = self.by_title.get(&book.title).cloned();

        if let Some(record) = &existing {
            if record.highlight_count == Some(count) {
                tracing::debug!(title = %book.title, count, "unchanged");
                return Ok(SyncOutcome::Unchanged);
            }
        }

        let previous = existing
            .as_ref()
            .and_then(|r| r.highlight_count)
            .unwrap_or(0);
        let diff_count = count - previous;
        let outcome = match existing {
            Some(_) => SyncOutcome::Updated { diff_count },
            None => SyncOutcome::Created { diff_count },
        };

        on_event(SyncEvent::Changing(book));
        if self.dry_run {
            tracing::info!(title = %book.title, diff = diff_count, ?outcome, "dry run");
            return Ok(outcome);
        }

        let rendered = render_highlights(&book.highlights, self.include_date);
        let store_err = |source| SyncError::Store {
            title: book.title.clone(),
            source,
        };

        let mut record = match existing {
            Some(record) => record,
            None => self
                .store
                .create_record(&NewRecord {
                    title: book.title.clone(),
                    author: book.author.clone(),
                })
                .map_err(store_err)?,
        };

        let blocks = self.store.list_child_blocks(record.id).map_err(store_err)?;
        if !blocks.is_empty() {
            self.store
                .delete_child_blocks(record.id, &blocks)
                .map_err(store_err)?;
        }

        let chunks = chunk_text(&rendered.body, CHUNK_SIZE);
        self.store
            .append_text_block(record.id, &chunks)
            .map_err(store_err)?;

        let update = RecordUpdate {
            highlight_count: count,
            last_highlighted_at: rendered.last_date.and_then(local_timestamp),
            last_synced_at: Local::now().fixed_offset(),
        };
        self.store
            .update_record(record.id, &update)
            .map_err(store_err)?;

        tracing::info!(title = %book.title, diff = diff_count, chunks = chunks.len(), ?outcome, "synced");

        record.highlight_count = Some(update.highlight_count);
        record.last_highlighted_at = update.last_highlighted_at;
        record.last_synced_at = Some(update.last_synced_at);
        self.by_title.insert(book.title.clone(), record);

        Ok(outcome)
    }
}

/// Reads a naive clipping date as local time.
fn local_timestamp(naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
}
