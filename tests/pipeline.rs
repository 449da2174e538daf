//! End-to-end runs: clippings file on disk -> parser -> synchronizer -> SQLite.

use std::fs;
use std::path::Path;

use kindle_highlights::db::SqliteStore;
use kindle_highlights::parser::{
    find_clippings_files, parse_clippings, parse_clippings_files, ParseOptions,
};
use kindle_highlights::render::render_highlights;
use kindle_highlights::sync::{RecordStore, SyncOutcome, Synchronizer};

const OPTIONS: ParseOptions = ParseOptions { include_date: true };

fn entry(header: &str, meta: &str, body: &str) -> String {
    format!("{}\r\n{}\r\n\r\n{}\r\n==========\r\n", header, meta, body)
}

fn export(entries: &[String]) -> String {
    format!("\u{feff}{}", entries.concat())
}

fn initial_entries() -> Vec<String> {
    vec![
        entry(
            "Meditations (Marcus Aurelius (Trans. Hays))",
            "- Your Highlight on page 12 | Location 234-235 | Added on Monday, May 3, 2021 10:03:12 PM",
            "You have power over your mind.",
        ),
        entry(
            "Great Gatsby, The (Fitzgerald, F. Scott)",
            "- Your Highlight on page 180 | Location 2700 | Added on Tuesday, May 4, 2021 08:00:00 AM",
            "So we beat on, boats against the current.",
        ),
        entry(
            "Meditations (Marcus Aurelius (Trans. Hays))",
            "- Your Bookmark on page 14 | Location 250 | Added on Monday, May 3, 2021 10:05:00 PM",
            "",
        ),
        entry(
            "Meditations (Marcus Aurelius (Trans. Hays))",
            "- Your Note on page 13 | Location 240 | Added on Wednesday, May 5, 2021 07:30:00 AM",
            "Read this again.",
        ),
    ]
}

fn write_export(dir: &Path, entries: &[String]) -> std::path::PathBuf {
    let path = dir.join("My Clippings.txt");
    fs::write(&path, export(entries)).unwrap();
    path
}

#[test]
fn parses_export_into_ordered_books() {
    let report = parse_clippings(&export(&initial_entries()), OPTIONS);

    assert_eq!(report.total_entries, 5);
    assert_eq!(report.discarded, 2);

    let titles: Vec<&str> = report.library.books().iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, vec!["Meditations", "The Great Gatsby"]);

    let meditations = report.library.get("Meditations").unwrap();
    assert_eq!(meditations.author, "Marcus Aurelius (Trans. Hays)");
    let texts: Vec<&str> = meditations.highlights.iter().map(|h| h.text.as_str()).collect();
    assert_eq!(texts, vec!["You have power over your mind.", "Read this again."]);
    assert!(meditations.highlights[1].is_note);

    let gatsby = report.library.get("The Great Gatsby").unwrap();
    assert_eq!(gatsby.author, "F. Scott Fitzgerald");
    assert_eq!(gatsby.highlights[0].page, "180");
}

#[test]
fn second_run_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let clippings = write_export(dir.path(), &initial_entries());
    let db_path = dir.path().join("highlights.db");
    let report = parse_clippings_files(&[clippings], OPTIONS).unwrap();

    let mut store = SqliteStore::open(&db_path).unwrap();
    let first = Synchronizer::new(&mut store, true)
        .unwrap()
        .sync_library(&report.library)
        .unwrap();
    let bodies_after_first: Vec<String> = store
        .list_records()
        .unwrap()
        .iter()
        .map(|r| store.read_body(r.id).unwrap())
        .collect();
    drop(store);

    let mut store = SqliteStore::open(&db_path).unwrap();
    let second = Synchronizer::new(&mut store, true)
        .unwrap()
        .sync_library(&report.library)
        .unwrap();
    let bodies_after_second: Vec<String> = store
        .list_records()
        .unwrap()
        .iter()
        .map(|r| store.read_body(r.id).unwrap())
        .collect();

    assert_eq!(first.created, 2);
    assert_eq!(first.highlights_added, 3);
    assert_eq!(second.created + second.updated, 0);
    assert_eq!(second.unchanged, 2);
    assert_eq!(bodies_after_first, bodies_after_second);
}

#[test]
fn new_clippings_update_existing_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open(&dir.path().join("highlights.db")).unwrap();

    let report = parse_clippings(&export(&initial_entries()), OPTIONS);
    Synchronizer::new(&mut store, true)
        .unwrap()
        .sync_library(&report.library)
        .unwrap();

    let mut entries = initial_entries();
    entries.push(entry(
        "Meditations (Marcus Aurelius (Trans. Hays))",
        "- Your Highlight on page 20 | Location 300 | Added on Thursday, May 6, 2021 09:00:00 PM",
        "Waste no more time arguing what a good man should be.",
    ));
    let report = parse_clippings(&export(&entries), OPTIONS);

    let mut sync = Synchronizer::new(&mut store, true).unwrap();
    let meditations = report.library.get("Meditations").unwrap();
    let gatsby = report.library.get("The Great Gatsby").unwrap();
    assert_eq!(
        sync.sync_book(meditations).unwrap(),
        SyncOutcome::Updated { diff_count: 1 }
    );
    assert_eq!(sync.sync_book(gatsby).unwrap(), SyncOutcome::Unchanged);
    drop(sync);

    let records = store.list_records().unwrap();
    assert_eq!(records.len(), 2);
    let record = records.iter().find(|r| r.title == "Meditations").unwrap();
    assert_eq!(record.highlight_count, Some(3));
    assert_eq!(
        store.read_body(record.id).unwrap(),
        render_highlights(&meditations.highlights, true).body
    );
    assert_eq!(store.list_child_blocks(record.id).unwrap().len(), 1);
}

#[test]
fn rendered_body_carries_metadata() {
    let report = parse_clippings(&export(&initial_entries()), OPTIONS);
    let meditations = report.library.get("Meditations").unwrap();

    let rendered = render_highlights(&meditations.highlights, true);

    assert_eq!(
        rendered.body,
        "You have power over your mind.\n\
         (Page: 12  Location: 234-235  Date Added: 2021-05-03 22:03:12)\n\n\
         **Note: **Read this again.\n\
         (Page: 13  Location: 240  Date Added: 2021-05-05 07:30:00)\n\n"
    );
}

#[test]
fn finds_clippings_on_mounted_device() {
    let dir = tempfile::tempdir().unwrap();
    let documents = dir.path().join("documents");
    fs::create_dir_all(&documents).unwrap();
    let path = write_export(&documents, &initial_entries());

    let files = find_clippings_files(dir.path());

    assert_eq!(files, vec![path]);
}

#[test]
fn day_first_twelve_hour_dates_reach_the_store() {
    let raw = export(&[entry(
        "Dune (Frank Herbert)",
        "- Your Highlight on page 5 | Location 10 | Added on Sunday, 2 May 2021 10:03:12 PM",
        "Fear",
    )]);
    let report = parse_clippings(&raw, OPTIONS);
    let mut store = SqliteStore::open_in_memory().unwrap();

    Synchronizer::new(&mut store, true)
        .unwrap()
        .sync_library(&report.library)
        .unwrap();

    let record = &store.list_records().unwrap()[0];
    assert_eq!(
        store.read_body(record.id).unwrap(),
        "Fear\n(Page: 5  Location: 10  Date Added: 2021-05-02 22:03:12)\n\n"
    );
    assert_eq!(
        record
            .last_highlighted_at
            .map(|dt| dt.naive_local().to_string()),
        Some("2021-05-02 22:03:12".to_string())
    );
}
