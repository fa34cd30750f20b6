//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every line leads with what happened to which catalog entity, by title.
//! IDs and local paths follow as context. Logging (`tracing`) goes to stderr;
//! these lines go to stdout and form the human report of a run.
//!
//! # Output Format
//!
//! ## Sync progress
//!
//! ```text
//! + run-a [c/1]
//! run-a/ → c/1 (0 existing records)
//!     + frame → d/2
//!     = spectrum (already present)
//!     ! raw: Failed to ingest …
//! ```
//!
//! `+` marks a creation, `=` something already in the catalog, `!` a skipped
//! failure.
//!
//! ## Report
//!
//! ```text
//! Collections: 2 created, 0 existing
//! Records: 4 created, 0 already present
//! ```
//!
//! ## Listing
//!
//! ```text
//! c/root
//!     001 run-a (collection c/1)
//!     002 notes (record d/7)
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::catalog::{COLLECTION_PREFIX, ListedItem};
use crate::sync::{SyncEvent, SyncReport};

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Sync progress
// ============================================================================

/// Format a single sync progress event as display lines.
pub fn format_sync_event(event: &SyncEvent) -> Vec<String> {
    match event {
        SyncEvent::CollectionCreated { title, id, .. } => vec![format!("+ {title} [{id}]")],
        SyncEvent::CollectionFound { title, id, .. } => vec![format!("= {title} [{id}]")],
        SyncEvent::LeafStarted {
            path,
            collection,
            existing,
        } => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            vec![format!(
                "{name}/ → {collection} ({} existing)",
                plural(*existing, "record", "records")
            )]
        }
        SyncEvent::RecordCreated { title, id } => vec![format!("    + {title} → {id}")],
        SyncEvent::RecordSkipped { title } => vec![format!("    = {title} (already present)")],
        SyncEvent::ItemFailed { path, error } => {
            vec![format!("    ! {}", path.display()), format!("        {error}")]
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// Format the end-of-run summary.
pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Collections: {} created, {} existing",
            report.collections_created, report.collections_found
        ),
        format!(
            "Records: {} created, {} already present",
            report.records_created, report.records_skipped
        ),
    ];
    if !report.failures.is_empty() {
        lines.push(format!(
            "Failures: {}",
            plural(report.failures.len(), "item skipped", "items skipped")
        ));
        for failure in &report.failures {
            lines.push(format!("    {}", failure.path.display()));
            lines.push(format!("        {}", failure.error));
        }
    }
    lines
}

pub fn print_sync_report(report: &SyncReport) {
    for line in format_sync_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Listing
// ============================================================================

/// Format the children of a collection, collections first.
pub fn format_listing(collection: &str, items: &[ListedItem]) -> Vec<String> {
    let mut lines = vec![collection.to_string()];
    if items.is_empty() {
        lines.push("    (empty)".to_string());
        return lines;
    }

    let (collections, records): (Vec<&ListedItem>, Vec<&ListedItem>) = items
        .iter()
        .partition(|i| i.id.starts_with(COLLECTION_PREFIX));
    for (i, item) in collections.iter().chain(records.iter()).enumerate() {
        let kind = if item.id.starts_with(COLLECTION_PREFIX) {
            "collection"
        } else {
            "record"
        };
        lines.push(format!(
            "    {} {} ({} {})",
            format_index(i + 1),
            item.title,
            kind,
            item.id
        ));
    }
    lines
}

pub fn print_listing(collection: &str, items: &[ListedItem]) {
    for line in format_listing(collection, items) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncFailure;
    use std::path::PathBuf;

    // =========================================================================
    // Events
    // =========================================================================

    #[test]
    fn collection_events_show_title_and_id() {
        let created = SyncEvent::CollectionCreated {
            title: "run-a".into(),
            id: "c/1".into(),
            depth: 1,
        };
        assert_eq!(format_sync_event(&created), vec!["+ run-a [c/1]"]);

        let found = SyncEvent::CollectionFound {
            title: "run-a".into(),
            id: "c/1".into(),
            depth: 1,
        };
        assert_eq!(format_sync_event(&found), vec!["= run-a [c/1]"]);
    }

    #[test]
    fn leaf_event_uses_directory_name() {
        let event = SyncEvent::LeafStarted {
            path: PathBuf::from("/data/instrument/run-a"),
            collection: "c/1".into(),
            existing: 1,
        };
        assert_eq!(
            format_sync_event(&event),
            vec!["run-a/ → c/1 (1 existing record)"]
        );
    }

    #[test]
    fn record_events_are_indented() {
        let created = SyncEvent::RecordCreated {
            title: "frame".into(),
            id: "d/2".into(),
        };
        assert_eq!(format_sync_event(&created), vec!["    + frame → d/2"]);

        let skipped = SyncEvent::RecordSkipped {
            title: "frame".into(),
        };
        assert_eq!(
            format_sync_event(&skipped),
            vec!["    = frame (already present)"]
        );
    }

    #[test]
    fn failure_event_has_error_context_line() {
        let event = SyncEvent::ItemFailed {
            path: PathBuf::from("run-a/frame.png"),
            error: "boom".into(),
        };
        assert_eq!(
            format_sync_event(&event),
            vec!["    ! run-a/frame.png", "        boom"]
        );
    }

    // =========================================================================
    // Report
    // =========================================================================

    #[test]
    fn clean_report_has_two_lines() {
        let report = SyncReport {
            collections_created: 2,
            records_created: 4,
            ..SyncReport::default()
        };
        assert_eq!(
            format_sync_report(&report),
            vec![
                "Collections: 2 created, 0 existing",
                "Records: 4 created, 0 already present"
            ]
        );
    }

    #[test]
    fn failures_are_listed() {
        let report = SyncReport {
            failures: vec![SyncFailure {
                path: PathBuf::from("a/b.dat"),
                error: "nope".into(),
            }],
            ..SyncReport::default()
        };
        let lines = format_sync_report(&report);
        assert_eq!(lines[2], "Failures: 1 item skipped");
        assert_eq!(lines[3], "    a/b.dat");
        assert_eq!(lines[4], "        nope");
    }

    // =========================================================================
    // Listing
    // =========================================================================

    #[test]
    fn listing_puts_collections_first() {
        let items = vec![
            ListedItem::new("d/3", "notes"),
            ListedItem::new("c/1", "run-a"),
        ];
        assert_eq!(
            format_listing("c/root", &items),
            vec![
                "c/root",
                "    001 run-a (collection c/1)",
                "    002 notes (record d/3)"
            ]
        );
    }

    #[test]
    fn empty_listing_says_so() {
        assert_eq!(format_listing("c/9", &[]), vec!["c/9", "    (empty)"]);
    }
}
