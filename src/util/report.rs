//! Plain-text reports over fetched records, used for console output.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::serde::Record;

/// Placeholder shown for missing authors.
const NOT_AVAILABLE: &str = "N/A";

/// Number of posts attributed to one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCount {
    /// Author name (`N/A` when unknown).
    pub author: String,
    /// Posts by this author in the record set.
    pub post_count: usize,
}

/// The `n` records with the most upvotes, highest first.
#[must_use]
pub fn top_by_upvotes(records: &[Record], n: usize) -> Vec<Record> {
    let mut sorted = records.to_vec();
    // Stable sort keeps fetch order among equal vote counts.
    sorted.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));
    sorted.truncate(n);
    sorted
}

/// Post counts per author, most prolific first, ties by name.
#[must_use]
pub fn count_by_author(records: &[Record]) -> Vec<AuthorCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        let author = record.author.as_deref().unwrap_or(NOT_AVAILABLE);
        *counts.entry(author).or_default() += 1;
    }
    let mut authors: Vec<AuthorCount> = counts
        .into_iter()
        .map(|(author, post_count)| AuthorCount {
            author: author.to_string(),
            post_count,
        })
        .collect();
    authors.sort_by(|a, b| {
        b.post_count
            .cmp(&a.post_count)
            .then_with(|| a.author.cmp(&b.author))
    });
    authors
}

/// Render records as an aligned `Upvotes | Author | Title` table.
#[must_use]
pub fn format_records_table(header: &str, records: &[Record]) -> String {
    if records.is_empty() {
        return "No submissions available.".to_string();
    }

    let upvotes_width = records
        .iter()
        .map(|r| r.upvotes.to_string().len())
        .max()
        .unwrap_or(0)
        .max("Upvotes".len());
    let author_width = records
        .iter()
        .map(|r| r.author.as_deref().unwrap_or(NOT_AVAILABLE).len())
        .max()
        .unwrap_or(0)
        .max("Author".len());
    let title_width = records
        .iter()
        .map(|r| r.title.len())
        .max()
        .unwrap_or(0)
        .max("Title".len());

    let mut out = String::new();
    let _ = writeln!(out, "\n{header}\n");
    let _ = writeln!(
        out,
        " {:<upvotes_width$} | {:<author_width$} | {:<title_width$}",
        "Upvotes", "Author", "Title"
    );
    let _ = writeln!(out, "{}", "-".repeat(upvotes_width + author_width + title_width + 10));
    for record in records {
        let _ = writeln!(
            out,
            " {:<upvotes_width$} | {:<author_width$} | {:<title_width$}",
            record.upvotes,
            record.author.as_deref().unwrap_or(NOT_AVAILABLE),
            record.title
        );
    }
    out
}

/// Render author counts as an aligned `Author | Post Count` table.
#[must_use]
pub fn format_author_table(header: &str, authors: &[AuthorCount]) -> String {
    if authors.is_empty() {
        return "No submissions available.".to_string();
    }

    let author_width = authors
        .iter()
        .map(|a| a.author.len())
        .max()
        .unwrap_or(0)
        .max("Author".len());

    let mut out = String::new();
    let _ = writeln!(out, "\n{header}\n");
    let _ = writeln!(out, " {:<author_width$} | Post Count", "Author");
    let _ = writeln!(out, "{}", "-".repeat(author_width + 15));
    for entry in authors {
        let _ = writeln!(out, " {:<author_width$} | {}", entry.author, entry.post_count);
    }
    out
}

/// Full console report for one source: top posts and posts per author.
#[must_use]
pub fn render_source_report(source: &str, records: &[Record], top_n: usize) -> String {
    let top = top_by_upvotes(records, top_n);
    let authors = count_by_author(&top);
    let mut out = format_records_table(
        &format!("Report: {source}\n Top {top_n} Posts with highest Upvote."),
        &top,
    );
    out.push('\n');
    out.push_str(&format_author_table(
        &format!(" Top {top_n} Posts with highest submission by user."),
        &authors,
    ));
    out
}
