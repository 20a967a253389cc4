//! Time-seeded catalog recommendations.
//!
//! The catalog is shuffled with a small linear-congruential generator seeded
//! from the hour of day, then grouped into fixed Arabic categories by keyword.
//! Results are stable for the whole hour and rotate afterwards.
use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

use crate::model::Book;

const LCG_A: u64 = 1_664_525;
const LCG_C: u64 = 1_013_904_223;
const LCG_M: u64 = 1 << 32;

/// Label used for books that match none of the fixed categories.
pub const OTHER_BUCKET: &str = "أخرى";

/// Fixed buckets in display order, each with the keywords that select it.
pub const BUCKETS: &[(&str, &[&str])] = &[
    ("روايات", &["رواية", "روايات", "قصة", "قصص", "novel", "fiction"]),
    ("شعر", &["شعر", "ديوان", "قصائد", "poetry"]),
    ("تاريخ", &["تاريخ", "تاريخي", "حضارة", "history"]),
    ("فلسفة", &["فلسفة", "فكر", "philosophy"]),
    ("دين", &["دين", "ديني", "دينية", "فقه", "تفسير", "religion"]),
    ("أطفال", &["أطفال", "طفل", "children", "kids"]),
    ("علوم", &["علوم", "علم", "فيزياء", "كيمياء", "science"]),
];

#[derive(Debug, Clone, Copy)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed % LCG_M }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = (LCG_A.wrapping_mul(self.state).wrapping_add(LCG_C)) % LCG_M;
        self.state as u32
    }

    /// Uniform-ish index in `0..bound`. `bound` must be non-zero.
    pub fn next_index(&mut self, bound: usize) -> usize {
        (self.next_u32() as usize) % bound
    }
}

/// Seed derived from the time of day: the current UTC hour.
pub fn seed_for(now: DateTime<Utc>) -> u64 {
    u64::from(now.hour())
}

/// Fisher-Yates shuffle driven by the LCG. Deterministic for a given seed.
pub fn shuffle<T>(items: &mut [T], seed: u64) {
    let mut rng = Lcg::new(seed);
    for i in (1..items.len()).rev() {
        let j = rng.next_index(i + 1);
        items.swap(i, j);
    }
}

/// Lowercased words of `text` with the Arabic definite article stripped, so
/// "التاريخ" matches the keyword "تاريخ".
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let w = w.to_lowercase();
            match w.strip_prefix("ال") {
                Some(rest) if rest.chars().count() > 1 => rest.to_string(),
                _ => w,
            }
        })
        .collect()
}

/// Name of the first fixed bucket with a keyword among the words of the
/// book's category, title or description. Keywords match whole words only.
pub fn bucket_for(book: &Book) -> &'static str {
    let mut haystack = words(&book.category);
    haystack.extend(words(&book.title));
    haystack.extend(words(book.description.as_deref().unwrap_or_default()));
    BUCKETS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| haystack.iter().any(|w| w == k)))
        .map(|(label, _)| *label)
        .unwrap_or(OTHER_BUCKET)
}

#[derive(Debug, Clone, Serialize)]
pub struct Bucket {
    pub label: &'static str,
    pub books: Vec<Book>,
}

/// Shuffle `books` with `seed`, group them and keep at most `limit` per group.
/// Empty groups are dropped; the fixed order is kept with "other" last.
pub fn recommend(mut books: Vec<Book>, seed: u64, limit: usize) -> Vec<Bucket> {
    shuffle(&mut books, seed);

    let mut buckets: Vec<Bucket> = BUCKETS
        .iter()
        .map(|(label, _)| *label)
        .chain(std::iter::once(OTHER_BUCKET))
        .map(|label| Bucket {
            label,
            books: Vec::new(),
        })
        .collect();

    for book in books {
        let label = bucket_for(&book);
        if let Some(bucket) = buckets.iter_mut().find(|b| b.label == label) {
            if bucket.books.len() < limit {
                bucket.books.push(book);
            }
        }
    }

    buckets.retain(|b| !b.books.is_empty());
    buckets
}
