//! Reading time estimation

use super::post::ContentSection;
use super::richtext::as_text;

/// Default reading speed in words per minute
pub const WORDS_PER_MINUTE: usize = 200;

/// Whitespace-delimited words across every section, headings included
pub fn count_words(sections: &[ContentSection]) -> usize {
    sections
        .iter()
        .map(|section| {
            section.heading.split_whitespace().count()
                + as_text(&section.body).split_whitespace().count()
        })
        .sum()
}

/// Estimated reading time in whole minutes
///
/// The word total is divided once and rounded up. Content with at least one
/// section never reads in 0 minutes.
pub fn estimate_minutes(sections: &[ContentSection], words_per_minute: usize) -> usize {
    if sections.is_empty() {
        return 0;
    }
    let words = count_words(sections);
    words.div_ceil(words_per_minute.max(1)).max(1)
}
