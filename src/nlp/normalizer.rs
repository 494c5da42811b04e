//! Text normalizer and catalog matcher
//!
//! Segments raw text into sentences and words, lemmatizes alphabetic tokens
//! and keeps every token whose lemma is a catalog surface form. Matches carry
//! the untouched sentence and token so the judge sees the student's own
//! phrasing.

use crate::catalog::VocabularyCatalog;
use crate::nlp::lemmatizer::Lemmatize;
use crate::types::{StudentId, UsageMatch};
use unicode_segmentation::UnicodeSegmentation;

/// Extracts catalog-word usages from student text
pub struct TextNormalizer<'a> {
    catalog: &'a VocabularyCatalog,
    lemmatizer: &'a dyn Lemmatize,
}

impl<'a> TextNormalizer<'a> {
    pub fn new(catalog: &'a VocabularyCatalog, lemmatizer: &'a dyn Lemmatize) -> Self {
        Self {
            catalog,
            lemmatizer,
        }
    }

    /// Every catalog-word occurrence in `text`, in reading order.
    /// Empty or malformed text yields no matches.
    pub fn extract(&self, student_id: StudentId, text: &str) -> Vec<UsageMatch> {
        let mut matches = Vec::new();
        for sentence in text.unicode_sentences() {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            for token in sentence.unicode_words() {
                let Some(word) = alphabetic_core(token) else {
                    continue;
                };
                let lemma = self.lemmatizer.lemmatize(&word.to_lowercase());
                if let Some(entry) = self.catalog.lookup(&lemma) {
                    matches.push(UsageMatch {
                        word_id: entry.id,
                        student_id,
                        original_sentence: sentence.to_string(),
                        original_surface_form: word.to_string(),
                    });
                }
            }
        }
        matches
    }

    /// Matches across several speaker-attributed spans of one student
    pub fn extract_spans<S: AsRef<str>>(&self, student_id: StudentId, spans: &[S]) -> Vec<UsageMatch> {
        spans
            .iter()
            .flat_map(|span| self.extract(student_id, span.as_ref()))
            .collect()
    }
}

/// Strip a possessive `'s` and reject tokens with any non-letter
fn alphabetic_core(token: &str) -> Option<&str> {
    let core = token
        .strip_suffix("'s")
        .or_else(|| token.strip_suffix("\u{2019}s"))
        .unwrap_or(token);
    if !core.is_empty() && core.chars().all(char::is_alphabetic) {
        Some(core)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::lemmatizer::RuleLemmatizer;
    use crate::types::WordId;

    fn fixture() -> (VocabularyCatalog, RuleLemmatizer) {
        let catalog = VocabularyCatalog::from_grade_lists(vec![(
            7,
            vec!["endure", "prevail", "through", "thorough"],
        )]);
        let lemmatizer =
            RuleLemmatizer::with_dictionary(catalog.words().iter().map(|w| w.surface_form.clone()));
        (catalog, lemmatizer)
    }

    #[test]
    fn test_matches_keep_original_form_and_sentence() {
        let (catalog, lem) = fixture();
        let normalizer = TextNormalizer::new(&catalog, &lem);

        let matches = normalizer.extract(
            StudentId(4),
            "We endured the storm. Then kindness prevails!",
        );

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].original_surface_form, "endured");
        assert_eq!(matches[0].original_sentence, "We endured the storm.");
        assert_eq!(matches[0].word_id, catalog.lookup("endure").unwrap().id);
        assert_eq!(matches[1].original_surface_form, "prevails");
        assert_eq!(matches[1].original_sentence, "Then kindness prevails!");
    }

    #[test]
    fn test_threw_does_not_match_through() {
        let (catalog, lem) = fixture();
        let normalizer = TextNormalizer::new(&catalog, &lem);
        let through = catalog.lookup("through").unwrap().id;

        let matches = normalizer.extract(StudentId(1), "He threw the ball.");
        assert!(matches.iter().all(|m| m.word_id != through));
        assert!(matches.is_empty());
    }

    #[test]
    fn test_repeated_word_keeps_every_occurrence() {
        let (catalog, lem) = fixture();
        let normalizer = TextNormalizer::new(&catalog, &lem);

        let matches = normalizer.extract(
            StudentId(1),
            "I need to be more through with my work. I went through the tunnel.",
        );
        assert_eq!(matches.len(), 2);
        assert_ne!(matches[0].original_sentence, matches[1].original_sentence);
    }

    #[test]
    fn test_empty_and_non_alphabetic_input() {
        let (catalog, lem) = fixture();
        let normalizer = TextNormalizer::new(&catalog, &lem);

        assert!(normalizer.extract(StudentId(1), "").is_empty());
        assert!(normalizer.extract(StudentId(1), "   \n\t").is_empty());
        assert!(normalizer.extract(StudentId(1), "1234 5678 !!! endure2").is_empty());
    }

    #[test]
    fn test_extract_spans() {
        let (catalog, lem) = fixture();
        let normalizer = TextNormalizer::new(&catalog, &lem);
        let spans = vec!["We must prevail.", "Nothing here.", "Endure it."];
        let matches = normalizer.extract_spans(StudentId(9), &spans);
        let ids: Vec<WordId> = matches.iter().map(|m| m.word_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(matches.iter().all(|m| m.student_id == StudentId(9)));
    }
}
