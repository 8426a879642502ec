//! Keyword-table domain classification

use crate::storage::GENERAL_DOMAIN;
use std::collections::BTreeMap;

/// Lowercase words of `text` joined by single spaces and padded with spaces
///
/// Keyword phrases are matched against this form starting at a word boundary.
pub(crate) fn word_form(text: &str) -> String {
    let mut form = String::with_capacity(text.len() + 2);
    form.push(' ');
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        form.push_str(word);
        form.push(' ');
    }
    form
}

/// Whether `phrase` occurs in the padded word form starting at a word start
///
/// The last word may continue, so "recommend" matches "recommendations" while
/// "ai" never matches inside "explain".
pub(crate) fn contains_phrase(form: &str, phrase: &str) -> bool {
    let phrase = word_form(phrase);
    let anchored = phrase.trim_end();
    !anchored.is_empty() && form.contains(anchored)
}

/// Classifies queries and documents into the configured domains
pub struct DomainClassifier {
    domains: BTreeMap<String, Vec<String>>,
}

impl DomainClassifier {
    pub fn new(domains: &BTreeMap<String, Vec<String>>) -> Self {
        Self {
            domains: domains.clone(),
        }
    }

    /// Configured domain names in sorted order
    pub fn domain_names(&self) -> Vec<String> {
        self.domains.keys().cloned().collect()
    }

    /// Query domain: matched keywords over total keywords, argmax
    ///
    /// Returns `general` with 0.0 when nothing matches.
    pub fn detect(&self, query: &str) -> (String, f32) {
        let form = word_form(query);
        let mut best = (GENERAL_DOMAIN.to_string(), 0.0f32);

        for (domain, keywords) in &self.domains {
            if keywords.is_empty() {
                continue;
            }
            let matched = count_matches(&form, keywords);
            let score = matched as f32 / keywords.len() as f32;
            if score > best.1 {
                best = (domain.clone(), score);
            }
        }

        best
    }

    /// Document domain: argmax of raw keyword counts over title and body
    pub fn classify_document(&self, title: &str, content: &str) -> String {
        let form = word_form(&format!("{} {}", title, content));
        let mut best = (GENERAL_DOMAIN, 0usize);

        for (domain, keywords) in &self.domains {
            let matched = count_matches(&form, keywords);
            if matched > best.1 {
                best = (domain.as_str(), matched);
            }
        }

        best.0.to_string()
    }
}

fn count_matches(form: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|keyword| contains_phrase(form, keyword))
        .count()
}
