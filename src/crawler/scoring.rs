//! Keyword relevance scoring
//!
//! Pages are scored by case-insensitive substring matching of configured
//! keywords against the page URL, its heading text and its body text. Two
//! policies are available through [`KeywordConfig`]: a weighted sum, or a
//! requirement that every keyword category matches at least once.

use tracing::trace;

use crate::crawler::config::{CategoryKeywords, KeywordConfig, WeightedKeywords};

/// Outcome of scoring a single page
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Relevance {
    /// Whether the page should be kept
    pub relevant: bool,

    /// Summed weight in weighted mode, `None` in category mode
    pub score: Option<f64>,

    /// Matched keywords tagged with their location, e.g. `TITLE:subventions`
    pub tags: Vec<String>,
}

impl Relevance {
    fn not_relevant() -> Self {
        Self::default()
    }
}

/// Page text handed to the scorer
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    /// Final URL of the page
    pub url: &'a str,

    /// Content type reported by the server, if any
    pub content_type: Option<&'a str>,

    /// Concatenated heading text
    pub headings: &'a str,

    /// Concatenated body text
    pub body: &'a str,
}

/// Whether a content type denotes textual content
pub fn is_textual(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.to_lowercase().contains("text"))
}

/// Score a page against the configured keywords
pub fn score_page(input: &ScoringInput<'_>, keywords: &KeywordConfig) -> Relevance {
    if !is_textual(input.content_type) {
        trace!("Skipping scoring of non-textual content at {}", input.url);
        return Relevance::not_relevant();
    }

    let headings = input.headings.to_lowercase();
    let body = input.body.to_lowercase();

    match keywords {
        KeywordConfig::Weighted(weighted) => {
            score_weighted(&input.url.to_lowercase(), &headings, &body, weighted)
        }
        KeywordConfig::Categories(categories) => score_categories(&headings, &body, categories),
    }
}

fn score_weighted(url: &str, headings: &str, body: &str, keywords: &WeightedKeywords) -> Relevance {
    let mut score = 0.0;
    let mut tags = Vec::new();

    for keyword in &keywords.url_keywords {
        if contains(url, keyword) {
            score += keywords.url_weight;
            tags.push(format!("URL:{}", keyword));
        }
    }

    for (keyword, weight) in &keywords.title_keywords {
        if contains(headings, keyword) {
            score += weight;
            tags.push(format!("TITLE:{}", keyword));
        }
    }

    for keyword in &keywords.content_keywords {
        if contains(body, keyword) {
            score += keywords.content_weight;
            tags.push(format!("CONTENT:{}", keyword));
        }
    }

    Relevance {
        relevant: score > 0.0,
        score: Some(score),
        tags,
    }
}

fn score_categories(headings: &str, body: &str, keywords: &CategoryKeywords) -> Relevance {
    let mut tags = Vec::new();
    let mut all_matched = !keywords.categories.is_empty();

    for (category, words) in &keywords.categories {
        let mut category_matched = false;
        for keyword in words {
            if contains(headings, keyword) {
                tags.push(format!("TITLE:{}", keyword));
                category_matched = true;
            }
            if contains(body, keyword) {
                tags.push(format!("CONTENT:{}", keyword));
                category_matched = true;
            }
        }
        if !category_matched {
            trace!("Category '{}' has no match", category);
            all_matched = false;
        }
    }

    Relevance {
        relevant: all_matched,
        score: None,
        tags,
    }
}

// `haystack` is already lowercase
fn contains(haystack: &str, keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    !keyword.is_empty() && haystack.contains(&keyword)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn page<'a>(url: &'a str, headings: &'a str, body: &'a str) -> ScoringInput<'a> {
        ScoringInput {
            url,
            content_type: Some("text/html; charset=utf-8"),
            headings,
            body,
        }
    }

    fn categories() -> KeywordConfig {
        KeywordConfig::Categories(CategoryKeywords {
            categories: BTreeMap::from([
                ("incentive".to_string(), vec!["subvention".to_string()]),
                ("scope".to_string(), vec!["commune".to_string()]),
                ("subject".to_string(), vec!["photovoltaïque".to_string()]),
            ]),
        })
    }

    #[test]
    fn test_weighted_scores_every_location() {
        let keywords = KeywordConfig::default();
        let relevance = score_page(
            &page(
                "https://lutry.ch/Energie/subventions",
                "Subventions communales",
                "Une installation PHOTOVOLTAÏQUE donne droit à 500 CHF",
            ),
            &keywords,
        );

        assert!(relevance.relevant);
        // URL: energie + subventions, TITLE: subventions, CONTENT: installation, photovoltaïque, chf
        assert_eq!(relevance.score, Some(5.0 + 5.0 + 5.0 + 0.5 * 3.0));
        assert!(relevance.tags.contains(&"URL:energie".to_string()));
        assert!(relevance.tags.contains(&"TITLE:subventions".to_string()));
        assert!(relevance.tags.contains(&"CONTENT:chf".to_string()));
        assert!(!relevance.tags.contains(&"TITLE:photovoltaïque".to_string()));
    }

    #[test]
    fn test_weighted_without_match_is_not_relevant() {
        let relevance = score_page(
            &page("https://lutry.ch/culture", "Agenda", "Concert au temple"),
            &KeywordConfig::default(),
        );
        assert!(!relevance.relevant);
        assert_eq!(relevance.score, Some(0.0));
        assert!(relevance.tags.is_empty());
    }

    #[test]
    fn test_single_content_match_is_relevant() {
        let relevance = score_page(
            &page("https://lutry.ch/", "", "Renseignements auprès de Pronovo"),
            &KeywordConfig::default(),
        );
        assert!(relevance.relevant);
        assert_eq!(relevance.tags, vec!["CONTENT:pronovo"]);
    }

    #[test]
    fn test_categories_require_every_category() {
        let keywords = categories();
        let relevance = score_page(
            &page(
                "https://lutry.ch/energie",
                "Photovoltaïque",
                "La commune verse une subvention",
            ),
            &keywords,
        );
        assert!(relevance.relevant);
        assert_eq!(relevance.score, None);
        assert!(relevance.tags.contains(&"TITLE:photovoltaïque".to_string()));

        // Drop the only match of the "scope" category
        let relevance = score_page(
            &page(
                "https://lutry.ch/energie",
                "Photovoltaïque",
                "Le canton verse une subvention",
            ),
            &keywords,
        );
        assert!(!relevance.relevant);
    }

    #[test]
    fn test_categories_ignore_url() {
        let relevance = score_page(
            &page("https://commune.ch/photovoltaïque/subvention", "", ""),
            &categories(),
        );
        assert!(!relevance.relevant);
        assert!(relevance.tags.is_empty());
    }

    #[test]
    fn test_non_textual_content_short_circuits() {
        let mut input = page("https://lutry.ch/subventions.pdf", "subventions", "subvention");
        input.content_type = Some("application/pdf");
        assert_eq!(score_page(&input, &KeywordConfig::default()), Relevance::default());

        input.content_type = None;
        assert!(!score_page(&input, &KeywordConfig::default()).relevant);
    }

    #[test]
    fn test_is_textual() {
        assert!(is_textual(Some("text/html")));
        assert!(is_textual(Some("Text/Plain")));
        assert!(!is_textual(Some("image/png")));
        assert!(!is_textual(None));
    }
}
