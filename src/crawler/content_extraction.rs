//! Content extraction functionality for the crawler module

use scraper::{ElementRef, Html, Selector};

use crate::crawler::PageText;
use crate::crawler::error::CrawlError;

const HEADING_SELECTOR: &str = "h1, h2, h3, h4, h5, h6";
const CONTENT_SELECTOR: &str = "p, h1, h2, h3, h4, h5, h6, li, span, div";
const LINK_SELECTOR: &str = "a[href]";

/// Elements whose text never counts as page content
const SKIPPED_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

fn selector(css: &str) -> Result<Selector, CrawlError> {
    Selector::parse(css)
        .map_err(|e| CrawlError::HtmlParse(format!("Failed to parse selector '{}': {}", css, e)))
}

/// Direct text children of an element, trimmed, skipping blank nodes
fn own_text(element: ElementRef<'_>) -> impl Iterator<Item = &str> {
    element
        .children()
        .filter_map(|child| child.value().as_text())
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
}

/// Extract heading text, body text and display content from a page
///
/// # Arguments
///
/// * `html` - The raw page text
///
/// # Returns
///
/// Heading text (all `h1`..`h6` text joined by spaces), body text (every text
/// node outside scripts and styles joined by spaces) and display content (the
/// own text of paragraph-like elements, one line per node)
pub fn extract_text(html: &str) -> Result<PageText, CrawlError> {
    let document = Html::parse_document(html);

    let headings = document
        .select(&selector(HEADING_SELECTOR)?)
        .flat_map(|element| element.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let body = document
        .root_element()
        .descendants()
        .filter(|node| {
            node.parent()
                .and_then(|parent| parent.value().as_element().map(|e| e.name().to_string()))
                .is_none_or(|name| !SKIPPED_ELEMENTS.contains(&name.as_str()))
        })
        .filter_map(|node| node.value().as_text().map(|text| text.trim()))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let display = document
        .select(&selector(CONTENT_SELECTOR)?)
        .flat_map(own_text)
        .collect::<Vec<_>>()
        .join("\n");

    Ok(PageText {
        headings,
        body,
        display,
    })
}

/// Extract raw `href` values of every anchor in document order
pub fn extract_links(html: &str) -> Result<Vec<String>, CrawlError> {
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector(LINK_SELECTOR)?)
        .filter_map(|element| element.value().attr("href"))
        .map(|href| href.to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head>
            <title>Commune de Lutry</title>
            <style>.x { color: red; }</style>
            <script>var subvention = 1;</script>
          </head>
          <body>
            <h1>Énergie</h1>
            <h2>Subventions <span>photovoltaïque</span></h2>
            <div>Intro
              <p>La commune soutient les installations.</p>
            </div>
            <ul><li>Montant : 500 CHF</li><li>   </li></ul>
            <a href="/subventions">Aides</a>
            <a href="https://pully.ch">Pully</a>
            <a>sans lien</a>
          </body>
        </html>
    "#;

    #[test]
    fn test_extract_headings() {
        let text = extract_text(PAGE).unwrap();
        assert_eq!(text.headings, "Énergie Subventions photovoltaïque");
    }

    #[test]
    fn test_body_skips_scripts_and_styles() {
        let text = extract_text(PAGE).unwrap();
        assert!(text.body.contains("La commune soutient les installations."));
        assert!(text.body.contains("Commune de Lutry"));
        assert!(!text.body.contains("var subvention"));
        assert!(!text.body.contains("color: red"));
    }

    #[test]
    fn test_display_content_is_line_per_node() {
        let text = extract_text(PAGE).unwrap();
        let lines: Vec<&str> = text.display.lines().collect();
        assert!(lines.contains(&"Intro"));
        assert!(lines.contains(&"La commune soutient les installations."));
        assert!(lines.contains(&"Montant : 500 CHF"));
        assert!(lines.iter().all(|line| !line.trim().is_empty()));
    }

    #[test]
    fn test_extract_links() {
        let links = extract_links(PAGE).unwrap();
        assert_eq!(links, vec!["/subventions", "https://pully.ch"]);
    }

    #[test]
    fn test_empty_document() {
        let text = extract_text("").unwrap();
        assert!(text.headings.is_empty());
        assert!(text.body.is_empty());
        assert!(extract_links("").unwrap().is_empty());
    }
}
