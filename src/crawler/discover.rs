// src/crawler/discover.rs
use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::normalize::normalize_url;

/// Sections of the site that show up in search-page markup but are not
/// listing detail pages.
const EXCLUDED_SECTIONS: [&str; 7] = [
    "houses",
    "blog",
    "local-guide",
    "sitemap",
    "grow",
    "about",
    "parks-and-recreation",
];

/// Builds the first search results URL for a city/state pair.
pub fn build_search_url(base_url: &str, city: &str, state: &str) -> String {
    let city_slug = city
        .to_lowercase()
        .replace(' ', "-")
        .replace(',', "")
        .replace('\'', "");
    format!(
        "{}/houses/{}-{}",
        base_url.trim_end_matches('/'),
        city_slug,
        state.to_lowercase()
    )
}

/// Reads search result pages: which listings they link to and where the
/// next page lives.
pub struct SearchPageParser {
    base_url: String,
}

impl SearchPageParser {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Listing detail URLs on a search page, in page order, deduplicated and
    /// normalized. Structured data is authoritative; anchor scraping only
    /// runs when it yields nothing.
    pub fn listing_urls(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let urls = self.urls_from_structured_data(&document);
        if !urls.is_empty() {
            return urls;
        }
        self.urls_from_link_selectors(&document)
    }

    fn urls_from_structured_data(&self, document: &Html) -> Vec<String> {
        let mut urls = Vec::new();
        let script_selector = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();

        for script in document.select(&script_selector) {
            let raw = script.text().collect::<String>();
            if raw.trim().is_empty() {
                continue;
            }
            let parsed: Value = match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    debug!("⏭️ Skipping malformed JSON-LD block: {}", e);
                    continue;
                }
            };
            let items = match parsed {
                Value::Array(items) => items,
                other => vec![other],
            };
            for item in &items {
                self.collect_item_list_urls(item, &mut urls);
            }
        }

        urls
    }

    fn collect_item_list_urls(&self, item: &Value, urls: &mut Vec<String>) {
        if item.get("@type").and_then(Value::as_str) != Some("CollectionPage") {
            return;
        }
        let list_items = item
            .get("mainEntity")
            .filter(|entity| entity.get("@type").and_then(Value::as_str) == Some("ItemList"))
            .and_then(|entity| entity.get("itemListElement"))
            .and_then(Value::as_array);

        if let Some(list_items) = list_items {
            for list_item in list_items {
                let listing_url = list_item
                    .get("item")
                    .and_then(|entry| entry.get("url"))
                    .and_then(Value::as_str);
                if let Some(listing_url) = listing_url {
                    if !listing_url.starts_with(&self.base_url) {
                        continue;
                    }
                    let normalized = normalize_url(listing_url);
                    if !normalized.is_empty() && !urls.contains(&normalized) {
                        urls.push(normalized);
                    }
                }
            }
        }
    }

    fn urls_from_link_selectors(&self, document: &Html) -> Vec<String> {
        let mut urls = Vec::new();
        let mut seen = HashSet::new();

        let link_selectors = [
            "article.placard a.property-link",
            "a.property-link",
            r#"article.placard a[href*="/"]"#,
        ];
        for selector_str in link_selectors {
            if let Ok(selector) = Selector::parse(selector_str) {
                for link in document.select(&selector) {
                    let href = match link.value().attr("href") {
                        Some(href) => href,
                        None => continue,
                    };
                    let normalized = match self.resolve(href) {
                        Some(url) => url,
                        None => continue,
                    };
                    if !normalized.starts_with(&self.base_url) {
                        continue;
                    }
                    // Detail pages carry at least an address slug and an id.
                    let path = normalized[self.base_url.len()..].trim_matches('/');
                    let segments = path.split('/').filter(|s| !s.is_empty()).count();
                    if segments < 2 {
                        continue;
                    }
                    if EXCLUDED_SECTIONS.iter().any(|section| path.contains(section)) {
                        continue;
                    }
                    if seen.insert(normalized.clone()) {
                        urls.push(normalized);
                    }
                }
            }
        }

        urls
    }

    /// URL of the next search results page, if the current page links one.
    pub fn next_page_url(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let anchor_selector = Selector::parse("a").unwrap();

        // A link labelled "next" anywhere on the page.
        let labeled_selector = Selector::parse("a[aria-label]").unwrap();
        for link in document.select(&labeled_selector) {
            let label = link.value().attr("aria-label").unwrap_or("");
            if label.to_lowercase().contains("next") {
                if let Some(url) = self.pagination_href(&link) {
                    return Some(url);
                }
            }
        }

        // A pagination nav link whose visible text is "next".
        for nav in self.pagination_navs(&document) {
            for link in nav.select(&anchor_selector) {
                let text = link.text().collect::<String>();
                if text.trim().to_lowercase() == "next" {
                    if let Some(url) = self.pagination_href(&link) {
                        return Some(url);
                    }
                }
            }
        }

        // Numbered pagination: the link for the current page plus one.
        for nav in self.pagination_navs(&document) {
            let current = nav
                .select(&anchor_selector)
                .find(|link| {
                    let element = link.value();
                    let label = element.attr("aria-label").unwrap_or("").to_lowercase();
                    element.classes().any(|class| class == "active") || label.contains("current")
                })
                .and_then(|link| link.text().collect::<String>().trim().parse::<u32>().ok());

            if let Some(current_page) = current {
                let wanted = current_page + 1;
                for link in nav.select(&anchor_selector) {
                    let text = link.text().collect::<String>();
                    let by_text = text.trim() == wanted.to_string();
                    let by_attr = link
                        .value()
                        .attr("data-page")
                        .and_then(|raw| raw.parse::<u32>().ok())
                        == Some(wanted);
                    if by_text || by_attr {
                        if let Some(url) = self.pagination_href(&link) {
                            return Some(url);
                        }
                    }
                }
            }
        }

        None
    }

    fn pagination_navs<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        let nav_selector = Selector::parse("nav").unwrap();
        document
            .select(&nav_selector)
            .filter(|nav| {
                let element = nav.value();
                let label = element.attr("aria-label").unwrap_or("").to_lowercase();
                label.contains("search results")
                    || element.classes().any(|class| class == "paging")
                    || element.id() == Some("paging")
            })
            .collect()
    }

    fn pagination_href(&self, link: &ElementRef<'_>) -> Option<String> {
        let href = link.value().attr("href")?;
        if href == "#" {
            return None;
        }
        self.resolve(href)
    }

    fn resolve(&self, href: &str) -> Option<String> {
        let base = Url::parse(&self.base_url).ok()?;
        let joined = base.join(href).ok()?;
        Some(normalize_url(joined.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> SearchPageParser {
        SearchPageParser::new("https://www.example.com")
    }

    #[test]
    fn test_search_url_slugs_city_and_state() {
        assert_eq!(
            build_search_url("https://www.example.com", "Sandy Springs", "GA"),
            "https://www.example.com/houses/sandy-springs-ga"
        );
        assert_eq!(
            build_search_url("https://www.example.com/", "O'Fallon", "MO"),
            "https://www.example.com/houses/ofallon-mo"
        );
    }

    #[test]
    fn test_listing_urls_prefer_structured_item_list() {
        let html = r#"
        <html><head>
        <script type="application/ld+json">
        {"@type": "CollectionPage",
         "mainEntity": {"@type": "ItemList", "itemListElement": [
            {"item": {"url": "https://www.example.com/sunny-apt/abc1/?utm=x"}},
            {"item": {"url": "https://www.example.com/sunny-apt/abc1/"}},
            {"item": {"url": "https://elsewhere.com/not/ours"}}
         ]}}
        </script>
        </head><body>
        <a class="property-link" href="/should-not-be-used/zzz9/">fallback</a>
        </body></html>
        "#;

        let urls = parser().listing_urls(html);
        assert_eq!(urls, vec!["https://www.example.com/sunny-apt/abc1".to_string()]);
    }

    #[test]
    fn test_listing_urls_fallback_filters_site_sections() {
        let html = r#"
        <html><body>
        <article class="placard"><a class="property-link" href="/maple-house/xyz9/">Maple</a></article>
        <a class="property-link" href="/blog/top-ten-kitchens">Blog post</a>
        <a class="property-link" href="/oak-flats/q2w3">Oak</a>
        <article class="placard"><a href="/houses/atlanta-ga/2/">More results</a></article>
        <a class="property-link" href="https://other.com/a/b">Elsewhere</a>
        <a class="property-link" href="/lone-segment/">Too shallow</a>
        </body></html>
        "#;

        let urls = parser().listing_urls(html);
        assert_eq!(
            urls,
            vec![
                "https://www.example.com/maple-house/xyz9".to_string(),
                "https://www.example.com/oak-flats/q2w3".to_string(),
            ]
        );
    }

    #[test]
    fn test_next_page_from_aria_label() {
        let html = r#"
        <html><body>
        <a aria-label="Next Page" href="/houses/atlanta-ga/2/">›</a>
        </body></html>
        "#;

        assert_eq!(
            parser().next_page_url(html).as_deref(),
            Some("https://www.example.com/houses/atlanta-ga/2")
        );
    }

    #[test]
    fn test_next_page_from_nav_link_text() {
        let html = r#"
        <html><body>
        <nav class="paging">
          <a href="/houses/atlanta-ga/1/">Prev</a>
          <a href="/houses/atlanta-ga/3/">Next</a>
        </nav>
        </body></html>
        "#;

        assert_eq!(
            parser().next_page_url(html).as_deref(),
            Some("https://www.example.com/houses/atlanta-ga/3")
        );
    }

    #[test]
    fn test_next_page_from_numbered_links() {
        let html = r##"
        <html><body>
        <nav id="paging">
          <a class="active" href="#">2</a>
          <a href="/houses/atlanta-ga/1/">1</a>
          <a href="/houses/atlanta-ga/3/">3</a>
        </nav>
        </body></html>
        "##;

        assert_eq!(
            parser().next_page_url(html).as_deref(),
            Some("https://www.example.com/houses/atlanta-ga/3")
        );
    }

    #[test]
    fn test_next_page_from_data_page_attribute() {
        let html = r##"
        <html><body>
        <nav aria-label="Search Results Pagination">
          <a aria-label="Current Page" href="#">1</a>
          <a data-page="2" href="/houses/atlanta-ga/2/">›</a>
        </nav>
        </body></html>
        "##;

        assert_eq!(
            parser().next_page_url(html).as_deref(),
            Some("https://www.example.com/houses/atlanta-ga/2")
        );
    }

    #[test]
    fn test_no_pagination_returns_none() {
        let html = r##"
        <html><body>
        <a aria-label="Next" href="#">dead link</a>
        <nav class="paging"><a href="/houses/atlanta-ga/1/">1</a></nav>
        </body></html>
        "##;

        assert!(parser().next_page_url(html).is_none());
    }
}
