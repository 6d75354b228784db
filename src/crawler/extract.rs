// src/crawler/extract.rs
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::crawler::types::ExtractionCandidate;
use crate::normalize::normalize_phone;

/// Values recovered from the page's JSON-LD blocks. `agent_name` is only set
/// when a nested agent entry names someone other than the main entity.
#[derive(Debug, Default)]
struct StructuredData {
    telephone: Option<String>,
    address: Option<String>,
    name: Option<String>,
    agent_name: Option<String>,
}

/// Pulls phone, address and manager identity out of a rendered listing page.
/// Each field falls through three tiers independently: structured data,
/// known DOM locations, then a regex sweep over the visible text. Malformed
/// input never escapes this type - a field that resolves nowhere stays None.
pub struct ListingExtractor {
    site_host: String,
    phone_regex: Regex,
    street_regex: Regex,
    label_regexes: Vec<Regex>,
    name_tail_regex: Regex,
    zip_regex: Regex,
    heading_address_regex: Regex,
    title_prefix_regex: Regex,
    leading_number_regex: Regex,
    city_state_regex: Regex,
}

impl ListingExtractor {
    pub fn new(site_host: &str) -> Self {
        Self {
            site_host: site_host.to_lowercase(),
            phone_regex: Regex::new(
                r"(?:\+?1[\s\-\.]?)?\(?\d{3}\)?[\s\-\.]?\d{3}[\s\-\.]?\d{4}",
            )
            .unwrap(),
            street_regex: Regex::new(
                r"(?i)\d+\s+[A-Za-z0-9\s]+(?:St|Street|Ave|Avenue|Rd|Road|Dr|Drive|Blvd|Boulevard|Ln|Lane|Ct|Court|Way|Pl|Place|Pkwy|Parkway)",
            )
            .unwrap(),
            label_regexes: vec![
                Regex::new(r"(?i)Managed by[:\s]+([A-Z][a-zA-Z\s&,.-]+)").unwrap(),
                Regex::new(r"(?i)Leasing Office[:\s]+([A-Z][a-zA-Z\s&,.-]+)").unwrap(),
                Regex::new(r"(?i)Property Management[:\s]+([A-Z][a-zA-Z\s&,.-]+)").unwrap(),
                Regex::new(r"(?i)Community[:\s]+([A-Z][a-zA-Z\s&,.-]+)").unwrap(),
            ],
            name_tail_regex: Regex::new(r"(?i)\s+(LLC|Inc|Corp|Management|Properties)\b.*$")
                .unwrap(),
            zip_regex: Regex::new(r"\d{5}").unwrap(),
            heading_address_regex: Regex::new(r"^\d+\s+[A-Za-z\s]+(?:St|Street|Ave|Avenue)")
                .unwrap(),
            title_prefix_regex: Regex::new(r"(?i)^(Apartments?|Rentals?|Homes?|Properties?)\s+")
                .unwrap(),
            leading_number_regex: Regex::new(r"^\d+").unwrap(),
            city_state_regex: Regex::new(r"^[A-Z][a-z]+\s+[A-Z]{2}$").unwrap(),
        }
    }

    /// One candidate per page. Fields resolve independently, so a page may
    /// land its phone from JSON-LD and its address from the regex sweep.
    pub fn extract(&self, html: &str) -> ExtractionCandidate {
        let document = Html::parse_document(html);
        let body_text = page_text(&document);
        let title = page_title(&document);
        let structured = self.parse_structured_data(&document);

        let phone = structured
            .telephone
            .as_deref()
            .and_then(normalize_phone)
            .or_else(|| self.phone_from_selectors(&document))
            .or_else(|| self.phone_from_text(&body_text));

        let address = structured
            .address
            .clone()
            .filter(|addr| !addr.trim().is_empty())
            .or_else(|| self.address_from_selectors(&document))
            .or_else(|| self.address_from_text(&body_text));

        let identity_name = structured
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| name_length_ok(name))
            .map(str::to_string)
            .or_else(|| self.name_from_labels(&body_text))
            .or_else(|| self.name_from_headings(&document))
            .or_else(|| self.name_from_title(title.as_deref()));

        let secondary_name = self
            .secondary_from_structured(&structured, identity_name.as_deref())
            .or_else(|| self.secondary_from_selectors(&document));

        ExtractionCandidate {
            phone,
            address,
            identity_name,
            secondary_name,
        }
    }

    fn parse_structured_data(&self, document: &Html) -> StructuredData {
        let mut data = StructuredData::default();
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
                merge_structured_item(item, &mut data);
            }
        }

        data
    }

    fn phone_from_selectors(&self, document: &Html) -> Option<String> {
        let tel_selector = Selector::parse(r#"a[href^="tel:"]"#).unwrap();
        for link in document.select(&tel_selector) {
            if let Some(href) = link.value().attr("href") {
                let raw = href.trim_start_matches("tel:").replace("+1", "");
                if let Some(phone) = normalize_phone(&raw) {
                    return Some(phone);
                }
            }
        }

        // Containers that tend to carry a phone number in their text.
        let likely_selectors = [
            r#"a[href*="phone"]"#,
            r#"a[href*="call"]"#,
            r#"[class*="contact"]"#,
            r#"[class*="phone"]"#,
            r#"[class*="call"]"#,
            r#"[id*="contact"]"#,
            r#"[id*="phone"]"#,
            r#"[data-testid*="phone"]"#,
            r#"[data-testid*="contact"]"#,
        ];
        for selector_str in likely_selectors {
            if let Ok(selector) = Selector::parse(selector_str) {
                for element in document.select(&selector) {
                    let text = element.text().collect::<Vec<_>>().join(" ");
                    for found in self.phone_regex.find_iter(&text) {
                        if let Some(phone) = normalize_phone(found.as_str()) {
                            return Some(phone);
                        }
                    }
                }
            }
        }

        None
    }

    fn phone_from_text(&self, body_text: &str) -> Option<String> {
        self.phone_regex
            .find_iter(body_text)
            .find_map(|found| normalize_phone(found.as_str()))
    }

    fn address_from_selectors(&self, document: &Html) -> Option<String> {
        let meta_selector = Selector::parse(r#"meta[itemprop="streetAddress"]"#).unwrap();
        if let Some(meta) = document.select(&meta_selector).next() {
            if let Some(content) = meta.value().attr("content") {
                let content = content.trim();
                if !content.is_empty() {
                    return Some(content.to_string());
                }
            }
        }

        let address_selector = Selector::parse("address").unwrap();
        for tag in document.select(&address_selector) {
            let text = tag.text().collect::<Vec<_>>().join("\n");
            if text.trim().len() > 10 {
                // First line up to the first comma is the street part.
                if let Some(first_line) = text.lines().map(str::trim).find(|l| !l.is_empty()) {
                    if let Some(street) = first_line.split(',').next() {
                        let street = street.trim();
                        if !street.is_empty() {
                            return Some(street.to_string());
                        }
                    }
                }
            }
        }

        let hinted_selectors = [
            r#"[data-testid*="address"]"#,
            r#"[data-testid*="Address"]"#,
            r#"[class*="address"]"#,
            r#"[class*="Address"]"#,
        ];
        for selector_str in hinted_selectors {
            if let Ok(selector) = Selector::parse(selector_str) {
                if let Some(element) = document.select(&selector).next() {
                    let text = element.text().collect::<Vec<_>>().join(" ");
                    let text = text.trim();
                    if text.len() > 10
                        && text.len() < 200
                        && self.leading_number_regex.is_match(text)
                    {
                        return Some(text.to_string());
                    }
                }
            }
        }

        None
    }

    fn address_from_text(&self, body_text: &str) -> Option<String> {
        self.street_regex
            .find(body_text)
            .map(|found| found.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
    }

    fn name_from_labels(&self, body_text: &str) -> Option<String> {
        for label_regex in &self.label_regexes {
            if let Some(captures) = label_regex.captures(body_text) {
                if let Some(found) = captures.get(1) {
                    let name = self.clean_name_tail(found.as_str());
                    if name_length_ok(&name) {
                        return Some(name);
                    }
                }
            }
        }
        None
    }

    fn name_from_headings(&self, document: &Html) -> Option<String> {
        let heading_selector = Selector::parse("h1, h2").unwrap();
        for heading in document.select(&heading_selector) {
            let text = heading.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if self.looks_like_name(&text) {
                return Some(text);
            }
        }
        None
    }

    fn name_from_title(&self, title: Option<&str>) -> Option<String> {
        let title = title?;
        // Everything before the first "-" or "|" separator.
        let head = title
            .split(|c| c == '-' || c == '|')
            .next()
            .unwrap_or(title)
            .trim();
        let name = self.title_prefix_regex.replace(head, "").trim().to_string();
        if name_length_ok(&name) && !self.contains_site_host(&name) {
            Some(name)
        } else {
            None
        }
    }

    fn secondary_from_structured(
        &self,
        structured: &StructuredData,
        identity: Option<&str>,
    ) -> Option<String> {
        let agent = structured.agent_name.as_deref()?.trim();
        if name_length_ok(agent) && identity != Some(agent) {
            Some(agent.to_string())
        } else {
            None
        }
    }

    fn secondary_from_selectors(&self, document: &Html) -> Option<String> {
        let business_selectors = [
            r#"[class*="business-name"]"#,
            r#"[class*="brokerage"]"#,
            r#"[class*="broker"]"#,
        ];
        for selector_str in business_selectors {
            if let Ok(selector) = Selector::parse(selector_str) {
                for element in document.select(&selector) {
                    let text = element.text().collect::<Vec<_>>().join(" ");
                    let name = self.clean_name_tail(text.trim());
                    let len = name.chars().count();
                    if (3..=80).contains(&len)
                        && !self.city_state_regex.is_match(&name)
                        && !name.starts_with(|c: char| c.is_ascii_digit())
                    {
                        return Some(name);
                    }
                }
            }
        }
        None
    }

    fn clean_name_tail(&self, raw: &str) -> String {
        self.name_tail_regex.replace(raw.trim(), "").trim().to_string()
    }

    fn looks_like_name(&self, text: &str) -> bool {
        name_length_ok(text)
            && !self.zip_regex.is_match(text)
            && !self.heading_address_regex.is_match(text)
            && !self.contains_site_host(text)
    }

    fn contains_site_host(&self, text: &str) -> bool {
        !self.site_host.is_empty() && text.to_lowercase().contains(&self.site_host)
    }
}

fn name_length_ok(name: &str) -> bool {
    let len = name.chars().count();
    len > 2 && len < 80
}

fn merge_structured_item(item: &Value, data: &mut StructuredData) {
    if data.address.is_none() {
        if let Some(addr) = item.get("address") {
            data.address = assemble_address(addr);
        }
    }
    if data.telephone.is_none() {
        data.telephone = telephone_value(item.get("telephone"));
    }
    if data.name.is_none() {
        if let Some(name) = item.get("name").and_then(Value::as_str) {
            let name = name.trim();
            if !name.is_empty() {
                data.name = Some(name.to_string());
            }
        }
    }

    // Agent entries backfill phone/name, or surface a distinct second name.
    if let Some(agent) = item.get("realEstateAgent").filter(|v| v.is_object()) {
        if data.telephone.is_none() {
            data.telephone = telephone_value(agent.get("telephone"));
        }
        if let Some(agent_name) = agent.get("name").and_then(Value::as_str) {
            let agent_name = agent_name.trim();
            if !agent_name.is_empty() {
                if data.name.is_none() {
                    data.name = Some(agent_name.to_string());
                } else if data.agent_name.is_none() && data.name.as_deref() != Some(agent_name) {
                    data.agent_name = Some(agent_name.to_string());
                }
            }
        }
    }
}

fn assemble_address(addr: &Value) -> Option<String> {
    match addr {
        Value::Object(fields) => {
            let mut parts = Vec::new();
            for key in ["streetAddress", "addressLocality", "addressRegion", "postalCode"] {
                if let Some(part) = fields.get(key).and_then(Value::as_str) {
                    let part = part.trim();
                    if !part.is_empty() {
                        parts.push(part.to_string());
                    }
                }
            }
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        _ => None,
    }
}

fn telephone_value(tel: Option<&Value>) -> Option<String> {
    match tel? {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        Value::Array(items) => items
            .first()
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn page_text(document: &Html) -> String {
    let body_selector = Selector::parse("body").unwrap();
    match document.select(&body_selector).next() {
        Some(body) => body.text().collect::<Vec<_>>().join(" "),
        None => document.root_element().text().collect::<Vec<_>>().join(" "),
    }
}

fn page_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").unwrap();
    document
        .select(&title_selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}
