use url::Url;

/// Canonical phone key: digits only, exactly 10 digits, or 11 with a leading 1.
/// The accepted digit string is kept as-is (an 11-digit value is not stripped
/// to 10). Everything else is rejected.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => Some(digits),
        11 if digits.starts_with('1') => Some(digits),
        _ => None,
    }
}

/// Collapse whitespace runs, trim, and title-case each word. Never fails;
/// empty input yields an empty string.
pub fn normalize_address(raw: &str) -> String {
    raw.split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// Trim and collapse whitespace. Empty input stays empty; the empty string is
/// the store's "unknown" sentinel for names.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical dedupe key for discovery and the visited set: query string and
/// fragment dropped, trailing slashes stripped. Never fails - unparseable
/// input falls back to manual stripping.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string().trim_end_matches('/').to_string()
        }
        Err(_) => {
            let stripped = raw.trim();
            let stripped = stripped.split('#').next().unwrap_or(stripped);
            let stripped = stripped.split('?').next().unwrap_or(stripped);
            stripped.trim_end_matches('/').to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_formats_to_ten_digits() {
        assert_eq!(
            normalize_phone("(404) 555-1234"),
            Some("4045551234".to_string())
        );
        assert_eq!(
            normalize_phone("404.555.1234"),
            Some("4045551234".to_string())
        );
        assert_eq!(
            normalize_phone("404 555 1234"),
            Some("4045551234".to_string())
        );
    }

    #[test]
    fn test_phone_keeps_eleven_digits_with_leading_one() {
        assert_eq!(
            normalize_phone("14045551234"),
            Some("14045551234".to_string())
        );
        assert_eq!(
            normalize_phone("+1 (404) 555-1234"),
            Some("14045551234".to_string())
        );
    }

    #[test]
    fn test_phone_rejects_bad_digit_counts() {
        assert_eq!(normalize_phone("555-1234"), None);
        assert_eq!(normalize_phone("24045551234"), None);
        assert_eq!(normalize_phone("404555123456"), None);
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("call us"), None);
    }

    #[test]
    fn test_address_collapses_and_title_cases() {
        assert_eq!(normalize_address("123   main   st"), "123 Main St");
        assert_eq!(normalize_address("  456  OAK  AVE "), "456 Oak Ave");
        assert_eq!(normalize_address(""), "");
    }

    #[test]
    fn test_name_trims_and_collapses() {
        assert_eq!(normalize_name("  ABC   Mgmt  "), "ABC Mgmt");
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("   "), "");
    }

    #[test]
    fn test_url_drops_query_fragment_and_trailing_slash() {
        assert_eq!(
            normalize_url("https://example.com/listing/abc123/?utm=x#photos"),
            "https://example.com/listing/abc123"
        );
        assert_eq!(
            normalize_url("https://example.com/listing/abc123/"),
            "https://example.com/listing/abc123"
        );
        assert_eq!(
            normalize_url("https://example.com"),
            "https://example.com"
        );
    }

    #[test]
    fn test_url_unparseable_input_is_stripped_not_refused() {
        assert_eq!(normalize_url("not a url?x=1"), "not a url");
        assert_eq!(normalize_url("/relative/path/#frag"), "/relative/path");
    }
}
