//! Browser locale resolution from the `Accept-Language` header.
//!
//! Cache keys vary by locale so that users with different language
//! preferences never share a rendered response. Resolution follows
//! [RFC 9110 §12.5.4]: entries are weighted by their `q=` parameter, the
//! highest-weight code supported by the application wins, and everything
//! falls back to a fixed default.
//!
//! [RFC 9110 §12.5.4]: https://www.rfc-editor.org/rfc/rfc9110#field.accept-language

/// Resolves the preferred locale from an `Accept-Language` header value.
///
/// Entries are parsed as comma-separated `code;q=weight` pairs. The weight
/// defaults to 1.0 when the `q=` part is absent or unparsable. Candidates are
/// tried in descending weight order (ties keep header order) and matched
/// against `supported` after normalization, so `en-us` in the header matches
/// a supported `en_US`. When the header is `None` or no candidate matches,
/// `default` is returned.
///
/// # Examples
///
/// ```
/// use shardcache::http::resolve_locale;
///
/// let supported = vec!["en_US".to_owned(), "zh_CN".to_owned()];
/// let locale = resolve_locale(Some("zh-CN,en;q=0.8"), &supported, "en_US");
/// assert_eq!(locale, "zh_CN");
///
/// assert_eq!(resolve_locale(None, &supported, "en_US"), "en_US");
/// ```
pub fn resolve_locale(header: Option<&str>, supported: &[String], default: &str) -> String {
    let Some(header) = header else {
        return default.to_owned();
    };

    let mut candidates: Vec<(&str, f64)> = Vec::new();
    for entry in header.split(',') {
        let mut parts = entry.trim().split(';');
        let code = parts.next().unwrap_or("").trim();
        if code.is_empty() {
            continue;
        }
        let weight = parts
            .next()
            .and_then(|q| q.trim().strip_prefix("q="))
            .and_then(|value| value.parse::<f64>().ok())
            .unwrap_or(1.0);
        candidates.push((code, weight));
    }

    // Stable sort: equal weights keep their header order.
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    for (code, _) in candidates {
        if let Some(resolved) = match_supported(code, supported) {
            return resolved;
        }
    }
    default.to_owned()
}

/// Matches a header code against the supported set, comparing normalized
/// forms. Returns the supported set's spelling.
fn match_supported(code: &str, supported: &[String]) -> Option<String> {
    let normalized = normalize(code)?;
    supported
        .iter()
        .find(|candidate| normalize(candidate).as_deref() == Some(normalized.as_str()))
        .cloned()
}

/// Normalizes a locale code to `language_REGION` form: separator `-` or `_`,
/// lowercase language, uppercase region. Codes without a region keep just the
/// lowercase language.
fn normalize(code: &str) -> Option<String> {
    let mut parts = code.splitn(2, ['-', '_']);
    let language = parts.next().filter(|l| !l.is_empty())?;
    match parts.next() {
        Some(region) if !region.is_empty() => Some(format!(
            "{}_{}",
            language.to_ascii_lowercase(),
            region.to_ascii_uppercase()
        )),
        _ => Some(language.to_ascii_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supported() -> Vec<String> {
        vec!["en_US".to_owned(), "zh_CN".to_owned(), "de_DE".to_owned()]
    }

    #[test]
    fn missing_header_falls_back_to_default() {
        assert_eq!(resolve_locale(None, &supported(), "en_US"), "en_US");
    }

    #[test]
    fn highest_weight_supported_code_wins() {
        let locale = resolve_locale(
            Some("de-DE;q=0.7,zh-CN;q=0.9,en-US;q=0.8"),
            &supported(),
            "en_US",
        );
        assert_eq!(locale, "zh_CN");
    }

    #[test]
    fn missing_q_defaults_to_full_weight() {
        // de-DE has no q and outranks zh-CN at 0.9.
        let locale = resolve_locale(Some("zh-CN;q=0.9,de-DE"), &supported(), "en_US");
        assert_eq!(locale, "de_DE");
    }

    #[test]
    fn unparsable_q_defaults_to_full_weight() {
        let locale = resolve_locale(Some("de-DE;q=abc,zh-CN;q=0.9"), &supported(), "en_US");
        assert_eq!(locale, "de_DE");
    }

    #[test]
    fn ties_keep_header_order() {
        let locale = resolve_locale(Some("zh-CN,de-DE"), &supported(), "en_US");
        assert_eq!(locale, "zh_CN");
    }

    #[test]
    fn unsupported_codes_skip_to_next_candidate() {
        let locale = resolve_locale(Some("fr-FR,de-DE;q=0.5"), &supported(), "en_US");
        assert_eq!(locale, "de_DE");
    }

    #[test]
    fn nothing_supported_falls_back_to_default() {
        let locale = resolve_locale(Some("fr-FR,ja-JP"), &supported(), "en_US");
        assert_eq!(locale, "en_US");
    }

    #[test]
    fn codes_are_normalized_before_matching() {
        assert_eq!(resolve_locale(Some("EN_us"), &supported(), "de_DE"), "en_US");
        assert_eq!(resolve_locale(Some("en-us"), &supported(), "de_DE"), "en_US");
    }

    #[test]
    fn garbage_entries_are_ignored() {
        let locale = resolve_locale(Some(" ,;q=0.5,,en-US"), &supported(), "de_DE");
        assert_eq!(locale, "en_US");
    }
}
