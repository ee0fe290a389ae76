//! Title variants and normalisation.

use std::collections::HashSet;

use super::types::TitleMetadata;

/// Build the ordered, deduplicated list of titles worth querying.
///
/// Order: title as given, symbol-stripped title, original-language title,
/// alternative title, punctuation-normalised title. Empty strings are skipped
/// and duplicates are compared case-insensitively (first occurrence wins).
pub fn title_variants(meta: &TitleMetadata) -> Vec<String> {
    let candidates = [
        Some(meta.title.clone()),
        Some(strip_symbols(&meta.title)),
        meta.original_title.clone(),
        meta.alternative_title.clone(),
        Some(cleaned_title(&meta.title)),
    ];

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .flatten()
        .map(|t| collapse_whitespace(&t))
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

/// Remove every character that is not alphanumeric or whitespace.
///
/// `"Spider-Man: No Way Home"` becomes `"SpiderMan No Way Home"`.
pub fn strip_symbols(title: &str) -> String {
    let stripped: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    collapse_whitespace(&stripped)
}

/// Normalise punctuation: `&` becomes `and`, apostrophes vanish and any other
/// symbol becomes a word break.
///
/// `"Spider-Man: No Way Home"` becomes `"Spider Man No Way Home"`.
pub fn cleaned_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.chars() {
        match c {
            '&' => out.push_str(" and "),
            '\'' | '’' | '`' => {}
            c if c.is_alphanumeric() => out.push(c),
            _ => out.push(' '),
        }
    }
    collapse_whitespace(&out)
}

/// Lowercased, punctuation-insensitive form used for matching.
pub fn normalize_title(title: &str) -> String {
    cleaned_title(title).to_lowercase()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_order_and_dedup() {
        let meta = TitleMetadata {
            title: "Spider-Man: No Way Home".to_string(),
            original_title: Some("Spider-Man: No Way Home".to_string()),
            alternative_title: Some("Spider-Man 3".to_string()),
            ..Default::default()
        };

        assert_eq!(
            title_variants(&meta),
            vec![
                "Spider-Man: No Way Home",
                "SpiderMan No Way Home",
                "Spider-Man 3",
                "Spider Man No Way Home",
            ]
        );
    }

    #[test]
    fn test_plain_title_yields_single_variant() {
        let meta = TitleMetadata {
            title: "Example".to_string(),
            ..Default::default()
        };
        assert_eq!(title_variants(&meta), vec!["Example"]);
    }

    #[test]
    fn test_case_insensitive_dedup_keeps_first() {
        let meta = TitleMetadata {
            title: "Amelie".to_string(),
            original_title: Some("AMELIE".to_string()),
            alternative_title: Some("Le Fabuleux Destin d'Amélie Poulain".to_string()),
            ..Default::default()
        };
        assert_eq!(
            title_variants(&meta),
            vec!["Amelie", "Le Fabuleux Destin d'Amélie Poulain"]
        );
    }

    #[test]
    fn test_empty_titles_are_skipped() {
        let meta = TitleMetadata {
            title: "  ".to_string(),
            original_title: Some(String::new()),
            ..Default::default()
        };
        assert!(title_variants(&meta).is_empty());
    }

    #[test]
    fn test_cleaned_title() {
        assert_eq!(cleaned_title("Fast & Furious"), "Fast and Furious");
        assert_eq!(cleaned_title("Ocean's Eleven"), "Oceans Eleven");
        assert_eq!(cleaned_title("Mission: Impossible - Fallout"), "Mission Impossible Fallout");
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("The.Matrix.1999.1080p"), "the matrix 1999 1080p");
        assert_eq!(normalize_title("WALL·E"), "wall e");
    }
}
