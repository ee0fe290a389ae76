//! Title, year and season matching used to drop false positives.
//!
//! Matching is keyword based and deterministic: a candidate title is scored
//! only against the query, never against other candidates.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::media::{normalize_title, MediaQuery};

use super::ScrapeSearchResult;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "in", "on", "at", "to", "for", "with", "by", "from",
];

static SEASON_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bs(\d{1,2})\s*(?:-|to)\s*s?(\d{1,2})\b").expect("valid season range regex")
});

static SEASON_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bs(\d{1,2})(?:e\d{1,4})*\b").expect("valid season tag regex"));

static SEASON_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bseasons?[\s._-]*(\d{1,2})(?:\s*(?:-|to)\s*(\d{1,2}))?\b")
        .expect("valid season word regex")
});

/// Default minimum share of target keywords a candidate must contain.
pub const DEFAULT_MIN_TITLE_SIMILARITY: f32 = 0.85;

/// Decides whether a scraped title plausibly refers to the queried media.
#[derive(Debug, Clone)]
pub struct TitleMatcher {
    min_similarity: f32,
}

impl Default for TitleMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_TITLE_SIMILARITY)
    }
}

impl TitleMatcher {
    pub fn new(min_similarity: f32) -> Self {
        Self { min_similarity }
    }

    pub fn min_similarity(&self) -> f32 {
        self.min_similarity
    }

    /// Keep only results that match the query; order is preserved.
    pub fn filter(
        &self,
        query: &MediaQuery,
        results: Vec<ScrapeSearchResult>,
    ) -> Vec<ScrapeSearchResult> {
        results
            .into_iter()
            .filter(|r| self.matches(query, &r.title))
            .collect()
    }

    /// Whether `candidate` matches the query (movie or show rules).
    pub fn matches(&self, query: &MediaQuery, candidate: &str) -> bool {
        match query.season {
            Some(season) => self.matches_show(&query.titles, season, candidate),
            None => self.matches_movie(&query.titles, query.year, candidate),
        }
    }

    /// Movie rule: title similar enough to any variant, and the year (when
    /// both sides have one) equal.
    pub fn matches_movie(&self, titles: &[String], year: Option<u16>, candidate: &str) -> bool {
        let candidate_tokens = tokenize(candidate);

        titles.iter().any(|title| {
            let target = keywords(title);
            if self.similarity(&target, &candidate_tokens) < self.min_similarity {
                return false;
            }
            let Some(year) = year else {
                return true;
            };
            let years = candidate_years(&candidate_tokens, &target);
            years.is_empty() || years.contains(&year)
        })
    }

    /// Show rule: title similar enough to any variant, and any explicit season
    /// tags include the requested season.
    pub fn matches_show(&self, titles: &[String], season: u32, candidate: &str) -> bool {
        let candidate_tokens = tokenize(candidate);
        let title_ok = titles
            .iter()
            .any(|t| self.similarity(&keywords(t), &candidate_tokens) >= self.min_similarity);
        if !title_ok {
            return false;
        }
        let seasons = tagged_seasons(candidate);
        seasons.is_empty() || seasons.contains(&season)
    }

    /// Share of target keywords found in the candidate (0.0-1.0).
    fn similarity(&self, target: &[String], candidate: &[String]) -> f32 {
        if target.is_empty() {
            return 0.0;
        }
        let matched = target
            .iter()
            .filter(|kw| candidate.iter().any(|tok| tokens_match(kw, tok)))
            .count();
        matched as f32 / target.len() as f32
    }
}

/// Lowercased, punctuation-insensitive tokens.
fn tokenize(text: &str) -> Vec<String> {
    normalize_title(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Significant keywords of a target title. Stop words are dropped unless the
/// title consists of nothing else.
fn keywords(title: &str) -> Vec<String> {
    let tokens = tokenize(title);
    let mut seen = HashSet::new();
    let significant: Vec<String> = tokens
        .iter()
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.to_string()))
        .cloned()
        .collect();
    if significant.is_empty() {
        tokens
    } else {
        significant
    }
}

/// Exact match, or a small edit distance for longer words.
fn tokens_match(keyword: &str, token: &str) -> bool {
    if keyword == token {
        return true;
    }
    let len = keyword.chars().count();
    if len < 5 || keyword.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let len_diff = (len as i64 - token.chars().count() as i64).abs();
    if len_diff > 2 {
        return false;
    }
    let threshold = if len >= 8 { 2 } else { 1 };
    levenshtein_distance(keyword, token) <= threshold
}

/// Levenshtein edit distance between two strings.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0usize; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Years (1900-2099) in the candidate that are not part of the target title.
fn candidate_years(candidate: &[String], target: &[String]) -> Vec<u16> {
    candidate
        .iter()
        .filter(|t| t.len() == 4 && !target.contains(*t))
        .filter_map(|t| t.parse::<u16>().ok())
        .filter(|y| (1900..=2099).contains(y))
        .collect()
}

/// Seasons explicitly tagged in a release title (`S01`, `S01E02`,
/// `S01-S03`, `Season 2`, `Seasons 1-4`).
fn tagged_seasons(title: &str) -> HashSet<u32> {
    let lower = title.to_lowercase();
    let mut seasons = HashSet::new();

    let mut push_range = |from: Option<u32>, to: Option<u32>| {
        if let Some(from) = from {
            let to = to.unwrap_or(from).max(from);
            seasons.extend(from..=to);
        }
    };

    for caps in SEASON_RANGE.captures_iter(&lower) {
        push_range(parse_cap(&caps, 1), parse_cap(&caps, 2));
    }
    for caps in SEASON_TAG.captures_iter(&lower) {
        push_range(parse_cap(&caps, 1), None);
    }
    for caps in SEASON_WORD.captures_iter(&lower) {
        push_range(parse_cap(&caps, 1), parse_cap(&caps, 2));
    }

    seasons
}

fn parse_cap(caps: &regex_lite::Captures<'_>, index: usize) -> Option<u32> {
    caps.get(index).and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(t: &[&str]) -> Vec<String> {
        t.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_movie_exact_title_and_year() {
        let m = TitleMatcher::default();
        let t = titles(&["Example"]);
        assert!(m.matches_movie(&t, Some(2020), "Example.2020.1080p.BluRay.x264"));
        assert!(m.matches_movie(&t, Some(2020), "EXAMPLE (2020) [2160p]"));
    }

    #[test]
    fn test_movie_wrong_year_rejected() {
        let m = TitleMatcher::default();
        let t = titles(&["Example"]);
        assert!(!m.matches_movie(&t, Some(2020), "Example.2014.720p"));
    }

    #[test]
    fn test_movie_without_candidate_year_allowed() {
        let m = TitleMatcher::default();
        let t = titles(&["Example"]);
        assert!(m.matches_movie(&t, Some(2020), "Example 1080p WEB-DL"));
    }

    #[test]
    fn test_movie_without_query_year_ignores_candidate_year() {
        let m = TitleMatcher::default();
        let t = titles(&["Example"]);
        assert!(m.matches_movie(&t, None, "Example.1987.DVDRip"));
    }

    #[test]
    fn test_movie_unrelated_title_rejected() {
        let m = TitleMatcher::default();
        let t = titles(&["Example"]);
        assert!(!m.matches_movie(&t, Some(2020), "Something Else 2020 1080p"));
    }

    #[test]
    fn test_year_in_title_is_not_a_release_year() {
        let m = TitleMatcher::default();
        let t = titles(&["Blade Runner 2049"]);
        assert!(m.matches_movie(&t, Some(2017), "Blade.Runner.2049.2017.2160p"));
        assert!(m.matches_movie(&t, Some(2017), "Blade Runner 2049 REMUX"));
        assert!(!m.matches_movie(&t, Some(2017), "Blade.Runner.2049.1982.Final.Cut"));
    }

    #[test]
    fn test_punctuation_and_case_insensitive() {
        let m = TitleMatcher::default();
        let t = titles(&["Spider-Man: No Way Home"]);
        assert!(m.matches_movie(&t, Some(2021), "spider man no way home 2021"));
        assert!(m.matches_movie(&t, Some(2021), "Spider.Man.No.Way.Home.2021.1080p"));
    }

    #[test]
    fn test_small_spelling_variation_allowed() {
        let m = TitleMatcher::default();
        let t = titles(&["Rachmaninov Concerts"]);
        assert!(m.matches_movie(&t, None, "Rahmaninov Concerts 1080p"));
    }

    #[test]
    fn test_any_title_variant_can_match() {
        let m = TitleMatcher::default();
        let t = titles(&["The Intouchables", "Intouchables"]);
        assert!(m.matches_movie(&t, Some(2011), "Intouchables.2011.FRENCH.1080p"));
    }

    #[test]
    fn test_stop_word_only_title() {
        let m = TitleMatcher::default();
        let t = titles(&["It"]);
        assert!(m.matches_movie(&t, Some(2017), "It.2017.1080p"));
    }

    #[test]
    fn test_show_season_tags() {
        let m = TitleMatcher::default();
        let t = titles(&["Some Show"]);
        assert!(m.matches_show(&t, 2, "Some.Show.S02.1080p"));
        assert!(m.matches_show(&t, 2, "Some.Show.S02E05.720p"));
        assert!(m.matches_show(&t, 2, "Some Show S01-S03 Complete"));
        assert!(m.matches_show(&t, 2, "Some Show Season 2"));
        assert!(m.matches_show(&t, 2, "Some Show Seasons 1-4"));
        assert!(m.matches_show(&t, 2, "Some Show Complete Series"));
        assert!(!m.matches_show(&t, 2, "Some.Show.S03E01"));
        assert!(!m.matches_show(&t, 2, "Other Program S02"));
    }

    #[test]
    fn test_tagged_seasons() {
        let seasons = tagged_seasons("Show.S01E01E02.S03");
        assert!(seasons.contains(&1));
        assert!(seasons.contains(&3));
        assert!(!seasons.contains(&2));
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }

    #[test]
    fn test_filter_preserves_order() {
        let m = TitleMatcher::default();
        let meta = crate::media::TitleMetadata {
            title: "Example".to_string(),
            year: Some(2020),
            ..Default::default()
        };
        let query = MediaQuery::movie("tt1", &meta).unwrap();
        let make = |title: &str, n: u8| ScrapeSearchResult {
            title: title.to_string(),
            hash: format!("{:040x}", n),
            file_size: 1,
            source: "s".to_string(),
        };
        let filtered = m.filter(
            &query,
            vec![
                make("Example 2020 B", 1),
                make("Nope 2020", 2),
                make("Example 2020 A", 3),
            ],
        );
        let titles: Vec<_> = filtered.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Example 2020 B", "Example 2020 A"]);
    }
}
