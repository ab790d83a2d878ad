/// Fuzzy matching and scoring of candidates against the typed prefix
///
/// Matching runs on normalized text: lowercase, with every unifying
/// character folded onto one canonical character, so `foo-bar` and
/// `foo_bar` compare equal when `-` and `_` are unifying.
///
/// A candidate is scored in three tiers, best first:
///
/// 1. **Prefix**: the normalized candidate starts with the normalized prefix
/// 2. **Transposed**: it does so once up to `transpose_band` adjacent swaps are undone
/// 3. **Fuzzy**: the prefix is a scattered subsequence (nucleo scoring),
///    only considered once the prefix reaches `min_match` characters
use crate::settings::MatchOptions;
use nucleo::pattern::{AtomKind, CaseMatching, Normalization, Pattern};
use nucleo::{Config, Matcher, Utf32Str};

/// Match tier, ordered worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum MatchKind {
    #[default]
    Fuzzy,
    Transposed,
    Prefix,
}

/// Score of a successful match; greater is better
///
/// Ordering compares the tier first, then the quality within the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MatchScore {
    pub kind: MatchKind,
    pub quality: u32,
}

impl MatchScore {
    pub fn new(kind: MatchKind, quality: u32) -> Self {
        Self { kind, quality }
    }
}

/// Normalize text for matching and sorting
pub fn normalize(text: &str, options: &MatchOptions) -> String {
    let canonical = options.unifying_chars.iter().next().copied();
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match canonical {
            Some(unified) if options.unifying_chars.contains(&c) => unified,
            _ => c,
        })
        .collect()
}

/// Number of adjacent swaps needed for `prefix` to be a prefix of `candidate`
fn transposed_prefix(prefix: &[char], candidate: &[char], band: usize) -> Option<usize> {
    if candidate.len() < prefix.len() {
        return None;
    }

    let mut i = 0;
    let mut swaps = 0;
    while i < prefix.len() {
        if prefix[i] == candidate[i] {
            i += 1;
        } else if swaps < band
            && i + 1 < prefix.len()
            && prefix[i] == candidate[i + 1]
            && prefix[i + 1] == candidate[i]
        {
            swaps += 1;
            i += 2;
        } else {
            return None;
        }
    }

    Some(swaps)
}

/// Scorer bound to one prefix
///
/// Build one per ranking pass; the nucleo matcher inside keeps scratch
/// buffers that are reused across candidates.
pub struct FuzzyMatcher {
    options: MatchOptions,
    prefix: Vec<char>,
    pattern: Option<Pattern>,
    matcher: Matcher,
    buf: Vec<char>,
}

impl FuzzyMatcher {
    pub fn new(prefix: &str, options: &MatchOptions) -> Self {
        let normalized = normalize(prefix, options);
        let prefix: Vec<char> = normalized.chars().collect();
        let pattern = (!prefix.is_empty() && prefix.len() >= options.min_match).then(|| {
            Pattern::new(
                &normalized,
                CaseMatching::Ignore,
                Normalization::Smart,
                AtomKind::Fuzzy,
            )
        });

        Self {
            options: options.clone(),
            prefix,
            pattern,
            matcher: Matcher::new(Config::DEFAULT),
            buf: Vec::new(),
        }
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    /// Score raw candidate text
    pub fn score(&mut self, candidate: &str) -> Option<MatchScore> {
        let normalized = normalize(candidate, &self.options);
        self.score_normalized(&normalized)
    }

    /// Score candidate text that is already normalized
    pub fn score_normalized(&mut self, candidate: &str) -> Option<MatchScore> {
        if self.prefix.is_empty() {
            return Some(MatchScore::new(MatchKind::Prefix, 0));
        }

        let chars: Vec<char> = candidate.chars().collect();
        let band = self.options.transpose_band;
        match transposed_prefix(&self.prefix, &chars, band) {
            Some(0) => return Some(MatchScore::new(MatchKind::Prefix, 0)),
            Some(swaps) => {
                let quality = (band - swaps) as u32;
                return Some(MatchScore::new(MatchKind::Transposed, quality));
            }
            None => {}
        }

        let pattern = self.pattern.as_ref()?;
        let haystack = Utf32Str::new(candidate, &mut self.buf);
        pattern
            .score(haystack, &mut self.matcher)
            .map(|score| MatchScore::new(MatchKind::Fuzzy, score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn options() -> MatchOptions {
        MatchOptions {
            transpose_band: 1,
            unifying_chars: ['-', '_'].into_iter().collect(),
            min_match: 2,
        }
    }

    #[test]
    fn test_normalize_folds_case_and_unifying_chars() {
        assert_eq!(normalize("Foo_Bar", &options()), normalize("foo-bar", &options()));
        assert_eq!(normalize("ABC", &options()), "abc");
    }

    #[test]
    fn test_exact_prefix_ranks_above_transposed() {
        let mut matcher = FuzzyMatcher::new("pri", &options());
        let exact = matcher.score("print").unwrap();
        let swapped = matcher.score("pirate").unwrap();
        assert_eq!(exact.kind, MatchKind::Prefix);
        assert_eq!(swapped.kind, MatchKind::Transposed);
        assert!(exact > swapped);
    }

    #[test]
    fn test_transpose_band_limits_swaps() {
        let mut matcher = FuzzyMatcher::new("rpni", &options());
        // needs two swaps (rp -> pr, ni -> in) with a band of one
        assert_ne!(
            matcher.score("print").map(|s| s.kind),
            Some(MatchKind::Transposed)
        );

        let wide = MatchOptions {
            transpose_band: 2,
            ..options()
        };
        let mut matcher = FuzzyMatcher::new("rpni", &wide);
        assert_eq!(
            matcher.score("print").map(|s| s.kind),
            Some(MatchKind::Transposed)
        );
    }

    #[test]
    fn test_unifying_chars_match_each_other() {
        let mut matcher = FuzzyMatcher::new("foo-b", &options());
        let score = matcher.score("foo_bar").unwrap();
        assert_eq!(score.kind, MatchKind::Prefix);
    }

    #[test]
    fn test_fuzzy_subsequence_match() {
        let mut matcher = FuzzyMatcher::new("pnt", &options());
        let score = matcher.score("print").unwrap();
        assert_eq!(score.kind, MatchKind::Fuzzy);
    }

    #[test]
    fn test_fuzzy_requires_min_match() {
        let mut matcher = FuzzyMatcher::new("t", &options());
        assert!(matcher.score("print").is_none());
    }

    #[test]
    fn test_no_match() {
        let mut matcher = FuzzyMatcher::new("xyz", &options());
        assert!(matcher.score("print").is_none());
    }

    #[test]
    fn test_empty_prefix_matches_everything() {
        let mut matcher = FuzzyMatcher::new("", &options());
        assert_eq!(
            matcher.score("anything"),
            Some(MatchScore::new(MatchKind::Prefix, 0))
        );
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(text in "[A-Za-z_\\-]{0,16}") {
            let once = normalize(&text, &options());
            prop_assert_eq!(normalize(&once, &options()), once);
        }

        #[test]
        fn prop_every_prefix_is_a_prefix_match(word in "[a-z_]{1,12}", cut in 0usize..12) {
            let cut = cut.min(word.len());
            let mut matcher = FuzzyMatcher::new(&word[..cut], &options());
            let score = matcher.score(&word);
            prop_assert_eq!(score.map(|s| s.kind), Some(MatchKind::Prefix));
        }
    }
}
