use unicode_normalization::UnicodeNormalization;

/// Katakana block range that has a hiragana counterpart exactly 0x60 below it
/// (ァ..=ヴ, including the small kana and ヮ).
const KATAKANA_FIRST: u32 = 0x30A1;
const KATAKANA_LAST: u32 = 0x30F4;
const KANA_OFFSET: u32 = 0x60;

/// Folds text for matching: NFKC (half-width kana and full-width ASCII become
/// their canonical widths), lowercase, then katakana to hiragana.
///
/// Keywords are stored as entered; both sides are folded only at comparison time.
pub fn normalize_text(text: &str) -> String {
    text.nfkc()
        .flat_map(char::to_lowercase)
        .map(katakana_to_hiragana)
        .collect()
}

fn katakana_to_hiragana(c: char) -> char {
    let code = c as u32;
    if (KATAKANA_FIRST..=KATAKANA_LAST).contains(&code) {
        char::from_u32(code - KANA_OFFSET).unwrap_or(c)
    } else {
        c
    }
}

/// Splits a space-separated search string into normalized terms, dropping empties.
pub fn split_keywords(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(normalize_text)
        .filter(|k| !k.is_empty())
        .collect()
}

/// AND search: every (already normalized) term must occur in the folded text.
pub fn matches_all_keywords(text: &str, terms: &[String]) -> bool {
    let folded = normalize_text(text);
    terms.iter().all(|t| folded.contains(t.as_str()))
}

/// Filters items by a free-text query over a description accessor.
/// An empty query keeps everything.
pub fn filter_by_keyword<'a, T, F>(items: &'a [T], query: &str, description: F) -> Vec<&'a T>
where
    F: Fn(&T) -> &str,
{
    let terms = split_keywords(query);
    items
        .iter()
        .filter(|item| terms.is_empty() || matches_all_keywords(description(item), &terms))
        .collect()
}
