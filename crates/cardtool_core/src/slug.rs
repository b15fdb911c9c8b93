/// Latin diacritics folded to their base letter before hyphenation.
const DIACRITIC_FOLDS: &[(char, char)] = &[
    ('à', 'a'),
    ('á', 'a'),
    ('â', 'a'),
    ('ä', 'a'),
    ('è', 'e'),
    ('é', 'e'),
    ('ê', 'e'),
    ('ë', 'e'),
    ('ì', 'i'),
    ('í', 'i'),
    ('î', 'i'),
    ('ï', 'i'),
    ('ò', 'o'),
    ('ó', 'o'),
    ('ô', 'o'),
    ('ö', 'o'),
    ('ù', 'u'),
    ('ú', 'u'),
    ('û', 'u'),
    ('ü', 'u'),
    ('ç', 'c'),
];

/// Derive the canonical card key for arbitrary text.
///
/// Lowercases, folds the diacritic table, collapses every run of characters
/// outside `[a-z0-9]` into one `-` and trims hyphens from both ends. Returns an
/// empty string when nothing survives.
pub fn slug(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for ch in text.chars().flat_map(char::to_lowercase).map(fold_diacritic) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen && !output.is_empty() {
                output.push('-');
            }
            pending_hyphen = false;
            output.push(ch);
        } else {
            pending_hyphen = true;
        }
    }
    output
}

/// True when `value` is a non-empty key already in slug form.
pub fn is_canonical_slug(value: &str) -> bool {
    !value.is_empty() && slug(value) == value
}

fn fold_diacritic(ch: char) -> char {
    DIACRITIC_FOLDS
        .iter()
        .find(|(accented, _)| *accented == ch)
        .map_or(ch, |(_, base)| *base)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{is_canonical_slug, slug};

    #[test]
    fn slug_folds_accents_and_hyphenates() {
        assert_eq!(slug("Caffè Latte"), "caffe-latte");
        assert_eq!(slug("  Più Gusto!! "), "piu-gusto");
        assert_eq!(slug("CRÈME brûlée"), "creme-brulee");
        assert_eq!(slug("Espresso (single)"), "espresso-single");
        assert_eq!(slug("Gelato 3 gusti"), "gelato-3-gusti");
    }

    #[test]
    fn slug_of_punctuation_is_empty() {
        assert_eq!(slug(""), "");
        assert_eq!(slug("   "), "");
        assert_eq!(slug("--!?--"), "");
    }

    #[test]
    fn slug_drops_characters_outside_the_fold_table() {
        assert_eq!(slug("Jalapeño"), "jalape-o");
        assert_eq!(slug("Straße"), "stra-e");
    }

    #[test]
    fn canonical_slug_detection() {
        assert!(is_canonical_slug("espresso-single"));
        assert!(!is_canonical_slug("Espresso"));
        assert!(!is_canonical_slug("espresso--single"));
        assert!(!is_canonical_slug("-espresso"));
        assert!(!is_canonical_slug(""));
    }

    proptest! {
        #[test]
        fn slug_is_idempotent(input in "\\PC*") {
            let once = slug(&input);
            prop_assert_eq!(slug(&once), once);
        }

        #[test]
        fn slug_output_is_hyphenated_alphanumeric(input in "\\PC*") {
            let output = slug(&input);
            if !output.is_empty() {
                prop_assert!(!output.starts_with('-'));
                prop_assert!(!output.ends_with('-'));
                prop_assert!(!output.contains("--"));
                prop_assert!(output
                    .chars()
                    .all(|ch| ch == '-' || ch.is_ascii_lowercase() || ch.is_ascii_digit()));
            }
        }
    }
}
