//! URL-safe slugs for content entities.
//!
//! A slug is lowercase ASCII letters and digits in hyphen-separated words
//! (`^[a-z0-9]+(-[a-z0-9]+)*$`): it never starts or ends with a hyphen and
//! never holds two in a row. Derived and explicit slugs follow the same rule.

/// slugify
///
/// Derives a slug from a display name: lowercases, trims, folds common Latin
/// diacritics to ASCII, turns every other non-alphanumeric run into a single
/// hyphen and strips hyphens from both ends. Deterministic, so two names that
/// differ only in case or punctuation produce the same slug.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    let mut buf = [0u8; 4];

    for c in name.trim().chars().flat_map(char::to_lowercase) {
        let piece: &str = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c.encode_utf8(&mut buf)
        } else if let Some(ascii) = fold(c) {
            ascii
        } else {
            pending_hyphen = true;
            continue;
        };

        if pending_hyphen && !slug.is_empty() {
            slug.push('-');
        }
        pending_hyphen = false;
        slug.push_str(piece);
    }

    slug
}

/// Checks an explicitly supplied slug: non-empty hyphen-separated words of
/// lowercase letters and digits.
pub fn is_valid_slug(slug: &str) -> bool {
    slug.split('-').all(|word| {
        !word.is_empty()
            && word
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    })
}

// Lowercase input only.
fn fold(c: char) -> Option<&'static str> {
    let ascii = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => "e",
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => "g",
        'ĥ' | 'ħ' => "h",
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => "i",
        'ĵ' => "j",
        'ķ' => "k",
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => "l",
        'ñ' | 'ń' | 'ņ' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => "o",
        'œ' => "oe",
        'ŕ' | 'ŗ' | 'ř' => "r",
        'ś' | 'ŝ' | 'ş' | 'š' => "s",
        'ß' => "ss",
        'ţ' | 'ť' | 'ŧ' => "t",
        'þ' => "th",
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => "u",
        'ŵ' => "w",
        'ý' | 'ÿ' | 'ŷ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(ascii)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_hyphenated_lowercase_slug() {
        assert_eq!(slugify("Sunset Kayak Tour"), "sunset-kayak-tour");
    }

    #[test]
    fn punctuation_and_case_normalize_to_the_same_slug() {
        assert_eq!(slugify("Sunset Kayak Tour!!"), "sunset-kayak-tour");
        assert_eq!(slugify("  SUNSET   kayak -- tour? "), "sunset-kayak-tour");
        assert_eq!(slugify("Sunset, Kayak & Tour"), "sunset-kayak-tour");
    }

    #[test]
    fn folds_diacritics() {
        assert_eq!(slugify("Café Crème Brûlée"), "cafe-creme-brulee");
        assert_eq!(slugify("Straße 5"), "strasse-5");
    }

    #[test]
    fn drops_characters_without_ascii_form() {
        assert_eq!(slugify("Tour 🌅 2025"), "tour-2025");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn derived_slugs_are_valid() {
        for name in ["Sunset Kayak Tour", "Ünïcödé Nàme", "a  b", "42"] {
            assert!(is_valid_slug(&slugify(name)), "{}", name);
        }
    }

    #[test]
    fn rejects_slugs_outside_the_pattern() {
        assert!(is_valid_slug("sunset-kayak-tour"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("Sunset"));
        assert!(!is_valid_slug("sunset_kayak"));
        assert!(!is_valid_slug("sunset kayak"));
    }

    #[test]
    fn rejects_stray_hyphens() {
        for slug in ["-", "-a", "a-", "a--b", "--"] {
            assert!(!is_valid_slug(slug), "{}", slug);
        }
        assert!(is_valid_slug("a-b-2"));
        assert!(is_valid_slug("a"));
    }
}
