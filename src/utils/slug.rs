/// Derives a URL-safe slug from a tour name: lowercase alphanumerics with
/// single dashes between words.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_dashes_words() {
        assert_eq!(slugify("Ten Char Min"), "ten-char-min");
        assert_eq!(slugify("The Forest Hiker"), "the-forest-hiker");
    }

    #[test]
    fn collapses_punctuation_and_repeated_separators() {
        assert_eq!(slugify("Fjords  &  Glaciers!"), "fjords-glaciers");
        assert_eq!(slugify("  Trim Me  "), "trim-me");
    }

    #[test]
    fn keeps_digits() {
        assert_eq!(slugify("Alps in 7 Days"), "alps-in-7-days");
    }
}
