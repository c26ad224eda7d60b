//! URL slug helpers for categories and products.

/// Longest slug produced by [`slugify`].
pub const MAX_SLUG_LEN: usize = 96;

/// Derive a URL-safe slug from a display name.
///
/// Lowercases ASCII alphanumerics, collapses every other run of characters
/// into a single `-`, and trims leading and trailing separators.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Whether `slug` is already in canonical form.
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Loose Leaf Tea"), "loose-leaf-tea");
        assert_eq!(slugify("  Mugs & Cups!  "), "mugs-cups");
        assert_eq!(slugify("Café 2026"), "caf-2026");
    }

    #[test]
    fn test_slugify_output_is_valid() {
        for name in ["Gift Sets", "--odd--name--", "A", "100% Cotton"] {
            assert!(is_valid_slug(&slugify(name)), "{name}");
        }
    }

    #[test]
    fn test_slugify_caps_length() {
        let long = "word ".repeat(100);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_is_valid_slug_rejects() {
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("Upper"));
        assert!(!is_valid_slug("double--dash"));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug("has space"));
    }
}
