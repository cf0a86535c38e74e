use std::sync::LazyLock;

use regex::Regex;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid spaces regex"));

pub fn normalize_email(input: &str) -> String {
    input.trim().to_lowercase()
}

pub fn is_valid_email(input: &str) -> bool {
    EMAIL.is_match(input)
}

/// Trims and collapses inner whitespace, keeping case.
pub fn sanitize_name(input: &str) -> String {
    SPACES.replace_all(input.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  City   Blood\tBank "), "City Blood Bank");
        assert_eq!(sanitize_name("O'Neil"), "O'Neil");
        assert_eq!(sanitize_name("     "), "");
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Donor@Demo.COM "), "donor@demo.com");
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("donor@demo.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("donor@demo"));
        assert!(!is_valid_email("no spaces@demo.com"));
        assert!(!is_valid_email(""));
    }
}
