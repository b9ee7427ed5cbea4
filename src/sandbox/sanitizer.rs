use unicode_general_category::{get_general_category, GeneralCategory};

use super::DEFAULT_MAX_INPUT_LENGTH;

/// Cleans raw keystrokes before they reach the parser.
pub struct InputSanitizer;

impl InputSanitizer {
    /// Truncates to `max_length` characters, drops every non-printable
    /// character except newline and tab, then trims surrounding whitespace.
    pub fn sanitize(raw: &str, max_length: usize) -> String {
        let cleaned: String = raw
            .chars()
            .take(max_length)
            .filter(|&c| is_printable(c) || c == '\n' || c == '\t')
            .collect();

        cleaned.trim().to_string()
    }

    pub fn sanitize_default(raw: &str) -> String {
        Self::sanitize(raw, DEFAULT_MAX_INPUT_LENGTH)
    }
}

/// Printable means not in the "Other" or "Separator" categories, with the
/// ASCII space as the only allowed separator. Bidi overrides, zero-width
/// characters and line separators are all removed.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }

    !matches!(
        get_general_category(c),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::Surrogate
            | GeneralCategory::PrivateUse
            | GeneralCategory::Unassigned
            | GeneralCategory::SpaceSeparator
            | GeneralCategory::LineSeparator
            | GeneralCategory::ParagraphSeparator
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_truncates_to_max_length() {
        let raw = "a".repeat(600);
        assert_eq!(InputSanitizer::sanitize_default(&raw).len(), 500);
        assert_eq!(InputSanitizer::sanitize("abcdef", 3), "abc");
    }

    #[test]
    fn test_strips_nul_and_control_characters() {
        assert_eq!(InputSanitizer::sanitize_default("ls\0 -la"), "ls -la");
        assert_eq!(InputSanitizer::sanitize_default("cat\x1b[31m file"), "cat[31m file");
        assert_eq!(InputSanitizer::sanitize_default("echo\x07hi"), "echohi");
    }

    #[test]
    fn test_strips_format_and_separator_characters() {
        assert_eq!(InputSanitizer::sanitize_default("cat notes\u{202E}txt."), "cat notestxt.");
        assert_eq!(InputSanitizer::sanitize_default("l\u{200B}s"), "ls");
        assert_eq!(InputSanitizer::sanitize_default("echo a\u{2028}b"), "echo ab");
        assert_eq!(InputSanitizer::sanitize_default("echo a\u{2029}b\u{00A0}c"), "echo abc");
    }

    #[test]
    fn test_keeps_printable_unicode() {
        assert_eq!(InputSanitizer::sanitize_default("echo héllo ✓"), "echo héllo ✓");
    }

    #[test]
    fn test_keeps_tab_and_newline_inside() {
        assert_eq!(InputSanitizer::sanitize_default("echo\ta\nb"), "echo\ta\nb");
    }

    #[test]
    fn test_trims_and_handles_empty() {
        assert_eq!(InputSanitizer::sanitize_default("   pwd \n"), "pwd");
        assert_eq!(InputSanitizer::sanitize_default(""), "");
        assert_eq!(InputSanitizer::sanitize_default("\0\0"), "");
    }

    #[test]
    fn test_truncation_counts_characters() {
        assert_eq!(InputSanitizer::sanitize("ééé", 2), "éé");
    }

    proptest! {
        #[test]
        fn prop_output_is_printable_and_bounded(raw in any::<String>(), max_length in 0usize..64) {
            let cleaned = InputSanitizer::sanitize(&raw, max_length);
            prop_assert!(cleaned.chars().count() <= max_length);
            prop_assert!(cleaned.chars().all(|c| is_printable(c) || c == '\n' || c == '\t'));
            prop_assert!(!cleaned.contains('\0'));
        }
    }
}
