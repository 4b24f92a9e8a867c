//! UI Builder module for formatting outbound messages

use crate::localization::t;

/// Format options as a numbered list, numbering from 1
pub fn format_option_list(title: &str, options: &[String]) -> String {
    let mut result = String::from(title);

    for (i, option) in options.iter().enumerate() {
        result.push_str(&format!("\n{}. {}", i + 1, option));
    }

    result
}

/// The post-login menu
pub fn main_menu() -> String {
    t("menu-prompt")
}

/// Prefix fetched portal text with its section name and keep it within `max_chars`
pub fn format_fetched(section: &str, content: &str, max_chars: usize) -> String {
    let body = truncate_chars(content.trim(), max_chars.saturating_sub(section.chars().count() + 2));
    format!("{section}:\n{body}")
}

/// Cut `text` to at most `max_chars` characters, marking the cut with an ellipsis
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut truncated: String = text.chars().take(max_chars - 1).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_option_list_is_one_based() {
        let years = vec!["2021".to_string(), "2022".to_string()];
        assert_eq!(format_option_list("Select a year:", &years), "Select a year:\n1. 2021\n2. 2022");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 4), "abc…");
        assert_eq!(truncate_chars("ééééé", 3).chars().count(), 3);
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_format_fetched_respects_limit() {
        let text = format_fetched("Result", &"x".repeat(100), 20);
        assert!(text.starts_with("Result:\n"));
        assert!(text.chars().count() <= 20);
    }
}
