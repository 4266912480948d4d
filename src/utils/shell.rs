//! Shell escaping and quoting utilities.

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a single argument for shell execution.
/// - Empty strings become `''`
/// - Strings with shell metacharacters are wrapped in single quotes
/// - Embedded single quotes are escaped
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    // Characters that require quoting
    const SHELL_META: &[char] = &[
        ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}',
        '<', '>', '|', '&', ';', '#', '~',
    ];

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", escape_single_quote_content(arg))
}

/// Quote a path for shell execution (always quotes).
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quote_content(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_arg_plain_words_pass_through() {
        assert_eq!(quote_arg("master"), "master");
        assert_eq!(quote_arg("v1.2.4"), "v1.2.4");
    }

    #[test]
    fn quote_arg_wraps_commit_titles() {
        assert_eq!(
            quote_arg("Release of master on 2024-01-01 10:00:00 UTC by ops"),
            "'Release of master on 2024-01-01 10:00:00 UTC by ops'"
        );
    }

    #[test]
    fn quote_arg_with_single_quote() {
        assert_eq!(quote_arg("it's"), "'it'\\''s'");
    }

    #[test]
    fn quote_arg_empty() {
        assert_eq!(quote_arg(""), "''");
    }

    #[test]
    fn quote_arg_handles_scp_style_urls() {
        assert_eq!(
            quote_arg("git@example.com:team/app.git"),
            "git@example.com:team/app.git"
        );
        assert_eq!(
            quote_arg("https://example.com/app.git?ref=1"),
            "'https://example.com/app.git?ref=1'"
        );
    }

    #[test]
    fn quote_path_always_quotes() {
        assert_eq!(quote_path("/tmp/launchpad-x"), "'/tmp/launchpad-x'");
        assert_eq!(quote_path("/tmp/it's"), "'/tmp/it'\\''s'");
    }
}
