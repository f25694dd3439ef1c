use tokio::time::Duration;

/// Parses a duration string such as "500ms", "30s", "10m", "2h", "1d" or a
/// compound form like "1m30s".
///
/// Supported units:
/// - `ms` for milliseconds
/// - `s` for seconds
/// - `m` for minutes
/// - `h` for hours
/// - `d` for days
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration string cannot be empty".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let value_str = &rest[..digits_end];
        let after_value = &rest[digits_end..];

        let unit_end = after_value
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(after_value.len());
        let unit = &after_value[..unit_end];

        let value: u64 = value_str
            .parse()
            .map_err(|_| format!("Invalid numeric value in duration: '{}'", s))?;

        let too_large = || format!("Duration value too large: '{}'", s);
        let secs = |factor: u64| value.checked_mul(factor).ok_or_else(too_large);

        let part = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(secs(60)?),
            "h" => Duration::from_secs(secs(60 * 60)?),
            "d" => Duration::from_secs(secs(24 * 60 * 60)?),
            "" => {
                return Err(format!(
                    "Unknown duration unit in '{}'. Use 'ms', 's', 'm', 'h', or 'd'.",
                    s
                ))
            }
            other => {
                return Err(format!(
                    "Unknown duration unit: '{}'. Use 'ms', 's', 'm', 'h', or 'd'.",
                    other
                ))
            }
        };

        total = total.checked_add(part).ok_or_else(too_large)?;
        rest = &after_value[unit_end..];
    }

    Ok(total)
}

/// Parses a comma-separated header string with support for escaped commas.
///
/// Use `\,` to include a literal comma in a header value.
/// Example: "Connection:keep-alive,Keep-Alive:timeout=5\,max=200"
pub fn parse_headers_with_escapes(headers_str: &str) -> Vec<String> {
    let mut headers = Vec::new();
    let mut current = String::new();
    let mut chars = headers_str.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => {
                if current.trim().is_empty() {
                    current.clear();
                } else {
                    headers.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.trim().is_empty() {
        headers.push(current);
    }

    headers
}

/// Trims surrounding whitespace and cuts the string to `max_len` characters,
/// appending "..." when anything was cut.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    let s = s.trim();
    match s.char_indices().nth(max_len) {
        None => s.to_string(),
        Some((byte_idx, _)) => format!("{}...", &s[..byte_idx]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod duration {
        use super::*;

        #[test]
        fn parse_seconds() {
            assert_eq!(
                parse_duration_string("30s").unwrap(),
                Duration::from_secs(30)
            );
        }

        #[test]
        fn parse_minutes() {
            assert_eq!(
                parse_duration_string("10m").unwrap(),
                Duration::from_secs(600)
            );
        }

        #[test]
        fn parse_hours_and_days() {
            assert_eq!(
                parse_duration_string("5h").unwrap(),
                Duration::from_secs(18000)
            );
            assert_eq!(
                parse_duration_string("3d").unwrap(),
                Duration::from_secs(259200)
            );
        }

        #[test]
        fn parse_millis() {
            assert_eq!(
                parse_duration_string("250ms").unwrap(),
                Duration::from_millis(250)
            );
        }

        #[test]
        fn parse_compound() {
            assert_eq!(
                parse_duration_string("1m30s").unwrap(),
                Duration::from_secs(90)
            );
            assert_eq!(
                parse_duration_string("1h0m500ms").unwrap(),
                Duration::from_millis(3_600_500)
            );
        }

        #[test]
        fn trims_whitespace() {
            assert_eq!(
                parse_duration_string("  10m  ").unwrap(),
                Duration::from_secs(600)
            );
        }

        #[test]
        fn empty_string_errors() {
            let err = parse_duration_string("   ").unwrap_err();
            assert!(err.contains("empty"), "error was: {}", err);
        }

        #[test]
        fn no_suffix_errors() {
            let err = parse_duration_string("10").unwrap_err();
            assert!(err.contains("Unknown duration unit"), "error was: {}", err);
        }

        #[test]
        fn unknown_suffix_errors() {
            let err = parse_duration_string("10x").unwrap_err();
            assert!(err.contains("Unknown duration unit"), "error was: {}", err);
        }

        #[test]
        fn no_number_errors() {
            let err = parse_duration_string("m").unwrap_err();
            assert!(err.contains("Invalid numeric"), "error was: {}", err);
        }

        #[test]
        fn overflowing_values_error() {
            let err = parse_duration_string("300000000000000d").unwrap_err();
            assert!(err.contains("too large"), "error was: {}", err);

            let err = parse_duration_string("18446744073709551615s1s").unwrap_err();
            assert!(err.contains("too large"), "error was: {}", err);
        }

        #[test]
        fn fractional_and_negative_error() {
            assert!(parse_duration_string("5.5h").is_err());
            assert!(parse_duration_string("-5m").is_err());
        }
    }

    #[test]
    fn test_parse_headers_with_escaped_comma() {
        let result = parse_headers_with_escapes("Connection:keep-alive,Keep-Alive:timeout=5\\,max=200");

        assert_eq!(result.len(), 2);
        assert_eq!(result[0], "Connection:keep-alive");
        assert_eq!(result[1], "Keep-Alive:timeout=5,max=200");
    }

    #[test]
    fn test_parse_headers_skips_empty_entries() {
        let result = parse_headers_with_escapes("Header1:value1, ,Header2:value2,");

        assert_eq!(result, vec!["Header1:value1", "Header2:value2"]);
    }

    #[test]
    fn test_truncate_within_limit_is_trimmed_only() {
        assert_eq!(truncate_string("  hello  ", 10), "hello");
        assert_eq!(truncate_string("exactly10!", 10), "exactly10!");
    }

    #[test]
    fn test_truncate_over_limit_appends_marker() {
        let body = "x".repeat(600);
        let truncated = truncate_string(&body, 500);

        assert_eq!(truncated.len(), 503);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_string("héllo wörld", 4), "héll...");
    }
}
