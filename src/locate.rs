//! Locating the target array in the document
//!
//! A plain substring search for `"key"` is wrong: the quoted key bytes may
//! appear inside some other string value. The locator therefore walks every
//! string literal with full escape handling and only accepts a quoted
//! occurrence that is a complete literal equal to the key, followed by
//! optional whitespace, `:`, optional whitespace and `[`. An occurrence
//! whose value turns out not to be an array resumes the search.
//!
//! The state machine consumes one byte at a time, so a key straddling a
//! refill boundary is matched without any re-scanning.

use std::io::Read;

use crate::buffer::StreamBuffer;
use crate::error::ExtractError;

fn is_ws(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\r' || b == b'\n'
}

enum State {
    /// Outside any string literal
    Scan,
    /// Inside a string literal; `matched` bytes of the key seen so far,
    /// `viable` false once the literal has diverged from the key
    InString { matched: usize, viable: bool, escape: bool },
    /// A literal equal to the key just closed; expecting `:`
    AfterKey,
    /// Key and colon seen; expecting `[`
    AfterColon,
}

/// Advance the buffer to just past the `[` that opens the target array.
///
/// An empty key selects the first `[` that is not inside a string literal.
/// Reaching end of input without a match is `TargetNotFound`.
pub fn locate_array<R: Read>(
    src: &mut StreamBuffer<R>,
    key: &str,
) -> Result<(), ExtractError> {
    if key.is_empty() {
        return locate_first_array(src);
    }

    let key = key.as_bytes();
    let mut state = State::Scan;

    while let Some(b) = src.next()? {
        state = match state {
            State::Scan => {
                if b == b'"' {
                    State::InString { matched: 0, viable: true, escape: false }
                } else {
                    State::Scan
                }
            }
            State::InString { matched, viable, escape } => {
                if escape {
                    State::InString { matched, viable: false, escape: false }
                } else if b == b'\\' {
                    State::InString { matched, viable: false, escape: true }
                } else if b == b'"' {
                    if viable && matched == key.len() {
                        State::AfterKey
                    } else {
                        State::Scan
                    }
                } else if viable && matched < key.len() && b == key[matched] {
                    State::InString { matched: matched + 1, viable, escape: false }
                } else {
                    State::InString { matched, viable: false, escape: false }
                }
            }
            State::AfterKey => {
                if is_ws(b) {
                    State::AfterKey
                } else if b == b':' {
                    State::AfterColon
                } else if b == b'"' {
                    // The matched literal was a string value; the byte after
                    // it may open the next candidate.
                    State::InString { matched: 0, viable: true, escape: false }
                } else {
                    State::Scan
                }
            }
            State::AfterColon => {
                if is_ws(b) {
                    State::AfterColon
                } else if b == b'[' {
                    tracing::debug!(bytes_read = src.bytes_read(), "target array located");
                    return Ok(());
                } else if b == b'"' {
                    // String value under the key; keep searching.
                    State::InString { matched: 0, viable: true, escape: false }
                } else {
                    State::Scan
                }
            }
        };
    }

    Err(ExtractError::TargetNotFound {
        key: String::from_utf8_lossy(key).into_owned(),
    })
}

/// Empty-key variant: the first `[` outside a string literal wins.
fn locate_first_array<R: Read>(src: &mut StreamBuffer<R>) -> Result<(), ExtractError> {
    let mut in_string = false;
    let mut escape = false;

    while let Some(b) = src.next()? {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => {
                tracing::debug!(bytes_read = src.bytes_read(), "top-level array located");
                return Ok(());
            }
            _ => {}
        }
    }

    Err(ExtractError::TargetNotFound { key: String::new() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn locate(doc: &str, key: &str, read_size: usize) -> Result<Vec<u8>, ExtractError> {
        let mut src = StreamBuffer::new(Cursor::new(doc.as_bytes().to_vec()), read_size);
        locate_array(&mut src, key)?;
        let mut rest = Vec::new();
        while let Some(b) = src.next().unwrap() {
            rest.push(b);
        }
        Ok(rest)
    }

    #[test]
    fn test_finds_named_key() {
        let rest = locate(r#"{"accounts":[1,2]}"#, "accounts", 4096).unwrap();
        assert_eq!(rest, b"1,2]}");
    }

    #[test]
    fn test_whitespace_around_colon_and_bracket() {
        let rest = locate("{\"accounts\" \n\t:  \r\n [1]}", "accounts", 4096).unwrap();
        assert_eq!(rest, b"1]}");
    }

    #[test]
    fn test_key_bytes_inside_string_value_do_not_match() {
        let doc = r#"{"note":"\"accounts\": [99]","accounts":[3]}"#;
        let rest = locate(doc, "accounts", 4096).unwrap();
        assert_eq!(rest, b"3]}");
    }

    #[test]
    fn test_key_as_string_value_does_not_match() {
        let doc = r#"{"kind":"accounts","accounts":[7]}"#;
        let rest = locate(doc, "accounts", 4096).unwrap();
        assert_eq!(rest, b"7]}");
    }

    #[test]
    fn test_key_with_non_array_value_resumes_search() {
        let doc = r#"{"accounts":{"n":1},"accounts":[5]}"#;
        let rest = locate(doc, "accounts", 4096).unwrap();
        assert_eq!(rest, b"5]}");
    }

    #[test]
    fn test_other_keys_with_array_values_are_ignored() {
        let doc = r#"{"users":[{"id":9}],"accounts":[1]}"#;
        let rest = locate(doc, "accounts", 4096).unwrap();
        assert_eq!(rest, b"1]}");
    }

    #[test]
    fn test_missing_key_is_target_not_found() {
        let err = locate(r#"{"other":[1]}"#, "accounts", 4096).unwrap_err();
        assert!(matches!(err, ExtractError::TargetNotFound { .. }));
    }

    #[test]
    fn test_empty_key_selects_top_level_array() {
        let rest = locate("  [10,20,30]", "", 4096).unwrap();
        assert_eq!(rest, b"10,20,30]");
    }

    #[test]
    fn test_empty_key_skips_brackets_inside_strings() {
        let rest = locate(r#""[nope" [1]"#, "", 4096).unwrap();
        assert_eq!(rest, b"1]");
    }

    #[test]
    fn test_key_straddles_refill_boundary() {
        let doc = r#"{"customer_accounts_snapshot":[42]}"#;
        for read_size in 1..8 {
            let rest = locate(doc, "customer_accounts_snapshot", read_size).unwrap();
            assert_eq!(rest, b"42]}");
        }
    }

    #[test]
    fn test_escaped_quote_does_not_close_string() {
        let doc = r#"{"a":"x\"accounts\":[","accounts":[8]}"#;
        let rest = locate(doc, "accounts", 4096).unwrap();
        assert_eq!(rest, b"8]}");
    }
}
