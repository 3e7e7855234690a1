//! Building R source text from host values.
//!
//! Every value that crosses into R goes through these helpers, so the R
//! side only ever sees literals, never spliced host strings.

use std::fmt;
use std::path::Path;

/// Quote `s` as an R string literal.
pub fn r_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// A path as an R string literal with forward slashes.
///
/// R accepts `/` on every platform; backslashes would need doubling.
pub fn r_path(path: &Path) -> String {
    r_string(&path.display().to_string().replace('\\', "/"))
}

/// Character vector handed to R, rendered as `c("a", "b")`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrVector(Vec<String>);

impl StrVector {
    pub fn from_slice<S: AsRef<str>>(items: &[S]) -> Self {
        Self(items.iter().map(|s| s.as_ref().to_string()).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for StrVector {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for StrVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "character(0)");
        }
        write!(f, "c(")?;
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", r_string(item))?;
        }
        write!(f, ")")
    }
}

/// Undo R's `encodeString(x, quote = '"')`.
///
/// Returns `None` for the bare `NA` marker and for input that is not a
/// quoted string.
pub fn decode_r_string(encoded: &str) -> Option<String> {
    let inner = encoded.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(u @ ('u' | 'U')) => {
                let mut hex = String::new();
                if chars.next_if_eq(&'{').is_some() {
                    while let Some(h) = chars.next_if(|h| *h != '}') {
                        hex.push(h);
                    }
                    chars.next_if_eq(&'}');
                } else {
                    let width = if u == 'u' { 4 } else { 8 };
                    while hex.len() < width {
                        match chars.next_if(char::is_ascii_hexdigit) {
                            Some(h) => hex.push(h),
                            None => break,
                        }
                    }
                }
                if let Some(decoded) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
                {
                    out.push(decoded);
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_r_string_escapes() {
        assert_eq!(r_string("forecast"), "\"forecast\"");
        assert_eq!(r_string("a\"b\\c\nd"), "\"a\\\"b\\\\c\\nd\"");
    }

    #[test]
    fn test_r_path_uses_forward_slashes() {
        let path = PathBuf::from("C:\\conda\\Lib\\R\\library");
        assert_eq!(r_path(&path), "\"C:/conda/Lib/R/library\"");
    }

    #[test]
    fn test_str_vector_rendering() {
        let v = StrVector::from_slice(&["forecast", "vars"]);
        assert_eq!(v.to_string(), "c(\"forecast\", \"vars\")");
        assert_eq!(StrVector::default().to_string(), "character(0)");
        let collected: StrVector = ["x"].into_iter().collect();
        assert_eq!(collected.len(), 1);
    }

    #[test]
    fn test_decode_inverts_encode() {
        for s in ["plain", "with \"quotes\"", "back\\slash", "two\nlines", "tab\there"] {
            assert_eq!(decode_r_string(&r_string(s)).as_deref(), Some(s));
        }
    }

    #[test]
    fn test_decode_na_and_unicode() {
        assert_eq!(decode_r_string("NA"), None);
        assert_eq!(decode_r_string("\"\\u00e9t\\u00e9\"").as_deref(), Some("été"));
        assert_eq!(decode_r_string("\"\\u{1F600}\"").as_deref(), Some("😀"));
    }
}
