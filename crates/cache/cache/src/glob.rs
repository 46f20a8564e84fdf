use regex::Regex;

use crate::error::CacheError;

/// Translate a cache-key glob into an anchored regular expression.
///
/// `*` matches any run of characters and `?` a single character; everything
/// else is matched literally.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut buf = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| CacheError::Pattern(e.to_string()))
}
