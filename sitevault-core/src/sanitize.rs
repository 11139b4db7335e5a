/*!
Filename sanitization for human-supplied snapshot names.
*/

/// Maximum length of a sanitized component, in bytes.
const MAX_COMPONENT_BYTES: usize = 200;

/// Characters that are not allowed in a filename component on any supported
/// filesystem; each occurrence is replaced with a hyphen.
const DISALLOWED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Turn arbitrary human text into a safe path component.
///
/// Percent-escapes are decoded, control characters stripped, filesystem
/// metacharacters and whitespace runs collapsed to single hyphens, repeated
/// hyphens deduplicated, and the result is trimmed and truncated to 200 bytes
/// on a character boundary. Never fails; empty input yields an empty string
/// and the caller supplies a fallback.
pub fn sanitize(input: &str) -> String {
    let decoded = percent_decode(input.trim());

    let mut out = String::with_capacity(decoded.len());
    let mut last_hyphen = false;
    for ch in decoded.chars() {
        if ch.is_control() {
            continue;
        }
        if DISALLOWED.contains(&ch) || ch.is_whitespace() {
            if !last_hyphen {
                out.push('-');
                last_hyphen = true;
            }
            continue;
        }
        if ch == '-' {
            if !last_hyphen {
                out.push('-');
                last_hyphen = true;
            }
            continue;
        }
        out.push(ch);
        last_hyphen = false;
    }

    let mut trimmed = out.trim_matches(|c| matches!(c, '-' | '.' | '_' | ' ')).to_string();

    if trimmed.len() > MAX_COMPONENT_BYTES {
        let mut cut = MAX_COMPONENT_BYTES;
        while !trimmed.is_char_boundary(cut) {
            cut -= 1;
        }
        trimmed.truncate(cut);
        trimmed = trimmed.trim_end_matches(|c| matches!(c, '-' | '.' | '_' | ' ')).to_string();
    }

    trimmed
}

/// Decode `%XX` percent-escapes; malformed escapes pass through verbatim.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
