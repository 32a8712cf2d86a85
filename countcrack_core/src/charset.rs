/// Characters that are never offered to the oracle, even though the target
/// process is spawned directly with piped stdin. Historically these broke a
/// shell-interpolated invocation; they stay excluded so candidate strings
/// remain safe to paste into a shell when reproducing a run by hand.
pub const DISALLOWED_CHARS: &[char] = &[
    '"', '\'', '(', ')', '>', '<', '`', '|', '\\', '#', ';', '&',
];

const ASCII_LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const ASCII_UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ASCII_DIGITS: &str = "0123456789";
const ASCII_PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// ASCII punctuation minus `DISALLOWED_CHARS`, preserving ASCII order.
fn safe_punctuation() -> String {
    ASCII_PUNCTUATION
        .chars()
        .filter(|c| !DISALLOWED_CHARS.contains(c))
        .collect()
}

/// Returns the ordered character set for a charset code.
///
/// Codes 1 through 4 select narrower sets; any other code (0 is the
/// conventional default) selects the full lower+upper+digits+punctuation
/// set. The order of the returned string is also the tie-break order of
/// the per-position scan: earlier characters win ties.
pub fn charset_for(code: u32) -> String {
    let punct = safe_punctuation();
    match code {
        1 => format!("{ASCII_LOWERCASE}{punct}"),
        2 => format!("{ASCII_UPPERCASE}{punct}"),
        3 => format!("{ASCII_LOWERCASE}{ASCII_UPPERCASE}{punct}"),
        4 => format!("{ASCII_LOWERCASE}{ASCII_DIGITS}{punct}"),
        _ => format!("{ASCII_LOWERCASE}{ASCII_UPPERCASE}{ASCII_DIGITS}{punct}"),
    }
}
