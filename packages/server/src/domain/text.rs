//! Pure text helpers for AI output.

/// Characters that close a sentence (or a quoted/emphasized span).
const SENTENCE_END: [char; 18] = [
    '.', '!', '?', '*', '"', ')', '}', '`', ']', '$', '…', '。', '！', '？', '”', '）', '】', '」',
];

/// Cut `input` after its last complete sentence.
///
/// Text without any sentence-closing character is returned with trailing
/// whitespace removed, so a short fragment is never discarded entirely.
pub fn trim_incomplete_sentences(input: &str) -> String {
    match input
        .char_indices()
        .rev()
        .find(|(_, c)| SENTENCE_END.contains(c))
    {
        Some((index, c)) => input[..index + c.len_utf8()].to_string(),
        None => input.trim_end().to_string(),
    }
}

/// Expand the `{{user}}` and `{{char}}` placeholders (case-insensitive).
pub fn replace_macros(text: &str, user: &str, character: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = &after[..end];
                if name.eq_ignore_ascii_case("user") {
                    output.push_str(user);
                } else if name.eq_ignore_ascii_case("char") {
                    output.push_str(character);
                } else {
                    output.push_str(&rest[start..start + 2 + end + 2]);
                }
                rest = &after[end + 2..];
            }
            None => {
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output
}
