//! String preparation for case-ignore matching (RFC 4518).
//!
//! The pipeline is MAP, NFKC, casefold, NFD, PROHIBIT, then insignificant
//! space handling. The decomposed (NFD) form is what gets stored and
//! compared, so two spellings of the same accented string normalize to
//! identical byte sequences.

use caseless::Caseless;
use unicode_normalization::UnicodeNormalization;

/// Apply the MAP step to one character: `None` deletes it, `Some(' ')`
/// replaces it with a space.
fn map_char(c: char) -> Option<char> {
    match c {
        '\u{09}'..='\u{0D}' | '\u{85}' => Some(' '),
        '\u{00}'..='\u{08}'
        | '\u{0E}'..='\u{1F}'
        | '\u{7F}'..='\u{84}'
        | '\u{86}'..='\u{9F}'
        | '\u{AD}'
        | '\u{34F}'
        | '\u{1806}'
        | '\u{180B}'..='\u{180D}'
        | '\u{200B}'..='\u{200D}'
        | '\u{2060}'
        | '\u{FE00}'..='\u{FE0F}'
        | '\u{FEFF}' => None,
        c if c.is_whitespace() => Some(' '),
        c => Some(c),
    }
}

fn prohibited(c: char) -> bool {
    matches!(c, '\u{FFFD}' | '\u{FDD0}'..='\u{FDEF}') || (c as u32 & 0xFFFE) == 0xFFFE
}

/// Prepare a string value for case-ignore comparison.
///
/// Fails with a short reason when the value contains a prohibited
/// codepoint; callers decide how to surface that.
pub fn prepare(input: &str) -> Result<String, &'static str> {
    let decomposed: String = input
        .chars()
        .filter_map(map_char)
        .nfkc()
        .default_case_fold()
        .nfd()
        .collect();
    if decomposed.chars().any(prohibited) {
        return Err("prohibited codepoint in value");
    }

    // Insignificant space handling: trim the ends, collapse inner runs.
    let mut out = String::with_capacity(decomposed.len());
    let mut pending_space = false;
    for c in decomposed.chars() {
        if c == ' ' {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::prepare;

    #[test]
    fn case_and_space_folding() {
        assert_eq!(prepare("J. Smith").unwrap(), "j. smith");
        assert_eq!(prepare("  a   b  ").unwrap(), "a b");
        assert_eq!(prepare("").unwrap(), "");
        assert_eq!(prepare("   ").unwrap(), "");
    }

    #[test]
    fn full_case_folding() {
        // Full Unicode case folding, not lowercasing: sharp s expands.
        assert_eq!(prepare("Stra\u{DF}e").unwrap(), "strasse");
        assert_eq!(prepare("STRASSE").unwrap(), prepare("stra\u{DF}e").unwrap());
        // Final sigma folds to the ordinary sigma.
        assert_eq!(prepare("\u{3A3}\u{3C2}").unwrap(), "\u{3C3}\u{3C3}");
    }

    #[test]
    fn control_chars_mapped() {
        // 0x00-0x08 are deleted, tab/CR/LF become spaces.
        assert_eq!(prepare("\u{4}\u{2}Hi").unwrap(), "hi");
        assert_eq!(prepare("Before\u{0d}After").unwrap(), "before after");
        assert_eq!(prepare("a\tb").unwrap(), "a b");
    }

    #[test]
    fn decomposed_output() {
        // The composed form decomposes: c with caron becomes c + U+030C.
        let out = prepare("Lu\u{10D}i\u{107}").unwrap();
        assert_eq!(out, "luc\u{30C}ic\u{301}");
        // Already-decomposed input reaches the same form.
        assert_eq!(prepare("LUC\u{30C}IC\u{301}").unwrap(), out);
    }

    #[test]
    fn idempotent() {
        for s in ["J. Smith", "Lu\u{10D}i\u{107}", "  a   b  ", "\u{55b6}\u{696d}\u{90e8}"] {
            let once = prepare(s).unwrap();
            assert_eq!(prepare(&once).unwrap(), once);
        }
    }

    #[test]
    fn prohibited_codepoint() {
        assert!(prepare("a\u{FFFD}b").is_err());
    }
}
