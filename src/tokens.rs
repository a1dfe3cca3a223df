//! Heuristic token estimation.
//!
//! This is an approximation, not a tokenizer: Han text averages roughly 1.5
//! characters per token and everything else roughly 4, which is close enough
//! for quota accounting without pulling in model-specific vocabularies.

/// Estimate the token count of `text` as `ceil(han / 1.5 + rest / 4)`.
pub fn estimate(text: &str) -> u64 {
    let mut han = 0u64;
    let mut rest = 0u64;
    for c in text.chars() {
        if is_han(c) {
            han += 1;
        } else {
            rest += 1;
        }
    }
    (han as f64 / 1.5 + rest as f64 / 4.0).ceil() as u64
}

fn is_han(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'      // CJK Unified Ideographs
        | '\u{3400}'..='\u{4DBF}'    // Extension A
        | '\u{F900}'..='\u{FAFF}'    // Compatibility Ideographs
        | '\u{20000}'..='\u{2EBEF}'  // Extensions B through F
        | '\u{30000}'..='\u{3134F}'  // Extension G
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero() {
        assert_eq!(estimate(""), 0);
    }

    #[test]
    fn han_text_counts_at_two_thirds_per_char() {
        // 7 Han characters: ceil(7 / 1.5) = 5
        assert_eq!(estimate("完成了项目开发"), 5);
    }

    #[test]
    fn ascii_text_counts_at_quarter_per_char() {
        // 8 chars: ceil(8 / 4) = 2
        assert_eq!(estimate("fix bugs"), 2);
    }

    #[test]
    fn mixed_text_sums_both_rates() {
        // 2 Han + 6 other: ceil(2 / 1.5 + 6 / 4) = ceil(2.833..) = 3
        assert_eq!(estimate("完成 tests"), 3);
    }

    #[test]
    fn estimate_is_deterministic() {
        let text = "本周完成了 API gateway 的重构工作";
        assert_eq!(estimate(text), estimate(text));
    }
}
