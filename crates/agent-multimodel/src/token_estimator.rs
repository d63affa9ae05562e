//! Rough token counts for pre-call cost estimates
//!
//! Character heuristic: CJK text averages about 1.5 characters per token,
//! everything else about 4. Good enough to price a call before it is made;
//! the real count always comes back in the provider's usage block.

/// Per-message framing added by chat APIs
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{3000}'..='\u{303F}'
        | '\u{FF00}'..='\u{FFEF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7AF}')
}

/// Estimate the token count of one piece of text
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), c| {
        if is_cjk(c) { (cjk + 1, other) } else { (cjk, other + 1) }
    });

    // cjk / 1.5 == cjk * 2 / 3, rounded up
    (cjk * 2).div_ceil(3) + other.div_ceil(4)
}

/// Estimate the prompt tokens of a system prompt plus user message
pub fn estimate_prompt_tokens(system: &str, user: &str) -> usize {
    estimate_tokens(system) + estimate_tokens(user) + 2 * MESSAGE_OVERHEAD_TOKENS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_english() {
        // 16 chars / 4
        assert_eq!(estimate_tokens("abcdefghijklmnop"), 4);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_chinese_costs_more_per_char() {
        let zh = estimate_tokens("贵州茅台基本面分析");
        let en = estimate_tokens("Kweichow M");
        assert_eq!(zh, 6);
        assert!(zh > en);
    }

    #[test]
    fn test_prompt_overhead() {
        assert_eq!(estimate_prompt_tokens("", ""), 8);
        assert_eq!(estimate_prompt_tokens("abcd", "abcd"), 10);
    }
}
