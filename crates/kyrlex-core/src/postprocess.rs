//! Cleanup of raw model output.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#+\s*").unwrap());
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static SENTENCE_GAP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.([А-ЯA-Z])").unwrap());

/// Hedging openers the prompt asks the model to avoid.
static PREAMBLE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)Based on the provided context[,:]?\s*",
        r"(?i)According to the context[,:]?\s*",
        r"(?i)From the legal texts?[,:]?\s*",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Normalize a generated answer into a single clean paragraph.
pub fn post_process(answer: &str) -> String {
    let answer = answer.trim();
    if answer.is_empty() {
        return String::new();
    }

    let answer = WHITESPACE_RE.replace_all(answer, " ");
    let answer = HEADER_RE.replace(&answer, "");
    let answer = BOLD_RE.replace_all(&answer, "$1");
    let answer = SENTENCE_GAP_RE.replace_all(&answer, ". $1");

    let mut answer = answer.into_owned();
    for re in PREAMBLE_RES.iter() {
        answer = re.replace_all(&answer, "").into_owned();
    }

    answer.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(post_process("  Статья 87\n\n  гласит:\tдва  "), "Статья 87 гласит: два");
    }

    #[test]
    fn test_markdown_removed() {
        assert_eq!(
            post_process("## **Общество** с ограниченной ответственностью"),
            "Общество с ограниченной ответственностью"
        );
        // Only a leading header marker is stripped
        assert_eq!(post_process("Issue #5 stays"), "Issue #5 stays");
    }

    #[test]
    fn test_sentence_spacing() {
        assert_eq!(post_process("Первое.Второе.Third"), "Первое. Второе. Third");
        // Lowercase after a period and decimals are untouched
        assert_eq!(post_process("ст.5 и т.д."), "ст.5 и т.д.");
    }

    #[test]
    fn test_preambles_removed_case_insensitively() {
        assert_eq!(
            post_process("Based on the provided context, employees have the right to leave."),
            "employees have the right to leave."
        );
        assert_eq!(
            post_process("ACCORDING TO THE CONTEXT: the fine is 100 som."),
            "the fine is 100 som."
        );
        assert_eq!(
            post_process("From the legal texts the term is 3 years."),
            "the term is 3 years."
        );
    }

    #[test]
    fn test_empty() {
        assert_eq!(post_process("   \n"), "");
    }
}
