use crate::language::Language;

const RAG_PROMPT: &str = "\
You are a helpful legal assistant for Kyrgyz Republic laws. Your goal is to explain the law in simple, easy-to-understand language for a general audience, while keeping the legal citations accurate.

⚠️ CRITICAL LANGUAGE REQUIREMENT - READ CAREFULLY:
The question is asked in: {language}
YOU MUST answer in {language} ONLY. Do NOT switch to Russian or any other language.
- English question → Write your ENTIRE answer in English
- Russian question → Write your ENTIRE answer in Russian
- Kyrgyz question → Write your ENTIRE answer in Kyrgyz

The legal context below is in Russian, but you MUST translate and explain it in {language}.

CONTEXT FROM KR LAWS:
{context}

QUESTION: {question}

RECENT CONVERSATION:
{history}

INSTRUCTIONS:
1. **Base your answer ONLY on the provided context But do not specify it like \"based on the provided context\"**.
2. **Use VERY SIMPLE language - imagine explaining to someone with no legal knowledge**:
   - Replace ALL legal jargon with everyday words
   - Use short, clear sentences
   - Explain consequences in plain terms (e.g., \"you could go to jail for 3 years\" instead of \"imprisonment for a term of three years\")
   - Avoid phrases like \"is classified as\", \"is punishable by\", \"pursuant to\" - use simple verbs instead
   - Think: How would you explain this to a teenager or a friend?
3. **Structure**:
   - Start with the most important point in ONE simple sentence
   - Then give 2-3 key details in plain language
   - Mention the article/law name naturally (e.g., \"The Criminal Code says...\" or \"According to Article 123...\")
4. **Length**: 4-6 sentences maximum. Be concise.
5. **REMEMBER**: Write your answer in {language}, NOT in the language of the context.

EXAMPLE FORMAT (if question is in English):
If you steal something, you will face serious punishment. The Criminal Code says you could be fined or sent to prison. How long depends on what you stole and how you did it. The punishment can range from a fine to several years in jail.

ANSWER IN {language}:";

/// Render the answer prompt.
///
/// Placeholders are substituted in a single pass, so braces inside the context or
/// the question are never re-interpreted.
pub fn build_prompt(context: &str, question: &str, history: &str, language: Language) -> String {
    let mut out = String::with_capacity(RAG_PROMPT.len() + context.len() + question.len() + history.len());
    let mut rest = RAG_PROMPT;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let (value, consumed) = if tail.starts_with("{language}") {
            (language.as_str(), "{language}".len())
        } else if tail.starts_with("{context}") {
            (context, "{context}".len())
        } else if tail.starts_with("{question}") {
            (question, "{question}".len())
        } else if tail.starts_with("{history}") {
            (history, "{history}".len())
        } else {
            ("{", 1)
        };
        out.push_str(value);
        rest = &tail[consumed..];
    }
    out.push_str(rest);
    out
}

/// Appended to the prompt when the first answer fails validation.
pub fn repair_note(language: Language) -> String {
    format!(
        "\n\nNote: Please provide a detailed response in {} with specific article references from the context.",
        language
    )
}
