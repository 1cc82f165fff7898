//! Interactive question loop.

use std::io::Write;

use anyhow::Result;
use futures_util::StreamExt;
use kyrlex_core::{ConversationHistory, LegalAssistant};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tracing::error;

const PROMPT: &str = "❓ ";
pub const CACHE_NOTE: &str = "⚡ Using cached results...";

/// Words that end a chat session, compared case-insensitively.
const EXIT_WORDS: [&str; 4] = ["exit", "quit", "q", "выход"];

pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim().to_lowercase();
    EXIT_WORDS.contains(&line.as_str())
}

/// Answer one question, printing the answer, and return its text.
pub async fn answer_once(
    assistant: &LegalAssistant,
    question: &str,
    history: &ConversationHistory,
    stream: bool,
) -> Result<String> {
    if stream {
        let mut reply = assistant.ask_stream(question, history).await;
        if reply.cached {
            println!("{}", CACHE_NOTE);
        }

        let mut stdout = std::io::stdout();
        let mut answer = String::new();
        while let Some(fragment) = reply.fragments.next().await {
            print!("{}", fragment);
            stdout.flush()?;
            answer.push_str(&fragment);
        }
        println!();
        Ok(answer)
    } else {
        let reply = assistant.ask(question, history).await;
        if reply.cached {
            println!("{}", CACHE_NOTE);
        }
        println!("{}", reply.answer);
        Ok(reply.answer)
    }
}

pub async fn run_chat(assistant: &LegalAssistant, stream: bool) -> Result<()> {
    let mut rl = Editor::<(), DefaultHistory>::new()?;
    let mut history = ConversationHistory::new();

    println!("Kyrgyz Republic legal assistant. Ask a question, or type 'exit' to quit.\n");

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if is_exit_command(question) {
            println!("Goodbye!");
            break;
        }
        let _ = rl.add_history_entry(question);

        match answer_once(assistant, question, &history, stream).await {
            Ok(answer) => {
                history.push_exchange(question, answer);
                println!();
            }
            Err(e) => error!("Error answering question: {}", e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_words() {
        for word in ["exit", "quit", "q", "выход", "  EXIT ", "Выход"] {
            assert!(is_exit_command(word), "{word:?} should exit");
        }
    }

    #[test]
    fn test_questions_do_not_exit() {
        for line in ["", "qq", "exit now", "Что такое выход из ООО?"] {
            assert!(!is_exit_command(line), "{line:?} should not exit");
        }
    }
}
