//! Interactive yes/no confirmation.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::LifecycleError;

/// Asks the operator to confirm a step.
#[async_trait::async_trait]
pub trait Prompt: Send + Sync {
    /// Show `message` and block until the operator answers.
    async fn confirm(&self, message: &str) -> Result<bool, LifecycleError>;
}

/// `y` or `yes`, case-insensitive.
#[must_use]
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Prompt on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

#[async_trait::async_trait]
impl Prompt for StdinPrompt {
    async fn confirm(&self, message: &str) -> Result<bool, LifecycleError> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(format!("{message} [y/N]: ").as_bytes()).await?;
        stdout.flush().await?;

        let mut answer = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut answer).await?;
        Ok(is_affirmative(&answer))
    }
}

/// Replays canned answers and records the questions asked.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: std::sync::Mutex<std::collections::VecDeque<String>>,
    asked: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl ScriptedPrompt {
    pub fn answering<I: IntoIterator<Item = &'static str>>(answers: I) -> Self {
        Self {
            answers: std::sync::Mutex::new(answers.into_iter().map(str::to_string).collect()),
            asked: std::sync::Mutex::default(),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl Prompt for ScriptedPrompt {
    async fn confirm(&self, message: &str) -> Result<bool, LifecycleError> {
        self.asked.lock().unwrap().push(message.to_string());
        let answer = self.answers.lock().unwrap().pop_front().unwrap_or_default();
        Ok(is_affirmative(&answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative_answers() {
        for answer in ["y", "Y", "yes", " YES\n"] {
            assert!(is_affirmative(answer), "{answer:?}");
        }
        for answer in ["", "n", "no", "yep", "sure"] {
            assert!(!is_affirmative(answer), "{answer:?}");
        }
    }

    #[tokio::test]
    async fn test_scripted_prompt() {
        let prompt = ScriptedPrompt::answering(["yes", "no"]);
        assert!(prompt.confirm("first?").await.unwrap());
        assert!(!prompt.confirm("second?").await.unwrap());
        assert!(!prompt.confirm("third?").await.unwrap());
        assert_eq!(prompt.asked().len(), 3);
    }
}
