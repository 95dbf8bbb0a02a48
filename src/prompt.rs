//! Prompt construction.
//!
//! The model input is assembled in a fixed order:
//!
//! ```text
//! <system instructions>
//!
//! Current Menu Context:          (only when context is non-empty)
//! <context>
//!
//! Conversation History:          (only when history is non-empty)
//! User: ...
//! Assistant: ...
//!
//! User: <new message>
//! Assistant:
//! ```
//!
//! History is a hard window over the most recent messages. Older turns are
//! dropped, not summarised.

use crate::models::Message;

/// Persona and behavioural rules sent at the top of every prompt.
pub const SYSTEM_PROMPT: &str = "\
You are a helpful Starbucks menu assistant. You help customers find drinks based on their preferences,
dietary requirements, and nutritional needs. You have access to the complete Starbucks menu with detailed
nutritional information including calories, caffeine content, fat, protein, and other nutrients.

When customers ask about drinks, you should:
1. Understand their preferences (taste, size, milk type, etc.)
2. Consider their dietary restrictions or nutritional goals
3. Recommend suitable drinks with explanations
4. Provide nutritional information when relevant
5. Be friendly and conversational

You can search for drinks by category, name, or nutritional criteria. Always provide helpful and accurate
information about Starbucks beverages.

Be a human and keep the conversations short and sweet.

Also, since you are responding in a chat - use bullets for suggesting different drinks
";

/// Default number of prior messages rendered into the prompt.
pub const HISTORY_WINDOW: usize = 6;

/// Cue the model continues from.
pub const ASSISTANT_CUE: &str = "Assistant:";

/// Composes model input from instructions, context, history, and the new message.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    history_window: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(HISTORY_WINDOW)
    }
}

impl PromptBuilder {
    pub fn new(history_window: usize) -> Self {
        Self { history_window }
    }

    /// Build the full prompt.
    ///
    /// `history` is expected oldest-first; only its last `history_window`
    /// entries are rendered.
    pub fn build(&self, history: &[Message], context: &str, user_message: &str) -> String {
        let mut prompt = String::with_capacity(SYSTEM_PROMPT.len() + context.len() + 512);

        prompt.push_str(SYSTEM_PROMPT);
        prompt.push_str("\n\n");

        if !context.is_empty() {
            prompt.push_str("Current Menu Context:\n");
            prompt.push_str(context);
            prompt.push_str("\n\n");
        }

        let window = &history[history.len().saturating_sub(self.history_window)..];
        if !window.is_empty() {
            prompt.push_str("Conversation History:\n");
            for msg in window {
                prompt.push_str(msg.role.label());
                prompt.push_str(": ");
                prompt.push_str(&msg.content);
                prompt.push('\n');
            }
            prompt.push('\n');
        }

        prompt.push_str("User: ");
        prompt.push_str(user_message);
        prompt.push('\n');
        prompt.push_str(ASSISTANT_CUE);

        prompt
    }
}
