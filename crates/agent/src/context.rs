//! Context assembly: turns stored history plus the new user text into the
//! ordered message list sent to the model.
//!
//! Output is always `[system, ...history, user]`. The system message
//! carries the identity prompt, the current channel/chat and, when the
//! session has been compacted, the rolling summary.

use pincer_core::identity::Identity;
use pincer_core::message::Message;

/// All inputs needed to assemble one request.
#[derive(Debug, Clone, Copy)]
pub struct ContextInput<'a> {
    /// Stored history, oldest first
    pub history: &'a [Message],
    /// Rolling summary of everything older than `history`
    pub summary: Option<&'a str>,
    /// The new user text
    pub user_text: &'a str,
    /// Media references attached to the user text
    pub media: &'a [String],
    pub channel: &'a str,
    pub chat_id: &'a str,
}

/// Builds the ordered message list for a model call, system prompt first.
pub trait ContextAssembler: Send + Sync {
    fn build_messages(&self, input: ContextInput<'_>) -> Vec<Message>;
}

/// Identity prompt + session block + summary, then history, then the user turn.
pub struct DefaultContextAssembler {
    identity: Identity,
}

impl DefaultContextAssembler {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn system_prompt(&self, input: &ContextInput<'_>) -> String {
        let mut prompt = self.identity.system_prompt.trim_end().to_string();

        prompt.push_str(&format!(
            "\n\n## Current Session\nChannel: {}\nChat ID: {}",
            input.channel, input.chat_id
        ));

        if let Some(summary) = input.summary.map(str::trim).filter(|s| !s.is_empty()) {
            prompt.push_str("\n\n## Summary of Previous Conversation\n");
            prompt.push_str(summary);
        }

        prompt
    }

    fn user_message(input: &ContextInput<'_>) -> Message {
        if input.media.is_empty() {
            return Message::user(input.user_text);
        }
        let mut text = input.user_text.to_string();
        text.push_str("\n\nAttached media:");
        for item in input.media {
            text.push_str(&format!("\n- {item}"));
        }
        Message::user(text)
    }
}

impl Default for DefaultContextAssembler {
    fn default() -> Self {
        Self::new(Identity::default_identity())
    }
}

impl ContextAssembler for DefaultContextAssembler {
    fn build_messages(&self, input: ContextInput<'_>) -> Vec<Message> {
        let mut messages = Vec::with_capacity(input.history.len() + 2);
        messages.push(Message::system(self.system_prompt(&input)));
        messages.extend(input.history.iter().cloned());
        messages.push(Self::user_message(&input));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pincer_core::message::Role;

    fn input<'a>(history: &'a [Message], summary: Option<&'a str>, media: &'a [String]) -> ContextInput<'a> {
        ContextInput {
            history,
            summary,
            user_text: "what's next?",
            media,
            channel: "telegram",
            chat_id: "42",
        }
    }

    #[test]
    fn system_first_then_history_then_user() {
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let messages = DefaultContextAssembler::default().build_messages(input(&history, None, &[]));

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "hi");
        assert_eq!(messages[2].content, "hello");
        assert_eq!(messages[3].role, Role::User);
        assert_eq!(messages[3].content, "what's next?");
    }

    #[test]
    fn system_prompt_carries_identity_and_session() {
        let messages = DefaultContextAssembler::default().build_messages(input(&[], None, &[]));
        let system = &messages[0].content;
        assert!(system.starts_with("You are Pincer"));
        assert!(system.contains("## Current Session\nChannel: telegram\nChat ID: 42"));
        assert!(!system.contains("Summary of Previous Conversation"));
    }

    #[test]
    fn summary_is_included_when_present() {
        let messages =
            DefaultContextAssembler::default().build_messages(input(&[], Some("User likes tea."), &[]));
        assert!(messages[0]
            .content
            .ends_with("## Summary of Previous Conversation\nUser likes tea."));

        let blank = DefaultContextAssembler::default().build_messages(input(&[], Some("  "), &[]));
        assert!(!blank[0].content.contains("Summary"));
    }

    #[test]
    fn media_appended_as_list() {
        let media = vec!["photo.jpg".to_string(), "voice.ogg".to_string()];
        let messages = DefaultContextAssembler::default().build_messages(input(&[], None, &media));
        let user = &messages.last().unwrap().content;
        assert!(user.starts_with("what's next?"));
        assert!(user.ends_with("- photo.jpg\n- voice.ogg"));
    }

    #[test]
    fn custom_identity_prompt() {
        let identity = Identity {
            name: "Ada".into(),
            system_prompt: "You are Ada.\n".into(),
            loaded_files: vec![],
        };
        let assembler = DefaultContextAssembler::new(identity);
        assert_eq!(assembler.identity().name, "Ada");
        let messages = assembler.build_messages(input(&[], None, &[]));
        assert!(messages[0].content.starts_with("You are Ada.\n\n## Current Session"));
    }
}
