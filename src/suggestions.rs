//! Quick-reply suggestions shown under the chat.

use crate::service::SessionService;
use voice_tutor_types::session::Suggestion;
use voice_tutor_types::{Intent, SpokenLanguage};

/// Conversation starters for a fresh session, chosen by declared intent.
pub fn initial(intent: &Intent) -> Vec<Suggestion> {
    match intent {
        Intent::Admission => vec![
            Suggestion::new("What documents are needed?", "📄"),
            Suggestion::new("When can I enroll?", "📅"),
            Suggestion::new("How long does admission take?", "⏱️"),
            Suggestion::new("Is there an entrance test?", "✍️"),
        ],
        Intent::Fees => vec![
            Suggestion::new("What is the total fee?", "💰"),
            Suggestion::new("Are there payment plans?", "💳"),
            Suggestion::new("Any discounts available?", "🎁"),
            Suggestion::new("What does the fee include?", "📦"),
        ],
        _ => vec![
            Suggestion::new("Tell me about admission process", "📝"),
            Suggestion::new("What are the fees?", "💰"),
            Suggestion::new("Can I get a demo class?", "🎥"),
            Suggestion::new("What subjects are covered?", "📚"),
        ],
    }
}

/// Follow-ups offered after an assistant reply.
pub fn contextual(language: SpokenLanguage) -> Vec<Suggestion> {
    let toggle = match language.other() {
        SpokenLanguage::English => Suggestion::new("Explain in English", "🇬🇧"),
        SpokenLanguage::Hindi => Suggestion::new("Explain in Hindi", "🇮🇳"),
    };
    vec![
        Suggestion::new("Tell me more", "💬"),
        toggle,
        Suggestion::new("What about fees?", "💰"),
        Suggestion::new("How do I enroll?", "📝"),
    ]
}

/// Starters from the session service, falling back to the local set.
pub async fn starters(service: &dyn SessionService, grade: &str, intent: &Intent) -> Vec<Suggestion> {
    match service.fetch_suggestions(grade, intent.as_str()).await {
        Ok(suggestions) if !suggestions.is_empty() => suggestions,
        Ok(_) => initial(intent),
        Err(e) => {
            tracing::debug!("using local suggestions: {}", e);
            initial(intent)
        }
    }
}
