use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::info;

use skein_core::ids::ConversationId;

use crate::conversation::Conversation;

/// Registry of independent conversations. Conversations share no mutable
/// state with each other and may run fully in parallel; the per-conversation
/// mutex keeps each one's turns strictly sequential.
#[derive(Default)]
pub struct ConversationManager {
    conversations: DashMap<ConversationId, Arc<Mutex<Conversation>>>,
}

impl ConversationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, conversation: Conversation) -> ConversationId {
        let id = ConversationId::new();
        info!(%id, backend = conversation.backend_name(), "conversation registered");
        self.conversations
            .insert(id.clone(), Arc::new(Mutex::new(conversation)));
        id
    }

    pub fn get(&self, id: &ConversationId) -> Option<Arc<Mutex<Conversation>>> {
        self.conversations.get(id).map(|entry| Arc::clone(&entry))
    }

    pub fn remove(&self, id: &ConversationId) -> bool {
        self.conversations.remove(id).is_some()
    }

    pub fn ids(&self) -> Vec<ConversationId> {
        let mut ids: Vec<_> = self
            .conversations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use skein_llm::{MockBackend, MockReply};

    fn mock_conversation(reply: &str) -> (Conversation, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::new(vec![MockReply::text(reply)]));
        (Conversation::with_backend(backend.clone()), backend)
    }

    #[tokio::test]
    async fn register_get_remove() {
        let manager = ConversationManager::new();
        assert!(manager.is_empty());

        let (conv, _) = mock_conversation("r");
        let id = manager.add(conv);
        assert_eq!(manager.len(), 1);
        assert!(manager.get(&id).is_some());

        assert!(manager.remove(&id));
        assert!(!manager.remove(&id));
        assert!(manager.get(&id).is_none());
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let manager = ConversationManager::new();
        let (conv_a, backend_a) = mock_conversation("reply a");
        let (conv_b, backend_b) = mock_conversation("reply b");
        let id_a = manager.add(conv_a);
        let id_b = manager.add(conv_b);

        let a = manager.get(&id_a).unwrap();
        let b = manager.get(&id_b).unwrap();

        let (ra, rb) = tokio::join!(
            async { a.lock().await.send("to a").await },
            async { b.lock().await.send("to b").await },
        );
        assert_eq!(ra.unwrap().content(), Some("reply a"));
        assert_eq!(rb.unwrap().content(), Some("reply b"));

        // Each backend saw only its own conversation.
        assert_eq!(backend_a.call_count(), 1);
        assert_eq!(backend_b.call_count(), 1);
        assert_eq!(backend_a.requests()[0][0].content(), Some("to a"));
        assert_eq!(backend_b.requests()[0][0].content(), Some("to b"));
    }

    #[tokio::test]
    async fn ids_listed_in_creation_order() {
        let manager = ConversationManager::new();
        let first = manager.add(mock_conversation("1").0);
        let second = manager.add(mock_conversation("2").0);
        assert_eq!(manager.ids(), vec![first, second]);
    }
}
