//! Fragments and the ordered fragment store.
//!
//! A fragment is one trusted author's message, treated as a unit of source
//! code. The store keeps fragments in the order they were first observed;
//! edits keep a fragment's position, removals leave no gap. Iteration order
//! is the engine's evaluation order.

use lazy_static::lazy_static;
use regex::Regex;

use crate::gateway::{AuthorId, ChannelId, InboundMessage, MessageId};

lazy_static! {
    // Fenced blocks tagged `sai`; the tag and fences are not part of the code.
    static ref CODE_BLOCK: Regex = Regex::new(r"(?s)```sai(.*?)```").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub id: MessageId,
    pub author_id: AuthorId,
    pub channel_id: ChannelId,
    pub raw_content: String,
}

impl Fragment {
    pub fn from_message(message: &InboundMessage) -> Self {
        Self {
            id: message.id.clone(),
            author_id: message.author_id.clone(),
            channel_id: message.channel_id.clone(),
            raw_content: message.content.clone(),
        }
    }

    /// Ordered fenced code segments. Text outside fences is ignored; a
    /// fragment without any fence is a no-op on evaluation but still holds
    /// its place in store order.
    pub fn code_blocks(&self) -> Vec<String> {
        CODE_BLOCK
            .captures_iter(&self.raw_content)
            .map(|captures| captures[1].to_string())
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct FragmentStore {
    fragments: Vec<Fragment>,
}

impl FragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new fragment at the end, or replaces the content of an
    /// existing one in place, keeping its position.
    pub fn upsert(&mut self, fragment: Fragment) {
        match self.fragments.iter_mut().find(|f| f.id == fragment.id) {
            Some(existing) => *existing = fragment,
            None => self.fragments.push(fragment),
        }
    }

    /// Removes the fragment with the given id. Returns whether it was held.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.fragments.len();
        self.fragments.retain(|f| f.id != id);
        self.fragments.len() != before
    }

    /// Replaces the whole collection, used by the startup sync.
    pub fn replace_all(&mut self, fragments: Vec<Fragment>) {
        self.fragments = fragments;
    }

    pub fn contains(&self, id: &str) -> bool {
        self.fragments.iter().any(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter()
    }

    /// Owned copy of the current collection, in order. The engine evaluates
    /// against a snapshot so a refresh observes one consistent state.
    pub fn snapshot(&self) -> Vec<Fragment> {
        self.fragments.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(id: &str, content: &str) -> Fragment {
        Fragment {
            id: id.to_string(),
            author_id: "author".to_string(),
            channel_id: "channel".to_string(),
            raw_content: content.to_string(),
        }
    }

    #[test]
    fn test_extracts_blocks_in_order() {
        let f = fragment(
            "m1",
            "first:\n```sai\nshared.a = 1\n```\nand then\n```sai\nshared.b = 2\n```",
        );
        assert_eq!(
            f.code_blocks(),
            vec!["\nshared.a = 1\n".to_string(), "\nshared.b = 2\n".to_string()]
        );
    }

    #[test]
    fn test_no_fence_means_no_blocks() {
        let f = fragment("m1", "just chatting about ```rust\ncode\n```");
        assert!(f.code_blocks().is_empty());
    }

    #[test]
    fn test_upsert_preserves_position() {
        let mut store = FragmentStore::new();
        store.upsert(fragment("a", "1"));
        store.upsert(fragment("b", "2"));
        store.upsert(fragment("c", "3"));

        store.upsert(fragment("b", "edited"));

        let ids: Vec<&str> = store.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(
            store.iter().find(|f| f.id == "b").unwrap().raw_content,
            "edited"
        );
    }

    #[test]
    fn test_remove_leaves_no_gap() {
        let mut store = FragmentStore::new();
        store.upsert(fragment("a", "1"));
        store.upsert(fragment("b", "2"));
        store.upsert(fragment("c", "3"));

        assert!(store.remove("b"));
        assert!(!store.remove("b"));

        let ids: Vec<&str> = store.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_replace_all() {
        let mut store = FragmentStore::new();
        store.upsert(fragment("a", "1"));
        store.replace_all(vec![fragment("x", "1"), fragment("y", "2")]);
        let ids: Vec<&str> = store.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Whatever surrounds the fences, every block comes back, in order.
            #[test]
            fn test_extraction_recovers_all_blocks(
                bodies in prop::collection::vec("[a-zA-Z0-9 =.+\n]{0,40}", 0..5),
            ) {
                let content = bodies
                    .iter()
                    .map(|body| format!("chatter\n```sai{}```", body))
                    .collect::<Vec<_>>()
                    .join("\n");
                let f = fragment("m1", &content);
                prop_assert_eq!(f.code_blocks(), bodies);
            }
        }
    }
}
