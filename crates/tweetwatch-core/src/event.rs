//! Stream events: posts delivered by the filtered stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EntityId, EventId, Handle, RuleId};

/// The author of a post, as expanded by the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: EntityId,
    pub handle: Option<Handle>,
    pub name: Option<String>,
    pub profile_image_url: Option<String>,
}

impl Author {
    /// An author known only by id.
    pub fn bare(id: EntityId) -> Self {
        Self {
            id,
            handle: None,
            name: None,
            profile_image_url: None,
        }
    }
}

/// One post delivered by the stream.
///
/// The session never interprets the content; matching is done downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub id: EventId,
    pub text: String,
    pub author_id: EntityId,
    /// Expanded author details, when the stream supplied them.
    pub author: Option<Author>,
    pub created_at: DateTime<Utc>,
    /// Remote rules that selected this post.
    pub matching_rules: Vec<RuleId>,
}

impl StreamEvent {
    /// A minimal event with only the required fields.
    pub fn new(
        id: impl Into<EventId>,
        author_id: impl Into<EntityId>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            author_id: author_id.into(),
            author: None,
            created_at,
            matching_rules: Vec::new(),
        }
    }

    /// Attach expanded author details.
    pub fn with_author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }

    /// The author's handle, if expanded.
    pub fn author_handle(&self) -> Option<&Handle> {
        self.author.as_ref().and_then(|a| a.handle.as_ref())
    }

    /// Public URL of the post, when the author's handle is known.
    pub fn url(&self) -> Option<String> {
        self.author_handle()
            .map(|handle| format!("https://twitter.com/{}/status/{}", handle, self.id))
    }
}
