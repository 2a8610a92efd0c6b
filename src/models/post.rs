use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Blog post served by the demo detail views.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_at: i64,
}

impl Post {
    /// Content type recorded on the hit counter of a post.
    pub const CONTENT_TYPE: &'static str = "blog.post";
}
