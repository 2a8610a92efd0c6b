use anyhow::Result;
use serde::Serialize;

use crate::hitcount::{HitCountContext, HitCountService, HitCounting};
use crate::models::Post;
use crate::request::Visit;

/// Post detail page; hits are counted by the page calling the JSON endpoint.
pub struct PostDetailView;

impl HitCounting for PostDetailView {
    fn content_type(&self) -> &str {
        Post::CONTENT_TYPE
    }
}

/// Post detail page that counts a hit on every render.
pub struct PostCountHitDetailView;

impl HitCounting for PostCountHitDetailView {
    fn content_type(&self) -> &str {
        Post::CONTENT_TYPE
    }

    fn count_hit(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
pub struct PostDetailContext {
    pub post: Post,
    pub hitcount: HitCountContext,
}

/// Build the render context for a post, or `None` if it does not exist
pub async fn post_detail_context<V>(
    view: &V,
    service: &HitCountService,
    visit: &mut Visit,
    post_id: i64,
) -> Result<Option<PostDetailContext>>
where
    V: HitCounting + ?Sized,
{
    let Some(post) = service.storage().get_post(post_id).await? else {
        return Ok(None);
    };

    let hitcount = view
        .hit_count_context(service, visit, &post.id.to_string())
        .await?;

    Ok(Some(PostDetailContext { post, hitcount }))
}
