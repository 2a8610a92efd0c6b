use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::service::HitCountService;
use crate::request::Visit;

/// Hit count data injected into a detail view's render context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitCountContext {
    /// Primary key of the counter, used by pages to call the JSON endpoint
    pub pk: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_counted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_message: Option<String>,
    pub total_hits: i64,
}

/// Capability for views that display a hit-counted object.
///
/// Implementors name the content type of their objects and choose whether
/// rendering the view counts as a hit.
#[async_trait]
pub trait HitCounting: Send + Sync {
    fn content_type(&self) -> &str;

    fn count_hit(&self) -> bool {
        false
    }

    /// Build the hit count context for the object with primary key `object_pk`.
    ///
    /// When the view counts hits and this visit was counted, `total_hits`
    /// includes it without querying the store again.
    async fn hit_count_context(
        &self,
        service: &HitCountService,
        visit: &mut Visit,
        object_pk: &str,
    ) -> Result<HitCountContext> {
        let counter = service
            .storage()
            .get_or_create_hit_counter(self.content_type(), object_pk)
            .await?;
        let mut total_hits = service.total_hits(&counter).await?;

        let mut context = HitCountContext {
            pk: counter.id,
            hit_counted: None,
            hit_message: None,
            total_hits,
        };

        if self.count_hit() {
            let response = service.hit_count(visit, &counter).await?;
            if response.hit_counted {
                total_hits += 1;
            }
            context.hit_counted = Some(response.hit_counted);
            context.hit_message = Some(response.hit_message);
        }

        context.total_hits = total_hits;
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Visitor;
    use crate::config::HitCountConfig;
    use crate::storage::{SqliteStorage, Storage};
    use std::sync::Arc;

    struct CountingView;

    impl HitCounting for CountingView {
        fn content_type(&self) -> &str {
            "test.article"
        }

        fn count_hit(&self) -> bool {
            true
        }
    }

    struct PassiveView;

    impl HitCounting for PassiveView {
        fn content_type(&self) -> &str {
            "test.article"
        }
    }

    async fn service() -> HitCountService {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        let storage: Arc<dyn Storage> = Arc::new(storage);
        HitCountService::new(storage, HitCountConfig::default())
    }

    fn visit() -> Visit {
        Visit::new(Visitor::Anonymous, "1.2.3.4", "example.com", "Mozilla/5.0")
    }

    #[tokio::test]
    async fn passive_view_reports_stored_total_only() {
        let service = service().await;
        let mut visit = visit();

        let context = PassiveView
            .hit_count_context(&service, &mut visit, "7")
            .await
            .unwrap();

        assert_eq!(context.total_hits, 0);
        assert_eq!(context.hit_counted, None);
        assert_eq!(context.hit_message, None);
        assert!(visit.session_key().is_none());

        let json = serde_json::to_value(&context).unwrap();
        assert_eq!(json, serde_json::json!({"pk": context.pk, "total_hits": 0}));
    }

    #[tokio::test]
    async fn counting_view_adds_new_hit_to_total() {
        let service = service().await;
        let mut first = visit();
        let mut second = visit();

        let context = CountingView
            .hit_count_context(&service, &mut first, "7")
            .await
            .unwrap();
        assert_eq!(context.hit_counted, Some(true));
        assert_eq!(context.hit_message.as_deref(), Some("Hit counted: session key"));
        assert_eq!(context.total_hits, 1);

        let context = CountingView
            .hit_count_context(&service, &mut second, "7")
            .await
            .unwrap();
        assert_eq!(context.total_hits, 2);

        // Repeat visit from the same session reports the stored total
        let context = CountingView
            .hit_count_context(&service, &mut second, "7")
            .await
            .unwrap();
        assert_eq!(context.hit_counted, Some(false));
        assert_eq!(context.total_hits, 2);
    }

    #[tokio::test]
    async fn views_share_the_counter_for_the_same_object() {
        let service = service().await;
        let mut visit = visit();

        let counted = CountingView
            .hit_count_context(&service, &mut visit, "7")
            .await
            .unwrap();
        let passive = PassiveView
            .hit_count_context(&service, &mut visit, "7")
            .await
            .unwrap();

        assert_eq!(counted.pk, passive.pk);
        assert_eq!(passive.total_hits, 1);
    }
}
