use anyhow::Result;
use tracing::warn;

use super::decision::HitCountResponse;
use super::service::HitCountService;
use crate::models::HitCounter;
use crate::request::Visit;

#[deprecated(since = "0.1.0", note = "use `HitCountService::hit_count` instead")]
pub async fn update_hit_count(
    service: &HitCountService,
    visit: &mut Visit,
    counter: &HitCounter,
) -> Result<HitCountResponse> {
    warn!("update_hit_count is deprecated, use HitCountService::hit_count instead");
    service.hit_count(visit, counter).await
}
