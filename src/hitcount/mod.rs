//! Hit counting: the eligibility evaluator and the capability views use to
//! attach hit counts to their render context.

pub mod decision;
pub mod deprecated;
pub mod mixin;
pub mod service;

pub use decision::{HitCountResponse, HitDecision};
pub use mixin::{HitCountContext, HitCounting};
pub use service::HitCountService;
