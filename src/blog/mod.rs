//! Demo content: blog posts whose detail views carry hit counts.

pub mod views;

pub use views::{PostCountHitDetailView, PostDetailContext, PostDetailView};
