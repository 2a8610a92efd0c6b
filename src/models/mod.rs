pub mod hit;
pub mod post;

pub use hit::{Hit, HitCounter, NewHit};
pub use post::Post;
