pub mod fake_router;

pub mod fixtures;

pub use fake_router::{FakeRouter, RouterScript, Seen};
