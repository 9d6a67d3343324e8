// Home feed engine: page accumulation, explore ranking, refresh arbitration.
// The controller task is the only writer of feed state; everything else talks
// to it through `FeedHandle`.

pub mod controller;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod ranker;
pub mod stream;

pub use controller::{FeedController, FeedHandle, FeedSettings};
