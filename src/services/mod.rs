pub mod aggregator;
pub mod commentary;
pub mod feeds;
pub mod normalizer;
pub mod poller;
pub mod upstream;

pub use feeds::FeedKind;
pub use poller::{FeedState, Poller, PollerHandle};
pub use upstream::{CommentarySource, FetchError, UpstreamClient};
