pub mod error;
pub mod fetchers;
pub mod readability;

pub use error::{ArchiveError, Result};
pub use fetchers::aggressive::AggressiveFetcher;
pub use fetchers::mirror::{mirror_urls, Mirror, MirrorFetcher, MirrorKind};
pub use fetchers::news::NewsFeedSearch;
pub use fetchers::page::{ChromeRenderer, RenderedFetcher, StaticFetcher};
pub use fetchers::search::{SearxngSearch, SerperSearch};
