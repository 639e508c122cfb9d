//! Services for plexkw-labeler

pub mod health_checker;
pub mod imdb_client;
pub mod keyword_cache;
pub mod plex_client;
pub mod rate_window;

pub use health_checker::{HealthChecker, HealthReport, ServiceHealth, ServiceStatus};
pub use imdb_client::{extract_keywords, ImdbClient, KeywordExtractError, KeywordSource};
pub use keyword_cache::{KeywordCache, LruKeywordCache};
pub use plex_client::{LabelSink, PlexClient, PlexProbeError};
pub use rate_window::{RateWindow, SlidingRateWindow};
