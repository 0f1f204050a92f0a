//! Pure text scanners shared by the analyzers and the resolver.

mod urls;

pub use urls::{
    extract_iframe_candidates, extract_m3u8_source, extract_video_urls, guess_provider,
    normalize_url, IframeCandidate, VideoUrls, MEDIA_SUFFIXES,
};
