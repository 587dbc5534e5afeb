/// Maximum length (in characters) of a page title or infobox type
pub const MAX_FIELD_CHARS: usize = 1024;

/// Tags (templates, categories, general heads) must be shorter than this
pub const MAX_TAG_CHARS: usize = 256;

/// Flush the sink every N pages
pub const COMMIT_INTERVAL: u64 = 100_000;

/// Progress update interval (tick every N pages)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Template/link nesting beyond this depth is treated as a parse failure
pub const MAX_NESTING_DEPTH: usize = 64;

/// Language used for entity titles, descriptions and the `<lang>wiki` sitelink
pub const DEFAULT_LANGUAGE: &str = "en";

/// Bump when the label cache layout changes
pub const CACHE_VERSION: u32 = 1;

/// Bump when the checkpoint layout changes
pub const CHECKPOINT_VERSION: u32 = 1;

/// Prefix marking an infobox template (after normalization)
pub const INFOBOX_PREFIX: &str = "infobox ";

/// Wikilink target prefix marking a category membership
pub const CATEGORY_PREFIX: &str = "Category:";
