//! Constants shared by the bkctl crates

// Frontend attributes
pub const REQUEST_ID_ATTR: &str = "requestid";
pub const FRONTEND_CAPS_ATTR: &str = "frontend.caps";
pub const NO_CACHE_ATTR: &str = "no-cache";

// Capability declared on behalf of sub-requests that did not name one
pub const SUBREQUESTS_CAP: &str = "moby.buildkit.frontend.subrequests";

// Sub-request metadata keys
pub const RESULT_KEY_PREFIX: &str = "result.";
pub const RESULT_TXT_KEY: &str = "result.txt";

// Client name reported to the engine
pub const DEFAULT_CLIENT_NAME: &str = "bkctl";
