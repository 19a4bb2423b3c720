use const_format::formatcp;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_SHA: &str = env!("VERGEN_GIT_SHA");
pub const BUILD_DATE: &str = env!("VERGEN_BUILD_DATE");

/// clap の `--version` とログに使うバージョン文字列。
pub const SHORT_VERSION: &str = formatcp!("{VERSION} ({GIT_SHA} {BUILD_DATE})");

/// LINE / Google API へのリクエストに付ける User-Agent。
pub const USER_AGENT: &str = formatcp!("kamidash/{VERSION}");
