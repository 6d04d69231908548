//! Platform separators used in `hg` templates and their output.

/// Line separator the platform's `hg` writes between template lines.
#[cfg(windows)]
pub const LINE_SEP: &str = "\r\n";

/// Line separator the platform's `hg` writes between template lines.
#[cfg(not(windows))]
pub const LINE_SEP: &str = "\n";

/// Separator placed between file names in the detail template.
#[cfg(windows)]
pub const PATH_SEP: char = ';';

/// Separator placed between file names in the detail template.
#[cfg(not(windows))]
pub const PATH_SEP: char = ':';
