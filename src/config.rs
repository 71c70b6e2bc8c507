//! Config for the LDIF reader and writer.
use serde::{Deserialize, Serialize};

/// Format description for LDAP Generalized Time attribute values as written
/// to LDIF, configured according to the syntax definition
/// `( 1.3.6.1.4.1.1466.115.121.1.24 DESC 'Generalized Time' )` described in
/// RFC4517 section 3.1.13, with the fixed `.0` fraction directories emit.
pub const GENERALIZED_TIME: &[time::format_description::FormatItem] =
	time::macros::format_description!("[year][month][day][hour][minute][second].0Z");

/// Options for [`LdifReader`](crate::reader::LdifReader).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ReaderConfig {
	/// Some LDIF producers use more than one space on folded lines. When
	/// set, *all* initial whitespace on each folded line is eliminated.
	/// Note that exactly one space is correct per RFC 2849.
	#[serde(default)]
	pub trim_folded_lines: bool,
}

/// Options for [`LdifWriter`](crate::writer::LdifWriter).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WriterConfig {
	/// Whether to append a `#`-prefixed summary of entry count and
	/// start/finish times when the writer is closed. Enabled by default;
	/// the summary is cosmetic and safely ignored by any reader.
	pub write_summary: bool,
}

impl Default for WriterConfig {
	fn default() -> Self {
		WriterConfig { write_summary: true }
	}
}
