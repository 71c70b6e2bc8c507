//! Streaming writer for LDIF output.
use std::{
	fs::File,
	io::{BufWriter, Write},
	path::Path,
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use time::OffsetDateTime;

use crate::{
	config::{WriterConfig, GENERALIZED_TIME},
	entry::Value,
	error::Error,
};

/// Encoded lines longer than this are folded onto continuation lines.
const FOLD_WIDTH: usize = 76;

/// Streaming LDIF encoder.
///
/// Values are written plain when 7-bit safe and switched to base64
/// automatically otherwise. Call [`close`](Self::close) to wrap up the last
/// entry and write the optional summary comment; dropping the writer
/// without closing flushes nothing extra.
#[derive(Debug)]
pub struct LdifWriter<W: Write> {
	/// The output stream.
	out: W,
	/// Writer options.
	config: WriterConfig,
	/// Whether an entry has been begun and not yet ended.
	open_entry: bool,
	/// Number of entries begun so far.
	entry_count: u64,
	/// Wall-clock time the first entry was written, for the summary.
	started: Option<OffsetDateTime>,
}

impl LdifWriter<BufWriter<File>> {
	/// Create a writer producing the file at `path`, which is truncated.
	///
	/// # Errors
	/// [`Error::Io`] if the file cannot be created.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
		Ok(Self::new(BufWriter::new(File::create(path)?)))
	}
}

impl<W: Write> LdifWriter<W> {
	/// Create a writer over an existing output stream with default options.
	pub fn new(out: W) -> Self {
		Self::with_config(out, WriterConfig::default())
	}

	/// Create a writer over an existing output stream with explicit
	/// options.
	pub fn with_config(out: W, config: WriterConfig) -> Self {
		LdifWriter { out, config, open_entry: false, entry_count: 0, started: None }
	}

	/// Close out an open entry, if any, and write the DN of the new entry.
	///
	/// # Errors
	/// [`Error::Io`] if writing fails.
	pub fn begin_entry(&mut self, dn: &str) -> Result<(), Error> {
		if self.open_entry {
			self.end_entry()?;
		}
		self.open_entry = true;

		if self.entry_count == 0 {
			self.started = Some(OffsetDateTime::now_utc());
		}
		self.entry_count += 1;

		self.write_attr("dn", dn)
	}

	/// Write a string value, switching to base64 if it is not 7-bit safe.
	///
	/// # Errors
	/// [`Error::State`] if no entry is open, [`Error::Io`] if writing
	/// fails.
	pub fn write_attr(&mut self, name: &str, value: &str) -> Result<(), Error> {
		self.ensure_open()?;
		if is_safe_string(value) {
			self.write_folded(&format!("{name}: {value}"))
		} else {
			self.write_folded(&format!("{name}:: {}", BASE64.encode(value.as_bytes())))
		}
	}

	/// Write a binary value in base64.
	///
	/// # Errors
	/// [`Error::State`] if no entry is open, [`Error::Io`] if writing
	/// fails.
	pub fn write_attr_bytes(&mut self, name: &str, value: &[u8]) -> Result<(), Error> {
		self.ensure_open()?;
		self.write_folded(&format!("{name}:: {}", BASE64.encode(value)))
	}

	/// Write a timestamp in Generalized Time UTC form,
	/// `yyyyMMddHHmmss.0Z`.
	///
	/// # Errors
	/// [`Error::State`] if no entry is open, [`Error::Io`] if writing
	/// fails.
	pub fn write_attr_time(&mut self, name: &str, value: OffsetDateTime) -> Result<(), Error> {
		self.ensure_open()?;
		let stamp = value
			.to_offset(time::UtcOffset::UTC)
			.format(&GENERALIZED_TIME)
			.map_err(|err| Error::Encoding(err.to_string()))?;
		self.write_folded(&format!("{name}: {stamp}"))
	}

	/// Write one [`Value`] in its natural wire form: text with the 7-bit
	/// safety test, binary as base64, URL references with `:<`, timestamps
	/// in Generalized Time.
	///
	/// # Errors
	/// [`Error::State`] if no entry is open, [`Error::Io`] if writing
	/// fails.
	pub fn write_value(&mut self, name: &str, value: &Value) -> Result<(), Error> {
		match value {
			Value::Text(text) => self.write_attr(name, text),
			Value::Binary(bytes) => self.write_attr_bytes(name, bytes),
			Value::Url(url) => {
				self.ensure_open()?;
				self.write_folded(&format!("{name}:< {url}"))
			}
			Value::Time(time) => self.write_attr_time(name, *time),
		}
	}

	/// Write a `#`-notated comment line.
	///
	/// # Errors
	/// [`Error::Io`] if writing fails.
	pub fn write_comment(&mut self, comment: &str) -> Result<(), Error> {
		writeln!(self.out, "# {comment}")?;
		Ok(())
	}

	/// Emit a single hyphen on a line; used between the change blocks of a
	/// `changetype: modify` instruction.
	///
	/// # Errors
	/// [`Error::State`] if no entry is open, [`Error::Io`] if writing
	/// fails.
	pub fn write_change_separator(&mut self) -> Result<(), Error> {
		self.ensure_open()?;
		writeln!(self.out, "-")?;
		Ok(())
	}

	/// Write a complete `changetype: modrdn` instruction. Pass
	/// `new_superior` to also move the entry to a new point in the tree,
	/// or `None` for an RDN change only.
	///
	/// # Errors
	/// [`Error::Io`] if writing fails.
	pub fn mod_rdn(
		&mut self,
		dn: &str,
		new_rdn: &str,
		new_superior: Option<&str>,
	) -> Result<(), Error> {
		self.begin_entry(dn)?;

		self.write_attr("changetype", "modrdn")?;
		self.write_attr("newrdn", new_rdn)?;
		self.write_attr("deleteoldrdn", "1")?;

		if let Some(superior) = new_superior.filter(|s| !s.is_empty()) {
			self.write_attr("newsuperior", superior)?;
		}

		self.end_entry()
	}

	/// Write the blank line that marks the end of the current entry.
	///
	/// # Errors
	/// [`Error::Io`] if writing fails.
	pub fn end_entry(&mut self) -> Result<(), Error> {
		writeln!(self.out)?;
		self.open_entry = false;
		Ok(())
	}

	/// Close out the stream: end any open entry, optionally write the
	/// summary comment, flush, and hand back the underlying stream.
	///
	/// # Errors
	/// [`Error::Io`] if writing or flushing fails.
	pub fn close(mut self) -> Result<W, Error> {
		if self.open_entry {
			self.end_entry()?;
		}

		if self.config.write_summary {
			if let Some(started) = self.started {
				writeln!(
					self.out,
					"# Exported {} entries; started at {started}; ended at {}",
					self.entry_count,
					OffsetDateTime::now_utc(),
				)?;
			}
		}

		self.out.flush()?;
		Ok(self.out)
	}

	/// Give back the underlying stream without ending the current entry or
	/// writing a summary.
	pub fn into_inner(self) -> W {
		self.out
	}

	/// Writing attribute data requires an open entry.
	fn ensure_open(&self) -> Result<(), Error> {
		if self.open_entry {
			Ok(())
		} else {
			Err(Error::State("no open entry".to_owned()))
		}
	}

	/// Write an encoded line, folding at [`FOLD_WIDTH`] characters with a
	/// single leading space marking each continuation.
	fn write_folded(&mut self, value: &str) -> Result<(), Error> {
		if value.len() <= FOLD_WIDTH {
			writeln!(self.out, "{value}")?;
			return Ok(());
		}

		let mut rest = value;
		let mut first = true;
		while !rest.is_empty() {
			if !first {
				self.out.write_all(b" ")?;
			}
			first = false;

			let mut take = rest.len().min(FOLD_WIDTH);
			// Never split a multibyte character across a fold.
			while !rest.is_char_boundary(take) {
				take -= 1;
			}
			writeln!(self.out, "{}", &rest[..take])?;
			rest = &rest[take..];
		}
		Ok(())
	}
}

/// Any value <= 127 except NUL, LF, CR, SPACE, colon and less-than is safe
/// as the first character of a plain value.
fn is_safe_init_char(c: char) -> bool {
	!matches!(c, '\0' | '\n' | '\r' | ' ' | ':' | '<') && (c as u32) <= 127
}

/// 7-bit safety test per RFC 2849. The empty string is trivially safe.
fn is_safe_string(value: &str) -> bool {
	let Some(first) = value.chars().next() else {
		return true;
	};
	if !is_safe_init_char(first) {
		return false;
	}
	value.chars().all(|c| (c as u32) <= 127 && !matches!(c, '\0' | '\n' | '\r'))
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use time::macros::datetime;

	use super::LdifWriter;
	use crate::{config::WriterConfig, entry::Value, error::Error};

	/// Run `write` against an in-memory writer and return the output text.
	fn output(write: impl FnOnce(&mut LdifWriter<Vec<u8>>)) -> String {
		let mut writer =
			LdifWriter::with_config(Vec::new(), WriterConfig { write_summary: false });
		write(&mut writer);
		String::from_utf8(writer.close().unwrap()).unwrap()
	}

	#[test]
	fn plain_safe_value() {
		let out = output(|w| {
			w.begin_entry("dc=com").unwrap();
			w.write_attr("cn", "Joe Blow").unwrap();
		});
		assert_eq!(out, "dn: dc=com\ncn: Joe Blow\n\n");
	}

	#[test]
	fn unsafe_values_switch_to_base64() {
		for value in [" leading space", ":leading colon", "<leading lt", "emb\nedded", "smörgås"]
		{
			let out = output(|w| {
				w.begin_entry("dc=com").unwrap();
				w.write_attr("cn", value).unwrap();
			});
			assert!(
				out.contains("cn:: "),
				"{value:?} should have been base64-encoded, got {out}"
			);
		}
	}

	#[test]
	fn plain_seven_bit_value_stays_plain() {
		let out = output(|w| {
			w.begin_entry("dc=com").unwrap();
			w.write_attr("cn", "inner: colon and < are fine").unwrap();
		});
		assert!(out.contains("cn: inner: colon and < are fine\n"));
	}

	#[test]
	fn binary_is_always_base64() {
		let out = output(|w| {
			w.begin_entry("dc=com").unwrap();
			w.write_attr_bytes("data", b"ok").unwrap();
		});
		assert!(out.contains("data:: b2s=\n"));
	}

	#[test]
	fn timestamps_use_generalized_time() {
		let out = output(|w| {
			w.begin_entry("dc=com").unwrap();
			w.write_attr_time("whencreated", datetime!(2013-05-16 20:05:20 UTC)).unwrap();
		});
		assert!(out.contains("whencreated: 20130516200520.0Z\n"), "got {out}");
	}

	#[test]
	fn url_values_use_the_reference_form() {
		let out = output(|w| {
			w.begin_entry("dc=com").unwrap();
			let url = url::Url::parse("file:///tmp/x.jpg").unwrap();
			w.write_value("jpegphoto", &Value::Url(url)).unwrap();
		});
		assert!(out.contains("jpegphoto:< file:///tmp/x.jpg\n"), "got {out}");
	}

	#[test]
	fn long_lines_fold_at_76_characters() {
		let value = "x".repeat(200);
		let out = output(|w| {
			w.begin_entry("dc=com").unwrap();
			w.write_attr("description", &value).unwrap();
		});

		let lines: Vec<&str> = out.lines().collect();
		// "description: " plus 200 chars is 213; 76 + 76 + 61.
		assert_eq!(lines[1].len(), 76);
		assert_eq!(lines[2].len(), 77, "Continuations carry a leading space");
		assert!(lines[2].starts_with(' '));
		assert_eq!(lines[3].len(), 62);
		assert!(lines[3].starts_with(' '));

		let reassembled: String = lines[1..4]
			.iter()
			.enumerate()
			.map(|(i, line)| if i == 0 { *line } else { &line[1..] })
			.collect();
		assert_eq!(reassembled, format!("description: {value}"));
	}

	#[test]
	fn short_lines_are_not_folded() {
		let out = output(|w| {
			w.begin_entry("dc=com").unwrap();
			w.write_attr("description", &"x".repeat(63)).unwrap();
		});
		assert_eq!(out.lines().nth(1).unwrap().len(), 76, "63 chars plus prefix fit exactly");
		assert_eq!(out.lines().count(), 2);
	}

	#[test]
	fn begin_entry_closes_the_previous_entry() {
		let out = output(|w| {
			w.begin_entry("dc=com").unwrap();
			w.begin_entry("dc=org").unwrap();
		});
		assert_eq!(out, "dn: dc=com\n\ndn: dc=org\n\n");
	}

	#[test]
	fn attribute_without_entry_fails() {
		let mut writer = LdifWriter::new(Vec::new());
		assert!(matches!(writer.write_attr("cn", "x"), Err(Error::State(_))));
		assert!(matches!(writer.write_change_separator(), Err(Error::State(_))));
	}

	#[test]
	fn mod_rdn_writes_a_changetype_block() {
		let out = output(|w| {
			w.mod_rdn("uid=joe,ou=users,dc=com", "uid=joseph", Some("ou=admins,dc=com"))
				.unwrap();
		});
		assert_eq!(
			out,
			"dn: uid=joe,ou=users,dc=com\n\
			 changetype: modrdn\n\
			 newrdn: uid=joseph\n\
			 deleteoldrdn: 1\n\
			 newsuperior: ou=admins,dc=com\n\n",
		);
	}

	#[test]
	fn mod_rdn_without_superior() {
		let out = output(|w| {
			w.mod_rdn("uid=joe,dc=com", "uid=joseph", None).unwrap();
		});
		assert!(!out.contains("newsuperior"));
	}

	#[test]
	fn summary_comment_is_written_when_enabled() {
		let mut writer = LdifWriter::new(Vec::new());
		writer.begin_entry("dc=com").unwrap();
		let out = String::from_utf8(writer.close().unwrap()).unwrap();
		assert!(out.contains("# Exported 1 entries"), "got {out}");
	}

	#[test]
	fn summary_is_skipped_with_no_entries() {
		let writer = LdifWriter::new(Vec::new());
		let out = String::from_utf8(writer.close().unwrap()).unwrap();
		assert!(out.is_empty(), "No entries means no summary, got {out}");
	}

	#[test]
	fn empty_value_is_written_plain() {
		let out = output(|w| {
			w.begin_entry("dc=com").unwrap();
			w.write_attr("seealso", "").unwrap();
		});
		assert!(out.contains("seealso: \n"));
	}
}
