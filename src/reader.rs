//! Event-driven streaming reader for LDIF content.
//!
//! [`LdifReader`] is a low-overhead, pull-based reader that turns physical
//! text lines into a sequence of [`LdifEvent`]s. Use
//! [`LdifEntryReader`](crate::entry_reader::LdifEntryReader) for a more
//! traditional, whole-entry reader on top of it.
use std::{
	fs::File,
	io::{BufRead, BufReader},
	path::Path,
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use url::Url;

use crate::{config::ReaderConfig, entry::Value, error::Error};

/// The state of the entire LDIF; mixing "full entry" and "changetype"
/// content in one stream is a format error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LdifType {
	/// No attribute or changetype line has been classified yet.
	Unknown,
	/// A plain dump of full entries.
	Normal,
	/// A script of `changetype:` instructions.
	Changetype,
}

/// The change kind declared by a `changetype:` line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeType {
	/// `changetype: add`
	Add,
	/// `changetype: modify`
	Modify,
	/// `changetype: delete`
	Delete,
	/// `changetype: modrdn` (or its synonym `moddn`)
	ModRdn,
}

/// Reserved operation keywords recognized in value position within a
/// changetype stream, captured as structure rather than forwarded as
/// attribute values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeDirective {
	/// `add`
	Add,
	/// `replace`
	Replace,
	/// `delete`
	Delete,
	/// `newrdn`
	NewRdn,
	/// `deleteoldrdn`
	DeleteOldRdn,
	/// `newsuperior`
	NewSuperior,
}

impl ChangeDirective {
	/// Map a reserved keyword to its directive, or `None` for ordinary
	/// values.
	fn from_keyword(keyword: &str) -> Option<Self> {
		match keyword {
			"add" => Some(ChangeDirective::Add),
			"replace" => Some(ChangeDirective::Replace),
			"delete" => Some(ChangeDirective::Delete),
			"newrdn" => Some(ChangeDirective::NewRdn),
			"deleteoldrdn" => Some(ChangeDirective::DeleteOldRdn),
			"newsuperior" => Some(ChangeDirective::NewSuperior),
			_ => None,
		}
	}
}

/// A structural event produced while reading LDIF.
#[derive(Clone, Debug, PartialEq)]
pub enum LdifEvent {
	/// A `dn:` line opened a new entry.
	BeginEntry(String),
	/// One complete attribute value, reassembled across any folded lines
	/// and decoded from its base64 or URL form.
	Attribute {
		/// The attribute name, case preserved.
		name: String,
		/// The decoded value.
		value: Value,
	},
	/// The entry's `changetype:` declaration.
	ChangeType(ChangeType),
	/// A reserved operation keyword seen in value position.
	Directive(ChangeDirective),
	/// A bare `-` line separating change blocks.
	EndChangeGroup,
	/// A blank line closed the entry with the given DN.
	EndEntry(String),
}

/// What the previous significant line was; `changetype:` is only legal
/// immediately after `dn:`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LastLine {
	/// Nothing read yet, or an entry was just closed.
	None,
	/// A `dn:` line.
	Dn,
	/// An ordinary attribute line.
	Attribute,
	/// Preamble such as a leading `version: 1` marker.
	Other,
}

/// Streaming LDIF decoder.
///
/// Drive it with [`next_event`](Self::next_event), or use the [`Iterator`]
/// impl. Events are delivered strictly in input order. Any grammar
/// violation yields [`Error::Format`] with the logical line number; the
/// reader must then be discarded, as no recovery is attempted.
#[derive(Debug)]
pub struct LdifReader<R> {
	/// The underlying line source.
	source: R,
	/// Reader options.
	config: ReaderConfig,
	/// A physical line read ahead of the fold-continuation check.
	peeked: Option<String>,
	/// Logical line number of the line being processed, 1-based.
	line_num: u64,
	/// Physical line counter, including fold continuations.
	end_line_num: u64,
	/// Whether a `dn:` line is open without a terminating blank line.
	open_entry: bool,
	/// DN of the most recently opened entry.
	last_dn: String,
	/// Classification of the previous significant line.
	last: LastLine,
	/// Whether the stream is normal or changetype content.
	ldif_type: LdifType,
	/// The open entry's change kind, if declared.
	change_type: Option<ChangeType>,
	/// The most recent operation directive, if any.
	directive: Option<ChangeDirective>,
}

impl LdifReader<BufReader<File>> {
	/// Open the LDIF file at `path` for reading. The file is owned by the
	/// reader and closed when it is dropped.
	///
	/// # Errors
	/// [`Error::Io`] if the file cannot be opened.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
		Ok(Self::new(BufReader::new(File::open(path)?)))
	}
}

impl<R: BufRead> LdifReader<R> {
	/// Read from an already-open source with default options. A
	/// caller-supplied source is returned by [`into_inner`](Self::into_inner)
	/// rather than closed.
	pub fn new(source: R) -> Self {
		Self::with_config(source, ReaderConfig::default())
	}

	/// Read from an already-open source with explicit options.
	pub fn with_config(source: R, config: ReaderConfig) -> Self {
		LdifReader {
			source,
			config,
			peeked: None,
			line_num: 0,
			end_line_num: 0,
			open_entry: false,
			last_dn: String::new(),
			last: LastLine::None,
			ldif_type: LdifType::Unknown,
			change_type: None,
			directive: None,
		}
	}

	/// Give back the underlying source.
	pub fn into_inner(self) -> R {
		self.source
	}

	/// Whether the stream has been classified as normal or changetype
	/// content.
	#[must_use]
	pub fn ldif_type(&self) -> LdifType {
		self.ldif_type
	}

	/// The change kind of the entry currently being read, if declared.
	#[must_use]
	pub fn entry_change_type(&self) -> Option<ChangeType> {
		self.change_type
	}

	/// The most recent attribute operation directive.
	#[must_use]
	pub fn last_directive(&self) -> Option<ChangeDirective> {
		self.directive
	}

	/// The DN of an entry left open at end of input, if any. The reader
	/// never synthesizes an [`LdifEvent::EndEntry`] for it; callers that
	/// need one must flush explicitly.
	#[must_use]
	pub fn open_dn(&self) -> Option<&str> {
		self.open_entry.then_some(self.last_dn.as_str())
	}

	/// Produce the next event, or `None` at end of input.
	///
	/// # Errors
	/// [`Error::Format`] on any malformed line, [`Error::Io`] if the
	/// source fails.
	pub fn next_event(&mut self) -> Result<Option<LdifEvent>, Error> {
		loop {
			let Some(line) = self.read_logical_line()? else {
				return Ok(None);
			};

			if line.starts_with('#') {
				// Comment; does not disturb any parser state.
				continue;
			}

			if line.is_empty() {
				if self.open_entry {
					self.open_entry = false;
					self.last = LastLine::None;
					return Ok(Some(LdifEvent::EndEntry(self.last_dn.clone())));
				}
				continue;
			}

			if !self.open_entry && !has_prefix_ignore_case(&line, "dn:") {
				// Preamble, such as a leading `version: 1` marker.
				self.last = LastLine::Other;
				continue;
			}

			return self.dispatch_line(&line).map(Some);
		}
	}

	/// Classify one non-blank, non-comment logical line into an event.
	fn dispatch_line(&mut self, line: &str) -> Result<LdifEvent, Error> {
		if has_prefix_ignore_case(line, "dn:") {
			self.open_entry = true;
			self.last = LastLine::Dn;
			self.change_type = None;
			self.directive = None;
			self.last_dn = self.parse_value(&line[3..])?.to_string();
			return Ok(LdifEvent::BeginEntry(self.last_dn.clone()));
		}

		if has_prefix_ignore_case(line, "changetype:") {
			return self.dispatch_changetype(&line[11..]).map(LdifEvent::ChangeType);
		}

		if line == "-" {
			if self.ldif_type != LdifType::Changetype {
				return Err(self.format_error("'-' separator outside changetype content"));
			}
			return Ok(LdifEvent::EndChangeGroup);
		}

		let Some(colon) = line.find(':') else {
			return Err(self.format_error("no attribute separator"));
		};
		let name = &line[..colon];
		let value = self.parse_value(&line[colon + 1..])?;

		if self.ldif_type == LdifType::Changetype {
			if let Some(directive) = value.as_text().and_then(ChangeDirective::from_keyword) {
				self.directive = Some(directive);
				return Ok(LdifEvent::Directive(directive));
			}
		}

		if self.ldif_type == LdifType::Unknown {
			self.ldif_type = LdifType::Normal;
		}
		self.last = LastLine::Attribute;
		Ok(LdifEvent::Attribute { name: name.to_owned(), value })
	}

	/// Handle a `changetype:` line, locking the stream into changetype
	/// mode.
	fn dispatch_changetype(&mut self, raw: &str) -> Result<ChangeType, Error> {
		if self.last != LastLine::Dn {
			return Err(self.format_error("changetype must follow dn"));
		}

		match self.ldif_type {
			LdifType::Unknown => self.ldif_type = LdifType::Changetype,
			LdifType::Normal => {
				return Err(self.format_error("cannot mix changetype and normal content"));
			}
			LdifType::Changetype => {}
		}

		let keyword = self.parse_value(raw)?;
		let change_type = match keyword.as_text() {
			Some("add") => ChangeType::Add,
			Some("delete") => ChangeType::Delete,
			Some("moddn" | "modrdn") => ChangeType::ModRdn,
			Some("modify") => ChangeType::Modify,
			_ => {
				return Err(self.format_error(&format!("unknown changetype {keyword}")));
			}
		};
		self.change_type = Some(change_type);
		Ok(change_type)
	}

	/// Decode the text after an attribute line's first colon into a value.
	///
	/// A second colon marks base64; decoded payloads that begin with `<`
	/// are URL references, and the rest are text when valid UTF-8, binary
	/// otherwise. A `<` marks a plain URL reference. Anything else is
	/// plain text with at most one leading space trimmed.
	fn parse_value(&self, raw: &str) -> Result<Value, Error> {
		if raw.trim().is_empty() {
			return Ok(Value::Text(String::new()));
		}

		if let Some(encoded) = raw.strip_prefix(':') {
			let bytes = BASE64
				.decode(encoded.trim())
				.map_err(|err| self.format_error(&format!("invalid base64 value: {err}")))?;
			if let Some(reference) = bytes.strip_prefix(b"<") {
				let reference = std::str::from_utf8(reference)
					.map_err(|_| self.format_error("URL reference is not valid UTF-8"))?;
				return self.parse_url(reference);
			}
			return Ok(match String::from_utf8(bytes) {
				Ok(text) => Value::Text(text),
				Err(err) => Value::Binary(err.into_bytes()),
			});
		}

		if let Some(reference) = raw.strip_prefix('<') {
			return self.parse_url(reference);
		}

		let text = raw.strip_prefix(' ').unwrap_or(raw);
		Ok(Value::Text(text.to_owned()))
	}

	/// Parse a URL reference value.
	fn parse_url(&self, reference: &str) -> Result<Value, Error> {
		Url::parse(reference.trim())
			.map(Value::Url)
			.map_err(|err| self.format_error(&format!("invalid URL reference: {err}")))
	}

	/// Build a format error at the current logical line.
	fn format_error(&self, reason: &str) -> Error {
		Error::Format { line: self.line_num, reason: reason.to_owned() }
	}

	/// Assemble one logical line: a physical line plus every immediately
	/// following line that begins with a space, each continuation's leading
	/// space stripped.
	fn read_logical_line(&mut self) -> Result<Option<String>, Error> {
		self.line_num = self.end_line_num + 1;

		let Some(mut line) = self.read_physical_line()? else {
			return Ok(None);
		};
		self.end_line_num += 1;

		if !line.is_empty() {
			loop {
				match self.read_physical_line()? {
					Some(next) if next.starts_with(' ') => {
						self.end_line_num += 1;
						let mut extra = &next[1..];
						if self.config.trim_folded_lines {
							extra = extra.trim_start_matches(' ');
						}
						line.push_str(extra);
					}
					Some(next) => {
						self.peeked = Some(next);
						break;
					}
					None => break,
				}
			}
		}
		Ok(Some(line))
	}

	/// Read one physical line, without its line terminator.
	fn read_physical_line(&mut self) -> Result<Option<String>, Error> {
		if let Some(line) = self.peeked.take() {
			return Ok(Some(line));
		}
		let mut line = String::new();
		if self.source.read_line(&mut line)? == 0 {
			return Ok(None);
		}
		while line.ends_with('\n') || line.ends_with('\r') {
			line.pop();
		}
		Ok(Some(line))
	}
}

impl<R: BufRead> Iterator for LdifReader<R> {
	type Item = Result<LdifEvent, Error>;

	fn next(&mut self) -> Option<Self::Item> {
		self.next_event().transpose()
	}
}

/// ASCII-case-insensitive prefix test that is safe on any byte boundary.
fn has_prefix_ignore_case(line: &str, prefix: &str) -> bool {
	line.len() >= prefix.len()
		&& line.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
