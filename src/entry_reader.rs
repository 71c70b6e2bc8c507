//! Whole-entry reading on top of the streaming reader.
use std::io::BufRead;

use crate::{
	entry::Entry,
	error::Error,
	reader::{LdifEvent, LdifReader},
};

/// A pull-style reader that assembles one [`Entry`] per begin/end pair,
/// for callers that prefer whole entries over individual events.
///
/// Attribute values are appended in arrival order. The reader is driven
/// until the underlying stream is exhausted; it cannot seek or rewind. An
/// entry left unterminated at end of input is flushed as the final entry.
#[derive(Debug)]
pub struct LdifEntryReader<R> {
	/// The event source.
	ldif: LdifReader<R>,
	/// The entry currently being assembled.
	work: Option<Entry>,
}

impl<R: BufRead> LdifEntryReader<R> {
	/// Wrap a streaming reader.
	pub fn new(ldif: LdifReader<R>) -> Self {
		LdifEntryReader { ldif, work: None }
	}

	/// Read the next complete entry, or `None` once the input is
	/// exhausted.
	///
	/// # Errors
	/// Any error of the underlying [`LdifReader`].
	pub fn read_entry(&mut self) -> Result<Option<Entry>, Error> {
		while let Some(event) = self.ldif.next_event()? {
			match event {
				LdifEvent::BeginEntry(dn) => {
					self.work = Some(Entry::new(dn));
				}
				LdifEvent::Attribute { name, value } => {
					if let Some(entry) = &mut self.work {
						entry.add_attr_value(&name, value);
					}
				}
				LdifEvent::EndEntry(_) => {
					if let Some(entry) = self.work.take() {
						return Ok(Some(entry));
					}
				}
				// Changetype structure does not affect entry assembly.
				_ => {}
			}
		}
		Ok(self.work.take())
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use super::LdifEntryReader;
	use crate::{entry::Value, reader::LdifReader};

	#[test]
	fn reads_whole_entries_in_order() {
		let input = "dn: dc=com\ndc: com\n\ndn: dc=org\ndc: org\n\n";
		let mut reader = LdifEntryReader::new(LdifReader::new(input.as_bytes()));

		let first = reader.read_entry().unwrap().unwrap();
		assert_eq!(first.dn(), "dc=com");
		assert_eq!(first.attr("dc").unwrap().values, vec![Value::from("com")]);

		let second = reader.read_entry().unwrap().unwrap();
		assert_eq!(second.dn(), "dc=org");

		assert!(reader.read_entry().unwrap().is_none(), "The stream should be exhausted");
	}

	#[test]
	fn multivalued_attributes_keep_arrival_order() {
		let input = "dn: dc=com\nmember: a\nmember: c\nmember: b\n\n";
		let mut reader = LdifEntryReader::new(LdifReader::new(input.as_bytes()));

		let entry = reader.read_entry().unwrap().unwrap();
		assert_eq!(
			entry.attr_string_values("member").unwrap(),
			["a", "c", "b"],
			"Values should keep the order they arrived in"
		);
	}

	#[test]
	fn unterminated_final_entry_is_flushed() {
		let input = "dn: dc=com\ndc: com\n";
		let mut reader = LdifEntryReader::new(LdifReader::new(input.as_bytes()));

		let entry = reader.read_entry().unwrap().unwrap();
		assert_eq!(entry.dn(), "dc=com");
		assert!(reader.read_entry().unwrap().is_none());
	}
}
