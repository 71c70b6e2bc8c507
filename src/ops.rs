//! Directory operations and the connector boundary they are submitted to.
//!
//! The toolkit only ever *constructs* operations; carrying them out against
//! a live directory is the business of whatever implements
//! [`DirectoryConnector`], usually a thin wrapper around an `ldap3`
//! connection, or [`LdifConnector`] when the target is a changetype LDIF
//! script instead of a server.
use std::{collections::HashSet, io::Write};

use ldap3::Mod;

use crate::{
	entry::{Attr, Value},
	error::Error,
	writer::LdifWriter,
};

/// The kind of a pending attribute modification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModOp {
	/// Add the values to the attribute.
	Add,
	/// Replace the attribute's values wholesale; no values means removal.
	Replace,
	/// Delete the specific values from the attribute.
	Delete,
}

/// One pending modification of one attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Modification {
	/// Case-folded attribute name.
	pub name: String,
	/// What to do with the values.
	pub op: ModOp,
	/// The values, in the order they were queued.
	pub values: Vec<Value>,
}

impl Modification {
	/// Convert into the `ldap3` modification form for submission over a
	/// real connection. URL references are passed on as their text; value
	/// order is not preserved, as the protocol form is a set.
	///
	/// # Errors
	/// [`Error::Encoding`] for value kinds with no protocol form.
	pub fn to_ldap3_mod(&self) -> Result<Mod<Vec<u8>>, Error> {
		let values = self.values.iter().map(value_bytes).collect::<Result<HashSet<_>, _>>()?;
		let name = self.name.clone().into_bytes();
		Ok(match self.op {
			ModOp::Add => Mod::Add(name, values),
			ModOp::Replace => Mod::Replace(name, values),
			ModOp::Delete => Mod::Delete(name, values),
		})
	}
}

/// The protocol byte form of one value.
fn value_bytes(value: &Value) -> Result<Vec<u8>, Error> {
	match value {
		Value::Text(text) => Ok(text.clone().into_bytes()),
		Value::Binary(bytes) => Ok(bytes.clone()),
		Value::Url(url) => Ok(url.as_str().as_bytes().to_vec()),
		Value::Time(_) => Err(Error::Encoding(
			"timestamp values have no protocol form; format them as text first".to_owned(),
		)),
	}
}

/// One directory operation, as produced by committing a
/// [`MutableEntry`](crate::changes::MutableEntry).
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
	/// Create a new entry with the given attributes.
	AddEntry {
		/// DN of the entry to create.
		dn: String,
		/// Its initial attributes.
		attributes: Vec<Attr>,
	},
	/// Apply attribute modifications to an existing entry.
	ModifyEntry {
		/// DN of the entry to modify.
		dn: String,
		/// The modifications, in the order they were queued.
		modifications: Vec<Modification>,
	},
	/// Rename and/or move an existing entry.
	RenameEntry {
		/// DN of the entry before the rename.
		dn: String,
		/// The new RDN.
		new_rdn: String,
		/// Whether the old RDN value is removed from the entry.
		delete_old_rdn: bool,
		/// New parent DN, when the entry is also being moved.
		new_superior: Option<String>,
	},
	/// Remove an entry.
	DeleteEntry {
		/// DN of the entry to remove.
		dn: String,
	},
}

impl Operation {
	/// The DN the operation targets.
	#[must_use]
	pub fn dn(&self) -> &str {
		match self {
			Operation::AddEntry { dn, .. }
			| Operation::ModifyEntry { dn, .. }
			| Operation::RenameEntry { dn, .. }
			| Operation::DeleteEntry { dn } => dn,
		}
	}
}

/// Something that can carry directory operations out.
///
/// Implementations decide what "carrying out" means: sending requests over
/// an LDAP connection, writing a migration script, or recording them for a
/// test. Submission order matters and implementations must apply
/// operations in the order received.
pub trait DirectoryConnector {
	/// Apply one operation.
	///
	/// # Errors
	/// Any error the backing medium reports; a failed submit leaves the
	/// originating entry's pending state intact so it can be retried.
	fn submit(&mut self, operation: Operation) -> Result<(), Error>;
}

/// A connector that renders every submitted operation as changetype LDIF,
/// producing a replayable migration script instead of touching a server.
#[derive(Debug)]
pub struct LdifConnector<W: Write> {
	/// The writer the script is rendered to.
	writer: LdifWriter<W>,
}

impl<W: Write> LdifConnector<W> {
	/// Render operations through the given writer.
	pub fn new(writer: LdifWriter<W>) -> Self {
		LdifConnector { writer }
	}

	/// Give back the underlying writer, e.g. to close it.
	pub fn into_writer(self) -> LdifWriter<W> {
		self.writer
	}
}

impl<W: Write> DirectoryConnector for LdifConnector<W> {
	fn submit(&mut self, operation: Operation) -> Result<(), Error> {
		match operation {
			Operation::AddEntry { dn, attributes } => {
				self.writer.begin_entry(&dn)?;
				self.writer.write_attr("changetype", "add")?;
				for attr in &attributes {
					for value in &attr.values {
						self.writer.write_value(&attr.name, value)?;
					}
				}
				self.writer.end_entry()
			}
			Operation::ModifyEntry { dn, modifications } => {
				self.writer.begin_entry(&dn)?;
				self.writer.write_attr("changetype", "modify")?;
				for modification in &modifications {
					let verb = match modification.op {
						ModOp::Add => "add",
						ModOp::Replace => "replace",
						ModOp::Delete => "delete",
					};
					self.writer.write_attr(verb, &modification.name)?;
					for value in &modification.values {
						self.writer.write_value(&modification.name, value)?;
					}
					self.writer.write_change_separator()?;
				}
				self.writer.end_entry()
			}
			Operation::RenameEntry { dn, new_rdn, delete_old_rdn, new_superior } => {
				self.writer.begin_entry(&dn)?;
				self.writer.write_attr("changetype", "modrdn")?;
				self.writer.write_attr("newrdn", &new_rdn)?;
				self.writer
					.write_attr("deleteoldrdn", if delete_old_rdn { "1" } else { "0" })?;
				if let Some(superior) = &new_superior {
					self.writer.write_attr("newsuperior", superior)?;
				}
				self.writer.end_entry()
			}
			Operation::DeleteEntry { dn } => {
				self.writer.begin_entry(&dn)?;
				self.writer.write_attr("changetype", "delete")?;
				self.writer.end_entry()
			}
		}
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use std::collections::HashSet;

	use ldap3::Mod;

	use super::{DirectoryConnector, LdifConnector, ModOp, Modification, Operation};
	use crate::{
		config::WriterConfig,
		entry::{Attr, Value},
		error::Error,
		writer::LdifWriter,
	};

	#[test]
	fn modification_converts_to_ldap3_form() {
		let modification = Modification {
			name: "cn".to_owned(),
			op: ModOp::Replace,
			values: vec![Value::from("Joe"), Value::Binary(vec![1, 2])],
		};

		let Mod::Replace(name, values) = modification.to_ldap3_mod().unwrap() else {
			panic!("expected a replace");
		};
		assert_eq!(name, b"cn".to_vec());
		assert_eq!(
			values,
			HashSet::from([b"Joe".to_vec(), vec![1, 2]]),
			"Text and binary values should both arrive as bytes"
		);
	}

	#[test]
	fn timestamps_have_no_protocol_form() {
		let modification = Modification {
			name: "whenchanged".to_owned(),
			op: ModOp::Replace,
			values: vec![Value::Time(time::macros::datetime!(2020-01-01 0:00 UTC))],
		};
		assert!(matches!(modification.to_ldap3_mod(), Err(Error::Encoding(_))));
	}

	/// Render one operation to changetype LDIF text.
	fn render(operation: Operation) -> String {
		let writer =
			LdifWriter::with_config(Vec::new(), WriterConfig { write_summary: false });
		let mut connector = LdifConnector::new(writer);
		connector.submit(operation).unwrap();
		String::from_utf8(connector.into_writer().close().unwrap()).unwrap()
	}

	#[test]
	fn add_renders_as_changetype_add() {
		let out = render(Operation::AddEntry {
			dn: "uid=joe,dc=com".to_owned(),
			attributes: vec![Attr::new("objectclass", vec![Value::from("inetOrgPerson")])],
		});
		assert_eq!(
			out,
			"dn: uid=joe,dc=com\n\
			 changetype: add\n\
			 objectclass: inetOrgPerson\n\n",
		);
	}

	#[test]
	fn modify_renders_change_blocks_in_order() {
		let out = render(Operation::ModifyEntry {
			dn: "uid=joe,dc=com".to_owned(),
			modifications: vec![
				Modification {
					name: "mail".to_owned(),
					op: ModOp::Replace,
					values: vec![Value::from("joe@example.com")],
				},
				Modification {
					name: "description".to_owned(),
					op: ModOp::Delete,
					values: vec![Value::from("old")],
				},
			],
		});
		assert_eq!(
			out,
			"dn: uid=joe,dc=com\n\
			 changetype: modify\n\
			 replace: mail\n\
			 mail: joe@example.com\n\
			 -\n\
			 delete: description\n\
			 description: old\n\
			 -\n\n",
		);
	}

	#[test]
	fn rename_and_delete_render() {
		let out = render(Operation::RenameEntry {
			dn: "uid=joe,ou=users,dc=com".to_owned(),
			new_rdn: "uid=joseph".to_owned(),
			delete_old_rdn: true,
			new_superior: Some("ou=admins,dc=com".to_owned()),
		});
		assert!(out.contains("changetype: modrdn"));
		assert!(out.contains("newsuperior: ou=admins,dc=com"));

		let out = render(Operation::DeleteEntry { dn: "uid=joe,dc=com".to_owned() });
		assert_eq!(out, "dn: uid=joe,dc=com\nchangetype: delete\n\n");
	}
}
