//! In-memory representation of directory entries and their attributes.
use std::{collections::HashMap, fmt, io};

use ldap3::SearchEntry;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::error::Error;

/// Characters that must be backslash-escaped inside a DN naming component.
const DN_SPECIALS: &str = ",+\"\\<>;";

/// A single attribute value. Values are tagged per value, not per attribute,
/// so one multivalued attribute may mix text and binary values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
	/// A text value.
	Text(String),
	/// An opaque binary value.
	Binary(Vec<u8>),
	/// A URL reference, as carried by the `:<` LDIF value form.
	Url(Url),
	/// A point in time, written to LDIF in Generalized Time form.
	Time(OffsetDateTime),
}

impl Value {
	/// Borrow the value as text, if it is text.
	#[must_use]
	pub fn as_text(&self) -> Option<&str> {
		match self {
			Value::Text(text) => Some(text),
			_ => None,
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Text(text) => f.write_str(text),
			Value::Binary(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
			Value::Url(url) => f.write_str(url.as_str()),
			Value::Time(time) => write!(f, "{time}"),
		}
	}
}

impl From<&str> for Value {
	fn from(text: &str) -> Self {
		Value::Text(text.to_owned())
	}
}

impl From<String> for Value {
	fn from(text: String) -> Self {
		Value::Text(text)
	}
}

impl From<Vec<u8>> for Value {
	fn from(bytes: Vec<u8>) -> Self {
		Value::Binary(bytes)
	}
}

impl From<Url> for Value {
	fn from(url: Url) -> Self {
		Value::Url(url)
	}
}

impl From<OffsetDateTime> for Value {
	fn from(time: OffsetDateTime) -> Self {
		Value::Time(time)
	}
}

/// A named, ordered, possibly multivalued attribute.
///
/// The name keeps the case it was created with for display; lookups through
/// [`Entry`] are case-insensitive regardless.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attr {
	/// Attribute name in its original case.
	pub name: String,
	/// The values, in arrival order.
	pub values: Vec<Value>,
}

impl Attr {
	/// Create an attribute from a name and its values.
	pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
		Attr { name: name.into(), values }
	}
}

/// One directory object: its DN and its attributes.
///
/// The RDN and superior DN are derived from the DN on demand, never stored.
/// Renaming or re-parenting rewrites the DN and raises the matching dirty
/// flag; [`MutableEntry`](crate::changes::MutableEntry) turns those flags
/// into a rename operation on commit.
#[derive(Clone, Debug)]
pub struct Entry {
	/// The current distinguished name.
	dn: String,
	/// The DN at load/creation time, frozen until a rename commits.
	original_dn: String,
	/// Whether the DN has been rewritten since the last commit.
	dn_dirty: bool,
	/// Whether the superior part of the DN has been rewritten.
	superior_dirty: bool,
	/// Attributes, keyed by case-folded name.
	attrs: HashMap<String, Attr>,
}

impl Entry {
	/// Create an empty entry with the given DN.
	#[must_use]
	pub fn new(dn: impl Into<String>) -> Self {
		let dn = dn.into();
		Entry {
			original_dn: dn.clone(),
			dn,
			dn_dirty: false,
			superior_dirty: false,
			attrs: HashMap::new(),
		}
	}

	/// Build an entry from an LDAP search result, taking both the text and
	/// the binary attribute sets.
	#[must_use]
	pub fn from_search(entry: SearchEntry) -> Self {
		let mut this = Entry::new(String::new());
		this.reload_from_search(entry);
		this
	}

	/// Replace this entry's DN and attributes with a search result's,
	/// clearing any pending rename state.
	pub fn reload_from_search(&mut self, entry: SearchEntry) {
		self.original_dn.clone_from(&entry.dn);
		self.dn = entry.dn;
		self.dn_dirty = false;
		self.superior_dirty = false;

		self.attrs.clear();
		for (name, values) in entry.attrs {
			let values = values.into_iter().map(Value::Text).collect();
			self.attrs.insert(name.to_lowercase(), Attr::new(name, values));
		}
		for (name, values) in entry.bin_attrs {
			let values = values.into_iter().map(Value::Binary).collect();
			self.attrs.insert(name.to_lowercase(), Attr::new(name, values));
		}
	}

	/// The current distinguished name.
	#[must_use]
	pub fn dn(&self) -> &str {
		&self.dn
	}

	/// The DN this entry was created or loaded with. Diverges from
	/// [`dn`](Self::dn) while a rename is pending.
	#[must_use]
	pub fn original_dn(&self) -> &str {
		&self.original_dn
	}

	/// Whether the DN has been changed since load or the last commit.
	#[must_use]
	pub fn is_dn_dirty(&self) -> bool {
		self.dn_dirty
	}

	/// Whether the superior DN has been changed since load or the last
	/// commit.
	#[must_use]
	pub fn is_superior_dirty(&self) -> bool {
		self.superior_dirty
	}

	/// Extract the RDN component from a distinguished name, including the
	/// attribute name, e.g. `cn=xyz`, and any escaping backslashes, e.g.
	/// `cn=xyz\, user`.
	///
	/// This is an explicit two-state scan: a backslash toggles the escape
	/// state per character, so `\\` does not leave the following comma
	/// escaped.
	#[must_use]
	pub fn parse_rdn(dn: &str) -> &str {
		let mut escaped = false;
		for (i, c) in dn.char_indices() {
			if c == '\\' {
				escaped = !escaped;
			} else {
				if c == ',' && !escaped {
					return &dn[..i];
				}
				escaped = false;
			}
		}
		dn
	}

	/// The superior (parent) part of a DN, or `None` when the RDN spans the
	/// whole DN.
	#[must_use]
	pub fn parse_superior(dn: &str) -> Option<&str> {
		let rdn = Self::parse_rdn(dn);
		if rdn.len() >= dn.len() {
			return None;
		}
		Some(dn[rdn.len() + 1..].trim())
	}

	/// Backslash-escape a DN naming component; e.g. `cn=xyz, user` becomes
	/// `cn=xyz\, user`.
	#[must_use]
	pub fn escape_naming_component(naming_component: &str) -> String {
		let mut out = String::with_capacity(naming_component.len());
		for c in naming_component.chars() {
			if DN_SPECIALS.contains(c) {
				out.push('\\');
			}
			out.push(c);
		}
		out
	}

	/// The RDN part of this entry's DN.
	#[must_use]
	pub fn rdn(&self) -> &str {
		Self::parse_rdn(&self.dn)
	}

	/// The superior DN of this entry, or `None` for a root-level DN.
	#[must_use]
	pub fn superior(&self) -> Option<&str> {
		Self::parse_superior(&self.dn)
	}

	/// Replace the RDN part of the DN. No escaping is applied to `new_rdn`;
	/// see [`set_rdn_escaped`](Self::set_rdn_escaped). The DN is only marked
	/// dirty if it actually changed.
	pub fn set_rdn(&mut self, new_rdn: &str) {
		let current_len = self.rdn().len();
		let dn = format!("{new_rdn}{}", &self.dn[current_len..]);
		if dn != self.dn {
			self.dn = dn;
			self.dn_dirty = true;
		}
	}

	/// Replace the RDN part of the DN, optionally escaping the new RDN
	/// first.
	pub fn set_rdn_escaped(&mut self, new_rdn: &str, escape: bool) {
		if escape {
			self.set_rdn(&Self::escape_naming_component(new_rdn));
		} else {
			self.set_rdn(new_rdn);
		}
	}

	/// Move the entry under a new superior DN. The comparison with the
	/// current superior is case-insensitive, so re-stating the existing
	/// parent does not dirty the entry.
	///
	/// # Errors
	/// [`Error::State`](crate::error::Error::State) if the RDN spans the
	/// whole DN, since there is then no superior to replace.
	pub fn set_superior(&mut self, new_superior: &str) -> Result<(), Error> {
		let rdn_len = self.rdn().len();
		if rdn_len >= self.dn.len() {
			return Err(Error::State(format!("cannot change superior of {}", self.dn)));
		}
		if !self.dn[rdn_len + 1..].eq_ignore_ascii_case(new_superior) {
			self.dn = format!("{},{new_superior}", &self.dn[..rdn_len]);
			self.superior_dirty = true;
			self.dn_dirty = true;
		}
		Ok(())
	}

	/// Reset the rename bookkeeping after a rename has been accepted by the
	/// directory.
	pub(crate) fn rename_committed(&mut self) {
		self.dn_dirty = false;
		self.superior_dirty = false;
		self.original_dn.clone_from(&self.dn);
	}

	/// Append one value to an attribute, creating the attribute if absent.
	/// This is plain local storage, without change tracking.
	pub fn add_attr_value(&mut self, name: &str, value: Value) {
		self.attrs
			.entry(name.to_lowercase())
			.or_insert_with(|| Attr::new(name, Vec::new()))
			.values
			.push(value);
	}

	/// Store an attribute wholesale, replacing any previous values.
	pub fn set_attr(&mut self, attr: Attr) {
		self.attrs.insert(attr.name.to_lowercase(), attr);
	}

	/// Look up an attribute by name, case-insensitively.
	#[must_use]
	pub fn attr(&self, name: &str) -> Option<&Attr> {
		self.attrs.get(&name.to_lowercase())
	}

	/// Count the values associated with the named attribute.
	#[must_use]
	pub fn attr_value_count(&self, name: &str) -> usize {
		self.attr(name).map_or(0, |attr| attr.values.len())
	}

	/// Whether the named attribute is present with at least one value.
	#[must_use]
	pub fn has_attribute(&self, name: &str) -> bool {
		self.attr_value_count(name) > 0
	}

	/// Whether the named attribute currently holds the given value.
	#[must_use]
	pub fn contains_attr_value(&self, name: &str, value: &Value) -> bool {
		self.attr(name).is_some_and(|attr| attr.values.contains(value))
	}

	/// Render each of the attribute's values to a string, or `None` if the
	/// attribute is absent. Binary values are rendered lossily.
	#[must_use]
	pub fn attr_string_values(&self, name: &str) -> Option<Vec<String>> {
		self.attr(name).map(|attr| attr.values.iter().map(ToString::to_string).collect())
	}

	/// The first value of the named attribute as a string, if any.
	#[must_use]
	pub fn attr_first_string(&self, name: &str) -> Option<String> {
		self.attr(name).and_then(|attr| attr.values.first()).map(ToString::to_string)
	}

	/// Iterate over the entry's attributes in map order.
	pub fn iter(&self) -> impl Iterator<Item = &Attr> {
		self.attrs.values()
	}

	/// Write the entry out for inspection. This is a convenience method and
	/// does not follow LDIF rules (7-bit safety, folding, and so on); use
	/// [`LdifWriter`](crate::writer::LdifWriter) for real output.
	pub fn dump<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
		writeln!(out, "dn: {}", self.dn)?;
		for attr in self.attrs.values() {
			for value in &attr.values {
				writeln!(out, "{}: {value}", attr.name)?;
			}
		}
		Ok(())
	}
}
