//! Change-tracking entries that turn attribute edits into directory
//! operations.
//!
//! [`MutableEntry`] wraps a basic [`Entry`] with a pending-modification
//! ledger. You can create, inspect, rename, modify, and delete one, then
//! [`commit`](MutableEntry::commit) the accumulated changes as a minimal
//! set of operations without dealing with the semantics of the individual
//! directory requests.
use ldap3::SearchEntry;
use tracing::{debug, info, warn};

use crate::{
	entry::{Attr, Entry, Value},
	error::Error,
	ops::{DirectoryConnector, ModOp, Modification, Operation},
};

/// Ledger keys for per-value deletions carry this suffix so a deletion and
/// an add/replace can be queued for the same attribute at once. `*` cannot
/// occur in an attribute name, so the key spaces never collide.
const DELETE_KEY_SUFFIX: &str = "*d";

/// How to resolve a mutation that clashes with one already queued for the
/// same attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictMode {
	/// Raise [`Error::Conflict`] and leave the ledger untouched.
	Error,
	/// Log the clash and merge or override, favoring the newest request.
	#[default]
	Accept,
}

/// One ledger slot: the pending modification plus the key it is filed
/// under.
#[derive(Clone, Debug)]
struct PendingChange {
	/// Ledger key; the case-folded attribute name, suffixed for per-value
	/// deletions.
	key: String,
	/// The queued modification.
	change: Modification,
}

/// An [`Entry`] with change tracking.
///
/// Mutation verbs queue work in a ledger instead of touching the directory;
/// [`commit`](Self::commit) later drains the ledger into the fewest
/// operations that realize it. Within one entry, modifications are applied
/// in the order the verbs were called.
#[derive(Clone, Debug)]
pub struct MutableEntry {
	/// The wrapped entry.
	entry: Entry,
	/// Pending modifications in verb-call order.
	changes: Vec<PendingChange>,
	/// Conflict resolution policy.
	conflict_mode: ConflictMode,
	/// Whether this entry has never been committed to the directory.
	is_new: bool,
	/// Whether this entry has been deleted. Deletion is terminal.
	is_deleted: bool,
}

impl MutableEntry {
	/// Start a new, uncommitted entry with the given DN.
	#[must_use]
	pub fn new(dn: impl Into<String>) -> Self {
		MutableEntry {
			entry: Entry::new(dn),
			changes: Vec::new(),
			conflict_mode: ConflictMode::default(),
			is_new: true,
			is_deleted: false,
		}
	}

	/// Wrap an entry loaded from a directory search result.
	#[must_use]
	pub fn from_search(entry: SearchEntry) -> Self {
		MutableEntry {
			entry: Entry::from_search(entry),
			changes: Vec::new(),
			conflict_mode: ConflictMode::default(),
			is_new: false,
			is_deleted: false,
		}
	}

	/// Start a new, uncommitted entry and queue its object classes.
	///
	/// # Errors
	/// [`Error::State`] if `dn` is empty.
	pub fn create_uncommitted(dn: &str, object_classes: &[&str]) -> Result<Self, Error> {
		if dn.is_empty() {
			return Err(Error::State("dn cannot be empty".to_owned()));
		}
		let mut entry = MutableEntry::new(dn);
		entry.set_values("objectClass", object_classes.iter().map(|c| Value::from(*c)))?;
		Ok(entry)
	}

	/// The wrapped entry.
	#[must_use]
	pub fn entry(&self) -> &Entry {
		&self.entry
	}

	/// The current distinguished name.
	#[must_use]
	pub fn dn(&self) -> &str {
		self.entry.dn()
	}

	/// The RDN part of the DN.
	#[must_use]
	pub fn rdn(&self) -> &str {
		self.entry.rdn()
	}

	/// The superior DN, if any.
	#[must_use]
	pub fn superior(&self) -> Option<&str> {
		self.entry.superior()
	}

	/// Whether this entry has never been committed.
	#[must_use]
	pub fn is_new(&self) -> bool {
		self.is_new
	}

	/// Whether this entry has been deleted.
	#[must_use]
	pub fn is_deleted(&self) -> bool {
		self.is_deleted
	}

	/// The number of pending ledger records.
	#[must_use]
	pub fn pending_change_count(&self) -> usize {
		self.changes.len()
	}

	/// The conflict resolution policy.
	#[must_use]
	pub fn conflict_mode(&self) -> ConflictMode {
		self.conflict_mode
	}

	/// Set the conflict resolution policy.
	pub fn set_conflict_mode(&mut self, mode: ConflictMode) {
		self.conflict_mode = mode;
	}

	/// Replace the RDN part of the DN; the rename is carried out on
	/// [`commit`](Self::commit).
	///
	/// # Errors
	/// [`Error::State`] if the entry has been deleted.
	pub fn set_rdn(&mut self, new_rdn: &str) -> Result<(), Error> {
		self.check_not_deleted()?;
		self.entry.set_rdn(new_rdn);
		Ok(())
	}

	/// Replace the RDN, optionally backslash-escaping it first.
	///
	/// # Errors
	/// [`Error::State`] if the entry has been deleted.
	pub fn set_rdn_escaped(&mut self, new_rdn: &str, escape: bool) -> Result<(), Error> {
		self.check_not_deleted()?;
		self.entry.set_rdn_escaped(new_rdn, escape);
		Ok(())
	}

	/// Move the entry under a new superior; carried out on
	/// [`commit`](Self::commit).
	///
	/// # Errors
	/// [`Error::State`] if the entry has been deleted or has no superior.
	pub fn set_superior(&mut self, new_superior: &str) -> Result<(), Error> {
		self.check_not_deleted()?;
		self.entry.set_superior(new_superior)
	}

	/// Whether the attribute is present with values and not already queued
	/// for whole-value deletion.
	#[must_use]
	pub fn has_attribute(&self, name: &str) -> bool {
		let delete_key = format!("{}{DELETE_KEY_SUFFIX}", name.to_lowercase());
		self.entry.has_attribute(name) && self.position(&delete_key).is_none()
	}

	/// Whether the attribute currently holds the given value.
	#[must_use]
	pub fn contains_attr_value(&self, name: &str, value: &Value) -> bool {
		self.has_attribute(name) && self.entry.contains_attr_value(name, value)
	}

	/// Queue appending a value to an attribute. Appending a value already
	/// queued is a no-op.
	///
	/// # Errors
	/// [`Error::State`] if deleted, [`Error::Encoding`] for value kinds the
	/// ledger does not carry, [`Error::Conflict`] if a non-append request
	/// is already queued under [`ConflictMode::Error`].
	pub fn append_value(&mut self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
		self.check_not_deleted()?;
		let value = ensure_ledger_value(value.into())?;
		let key = name.to_lowercase();

		let Some(pos) = self.position(&key) else {
			self.changes.push(PendingChange {
				key: key.clone(),
				change: Modification { name: key, op: ModOp::Add, values: vec![value] },
			});
			return Ok(());
		};

		let change = &mut self.changes[pos].change;
		if self.conflict_mode == ConflictMode::Error && change.op != ModOp::Add {
			return Err(Error::Conflict {
				attr: key,
				reason: format!(
					"cannot append while a {:?} request is queued; results would be indeterminate",
					change.op
				),
			});
		}

		info!(attr = %key, op = ?change.op, "appending value to an existing pending request");
		// An empty replacement value left in the slot would defeat the
		// append.
		if change.values.iter().any(|v| v.as_text() == Some("")) {
			info!(attr = %key, "removing empty-replacement value");
			change.values.retain(|v| v.as_text() != Some(""));
		}
		if !change.values.contains(&value) {
			change.values.push(value);
		}
		Ok(())
	}

	/// Queue removal of a single value. On a new entry this retracts the
	/// value from any queued append, since nothing has been sent yet; on an
	/// existing entry it queues a per-value deletion, independent of any
	/// add/replace queued for the same attribute.
	///
	/// # Errors
	/// [`Error::State`] if deleted, [`Error::Encoding`] for value kinds the
	/// ledger does not carry.
	pub fn remove_value(&mut self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
		self.check_not_deleted()?;
		let value = ensure_ledger_value(value.into())?;
		let key = name.to_lowercase();

		if self.is_new {
			if let Some(pos) = self.position(&key) {
				let change = &mut self.changes[pos].change;
				change.values.retain(|v| v != &value);
				if change.values.is_empty() {
					self.changes.remove(pos);
				}
			}
			return Ok(());
		}

		let delete_key = format!("{key}{DELETE_KEY_SUFFIX}");
		if let Some(pos) = self.position(&delete_key) {
			let change = &mut self.changes[pos].change;
			if !change.values.contains(&value) {
				change.values.push(value);
			}
		} else {
			self.changes.push(PendingChange {
				key: delete_key,
				change: Modification { name: key, op: ModOp::Delete, values: vec![value] },
			});
		}
		Ok(())
	}

	/// Queue replacement of all of an attribute's values. Merging into an
	/// already-queued replace is a set union.
	///
	/// # Errors
	/// [`Error::State`] if deleted, [`Error::Encoding`] for value kinds the
	/// ledger does not carry, [`Error::Conflict`] if a non-replace request
	/// is already queued under [`ConflictMode::Error`].
	pub fn set_values(
		&mut self,
		name: &str,
		values: impl IntoIterator<Item = Value>,
	) -> Result<(), Error> {
		self.check_not_deleted()?;
		let key = name.to_lowercase();

		let pos = match self.position(&key) {
			Some(pos) if self.changes[pos].change.op != ModOp::Replace => {
				if self.conflict_mode == ConflictMode::Error {
					return Err(Error::Conflict {
						attr: key,
						reason: format!(
							"change buffer already holds a {:?} request",
							self.changes[pos].change.op
						),
					});
				}
				info!(
					attr = %key,
					op = ?self.changes[pos].change.op,
					"overriding pending request with a replace"
				);
				self.changes[pos].change =
					Modification { name: key.clone(), op: ModOp::Replace, values: Vec::new() };
				pos
			}
			Some(pos) => pos,
			None => {
				debug!(attr = %key, "preparing replacement");
				self.changes.push(PendingChange {
					key: key.clone(),
					change: Modification {
						name: key.clone(),
						op: ModOp::Replace,
						values: Vec::new(),
					},
				});
				self.changes.len() - 1
			}
		};

		for value in values {
			let value = ensure_ledger_value(value)?;
			let change = &mut self.changes[pos].change;
			if change.values.contains(&value) {
				debug!(attr = %key, %value, "replacement already contains value");
			} else {
				debug!(attr = %key, %value, "added value to replacement");
				change.values.push(value);
			}
		}
		Ok(())
	}

	/// Queue replacement with a single value.
	///
	/// # Errors
	/// As for [`set_values`](Self::set_values).
	pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
		self.set_values(name, [value.into()])
	}

	/// Queue removal of the whole attribute: a replace with no values. Any
	/// queued per-value deletion for the attribute is dropped as redundant.
	/// A no-op when the entry does not hold the attribute.
	///
	/// # Errors
	/// [`Error::State`] if deleted, [`Error::Conflict`] if a non-empty
	/// request is already queued under [`ConflictMode::Error`].
	pub fn clear_attribute(&mut self, name: &str) -> Result<(), Error> {
		self.check_not_deleted()?;
		let key = name.to_lowercase();

		if self.entry.attr_value_count(&key) == 0 {
			return Ok(());
		}

		if let Some(pos) = self.position(&key) {
			let change = &self.changes[pos].change;
			if change.op == ModOp::Replace && change.values.is_empty() {
				debug!(attr = %key, "attribute is already queued to be cleared");
				return Ok(());
			}
			if self.conflict_mode == ConflictMode::Error {
				return Err(Error::Conflict {
					attr: key,
					reason: format!(
						"change buffer already holds a non-empty {:?} request",
						change.op
					),
				});
			}
			info!(attr = %key, op = ?change.op, "overriding pending request with a clear");
			self.changes[pos].change =
				Modification { name: key.clone(), op: ModOp::Replace, values: Vec::new() };
		} else {
			debug!(attr = %key, "queued attribute clear");
			self.changes.push(PendingChange {
				key: key.clone(),
				change: Modification { name: key.clone(), op: ModOp::Replace, values: Vec::new() },
			});
		}

		let delete_key = format!("{key}{DELETE_KEY_SUFFIX}");
		if let Some(pos) = self.position(&delete_key) {
			warn!(attr = %key, "removing a per-value deletion superseded by the clear");
			self.changes.remove(pos);
		}
		Ok(())
	}

	/// Send all pending changes through the connector. A pending rename or
	/// move fires first, against the original DN; a non-empty ledger then
	/// becomes one create (new entry) or one update (existing entry).
	/// Committing an existing entry with nothing pending is a no-op.
	///
	/// # Errors
	/// [`Error::State`] if the entry has been deleted, or is new with an
	/// empty ledger; any error the connector reports, in which case the
	/// pending state is retained for retry.
	pub fn commit<C: DirectoryConnector>(&mut self, connector: &mut C) -> Result<(), Error> {
		self.check_not_deleted()?;

		if self.entry.is_dn_dirty() {
			let new_rdn = self.entry.rdn().to_owned();
			info!(%new_rdn, "requesting new name");

			let new_superior = if self.entry.is_superior_dirty() {
				let superior = self.entry.superior().map(str::to_owned);
				info!(?superior, "requesting new superior");
				superior
			} else {
				None
			};

			connector.submit(Operation::RenameEntry {
				dn: self.entry.original_dn().to_owned(),
				new_rdn,
				delete_old_rdn: true,
				new_superior,
			})?;
			self.entry.rename_committed();
		}

		if self.changes.is_empty() {
			info!(dn = %self.entry.dn(), "nothing to commit");
			if self.is_new {
				return Err(Error::State(
					"cannot commit a new directory entry with no attributes".to_owned(),
				));
			}
			return Ok(());
		}

		let operation = if self.is_new {
			let attributes = self
				.changes
				.iter()
				.map(|pending| {
					Attr::new(pending.change.name.clone(), pending.change.values.clone())
				})
				.collect();
			Operation::AddEntry { dn: self.entry.dn().to_owned(), attributes }
		} else {
			let modifications =
				self.changes.iter().map(|pending| pending.change.clone()).collect();
			Operation::ModifyEntry { dn: self.entry.dn().to_owned(), modifications }
		};
		connector.submit(operation)?;

		self.changes.clear();
		self.is_new = false;
		info!(dn = %self.entry.dn(), "commit complete");
		Ok(())
	}

	/// Delete the entry from the directory. Terminal: every further
	/// mutation on this instance fails.
	///
	/// # Errors
	/// [`Error::State`] if the entry was never committed or is already
	/// deleted; any error the connector reports.
	pub fn delete<C: DirectoryConnector>(&mut self, connector: &mut C) -> Result<(), Error> {
		self.check_not_deleted()?;
		if self.is_new {
			return Err(Error::State(format!(
				"entry {} was never committed and cannot be deleted",
				self.entry.dn()
			)));
		}
		connector.submit(Operation::DeleteEntry { dn: self.entry.dn().to_owned() })?;
		self.is_deleted = true;
		Ok(())
	}

	/// Index of the ledger slot filed under `key`.
	fn position(&self, key: &str) -> Option<usize> {
		self.changes.iter().position(|pending| pending.key == key)
	}

	/// Deleted entries accept no further use.
	fn check_not_deleted(&self) -> Result<(), Error> {
		if self.is_deleted {
			Err(Error::State(format!("entry {} has already been deleted", self.entry.dn())))
		} else {
			Ok(())
		}
	}
}

/// The ledger carries text, binary and URL values; timestamps must be
/// formatted to text by the caller first.
fn ensure_ledger_value(value: Value) -> Result<Value, Error> {
	if matches!(value, Value::Time(_)) {
		return Err(Error::Encoding(
			"timestamp values cannot be queued for modification; format them as text first"
				.to_owned(),
		));
	}
	Ok(value)
}
