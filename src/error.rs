//! Error codes

/// Errors that can occur when using this library
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// The input violated the LDIF wire grammar. Fatal to the stream: the
	/// reader must be discarded, partial entry state is undefined.
	#[error("malformed LDIF at line {line}: {reason}")]
	Format {
		/// 1-based logical line number on which the violation was found.
		line: u64,
		/// What was wrong with the line.
		reason: String,
	},
	/// Two pending modifications targeting the same attribute could not be
	/// reconciled. Only raised under [`ConflictMode::Error`]; the caller may
	/// retry under [`ConflictMode::Accept`] or resolve the clash itself.
	///
	/// [`ConflictMode::Error`]: crate::changes::ConflictMode::Error
	/// [`ConflictMode::Accept`]: crate::changes::ConflictMode::Accept
	#[error("conflicting modification on attribute {attr}: {reason}")]
	Conflict {
		/// Case-folded name of the attribute the clash occurred on.
		attr: String,
		/// Which pending request the new one collided with.
		reason: String,
	},
	/// An entry was used in a way its lifecycle does not allow, such as
	/// mutating a deleted entry or committing an empty new one.
	#[error("invalid entry state: {0}")]
	State(String),
	/// A value kind was passed somewhere it has no representation.
	#[error("unsupported value encoding: {0}")]
	Encoding(String),
	/// An underlying I/O operation on the text stream failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// An error reported by the directory connection layer.
	#[error(transparent)]
	Ldap(#[from] ldap3::LdapError),
}
