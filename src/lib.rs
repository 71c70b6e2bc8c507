//! Read, write, and incrementally mutate directory entries in the LDAP
//! Data Interchange Format (LDIF, per [RFC 2849]).
//!
//! The toolkit has three layers. [`reader::LdifReader`] and
//! [`writer::LdifWriter`] are the codec: a streaming, event-driven parser
//! and a folding, auto-base64-encoding writer for the wire grammar,
//! including the `changetype:` dialect used by replication and migration
//! scripts. [`entry::Entry`] is the in-memory model of one directory
//! object, with the DN/RDN/superior manipulation primitives. On top of
//! both, [`changes::MutableEntry`] tracks attribute edits in a pending
//! ledger and, on commit, turns them into the minimal set of directory
//! operations, which are handed to whatever [`ops::DirectoryConnector`]
//! you provide rather than sent anywhere by this crate.
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate
//! is an excellent resource; search results from that crate can be loaded
//! directly via [`Entry::from_search`](entry::Entry::from_search).
//!
//! [RFC 2849]: https://www.rfc-editor.org/rfc/rfc2849
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! Parsing a document and inspecting its entries:
//! ```
//! use ldif_toolkit::{LdifEntryReader, LdifReader};
//!
//! # fn run() -> Result<(), ldif_toolkit::Error> {
//! let ldif = "dn: uid=jblow,ou=users,dc=test,dc=com\n\
//!             cn: Joe Blow\n\
//!             mail:: am9lQGV4YW1wbGUuY29t\n\n";
//!
//! let mut reader = LdifEntryReader::new(LdifReader::new(ldif.as_bytes()));
//! while let Some(entry) = reader.read_entry()? {
//!     println!("{} is named {:?}", entry.rdn(), entry.attr_first_string("cn"));
//! }
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! Queueing edits and committing them as a changetype LDIF script:
//! ```
//! use ldif_toolkit::{LdifConnector, LdifWriter, MutableEntry};
//!
//! # fn run() -> Result<(), ldif_toolkit::Error> {
//! let mut entry = MutableEntry::create_uncommitted(
//!     "uid=jblow,ou=users,dc=test,dc=com",
//!     &["inetOrgPerson"],
//! )?;
//! entry.append_value("cn", "Joe Blow")?;
//!
//! let mut connector = LdifConnector::new(LdifWriter::new(Vec::new()));
//! entry.commit(&mut connector)?;
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! # Limitations
//! * The codec is single-threaded and synchronous; give each stream its
//!   own reader or writer instance.
//! * Values are not validated against a directory schema.
//! * LDAP controls (paging cookies, VLV offsets) are the business of the
//!   connector behind [`ops::DirectoryConnector`], not of this crate.

pub mod changes;
pub mod config;
pub mod entry;
pub mod entry_reader;
pub mod error;
pub mod ops;
pub mod reader;
pub mod writer;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	changes::{ConflictMode, MutableEntry},
	config::{ReaderConfig, WriterConfig},
	entry::{Attr, Entry, Value},
	entry_reader::LdifEntryReader,
	error::Error,
	ops::{DirectoryConnector, LdifConnector, ModOp, Modification, Operation},
	reader::{ChangeDirective, ChangeType, LdifEvent, LdifReader, LdifType},
	writer::LdifWriter,
};
