#![allow(
	clippy::expect_used,
	clippy::missing_docs_in_private_items,
	clippy::unwrap_used
)]
use std::error::Error;

use ldif_toolkit::{
	Entry, LdifEntryReader, LdifReader, LdifWriter, ReaderConfig, Value, WriterConfig,
};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

fn init_tracing() {
	let tracing_filter = EnvFilter::default().add_directive(LevelFilter::DEBUG.into());
	let _ = tracing_subscriber::fmt().with_env_filter(tracing_filter).try_init();
}

/// Write the entry's attributes through the LDIF writer and read them back.
fn roundtrip(entry: &Entry) -> Result<Entry, Box<dyn Error>> {
	let mut writer = LdifWriter::with_config(Vec::new(), WriterConfig { write_summary: false });
	writer.begin_entry(entry.dn())?;
	for attr in entry.iter() {
		for value in &attr.values {
			writer.write_value(&attr.name, value)?;
		}
	}
	let text = writer.close()?;

	let mut reader = LdifEntryReader::new(LdifReader::new(text.as_slice()));
	let decoded = reader.read_entry()?.expect("one entry should come back");
	assert!(reader.read_entry()?.is_none(), "exactly one entry should come back");
	Ok(decoded)
}

#[test]
fn entries_survive_a_write_read_cycle() -> Result<(), Box<dyn Error>> {
	init_tracing();

	let mut entry = Entry::new("uid=jblow,ou=users,dc=test,dc=com");
	entry.add_attr_value("cn", Value::from("Joe Blow"));
	entry.add_attr_value("description", Value::from("plain ascii"));
	entry.add_attr_value("description", Value::from("smörgåsbord"));
	entry.add_attr_value("description", Value::from("two\nlines"));
	entry.add_attr_value("jpegPhoto", Value::Binary(vec![0xFF, 0xD8, 0x00, 0x1F]));

	let decoded = roundtrip(&entry)?;

	assert_eq!(decoded.dn(), entry.dn());
	for attr in entry.iter() {
		assert_eq!(
			decoded.attr(&attr.name).map(|a| &a.values),
			Some(&attr.values),
			"attribute {} should survive the cycle with order intact",
			attr.name
		);
	}
	Ok(())
}

#[test]
fn folded_values_reconstruct_exactly() -> Result<(), Box<dyn Error>> {
	init_tracing();

	for len in [0, 75, 76, 77, 200] {
		let value = "v".repeat(len);
		let mut entry = Entry::new("dc=test,dc=com");
		entry.add_attr_value("description", Value::from(value.clone()));

		let decoded = roundtrip(&entry)?;
		assert_eq!(
			decoded.attr_first_string("description").unwrap_or_default(),
			value,
			"a value of length {len} should reassemble from its folds"
		);
	}
	Ok(())
}

#[test]
fn summary_comments_do_not_disturb_reading() -> Result<(), Box<dyn Error>> {
	init_tracing();

	let mut writer = LdifWriter::new(Vec::new());
	writer.write_comment("export of two entries")?;
	writer.begin_entry("dc=com")?;
	writer.write_attr("dc", "com")?;
	writer.begin_entry("dc=org")?;
	writer.write_attr("dc", "org")?;
	let text = writer.close()?;

	let reader = LdifReader::with_config(
		text.as_slice(),
		ReaderConfig { trim_folded_lines: false },
	);
	let mut reader = LdifEntryReader::new(reader);

	let mut dns = Vec::new();
	while let Some(entry) = reader.read_entry()? {
		dns.push(entry.dn().to_owned());
	}
	assert_eq!(dns, ["dc=com", "dc=org"], "comments and the summary should be skipped");
	Ok(())
}

#[test]
fn url_references_survive_a_write_read_cycle() -> Result<(), Box<dyn Error>> {
	init_tracing();

	let mut entry = Entry::new("dc=test,dc=com");
	entry.add_attr_value(
		"jpegPhoto",
		Value::Url(url::Url::parse("file:///usr/local/photos/x.jpg")?),
	);

	let decoded = roundtrip(&entry)?;
	assert_eq!(
		decoded.attr("jpegphoto").map(|a| a.values.clone()),
		Some(vec![Value::Url(url::Url::parse("file:///usr/local/photos/x.jpg")?)]),
	);
	Ok(())
}
