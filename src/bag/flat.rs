//! Flat `KEY = value` property sections.
//!
//! One property per line.  Keys are plain tokens; values escape `\`, LF and
//! CR so that every property stays on a single line.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;

use super::{Bag, BagError};

const SEPARATOR: &str = " = ";

/// Appends properties to one section.  Consumed by [`FlatWriter::close`].
///
/// The writer keeps its bag mutably borrowed, so the bag cannot be closed
/// while a section is still being written:
///
/// ```compile_fail
/// # use aipbag::bag::{Bag, BagError};
/// # use aipbag::config::BagOptions;
/// # fn main() -> Result<(), BagError> {
/// let mut bag = Bag::create("/tmp/aips", "late", &BagOptions::default())?;
/// let mut props = bag.flat_writer("object.properties")?;
/// bag.close()?;
/// props.write_property("OBJECT_ID", "1/1")?;
/// # Ok(())
/// # }
/// ```
pub struct FlatWriter<'a> {
    out:  BufWriter<File>,
    _bag: PhantomData<&'a mut Bag>,
}

impl FlatWriter<'_> {
    pub(super) fn create(path: &Path) -> Result<Self, BagError> {
        Ok(Self { out: BufWriter::new(File::create(path)?), _bag: PhantomData })
    }

    pub fn write_property(&mut self, key: &str, value: &str) -> Result<(), BagError> {
        if key.is_empty() || key.contains(|c: char| c == '=' || c.is_whitespace()) {
            return Err(BagError::InvalidKey(key.to_owned()));
        }
        writeln!(self.out, "{key}{SEPARATOR}{}", escape(value))?;
        Ok(())
    }

    pub fn close(mut self) -> Result<(), BagError> {
        self.out.flush()?;
        Ok(())
    }
}

/// A parsed property section, in file order.
#[derive(Debug, Clone, Default)]
pub struct FlatReader {
    entries: Vec<(String, String)>,
}

impl FlatReader {
    pub(super) fn open(path: &Path) -> Result<Self, BagError> {
        let mut entries = Vec::new();
        for line in BufReader::new(File::open(path)?).lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once(SEPARATOR) {
                Some((key, value)) => entries.push((key.to_owned(), unescape(value))),
                None => return Err(BagError::MalformedProperty(line)),
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c    => out.push(c),
        }
    }
    out
}

pub(crate) fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n')   => out.push('\n'),
            Some('r')   => out.push('\r'),
            Some(other) => out.push(other),
            None        => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn writer_output_parses_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.properties");
        let mut w = FlatWriter::create(&path).unwrap();
        w.write_property("BAG_TYPE", "AIP").unwrap();
        w.write_property("OBJECT_ID", "123456789/7").unwrap();
        w.write_property("NOTE", "a = b\nc").unwrap();
        w.close().unwrap();

        let r = FlatReader::open(&path).unwrap();
        assert_eq!(r.keys().collect::<Vec<_>>(), ["BAG_TYPE", "OBJECT_ID", "NOTE"]);
        assert_eq!(r.get("NOTE"), Some("a = b\nc"));
        assert_eq!(r.get("OWNER_ID"), None);
    }

    #[test]
    fn keys_with_separators_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = FlatWriter::create(&dir.path().join("p")).unwrap();
        assert!(matches!(w.write_property("A B", "x"), Err(BagError::InvalidKey(_))));
        assert!(matches!(w.write_property("A=B", "x"), Err(BagError::InvalidKey(_))));
    }

    proptest! {
        #[test]
        fn escaped_values_stay_on_one_line(value in "(?s).*") {
            let escaped = escape(&value);
            prop_assert!(!escaped.contains('\n') && !escaped.contains('\r'));
            prop_assert_eq!(unescape(&escaped), value);
        }
    }
}
