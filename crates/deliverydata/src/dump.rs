//! Text rendering of a whole dataset
//!
//! One line per element in tag order, sequence items indented beneath
//! their sequence:
//!
//! ```text
//! (300A,00B0) BeamSequence SQ <1 item>
//!   Item 1
//!     (300A,00C0) BeamNumber IS [1]
//! ```
//!
//! Two datasets with the same dump hold the same elements with the same
//! values, which is how rebuilt plans are checked against their template.

use dicom::core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom::core::value::Value;
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;
use std::fmt;

const INDENT: &str = "  ";

/// Display adapter producing the dump of a dataset
#[derive(Debug, Clone, Copy)]
pub struct DatasetDump<'a> {
    obj: &'a InMemDicomObject,
}

impl<'a> DatasetDump<'a> {
    /// Wrap a dataset for display
    #[inline]
    #[must_use]
    pub fn new(obj: &'a InMemDicomObject) -> Self {
        Self { obj }
    }
}

impl fmt::Display for DatasetDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_object(f, self.obj, 0)
    }
}

/// Render a dataset as text
#[must_use]
pub fn dump_dataset(obj: &InMemDicomObject) -> String {
    DatasetDump::new(obj).to_string()
}

fn write_object(f: &mut fmt::Formatter<'_>, obj: &InMemDicomObject, depth: usize) -> fmt::Result {
    for element in obj.iter() {
        write_element(f, element, depth)?;
    }
    Ok(())
}

fn write_element(f: &mut fmt::Formatter<'_>, element: &InMemElement, depth: usize) -> fmt::Result {
    let tag = element.header().tag;
    let name = StandardDataDictionary
        .by_tag(tag)
        .map_or("Unknown", DataDictionaryEntry::alias);
    write!(
        f,
        "{}({:04X},{:04X}) {} {} ",
        INDENT.repeat(depth),
        tag.group(),
        tag.element(),
        name,
        element.header().vr
    )?;

    match element.value() {
        Value::Primitive(value) => writeln!(f, "[{}]", value.to_str()),
        Value::Sequence(sequence) => {
            let items = sequence.items();
            let plural = if items.len() == 1 { "" } else { "s" };
            writeln!(f, "<{} item{}>", items.len(), plural)?;
            for (n, item) in items.iter().enumerate() {
                writeln!(f, "{}Item {}", INDENT.repeat(depth + 1), n + 1)?;
                write_object(f, item, depth + 2)?;
            }
            Ok(())
        }
        Value::PixelSequence(pixels) => writeln!(
            f,
            "<{} fragments, offset table of {} entries>",
            pixels.fragments().len(),
            pixels.offset_table().len()
        ),
    }
}
