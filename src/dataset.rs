//
// dataset.rs
// Dicom-Worklist-rs
//
// Ordered collection of data elements, used for the top-level data set and for sequence items.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io::Write;

use crate::element::{decode_nested, read_tag, write_element, DataElement, Tag, Value};
use crate::error::Result;

/// A data set or sequence item.
///
/// Elements built through [`DataSet::insert`] are kept in ascending tag order with at most one
/// element per tag. Decoded data sets keep the order found in the file so that it can be checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    elements: Vec<DataElement>,
}

impl DataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an element at its ordered position, returning the element it replaced.
    pub fn insert(&mut self, element: DataElement) -> Option<DataElement> {
        match self.elements.binary_search_by_key(&element.tag, |e| e.tag) {
            Ok(idx) => Some(std::mem::replace(&mut self.elements[idx], element)),
            Err(idx) => {
                self.elements.insert(idx, element);
                None
            }
        }
    }

    pub fn get(&self, tag: Tag) -> Option<&DataElement> {
        self.elements.iter().find(|e| e.tag == tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.get(tag).is_some()
    }

    pub fn string(&self, tag: Tag) -> Option<&str> {
        self.get(tag).and_then(|e| e.value.as_str())
    }

    pub fn u16(&self, tag: Tag) -> Option<u16> {
        self.get(tag).and_then(|e| e.value.as_u16())
    }

    pub fn u32(&self, tag: Tag) -> Option<u32> {
        self.get(tag).and_then(|e| e.value.as_u32())
    }

    pub fn items(&self, tag: Tag) -> Option<&[DataSet]> {
        self.get(tag).and_then(|e| e.value.items())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataElement> {
        self.elements.iter()
    }

    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.elements.iter().map(|e| e.tag)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// True when tags are strictly ascending here and inside every sequence item.
    pub fn is_strictly_ascending(&self) -> bool {
        let ordered = self.elements.windows(2).all(|w| w[0].tag < w[1].tag);
        ordered
            && self.elements.iter().all(|e| match &e.value {
                Value::Sequence(items) => items.iter().all(DataSet::is_strictly_ascending),
                _ => true,
            })
    }

    /// Serialize every element, in ascending tag order, as explicit VR little endian.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let mut ordered: Vec<&DataElement> = self.elements.iter().collect();
        ordered.sort_by_key(|e| e.tag);
        for element in ordered {
            write_element(out, element)?;
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Decode every element of an explicit VR little endian buffer.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        read_range(bytes, 0, bytes.len(), 0)
    }

    pub(crate) fn push(&mut self, element: DataElement) {
        self.elements.push(element);
    }
}

impl FromIterator<DataElement> for DataSet {
    fn from_iter<I: IntoIterator<Item = DataElement>>(iter: I) -> Self {
        let mut set = DataSet::new();
        for element in iter {
            set.insert(element);
        }
        set
    }
}

impl IntoIterator for DataSet {
    type Item = DataElement;
    type IntoIter = std::vec::IntoIter<DataElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

impl<'a> IntoIterator for &'a DataSet {
    type Item = &'a DataElement;
    type IntoIter = std::slice::Iter<'a, DataElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

/// Decode the elements in `bytes[start..end]`, preserving file order.
pub(crate) fn read_range(bytes: &[u8], start: usize, end: usize, depth: usize) -> Result<DataSet> {
    let bounded = &bytes[..end];
    let mut set = DataSet::new();
    let mut pos = start;
    while pos < end {
        let (element, consumed) = decode_nested(bounded, pos, depth)?;
        set.push(element);
        pos += consumed;
    }
    Ok(set)
}

/// Decode elements from `start` until `delimiter` is found; returns the delimiter's offset.
pub(crate) fn read_until(bytes: &[u8], start: usize, delimiter: Tag, depth: usize) -> Result<(DataSet, usize)> {
    let mut set = DataSet::new();
    let mut pos = start;
    while read_tag(bytes, pos)? != delimiter {
        let (element, consumed) = decode_nested(bytes, pos, depth)?;
        set.push(element);
        pos += consumed;
    }
    Ok((set, pos))
}
