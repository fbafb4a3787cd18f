//
// dump.rs
// Dicom-Worklist-rs
//
// Renders a human-readable dump of an encoded file, including sequences, with configurable depth and value previews.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use dicom::core::dictionary::DataDictionary;
use dicom::dictionary_std::StandardDataDictionary;

use crate::dataset::DataSet;
use crate::element::{Tag, Value};
use crate::file::read_file;

/// Print a textual dump of all elements in the file, resolving names via the standard dictionary.
pub fn dump_file(path: &Path, max_depth: usize, max_value_len: usize) -> Result<()> {
    let output = dump_to_string(path, max_depth, max_value_len)?;
    println!("{output}");
    Ok(())
}

pub fn dump_to_string(path: &Path, max_depth: usize, max_value_len: usize) -> Result<String> {
    let file = read_file(path).with_context(|| format!("Failed to decode {}", path.display()))?;
    let mut out = String::new();

    let meta = &file.meta;
    let _ = writeln!(out, "# File Meta Information (group length {:?})", meta.declared_group_length);
    let _ = writeln!(out, "  Media Storage SOP Class UID: {}", meta.meta.media_storage_sop_class_uid);
    let _ = writeln!(out, "  Media Storage SOP Instance UID: {}", meta.meta.media_storage_sop_instance_uid);
    let _ = writeln!(out, "  Transfer Syntax UID: {}", meta.meta.transfer_syntax_uid);
    let _ = writeln!(out, "  Implementation Class UID: {}", meta.meta.implementation_class_uid);
    let _ = writeln!(out, "  Implementation Version Name: {}", meta.meta.implementation_version_name);
    let _ = writeln!(out, "# Data Set");

    dump_data_set(&file.data_set, 0, max_depth, max_value_len, &mut out);
    Ok(out)
}

fn dump_data_set(set: &DataSet, depth: usize, max_depth: usize, max_value_len: usize, out: &mut String) {
    for elem in set {
        let indent = "  ".repeat(depth);
        let name = tag_name(elem.tag);

        match &elem.value {
            Value::Sequence(items) => {
                let _ = writeln!(
                    out,
                    "{}{} {} {} [sequence: {} item(s)]",
                    indent,
                    elem.tag,
                    name,
                    elem.vr,
                    items.len()
                );
                if depth < max_depth {
                    for (idx, item) in items.iter().enumerate() {
                        let _ = writeln!(out, "{}  Item {}", indent, idx + 1);
                        dump_data_set(item, depth + 2, max_depth, max_value_len, out);
                    }
                }
            }
            value => {
                let _ = writeln!(
                    out,
                    "{}{} {} {} {}",
                    indent,
                    elem.tag,
                    name,
                    elem.vr,
                    preview(value, max_value_len)
                );
            }
        }
    }
}

fn preview(value: &Value, max_value_len: usize) -> String {
    match value {
        Value::Text(text) => format!("[{}]", truncate(text, max_value_len)),
        Value::U16(v) => v.to_string(),
        Value::U32(v) => v.to_string(),
        Value::Bytes(bytes) => {
            // Two hex digits per byte.
            let shown = &bytes[..bytes.len().min(max_value_len / 2)];
            let mut text = hex::encode(shown);
            if shown.len() < bytes.len() {
                text.push('…');
            }
            format!("{} bytes {}", bytes.len(), text)
        }
        Value::Sequence(items) => format!("{} item(s)", items.len()),
    }
}

fn truncate(input: &str, limit: usize) -> String {
    match input.char_indices().nth(limit) {
        None => input.to_string(),
        Some((idx, _)) => {
            let mut truncated = input[..idx].to_string();
            truncated.push('…');
            truncated
        }
    }
}

fn tag_name(tag: Tag) -> String {
    StandardDataDictionary
        .by_tag(dicom::core::Tag(tag.group(), tag.element()))
        .map(|e| e.alias.to_string())
        .unwrap_or_else(|| "UnknownTag".to_string())
}
