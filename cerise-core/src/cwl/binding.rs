//! File extraction from CWL input and output bindings

use serde_json::Value;

use super::error::CwlError;
use crate::domain::input_file::{FileId, InputFile, InputFiles};

fn class_of(value: &Value) -> Option<&str> {
    value.get("class").and_then(Value::as_str)
}

fn location_of(value: &Value) -> Result<String, CwlError> {
    value
        .get("location")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CwlError::validation("File object without a location"))
}

/// Parses a `secondaryFiles` list into `files`, recursively.
///
/// Returns the ids of the entries of `secondary_files` itself, in order.
/// Nested lists are handled with an explicit work list, so deeply nested
/// input cannot exhaust the stack.
pub fn get_secondary_files(
    files: &mut InputFiles,
    secondary_files: &Value,
) -> Result<Vec<FileId>, CwlError> {
    let mut top_level = Vec::new();
    let mut pending: Vec<(Option<FileId>, &Value)> = vec![(None, secondary_files)];

    while let Some((parent, list)) = pending.pop() {
        let entries = list
            .as_array()
            .ok_or_else(|| CwlError::validation("secondaryFiles must be an array"))?;

        for entry in entries {
            match class_of(entry) {
                Some("File") => {
                    let id = files.insert(InputFile::new(None, location_of(entry)?, None));
                    match parent {
                        Some(parent) => files.get_mut(parent).secondary_files.push(id),
                        None => top_level.push(id),
                    }
                    if let Some(nested) = entry.get("secondaryFiles") {
                        pending.push((Some(id), nested));
                    }
                }
                Some("Directory") => {
                    return Err(CwlError::Unsupported(
                        "Directory inputs are not yet supported".to_string(),
                    ));
                }
                _ => {
                    return Err(CwlError::validation(
                        "invalid secondaryFiles entry: must be a File or a Directory",
                    ));
                }
            }
        }
    }

    Ok(top_level)
}

/// Extracts all Files from a CWL binding.
///
/// Top-level File values become roots named after their key. Array values
/// are scanned and every File element becomes a root carrying its position
/// as `index`. Anything that is not a File is skipped; this does not check
/// the binding for general CWL correctness.
pub fn get_files_from_binding(cwl_binding: &Value) -> Result<InputFiles, CwlError> {
    let mut files = InputFiles::new();

    let Some(binding) = cwl_binding.as_object() else {
        return Ok(files);
    };

    for (name, value) in binding {
        match value {
            Value::Object(_) if class_of(value) == Some("File") => {
                add_file(&mut files, name, value, None)?;
            }
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    if class_of(item) == Some("File") {
                        add_file(&mut files, name, item, Some(index))?;
                    }
                }
            }
            _ => {}
        }
    }

    debug_assert!(files.is_well_formed());
    Ok(files)
}

fn add_file(
    files: &mut InputFiles,
    name: &str,
    value: &Value,
    index: Option<usize>,
) -> Result<(), CwlError> {
    let root = files.push_root(InputFile::new(
        Some(name.to_string()),
        location_of(value)?,
        index,
    ));
    if let Some(secondary) = value.get("secondaryFiles") {
        let children = get_secondary_files(files, secondary)?;
        files.get_mut(root).secondary_files = children;
    }
    Ok(())
}

/// Locates every file of `files` in the binding it was extracted from.
///
/// Returns a JSON pointer per file, walking each top-level file and its
/// secondary files depth-first. This is the order in which files are
/// staged, and the pointers let callers rewrite exactly the right entry,
/// array slot included.
pub fn json_pointers(files: &InputFiles) -> Result<Vec<(FileId, String)>, CwlError> {
    let mut pointers = Vec::with_capacity(files.len());

    for root in files.roots() {
        let file = files.get(*root);
        let name = file
            .name
            .as_deref()
            .ok_or_else(|| CwlError::validation("top-level file without a binding name"))?;
        let escaped = name.replace('~', "~0").replace('/', "~1");
        let base = match file.index {
            Some(index) => format!("/{}/{}", escaped, index),
            None => format!("/{}", escaped),
        };

        let mut stack = vec![(*root, base)];
        while let Some((id, pointer)) = stack.pop() {
            for (i, child) in files.get(id).secondary_files.iter().enumerate().rev() {
                stack.push((*child, format!("{}/secondaryFiles/{}", pointer, i)));
            }
            pointers.push((id, pointer));
        }
    }

    Ok(pointers)
}
