//! Destination path templates.
//!
//! The destination of a saved file is described by a template such as
//! `{dir}/{channel}/{topic}/{start} {title}{ext}`. Every show field is
//! available as a placeholder; field values are sanitized so a hostile
//! catalog value cannot escape the target directory.

use crate::durations;
use crate::error::{Error, Result};
use crate::types::ShowRecord;
use std::path::{Path, PathBuf};

/// Replace path separators and characters illegal in file names with `_`.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

/// Resolve a single placeholder name to its value.
fn placeholder(name: &str, dir: &Path, show: &ShowRecord, filename: &str, ext: &str) -> Option<String> {
    let value = match name {
        "dir" => return Some(dir.to_string_lossy().into_owned()),
        "filename" => filename.to_string(),
        "ext" => return Some(ext.to_string()),
        "date" => show.start.format("%Y-%m-%d").to_string(),
        "time" => show.start.format("%H-%M").to_string(),
        "hash" => show.hash.clone(),
        "channel" => show.channel.clone(),
        "topic" => show.topic.clone(),
        "title" => show.title.clone(),
        "description" => show.description.clone(),
        "region" => show.region.clone(),
        "website" => show.website.clone(),
        "size" => show.size.to_string(),
        "start" => show.start.format("%Y-%m-%d %H-%M-%S").to_string(),
        "duration" => durations::format(show.duration),
        "age" => durations::format(show.age),
        "url" => show.url.clone(),
        _ => return None,
    };
    Some(sanitize(&value))
}

/// Expand a destination template for one show.
///
/// `filename` and `ext` describe the retrieved file; `ext` keeps its
/// leading dot. Unknown placeholders are a configuration error.
pub fn render(
    template: &str,
    dir: &Path,
    show: &ShowRecord,
    filename: &str,
    ext: &str,
) -> Result<PathBuf> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let name: String = chars
            .by_ref()
            .take_while(|(_, c)| *c != '}')
            .map(|(_, c)| c)
            .collect();
        match placeholder(&name, dir, show, filename, ext) {
            Some(value) => out.push_str(&value),
            None => {
                return Err(Error::config(
                    format!("unknown target placeholder at offset {pos}"),
                    format!("{{{name}}}"),
                ));
            }
        }
    }
    Ok(PathBuf::from(out))
}

/// Move a finished file to its destination, creating missing parent
/// directories first.
pub fn place(source: &Path, destination: &Path) -> std::io::Result<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(source, destination)
}
