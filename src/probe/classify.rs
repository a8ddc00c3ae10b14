//! Turns the raw runner output into something that can be compared and stored.
//!
//! The steps run in a fixed order:
//! 1. every value becomes text (invalid utf-8 is replaced, never an error)
//! 2. the `strace` variant is squeezed down to zlib of its stdout
//! 3. the `" "` variant gets a readable name
//! 4. variants with identical results are folded into one `a, b` entry

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{write::ZlibEncoder, Compression};
use itertools::Itertools;
use serde::{ser::SerializeMap, Serialize, Serializer};
use std::{collections::BTreeMap, io::Write};
use tracing::warn;

use super::raw::RawOutput;

pub const TRACE_VARIANT: &str = "strace";
pub const ERROR_VARIANT: &str = "error";
pub const NO_PARAMETER: &str = "(no parameter)";

/// Variant name the runner uses for "no arguments at all"
const BLANK_VARIANT: &str = " ";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    /// stdout/stderr/return_code and whatever else the runner sent, as text
    Record(BTreeMap<String, String>),
    /// zlib of the trace's stdout
    Trace(Vec<u8>),
    /// A trace variant that had nothing to say
    Empty,
}

impl Entry {
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            Entry::Record(fields) => fields.get(name).map(String::as_str),
            Entry::Trace(_) | Entry::Empty => None,
        }
    }
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Entry::Record(fields) => fields.serialize(serializer),
            Entry::Trace(compressed) => serializer.serialize_str(&STANDARD.encode(compressed)),
            Entry::Empty => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

/// Classified output of one sandbox run, keyed by (possibly merged) variant name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Normalized {
    pub entries: Vec<(String, Entry)>,
}

impl Normalized {
    pub fn get(&self, variant: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|(name, _)| name == variant)
            .map(|(_, entry)| entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }
}

impl Serialize for Normalized {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, entry) in &self.entries {
            map.serialize_entry(name, entry)?;
        }
        map.end()
    }
}

pub fn classify(raw: RawOutput) -> Normalized {
    let mut entries = decode(raw);
    compress_trace(&mut entries);
    name_blank_variant(&mut entries);
    merge_duplicates(&mut entries);
    Normalized { entries }
}

pub fn decode(raw: RawOutput) -> Vec<(String, Entry)> {
    raw.variants
        .into_iter()
        .map(|(variant, record)| {
            let fields = record
                .into_iter()
                .map(|(name, value)| (name, value.to_text()))
                .collect();
            (variant, Entry::Record(fields))
        })
        .collect()
}

/// The trace entry is always there afterwards, empty if there was nothing to keep
pub fn compress_trace(entries: &mut Vec<(String, Entry)>) {
    let position = entries.iter().position(|(name, _)| name == TRACE_VARIANT);

    let stdout = position
        .and_then(|i| entries[i].1.field("stdout"))
        .filter(|stdout| !stdout.is_empty());

    let entry = match stdout.map(zlib) {
        Some(Ok(compressed)) => Entry::Trace(compressed),
        Some(Err(e)) => {
            warn!("could not compress trace: {e}");
            Entry::Empty
        }
        None => Entry::Empty,
    };

    match position {
        Some(i) => entries[i].1 = entry,
        None => entries.push((TRACE_VARIANT.to_string(), entry)),
    }
}

fn zlib(text: &str) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    encoder.finish()
}

/// Renamed entries move to the back, like any other re-inserted key
pub fn name_blank_variant(entries: &mut Vec<(String, Entry)>) {
    if let Some(i) = entries.iter().position(|(name, _)| name == BLANK_VARIANT) {
        let (_, entry) = entries.remove(i);
        entries.retain(|(name, _)| name != NO_PARAMETER);
        entries.push((NO_PARAMETER.to_string(), entry));
    }
}

/// Folds every pair of identical entries until none are left.
///
/// A merge creates a new key, so the scan starts over after each one.
pub fn merge_duplicates(entries: &mut Vec<(String, Entry)>) {
    while let Some((first, second)) = find_duplicate(entries) {
        // second > first, so remove it first to keep `first` valid
        let (second_name, _) = entries.remove(second);
        let (first_name, entry) = entries.remove(first);
        entries.push((format!("{first_name}, {second_name}"), entry));
    }
}

fn find_duplicate(entries: &[(String, Entry)]) -> Option<(usize, usize)> {
    (0..entries.len())
        .tuple_combinations()
        .find(|&(a, b)| entries[a].1 == entries[b].1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::raw::{RawOutput, RawValue};
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    fn record(stdout: &str, stderr: &str, code: &str) -> Entry {
        Entry::Record(BTreeMap::from([
            ("stdout".to_string(), stdout.to_string()),
            ("stderr".to_string(), stderr.to_string()),
            ("return_code".to_string(), code.to_string()),
        ]))
    }

    fn raw(variants: &[(&str, &[u8], &[u8], i64)]) -> RawOutput {
        RawOutput {
            variants: variants
                .iter()
                .map(|(name, stdout, stderr, code)| {
                    (
                        name.to_string(),
                        vec![
                            ("stdout".into(), RawValue::Bytes(stdout.to_vec())),
                            ("stderr".into(), RawValue::Bytes(stderr.to_vec())),
                            ("return_code".into(), RawValue::Other(code.to_string())),
                        ],
                    )
                })
                .collect(),
        }
    }

    fn names(entries: &[(String, Entry)]) -> Vec<&str> {
        entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    #[test]
    fn decodes_lossy() {
        let entries = decode(raw(&[("-h", b"caf\xe9", b"", 0)]));
        assert_eq!(entries[0].1, record("caf\u{fffd}", "", "0"));
    }

    #[test]
    fn trace_compressed() {
        let mut entries = decode(raw(&[("strace", b"execve(...)", b"", 0)]));
        compress_trace(&mut entries);

        let Entry::Trace(compressed) = &entries[0].1 else {
            panic!("not compressed: {:?}", entries[0].1);
        };

        let mut text = String::new();
        ZlibDecoder::new(&compressed[..])
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "execve(...)");
    }

    #[test]
    fn trace_without_output_is_empty() {
        let mut entries = decode(raw(&[("strace", b"", b"oops", 1)]));
        compress_trace(&mut entries);
        assert_eq!(entries, vec![("strace".to_string(), Entry::Empty)]);

        // missing altogether
        let mut entries = decode(raw(&[("-h", b"x", b"", 0)]));
        compress_trace(&mut entries);
        assert_eq!(names(&entries), ["-h", "strace"]);
        assert_eq!(entries[1].1, Entry::Empty);
    }

    #[test]
    fn blank_variant_renamed() {
        let mut entries = vec![
            (" ".to_string(), record("a", "", "0")),
            ("-h".to_string(), record("b", "", "0")),
        ];
        name_blank_variant(&mut entries);
        assert_eq!(names(&entries), ["-h", "(no parameter)"]);
    }

    #[test]
    fn merges_transitively() {
        let same = record("usage", "", "0");
        let mut entries = vec![
            ("-h".to_string(), same.clone()),
            ("--help".to_string(), same.clone()),
            ("-v".to_string(), record("1.0", "", "0")),
            ("help".to_string(), same.clone()),
        ];
        merge_duplicates(&mut entries);

        assert_eq!(names(&entries), ["-v", "help, -h, --help"]);
        assert_eq!(entries[1].1, same);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut entries = vec![
            ("a".to_string(), record("x", "", "0")),
            ("b".to_string(), record("y", "", "1")),
            ("c".to_string(), record("x", "", "0")),
            ("d".to_string(), record("y", "", "1")),
            ("e".to_string(), record("z", "", "0")),
        ];
        merge_duplicates(&mut entries);
        let once = entries.clone();
        merge_duplicates(&mut entries);
        assert_eq!(entries, once);

        // every distinct record ends up exactly once
        assert_eq!(entries.len(), 3);
        for (i, (_, a)) in entries.iter().enumerate() {
            for (_, b) in &entries[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn merge_groups_regardless_of_order() {
        let groups = |mut entries: Vec<(String, Entry)>| {
            merge_duplicates(&mut entries);
            let mut groups: Vec<Vec<String>> = entries
                .iter()
                .map(|(name, _)| name.split(", ").map(str::to_string).sorted().collect())
                .collect();
            groups.sort();
            groups
        };

        let x = record("x", "", "0");
        let y = record("y", "", "0");
        let forward = vec![
            ("a".to_string(), x.clone()),
            ("b".to_string(), y.clone()),
            ("c".to_string(), x.clone()),
        ];
        let backward = forward.iter().cloned().rev().collect();

        assert_eq!(groups(forward), groups(backward));
    }

    #[test]
    fn full_pipeline() {
        let normalized = classify(raw(&[
            (" ", b"hi", b"", 0),
            ("-h", b"hi", b"", 0),
            ("strace", b"write(1, ...)", b"", 0),
        ]));

        assert_eq!(
            normalized.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            ["strace", "-h, (no parameter)"]
        );
        assert!(matches!(normalized.get("strace"), Some(Entry::Trace(_))));

        let json = serde_json::to_value(&normalized).unwrap();
        assert_eq!(json["-h, (no parameter)"]["stdout"], "hi");
        assert!(json["strace"].is_string());
    }

    #[test]
    fn empty_trace_serializes_as_object() {
        let json = serde_json::to_string(&Entry::Empty).unwrap();
        assert_eq!(json, "{}");
    }
}
