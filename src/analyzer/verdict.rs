use serde::Serialize;
use std::collections::BTreeMap;

use super::{ArchResult, FileResult};
use crate::{
    arch::Arch,
    probe::classify::{Entry, ERROR_VARIANT, TRACE_VARIANT},
};

pub const EXECUTABLE: &str = "executable";

/// Shown on the analyzed object when any of its files ran
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub name: &'static str,
    pub value: &'static str,
    pub color: &'static str,
    /// Also show it on every container above
    pub propagate: bool,
}

pub const EXECUTABLE_TAG: Tag = Tag {
    name: "qemu_exec",
    value: "QEMU executable",
    color: "blue",
    propagate: true,
};

/// Some architecture produced output for some variant without obviously failing.
///
/// An architecture whose results carry an `error` entry doesn't count at all.
pub fn is_executable(results: &BTreeMap<Arch, ArchResult>) -> bool {
    results
        .values()
        .filter_map(|result| match result {
            ArchResult::Completed(normalized) => Some(normalized),
            ArchResult::Failed { .. } => None,
        })
        .filter(|normalized| normalized.get(ERROR_VARIANT).is_none())
        .flat_map(|normalized| normalized.iter())
        .filter(|(variant, _)| !matches!(*variant, TRACE_VARIANT | ERROR_VARIANT))
        .any(|(_, entry)| output_without_error(entry))
}

/// Non-empty stdout, and either a clean exit or nothing on stderr.
/// Missing fields never count.
fn output_without_error(entry: &Entry) -> bool {
    match entry.field("stdout") {
        Some(stdout) if !stdout.is_empty() => {}
        _ => return false,
    }

    match entry.field("return_code") {
        None => false,
        Some("0") => true,
        Some(_) => entry.field("stderr") == Some(""),
    }
}

pub fn summarize(files: &BTreeMap<String, FileResult>) -> Vec<String> {
    if files.values().any(|file| file.executable) {
        vec![EXECUTABLE.to_string()]
    } else {
        vec![]
    }
}

pub fn tag(files: &BTreeMap<String, FileResult>) -> Option<Tag> {
    files
        .values()
        .any(|file| file.executable)
        .then_some(EXECUTABLE_TAG)
}

#[cfg(test)]
mod tests {
    use super::{is_executable, output_without_error, summarize, tag, EXECUTABLE_TAG};
    use crate::{
        analyzer::{ArchResult, FileResult},
        arch::Arch,
        probe::{
            classify::{Entry, Normalized},
            ErrorMarker,
        },
    };
    use std::collections::BTreeMap;

    fn record(fields: &[(&str, &str)]) -> Entry {
        Entry::Record(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn run(stdout: &str, stderr: &str, code: &str) -> Entry {
        record(&[("stdout", stdout), ("stderr", stderr), ("return_code", code)])
    }

    fn completed(entries: Vec<(&str, Entry)>) -> ArchResult {
        ArchResult::Completed(Normalized {
            entries: entries
                .into_iter()
                .map(|(name, entry)| (name.to_string(), entry))
                .collect(),
        })
    }

    fn single(arch: Arch, result: ArchResult) -> BTreeMap<Arch, ArchResult> {
        BTreeMap::from([(arch, result)])
    }

    #[test]
    fn output_rules() {
        assert!(!output_without_error(&run("", "", "0")));
        assert!(output_without_error(&run("hi", "", "1")));
        assert!(!output_without_error(&run("hi", "boom", "1")));
        assert!(output_without_error(&run("hi", "boom", "0")));
    }

    #[test]
    fn missing_fields() {
        assert!(!output_without_error(&record(&[])));
        assert!(!output_without_error(&record(&[("stdout", "hi"), ("stderr", "")])));
        assert!(output_without_error(&record(&[("stdout", "hi"), ("return_code", "0")])));
        assert!(!output_without_error(&record(&[("stdout", "hi"), ("return_code", "1")])));
        assert!(!output_without_error(&Entry::Empty));
    }

    #[test]
    fn error_marker_never_executable() {
        let results = single(
            Arch::Arm,
            ArchResult::Failed {
                error: ErrorMarker::Timeout,
            },
        );
        assert!(!is_executable(&results));
    }

    #[test]
    fn trace_is_ignored() {
        let results = single(
            Arch::Arm,
            completed(vec![
                ("strace", run("execve", "", "0")),
                ("-h", run("", "", "0")),
            ]),
        );
        assert!(!is_executable(&results));
    }

    #[test]
    fn error_variant_discards_its_arch() {
        let results = single(
            Arch::Mips,
            completed(vec![
                ("error", record(&[("stdout", "")])),
                ("-h", run("usage", "", "0")),
            ]),
        );
        assert!(!is_executable(&results));
    }

    #[test]
    fn one_good_arch_is_enough() {
        let mut results = single(
            Arch::Arm,
            ArchResult::Failed {
                error: ErrorMarker::Timeout,
            },
        );
        results.insert(
            Arch::Armeb,
            completed(vec![("-h, --help", run("usage", "", "1"))]),
        );
        assert!(is_executable(&results));
    }

    #[test]
    fn summary_and_tag() {
        let file = |executable| FileResult {
            path: "/bin/busybox".into(),
            results: BTreeMap::new(),
            executable,
        };

        let files = BTreeMap::from([("a".to_string(), file(false))]);
        assert!(summarize(&files).is_empty());
        assert_eq!(tag(&files), None);

        let files = BTreeMap::from([
            ("a".to_string(), file(false)),
            ("b".to_string(), file(true)),
        ]);
        assert_eq!(summarize(&files), ["executable"]);
        assert_eq!(tag(&files), Some(EXECUTABLE_TAG));
    }
}
