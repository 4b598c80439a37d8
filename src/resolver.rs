//! Unprocessed-file resolution

use crate::scanner::{ExtensionMatcher, ProcessedFile, SourceFile};

/// Source files with no processed counterpart, in input order
pub fn unprocessed<'a>(
    sources: &'a [SourceFile],
    processed: &[ProcessedFile],
    matcher: &ExtensionMatcher,
) -> Vec<&'a SourceFile> {
    sources
        .iter()
        .filter(|source| !processed.iter().any(|p| matcher.is_handled_by(source, p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchMode;

    fn classify(
        names: &[&str],
        matcher: &ExtensionMatcher,
    ) -> (Vec<SourceFile>, Vec<ProcessedFile>) {
        let mut sources = Vec::new();
        let mut processed = Vec::new();
        for name in names {
            if let Some(p) = matcher.as_processed(name) {
                processed.push(p);
            } else if let Some(s) = matcher.as_source(name) {
                sources.push(s);
            }
        }
        (sources, processed)
    }

    fn resolve(names: &[&str], mode: MatchMode) -> Vec<String> {
        let matcher = ExtensionMatcher::new("mzML", "pep.xml", mode);
        let (sources, processed) = classify(names, &matcher);
        unprocessed(&sources, &processed, &matcher)
            .into_iter()
            .map(|s| s.name.clone())
            .collect()
    }

    #[test]
    fn processed_counterpart_marks_source_handled() {
        for mode in [MatchMode::Suffix, MatchMode::Substring] {
            assert!(resolve(&["a.mzML", "a.pep.xml"], mode).is_empty());
        }
    }

    #[test]
    fn input_order_is_preserved() {
        let out = resolve(&["c.mzML", "a.mzML", "b.mzML", "a.pep.xml"], MatchMode::Suffix);
        assert_eq!(out, ["c.mzML", "b.mzML"]);
    }

    /// Story: legacy substring matching cross-matches overlapping names
    ///
    /// With substring matching, `run1.pep.xml` has base `run1.` which is
    /// contained in `run1.mzML` and `xrun1.mzML` but not in `run10.mzML`.
    /// `sample.pep.xml` (base `sample.`) also swallows
    /// `sample.mzML.backup.mzML`. Suffix mode joins on exact base names.
    #[test]
    fn story_substring_and_suffix_modes_differ_on_overlapping_names() {
        let files = [
            "run1.mzML",
            "run10.mzML",
            "run1.pep.xml",
            "xrun1.mzML",
            "sample.mzML.backup.mzML",
            "sample.pep.xml",
        ];

        let substring = resolve(&files, MatchMode::Substring);
        assert_eq!(substring, ["run10.mzML"]);

        let suffix = resolve(&files, MatchMode::Suffix);
        assert_eq!(suffix, ["run10.mzML", "xrun1.mzML", "sample.mzML.backup.mzML"]);
    }

    /// For every fixture, a file is an unprocessed source iff it contains the
    /// source extension and no processed base name is a substring of it.
    #[test]
    fn substring_classification_matches_its_definition() {
        let fixtures: &[&[&str]] = &[
            &["a.mzML", "a.pep.xml"],
            &["b.mzML"],
            &["ab.mzML", "b.pep.xml", "a.mzML"],
            &["pep.xml", "x.mzML"],
            &["mzML.pep.xml", "q.mzML", "mzML"],
            &["a_b.mzML", "a.pep.xml", "a.b.mzML"],
        ];
        for files in fixtures {
            let matcher = ExtensionMatcher::new("mzML", "pep.xml", MatchMode::Substring);
            let bases: Vec<String> = files
                .iter()
                .filter_map(|f| f.split_once("pep.xml").map(|(b, _)| b.to_string()))
                .filter(|b| !b.is_empty())
                .collect();
            let expected: Vec<String> = files
                .iter()
                .filter(|f| f.contains("mzML") && !f.contains("pep.xml"))
                .filter(|f| !bases.iter().any(|b| f.contains(b.as_str())))
                .map(|f| f.to_string())
                .collect();

            let (sources, processed) = classify(files, &matcher);
            let actual: Vec<String> = unprocessed(&sources, &processed, &matcher)
                .into_iter()
                .map(|s| s.name.clone())
                .collect();
            assert_eq!(actual, expected, "fixture {files:?}");
        }
    }
}
