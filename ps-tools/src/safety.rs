//! Test-artifact classification.
//!
//! Test and e2e code never explains a runtime regression, so it is excluded from
//! listings and whole-change diffs, and flagged when requested by name.

const TEST_DIR_SEGMENTS: &[&str] = &["test", "tests", "testdata", "e2e"];
const TEST_FILE_SUFFIXES: &[&str] = &["_test.go", "_test.py", "_test.js", "_test.ts"];

pub const TEST_FILE_WARNING: &str = "NOTE: This is a test/e2e file. Changes to test files do NOT affect runtime\n\
performance of production components. Do not attribute performance regressions\n\
to test file changes.\n\n";

pub fn is_test_artifact(path: &str) -> bool {
    let path = path.trim().trim_start_matches("./");
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(file_name) = segments.pop() else {
        return false;
    };
    if segments.iter().any(|s| TEST_DIR_SEGMENTS.contains(s)) {
        return true;
    }
    TEST_FILE_SUFFIXES.iter().any(|suffix| file_name.ends_with(suffix))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredDiff {
    pub text: String,
    pub skipped_files: usize,
}

/// Drop every `diff --git` section whose file is a test artifact.
pub fn filter_test_hunks(diff: &str) -> FilteredDiff {
    let mut text = String::with_capacity(diff.len());
    let mut skipped_files = 0usize;

    for section in split_file_sections(diff) {
        if section.trim().is_empty() {
            continue;
        }
        let header = section.lines().next().unwrap_or_default();
        let is_test = header_paths(header).iter().any(|p| is_test_artifact(p));
        if is_test {
            skipped_files += 1;
            continue;
        }
        text.push_str(section);
    }

    if skipped_files > 0 {
        tracing::info!(skipped_files, "filtered test files from diff");
    }
    FilteredDiff {
        text,
        skipped_files,
    }
}

/// Split a unified diff at each line that starts with `diff --git `.
fn split_file_sections(diff: &str) -> Vec<&str> {
    let mut starts: Vec<usize> = Vec::new();
    let mut offset = 0usize;
    for line in diff.split_inclusive('\n') {
        if line.starts_with("diff --git ") {
            starts.push(offset);
        }
        offset += line.len();
    }
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }
    starts.push(diff.len());
    starts.windows(2).map(|w| &diff[w[0]..w[1]]).collect()
}

/// `diff --git a/x/y.go b/x/y.go` → `["x/y.go", "x/y.go"]`.
fn header_paths(header: &str) -> Vec<&str> {
    let Some(rest) = header.strip_prefix("diff --git ") else {
        return Vec::new();
    };
    rest.split_whitespace()
        .map(|p| {
            p.strip_prefix("a/")
                .or_else(|| p.strip_prefix("b/"))
                .unwrap_or(p)
        })
        .collect()
}

/// Prefix the warning when `path` is a test artifact.
pub fn annotate_if_test(path: &str, text: String) -> String {
    if is_test_artifact(path) {
        return format!("{TEST_FILE_WARNING}{text}");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_directory_segments_and_suffixes() {
        for path in [
            "test/e2e/util.go",
            "go-controller/pkg/ovn/tests/helpers.go",
            "pkg/testdata/fixture.json",
            "e2e/run.sh",
            "pkg/ovn/controller_test.go",
            "scripts/check_test.py",
            "web/app_test.ts",
        ] {
            assert!(is_test_artifact(path), "{path} should be a test artifact");
        }
    }

    #[test]
    fn production_paths_are_not_test_artifacts() {
        for path in [
            "go-controller/pkg/ovn/controller.go",
            "pkg/testing_utils.go",
            "docs/test.md",
            "cmd/latest/main.go",
            "pkg/contest/handler.go",
            "",
        ] {
            assert!(!is_test_artifact(path), "{path} should be production code");
        }
    }

    #[test]
    fn filter_drops_only_test_sections() {
        let diff = "diff --git a/pkg/a.go b/pkg/a.go\n+prod a\n\
diff --git a/pkg/a_test.go b/pkg/a_test.go\n+test a\n\
diff --git a/test/e2e/b.go b/test/e2e/b.go\n+e2e b\n\
diff --git a/pkg/c.go b/pkg/c.go\n+prod c\n";
        let filtered = filter_test_hunks(diff);
        assert_eq!(filtered.skipped_files, 2);
        assert!(filtered.text.contains("+prod a"));
        assert!(filtered.text.contains("+prod c"));
        assert!(!filtered.text.contains("a_test.go"));
        assert!(!filtered.text.contains("+e2e b"));
    }

    #[test]
    fn filter_of_only_tests_is_empty() {
        let diff = "diff --git a/tests/x.py b/tests/x.py\n+assert True\n";
        let filtered = filter_test_hunks(diff);
        assert!(filtered.text.trim().is_empty());
        assert_eq!(filtered.skipped_files, 1);
    }

    #[test]
    fn annotate_prefixes_warning_for_tests_only() {
        let flagged = annotate_if_test("pkg/x_test.go", "@@ -1 +1 @@".to_string());
        assert!(flagged.starts_with("NOTE: This is a test/e2e file."));
        assert!(flagged.ends_with("@@ -1 +1 @@"));

        let clean = annotate_if_test("pkg/x.go", "@@ -1 +1 @@".to_string());
        assert_eq!(clean, "@@ -1 +1 @@");
    }
}
