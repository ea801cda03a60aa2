use super::language::{CommentSyntax, comment_syntax, detect_language, is_binary};
use super::{HeadFile, LineCounter};
use crate::types::LineCounts;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

/// [`LineCounter`] classifying lines with each language's comment markers.
///
/// Files are read back from the materialized directory and counted in
/// parallel.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentAwareLineCounter;

impl LineCounter for CommentAwareLineCounter {
    fn count_lines(&self, dir: &Path, files: &[HeadFile]) -> Result<BTreeMap<String, LineCounts>> {
        files
            .par_iter()
            .filter_map(|file| detect_language(&file.path).map(|lang| (file, lang)))
            .map(|(file, lang)| -> Result<Option<(&'static str, LineCounts)>> {
                let path = dir.join(&file.path);
                let content = std::fs::read(&path)
                    .with_context(|| format!("Can't analyze {}", path.display()))?;
                if is_binary(&content) {
                    return Ok(None);
                }

                let text = String::from_utf8_lossy(&content);
                Ok(Some((lang, count(&text, comment_syntax(lang)))))
            })
            .try_fold(BTreeMap::new, |mut acc, counted| -> Result<_> {
                if let Some((lang, counts)) = counted? {
                    add(&mut acc, lang, counts);
                }
                Ok(acc)
            })
            .try_reduce(BTreeMap::new, |mut left, right| {
                for (lang, counts) in right {
                    add(&mut left, lang, counts);
                }
                Ok(left)
            })
            .map(|counts| {
                counts
                    .into_iter()
                    .map(|(lang, counts)| (lang.to_string(), counts))
                    .collect()
            })
    }
}

fn add(acc: &mut BTreeMap<&'static str, LineCounts>, lang: &'static str, counts: LineCounts) {
    let total = acc.entry(lang).or_default();
    total.blank += counts.blank;
    total.code += counts.code;
    total.comments += counts.comments;
}

/// Classify every line of `text`
pub fn count(text: &str, syntax: CommentSyntax) -> LineCounts {
    let mut counts = LineCounts::default();
    let mut in_block: Option<&str> = None;

    for line in text.lines() {
        let line = line.trim();

        if let Some(end) = in_block {
            counts.comments += 1;
            if line.contains(end) {
                in_block = None;
            }
            continue;
        }

        if line.is_empty() {
            counts.blank += 1;
        } else if syntax.line.iter().any(|prefix| line.starts_with(prefix)) {
            counts.comments += 1;
        } else if let Some((start, end)) = syntax.block
            && line.starts_with(start)
        {
            counts.comments += 1;
            if !line[start.len()..].contains(end) {
                in_block = Some(end);
            }
        } else {
            counts.code += 1;
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::materialize;

    #[test]
    fn test_count_c_style() {
        let text = "// header\n\nfn main() {\n    /* one\n       two */\n    run();\n}\n";
        let counts = count(text, comment_syntax("Rust"));
        assert_eq!(
            counts,
            LineCounts {
                blank: 1,
                code: 3,
                comments: 3,
            }
        );
    }

    #[test]
    fn test_count_single_line_block() {
        let counts = count("/* x */\ncode();\n", comment_syntax("C"));
        assert_eq!(counts.comments, 1);
        assert_eq!(counts.code, 1);
    }

    #[test]
    fn test_count_hash_comments() {
        let counts = count("#!/bin/sh\n# comment\necho hi\n\n", comment_syntax("Shell"));
        assert_eq!(
            counts,
            LineCounts {
                blank: 1,
                code: 1,
                comments: 2,
            }
        );
    }

    #[test]
    fn test_count_lines_over_files() {
        let files: Vec<HeadFile> = (0..20)
            .map(|i| HeadFile {
                path: format!("src/f{}.py", i),
                content: b"# c\nx = 1\n\n".to_vec(),
            })
            .chain(std::iter::once(HeadFile {
                path: "NOTICE".to_string(),
                content: b"unknown\n".to_vec(),
            }))
            .collect();
        let dir = materialize(&files, None).unwrap();

        let counts = CommentAwareLineCounter.count_lines(dir.path(), &files).unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(
            counts["Python"],
            LineCounts {
                blank: 20,
                code: 20,
                comments: 20,
            }
        );
    }

    #[test]
    fn test_count_lines_missing_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let files = vec![HeadFile {
            path: "gone.rs".to_string(),
            content: vec![],
        }];
        assert!(CommentAwareLineCounter.count_lines(dir.path(), &files).is_err());
    }
}
