use super::LicenseDetector;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

/// Minimum share of a license's marker phrases that must be present
const MIN_CONFIDENCE: f32 = 0.6;

/// Distinctive phrases of each recognized license, lowercase and with single
/// spaces. More specific licenses come first.
const LICENSE_MARKERS: &[(&str, &[&str])] = &[
    (
        "AGPL-3.0",
        &["gnu affero general public license", "version 3", "network server"],
    ),
    (
        "LGPL-3.0",
        &["gnu lesser general public license", "version 3", "29 june 2007"],
    ),
    (
        "GPL-3.0",
        &[
            "gnu general public license",
            "version 3, 29 june 2007",
            "the gnu general public license is a free, copyleft license",
        ],
    ),
    (
        "GPL-2.0",
        &["gnu general public license", "version 2, june 1991", "51 franklin street"],
    ),
    (
        "Apache-2.0",
        &[
            "apache license",
            "version 2.0, january 2004",
            "http://www.apache.org/licenses/",
            "grant of patent license",
        ],
    ),
    (
        "MPL-2.0",
        &["mozilla public license version 2.0", "covered software", "larger work"],
    ),
    (
        "MIT",
        &[
            "permission is hereby granted, free of charge",
            "the above copyright notice and this permission notice shall be included",
            "the software is provided \"as is\"",
        ],
    ),
    (
        "ISC",
        &[
            "permission to use, copy, modify, and/or distribute this software for any purpose",
            "the software is provided \"as is\" and the author disclaims all warranties",
        ],
    ),
    (
        "BSD-3-Clause",
        &[
            "redistribution and use in source and binary forms",
            "neither the name of",
            "this software is provided by the copyright holders and contributors \"as is\"",
        ],
    ),
    (
        "BSD-2-Clause",
        &[
            "redistribution and use in source and binary forms",
            "redistributions in binary form must reproduce",
            "this software is provided by the copyright holders and contributors \"as is\"",
        ],
    ),
    (
        "Unlicense",
        &[
            "this is free and unencumbered software released into the public domain",
            "http://unlicense.org",
        ],
    ),
];

/// [`LicenseDetector`] matching marker phrases in top-level license files
#[derive(Debug, Clone)]
pub struct KeywordLicenseDetector {
    file_name: Regex,
}

impl KeywordLicenseDetector {
    pub fn new() -> Self {
        Self {
            file_name: Regex::new(r"(?i)^(un)?(licen[cs]e|copying)([.-][\w.-]+)?$")
                .expect("license file pattern is valid"),
        }
    }

    /// Whether `name` looks like a license file
    pub fn is_license_file(&self, name: &str) -> bool {
        self.file_name.is_match(name)
    }
}

impl Default for KeywordLicenseDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LicenseDetector for KeywordLicenseDetector {
    fn detect_license(&self, dir: &Path) -> Result<BTreeMap<String, f32>> {
        let mut found: BTreeMap<String, f32> = BTreeMap::new();

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Unable to read {}", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !self.is_license_file(name) || !entry.file_type()?.is_file() {
                continue;
            }

            let content = std::fs::read(entry.path())
                .with_context(|| format!("Unable to read {}", name))?;
            for (license, confidence) in match_licenses(&String::from_utf8_lossy(&content)) {
                let best = found.entry(license.to_string()).or_default();
                *best = best.max(confidence);
            }
        }

        Ok(found)
    }
}

/// Score every known license against `text`
pub fn match_licenses(text: &str) -> Vec<(&'static str, f32)> {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    LICENSE_MARKERS
        .iter()
        .filter_map(|(license, markers)| {
            let matched = markers.iter().filter(|m| normalized.contains(*m)).count();
            let confidence = matched as f32 / markers.len() as f32;
            (confidence >= MIN_CONFIDENCE).then_some((*license, confidence))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MIT: &str = "MIT License\n\nCopyright (c) 2018 someone\n\n\
        Permission is hereby granted, free of charge, to any person obtaining a copy\n\
        of this software...\n\n\
        The above copyright notice and this permission notice shall be included in all\n\
        copies or substantial portions of the Software.\n\n\
        THE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND.\n";

    #[test]
    fn test_license_file_names() {
        let detector = KeywordLicenseDetector::new();
        for name in [
            "LICENSE",
            "license.md",
            "LICENCE.txt",
            "COPYING",
            "UNLICENSE",
            "LICENSE-MIT",
        ] {
            assert!(detector.is_license_file(name), "{}", name);
        }
        for name in ["README.md", "src", "licenses.rs.bak", "MY_LICENSE"] {
            assert!(!detector.is_license_file(name), "{}", name);
        }
    }

    #[test]
    fn test_match_mit_across_line_breaks() {
        let matches = match_licenses(MIT);
        assert_eq!(matches, vec![("MIT", 1.0)]);
    }

    #[test]
    fn test_no_match_on_unrelated_text() {
        assert!(match_licenses("All rights reserved.").is_empty());
    }

    #[test]
    fn test_detect_license_in_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("LICENSE"), MIT).unwrap();
        std::fs::write(
            dir.path().join("README.md"),
            "permission is hereby granted, free of charge",
        )
        .unwrap();

        let license = KeywordLicenseDetector::new().detect_license(dir.path()).unwrap();
        assert_eq!(license.len(), 1);
        assert_eq!(license["MIT"], 1.0);
    }

    #[test]
    fn test_detect_license_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(KeywordLicenseDetector::new().detect_license(dir.path()).unwrap().is_empty());
    }
}
