use super::{HeadFile, LanguageDetector};
use crate::types::LanguageUsage;
use std::collections::BTreeMap;
use std::path::Path;

/// Bytes inspected when deciding whether content is binary
const BINARY_PROBE: usize = 8000;

/// Comment markers of a language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentSyntax {
    pub line: &'static [&'static str],
    pub block: Option<(&'static str, &'static str)>,
}

const C_STYLE: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: Some(("/*", "*/")),
};
const HASH: CommentSyntax = CommentSyntax {
    line: &["#"],
    block: None,
};
const NONE: CommentSyntax = CommentSyntax {
    line: &[],
    block: None,
};

/// Detect the language of a file from its name
pub fn detect_language(path: &str) -> Option<&'static str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name {
        "Makefile" | "GNUmakefile" | "makefile" => return Some("Makefile"),
        "Dockerfile" => return Some("Dockerfile"),
        "CMakeLists.txt" => return Some("CMake"),
        _ => {}
    }

    let extension = Path::new(name).extension()?.to_str()?;
    let lang = match extension.to_lowercase().as_str() {
        "rs" => "Rust",
        "py" => "Python",
        "js" | "mjs" | "cjs" | "jsx" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "java" => "Java",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => "C++",
        "c" | "h" => "C",
        "cs" => "C#",
        "go" => "Go",
        "rb" => "Ruby",
        "php" => "PHP",
        "swift" => "Swift",
        "kt" | "kts" => "Kotlin",
        "scala" => "Scala",
        "sh" | "bash" => "Shell",
        "sql" => "SQL",
        "pl" | "pm" => "Perl",
        "lua" => "Lua",
        "hs" => "Haskell",

        "html" | "htm" => "HTML",
        "css" => "CSS",
        "scss" | "sass" => "SCSS",

        "json" => "JSON",
        "yaml" | "yml" => "YAML",
        "toml" => "TOML",
        "xml" => "XML",
        "ini" | "cfg" => "INI",

        "md" | "markdown" => "Markdown",
        "rst" => "reStructuredText",
        "adoc" | "asciidoc" => "AsciiDoc",
        "txt" => "Text",

        _ => return None,
    };

    Some(lang)
}

/// Comment markers used when counting lines of `language`
pub fn comment_syntax(language: &str) -> CommentSyntax {
    match language {
        "Rust" | "JavaScript" | "TypeScript" | "Java" | "C++" | "C" | "C#" | "Go" | "Swift"
        | "Kotlin" | "Scala" | "CSS" | "SCSS" => C_STYLE,
        "PHP" => CommentSyntax {
            line: &["//", "#"],
            block: Some(("/*", "*/")),
        },
        "Python" | "Ruby" | "Shell" | "Perl" | "YAML" | "TOML" | "Makefile" | "Dockerfile"
        | "CMake" => HASH,
        "SQL" | "Haskell" | "Lua" => CommentSyntax {
            line: &["--"],
            block: None,
        },
        "INI" => CommentSyntax {
            line: &[";", "#"],
            block: None,
        },
        "HTML" | "XML" | "Markdown" => CommentSyntax {
            line: &[],
            block: Some(("<!--", "-->")),
        },
        _ => NONE,
    }
}

/// Binary content is never attributed to a language
pub fn is_binary(content: &[u8]) -> bool {
    content[..content.len().min(BINARY_PROBE)].contains(&0)
}

/// [`LanguageDetector`] based on file names and extensions
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionLanguageDetector;

impl LanguageDetector for ExtensionLanguageDetector {
    fn detect_languages(&self, files: &[HeadFile]) -> BTreeMap<String, LanguageUsage> {
        let mut usage: BTreeMap<String, LanguageUsage> = BTreeMap::new();

        for file in files {
            let Some(lang) = detect_language(&file.path) else {
                continue;
            };
            if is_binary(&file.content) {
                continue;
            }

            let report = usage.entry(lang.to_string()).or_default();
            report.files += 1;
            report.bytes += file.content.len() as u64;
            // Lines as separated by '\n', so a trailing newline counts one more
            report.lines += file.content.iter().filter(|&&b| b == b'\n').count() as u64 + 1;
        }

        usage
    }
}
