//! Star counts looked up by repository name

use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::path::Path;

const HTTPS_PREFIX: &str = "https://github.com/";
const GIT_PREFIX: &str = "git://github.com/";
const GIT_SUFFIX: &str = ".git";

/// Stars per `owner/name`
#[derive(Debug, Clone, Default)]
pub struct Stars {
    by_name: HashMap<String, u32>,
}

impl Stars {
    /// Stars of the repository at `url`, 0 when unknown
    pub fn for_url(&self, url: &str) -> u32 {
        let name = trim_repo_url(url);
        if name.is_empty() {
            return 0;
        }
        self.by_name.get(name).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Parse `owner/name stars` lines; comma separated lines are accepted too.
    ///
    /// When `list` is not empty only the repositories it names are kept.
    pub fn parse(content: &str, list: &[String]) -> Result<Self> {
        let wanted: Vec<&str> = list.iter().map(|url| trim_repo_url(url)).collect();

        let mut by_name = HashMap::new();
        for (n, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|f| !f.is_empty());
            let (Some(name), Some(stars)) = (fields.next(), fields.next()) else {
                bail!("line {}: expected `owner/name stars`", n + 1);
            };
            let stars: u32 = stars
                .parse()
                .with_context(|| format!("line {}: invalid star count '{}'", n + 1, stars))?;

            if wanted.is_empty() || wanted.contains(&name) {
                by_name.insert(name.to_string(), stars);
            }
        }

        Ok(Self { by_name })
    }

    pub fn load(path: &Path, list: &[String]) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read stars file {}", path.display()))?;
        let stars = Self::parse(&content, list)
            .with_context(|| format!("Invalid stars file {}", path.display()))?;
        tracing::debug!("Loaded stars of {} repositories", stars.len());
        Ok(stars)
    }
}

/// `owner/name` of a GitHub URL, empty for other hosts
pub fn trim_repo_url(url: &str) -> &str {
    if let Some(name) = url.strip_prefix(HTTPS_PREFIX) {
        name
    } else if let Some(name) = url.strip_prefix(GIT_PREFIX) {
        name.strip_suffix(GIT_SUFFIX).unwrap_or(name)
    } else {
        ""
    }
}
