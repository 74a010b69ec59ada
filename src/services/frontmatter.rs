//! YAML front matter of directory `index.md` files.

use serde::Deserialize;
use thiserror::Error;

/// Settings a directory's index file may carry.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryConfiguration {
    #[serde(default)]
    pub sort_photos_in_chronological_order: bool,
}

#[derive(Debug, Error)]
pub enum FrontMatterError {
    #[error("markdown must start with YAML frontmatter delimiter ---")]
    MissingOpening,
    #[error("missing closing YAML frontmatter delimiter ---")]
    MissingClosing,
    #[error("invalid frontmatter: {0}")]
    Invalid(#[from] serde_yaml::Error),
}

/// Parse and validate the front matter at the top of `markdown`.
///
/// The document must open with `---` and the block ends at the next line
/// starting with `---`. An empty block is valid; unknown fields are not.
pub fn parse_front_matter(markdown: &str) -> Result<DirectoryConfiguration, FrontMatterError> {
    let rest = markdown
        .strip_prefix("---")
        .ok_or(FrontMatterError::MissingOpening)?;
    let (yaml, _) = rest
        .split_once("\n---")
        .ok_or(FrontMatterError::MissingClosing)?;
    let yaml = yaml.strip_prefix('\n').unwrap_or(yaml);

    if yaml.trim().is_empty() {
        return Ok(DirectoryConfiguration::default());
    }
    Ok(serde_yaml::from_str(yaml)?)
}
