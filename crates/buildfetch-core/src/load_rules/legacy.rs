//! Line-oriented load-rule format (`RootFolderName=<path>` per line).

use super::RuleEntry;
use crate::error::ConfigurationError;

const ROOT_FOLDER_KEY: &str = "RootFolderName";

pub(crate) fn parse(path: &str, content: &str) -> Result<Vec<RuleEntry>, ConfigurationError> {
    let mut rules = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let value = line
            .split_once('=')
            .filter(|(key, _)| key.trim() == ROOT_FOLDER_KEY)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ConfigurationError::InvalidLoadRule {
                path: path.to_string(),
                reason: format!("line {}: expected {ROOT_FOLDER_KEY}=<path>", idx + 1),
            })?;
        rules.push(RuleEntry {
            component: None,
            path: value.to_string(),
        });
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blanks() {
        let rules = parse("r", "# header\n\nRootFolderName=/src\nRootFolderName = docs \n").unwrap();
        let paths: Vec<_> = rules.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/src", "docs"]);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = parse("r", "Folder=/src").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
