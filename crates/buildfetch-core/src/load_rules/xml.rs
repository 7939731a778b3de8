//! XML load-rule format.
//!
//! ```xml
//! <scm:sourceControlLoadRule version="1" xmlns:scm="http://com.ibm.team.scm">
//!   <parentLoadRule>
//!     <component name="component1"/>
//!     <parentFolder repositoryPath="/src"/>
//!   </parentLoadRule>
//! </scm:sourceControlLoadRule>
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use buildfetch_scm::ItemId;

use super::{ComponentRef, RuleEntry};
use crate::error::ConfigurationError;

const ROOT: &[u8] = b"sourceControlLoadRule";
const RULE: &[u8] = b"parentLoadRule";

fn invalid(path: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidLoadRule {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8], path: &str) -> Result<Option<String>, ConfigurationError> {
    for a in e.attributes() {
        let a = a.map_err(|err| invalid(path, err.to_string()))?;
        if a.key.local_name().as_ref() == key {
            let value = a
                .unescape_value()
                .map_err(|err| invalid(path, err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[derive(Default)]
struct PartialRule {
    component: Option<ComponentRef>,
    path: Option<String>,
}

/// Parse the rules of one XML load-rule file.
pub(crate) fn parse(path: &str, content: &str) -> Result<Vec<RuleEntry>, ConfigurationError> {
    let content = content.trim_start_matches('\u{feff}');
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut seen_root = false;
    let mut current: Option<PartialRule> = None;
    let mut rules = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|err| invalid(path, err.to_string()))?;
        match event {
            Event::Eof => break,
            Event::Empty(e) if seen_root && e.local_name().as_ref() == RULE => continue,
            Event::Start(e) | Event::Empty(e) => {
                let name = e.local_name();
                let name = name.as_ref();
                if !seen_root {
                    if name != ROOT {
                        return Err(invalid(
                            path,
                            format!(
                                "root element must be sourceControlLoadRule, found {}",
                                String::from_utf8_lossy(name)
                            ),
                        ));
                    }
                    seen_root = true;
                    continue;
                }
                match name {
                    RULE => current = Some(PartialRule::default()),
                    b"component" => {
                        let rule = current
                            .as_mut()
                            .ok_or_else(|| invalid(path, "component outside parentLoadRule"))?;
                        rule.component = if let Some(id) = attr(&e, b"itemId", path)? {
                            Some(ComponentRef::ItemId(ItemId(id)))
                        } else if let Some(name) = attr(&e, b"name", path)? {
                            Some(ComponentRef::Name(name))
                        } else {
                            return Err(invalid(path, "component needs a name or itemId"));
                        };
                    }
                    b"parentFolder" | b"item" => {
                        let rule = current.as_mut().ok_or_else(|| {
                            invalid(path, "parentFolder or item outside parentLoadRule")
                        })?;
                        let repo_path = attr(&e, b"repositoryPath", path)?
                            .ok_or_else(|| invalid(path, "missing repositoryPath"))?;
                        rule.path = Some(repo_path);
                    }
                    _ => {}
                }
            }
            Event::End(e) if e.local_name().as_ref() == RULE => {
                let rule = current
                    .take()
                    .ok_or_else(|| invalid(path, "unbalanced parentLoadRule"))?;
                let rule_path = rule
                    .path
                    .ok_or_else(|| invalid(path, "parentLoadRule selects no parentFolder or item"))?;
                rules.push(RuleEntry {
                    component: rule.component,
                    path: rule_path,
                });
            }
            _ => {}
        }
    }

    if !seen_root {
        return Err(invalid(path, "document is empty"));
    }
    Ok(rules)
}
