//! Load-rule source resolution: read, classify and gate the configured files.

use tracing::{debug, info};

use buildfetch_scm::{ComponentDescriptor, ScmConnector, ServerVersion, SourceHandle};

use super::{LoadRuleFile, LoadRuleFormat, LoadRuleReference, LoadRuleScope};
use crate::components::find_component_by_name;
use crate::config::{LoadPolicy, LoadRuleFileSpec};
use crate::error::{ConfigurationError, Result};

/// First server/toolkit version that can load only rule-covered components.
pub const LOAD_RULES_MINIMUM_VERSION: &str = "6.0.3";

pub fn minimum_load_rules_version() -> ServerVersion {
    ServerVersion::new(&[6, 0, 3])
}

pub fn supports_load_rule_only_mode(version: &ServerVersion) -> bool {
    *version >= minimum_load_rules_version()
}

/// XML when the first non-blank character is `<`, line-oriented otherwise.
pub fn detect_format(content: &str) -> LoadRuleFormat {
    let body = content.trim_start_matches('\u{feff}').trim_start();
    if body.starts_with('<') {
        LoadRuleFormat::XmlPerComponent
    } else {
        LoadRuleFormat::LegacyLineOriented
    }
}

/// Check a classified reference against the selected policy.
///
/// Under `useLoadRules` the rules must come from a single XML file and the
/// server must support loading rule-covered components only. Other
/// policies accept both formats and any number of files.
pub fn validate_reference(
    policy: Option<LoadPolicy>,
    reference: Option<&LoadRuleReference>,
    supports_load_rule_only_mode: bool,
) -> std::result::Result<(), ConfigurationError> {
    if policy != Some(LoadPolicy::UseLoadRules) {
        return Ok(());
    }

    if let Some(reference) = reference {
        if reference.scope == LoadRuleScope::PerComponentMultiple {
            return Err(ConfigurationError::MultipleLoadRuleFiles {
                count: reference.files.len(),
            });
        }
        if reference.format == LoadRuleFormat::LegacyLineOriented {
            let path = reference
                .files
                .iter()
                .find(|f| f.format == LoadRuleFormat::LegacyLineOriented)
                .map(|f| f.spec.to_string())
                .unwrap_or_default();
            return Err(ConfigurationError::LoadRulesNotXml { path });
        }
    }

    if !supports_load_rule_only_mode {
        return Err(ConfigurationError::UnsupportedServerVersion {
            required: LOAD_RULES_MINIMUM_VERSION.to_string(),
            actual: String::new(),
        });
    }
    Ok(())
}

async fn read_rule_file(
    connector: &dyn ScmConnector,
    source: &SourceHandle,
    components: &[ComponentDescriptor],
    spec: &LoadRuleFileSpec,
) -> Result<LoadRuleFile> {
    let (component_name, path) = spec.location()?;
    let owner = find_component_by_name(components, &component_name)?
        .ok_or(ConfigurationError::ComponentNotFound {
            name: component_name.clone(),
        })?
        .clone();
    let content = connector.read_file(source, &owner.item_id, &path).await?;
    let format = detect_format(&content);
    debug!(file = %spec, format = ?format, "Read load rule file");
    Ok(LoadRuleFile {
        spec: spec.clone(),
        owner,
        format,
        content,
    })
}

/// Checks that need only the configuration and the server version.
///
/// Runs before any rule file is read, so a file that cannot be read never
/// hides a file-count or server-version rejection.
pub fn gate_before_read(
    policy: Option<LoadPolicy>,
    file_count: usize,
    server_version: &ServerVersion,
) -> std::result::Result<(), ConfigurationError> {
    if policy != Some(LoadPolicy::UseLoadRules) {
        return Ok(());
    }
    if file_count > 1 {
        return Err(ConfigurationError::MultipleLoadRuleFiles { count: file_count });
    }
    if !supports_load_rule_only_mode(server_version) {
        return Err(ConfigurationError::UnsupportedServerVersion {
            required: LOAD_RULES_MINIMUM_VERSION.to_string(),
            actual: server_version.to_string(),
        });
    }
    Ok(())
}

/// Read the configured rule files and validate them for `policy`.
///
/// Returns `None` when no rule files are configured.
pub async fn resolve_load_rule_source(
    connector: &dyn ScmConnector,
    source: &SourceHandle,
    components: &[ComponentDescriptor],
    specs: &[LoadRuleFileSpec],
    policy: Option<LoadPolicy>,
    server_version: &ServerVersion,
) -> Result<Option<LoadRuleReference>> {
    gate_before_read(policy, specs.len(), server_version)?;

    let mut files = Vec::with_capacity(specs.len());
    for spec in specs {
        files.push(read_rule_file(connector, source, components, spec).await?);
    }
    let reference = LoadRuleReference::classify(files);

    // Only the format is left to check once the content is known.
    validate_reference(policy, reference.as_ref(), true)?;

    if let Some(reference) = &reference {
        info!(
            files = reference.files.len(),
            format = ?reference.format,
            scope = ?reference.scope,
            "Resolved load rule source"
        );
    }
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(formats: &[LoadRuleFormat]) -> LoadRuleReference {
        let files = formats
            .iter()
            .enumerate()
            .map(|(idx, format)| LoadRuleFile {
                spec: LoadRuleFileSpec::new(&format!("c{idx}"), "r.loadrule"),
                owner: ComponentDescriptor::new(format!("_c{idx}"), format!("c{idx}")),
                format: *format,
                content: String::new(),
            })
            .collect();
        LoadRuleReference::classify(files).unwrap()
    }

    #[test]
    fn detects_xml_with_bom_and_whitespace() {
        assert_eq!(
            detect_format("\u{feff}\n  <sourceControlLoadRule/>"),
            LoadRuleFormat::XmlPerComponent
        );
        assert_eq!(
            detect_format("RootFolderName=/src"),
            LoadRuleFormat::LegacyLineOriented
        );
    }

    #[test]
    fn minimum_version_gate() {
        assert!(supports_load_rule_only_mode(&"6.0.3".parse().unwrap()));
        assert!(supports_load_rule_only_mode(&"7.0".parse().unwrap()));
        assert!(!supports_load_rule_only_mode(&"6.0.2".parse().unwrap()));
    }

    #[test]
    fn use_load_rules_rejects_multiple_files() {
        let r = reference(&[LoadRuleFormat::XmlPerComponent, LoadRuleFormat::XmlPerComponent]);
        let err = validate_reference(Some(LoadPolicy::UseLoadRules), Some(&r), true).unwrap_err();
        assert!(err
            .to_string()
            .contains("multiple load rule files, one per component, is not supported"));
    }

    #[test]
    fn use_load_rules_rejects_legacy_format() {
        let r = reference(&[LoadRuleFormat::LegacyLineOriented]);
        let err = validate_reference(Some(LoadPolicy::UseLoadRules), Some(&r), true).unwrap_err();
        assert!(err
            .to_string()
            .contains("load rules are not provided in XML format"));
    }

    #[test]
    fn use_load_rules_requires_server_support() {
        let r = reference(&[LoadRuleFormat::XmlPerComponent]);
        let err = validate_reference(Some(LoadPolicy::UseLoadRules), Some(&r), false).unwrap_err();
        assert!(err.to_string().contains(LOAD_RULES_MINIMUM_VERSION));
        // Gated even when no file is configured.
        assert!(validate_reference(Some(LoadPolicy::UseLoadRules), None, false).is_err());
    }

    #[test]
    fn gate_before_read_counts_files_then_checks_version() {
        let old: ServerVersion = "6.0.2".parse().unwrap();
        let new: ServerVersion = "6.0.6".parse().unwrap();
        let policy = Some(LoadPolicy::UseLoadRules);
        assert!(matches!(
            gate_before_read(policy, 2, &old),
            Err(ConfigurationError::MultipleLoadRuleFiles { count: 2 })
        ));
        match gate_before_read(policy, 1, &old) {
            Err(ConfigurationError::UnsupportedServerVersion { required, actual }) => {
                assert_eq!(required, "6.0.3");
                assert_eq!(actual, "6.0.2");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(gate_before_read(policy, 1, &new).is_ok());
        assert!(gate_before_read(None, 3, &old).is_ok());
        assert!(gate_before_read(Some(LoadPolicy::UseComponentLoadConfig), 3, &old).is_ok());
    }

    #[test]
    fn other_policies_accept_everything() {
        let r = reference(&[LoadRuleFormat::LegacyLineOriented, LoadRuleFormat::XmlPerComponent]);
        for policy in [None, Some(LoadPolicy::UseComponentLoadConfig)] {
            assert!(validate_reference(policy, Some(&r), false).is_ok());
        }
    }
}
