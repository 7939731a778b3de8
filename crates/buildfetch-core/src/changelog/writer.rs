//! Persisted change-log document writer.

use chrono::SecondsFormat;
use std::fmt::Write;
use std::path::Path;

use super::model::{ChangeReport, ChangeSetEntry};
use super::{ChangeLogError, FORMAT_VERSION};
use buildfetch_scm::{ItemId, WorkItemDesc};

/// Escape text for use inside a double-quoted attribute.
///
/// Line breaks and tabs become character references so attribute value
/// normalisation cannot alter them on read.
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            other => out.push(other),
        }
    }
    out
}

fn write_work_item(xml: &mut String, item: &WorkItemDesc, primary: bool) -> std::fmt::Result {
    writeln!(
        xml,
        r#"        <workItem number="{}" summary="{}" primary="{}"/>"#,
        xml_escape(&item.number),
        xml_escape(&item.summary),
        primary
    )
}

fn write_change_set(xml: &mut String, cs: &ChangeSetEntry) -> std::fmt::Result {
    write!(xml, r#"      <changeSet itemId="{}""#, xml_escape(cs.change_set_id.as_str()))?;
    if let Some(comment) = &cs.comment {
        write!(xml, r#" comment="{}""#, xml_escape(comment))?;
    }
    write!(
        xml,
        r#" date="{}" tooManyChanges="{}" changeCount="{}""#,
        cs.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        cs.is_too_many_changes,
        cs.change_count
    )?;
    if let Some(message) = cs.summary_message() {
        write!(xml, r#" message="{}""#, xml_escape(&message))?;
    }

    if cs.affected_versionables.is_empty()
        && cs.work_item.is_none()
        && cs.additional_work_items.is_empty()
    {
        return writeln!(xml, "/>");
    }
    writeln!(xml, ">")?;

    for change in &cs.affected_versionables {
        write!(
            xml,
            r#"        <change kind="{}" path="{}" itemId="{}""#,
            change.kind,
            xml_escape(&change.path),
            xml_escape(change.item_id.as_str())
        )?;
        if let Some(state) = &change.state_id {
            write!(xml, r#" stateId="{}""#, xml_escape(state))?;
        }
        writeln!(xml, "/>")?;
    }
    if let Some(item) = &cs.work_item {
        write_work_item(xml, item, true)?;
    }
    for item in &cs.additional_work_items {
        write_work_item(xml, item, false)?;
    }
    writeln!(xml, "      </changeSet>")
}

fn write_section(
    xml: &mut String,
    tag: &str,
    sets: &std::collections::BTreeMap<ItemId, Vec<ChangeSetEntry>>,
) -> std::fmt::Result {
    if sets.is_empty() {
        return writeln!(xml, "  <{tag}/>");
    }
    writeln!(xml, "  <{tag}>")?;
    for (component_id, entries) in sets {
        let name = entries
            .first()
            .map(|cs| cs.component_name.as_str())
            .unwrap_or_default();
        writeln!(
            xml,
            r#"    <component itemId="{}" name="{}">"#,
            xml_escape(component_id.as_str()),
            xml_escape(name)
        )?;
        for cs in entries {
            write_change_set(xml, cs)?;
        }
        writeln!(xml, "    </component>")?;
    }
    writeln!(xml, "  </{tag}>")
}

/// Serialize a report to the change-log document.
pub fn write_change_log(report: &ChangeReport) -> Result<String, ChangeLogError> {
    let mut xml = String::new();
    writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    write!(
        xml,
        r#"<changelog version="{FORMAT_VERSION}" workspaceItemId="{}""#,
        xml_escape(report.workspace_item_id.as_str())
    )?;
    if let Some(id) = &report.baseline_set_item_id {
        write!(xml, r#" baselineSetItemId="{}""#, xml_escape(id.as_str()))?;
    }
    if let Some(name) = &report.baseline_set_name {
        write!(xml, r#" baselineSetName="{}""#, xml_escape(name))?;
    }
    writeln!(
        xml,
        r#" personalBuild="{}" changesAccepted="{}" changesDiscarded="{}" componentChanges="{}">"#,
        report.personal_build,
        report.accepted_count(),
        report.discarded_count(),
        report.component_change_count()
    )?;

    if report.component_changes.is_empty() {
        writeln!(xml, "  <componentChanges/>")?;
    } else {
        writeln!(xml, "  <componentChanges>")?;
        for cc in &report.component_changes {
            writeln!(
                xml,
                r#"    <component itemId="{}" name="{}" action="{}"/>"#,
                xml_escape(cc.item_id.as_str()),
                xml_escape(&cc.name),
                cc.action.as_str()
            )?;
        }
        writeln!(xml, "  </componentChanges>")?;
    }

    write_section(&mut xml, "accepted", &report.change_sets_accepted)?;
    write_section(&mut xml, "discarded", &report.change_sets_discarded)?;
    writeln!(xml, "</changelog>")?;
    Ok(xml)
}

/// Write the change-log document to `path`.
pub async fn write_change_log_file(report: &ChangeReport, path: &Path) -> Result<(), ChangeLogError> {
    let xml = write_change_log(report)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, xml).await?;
    Ok(())
}
