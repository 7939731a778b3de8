//! Change Report Reader: persisted document back to [`ChangeReport`].

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::path::Path;

use buildfetch_scm::{ComponentAction, ItemId, WorkItemDesc};

use super::model::{ChangeDesc, ChangeReport, ChangeSetEntry, ComponentChangeEntry};
use super::{ChangeLogError, FORMAT_VERSION};

type Attrs = BTreeMap<String, String>;

fn malformed(msg: impl Into<String>) -> ChangeLogError {
    ChangeLogError::Malformed(msg.into())
}

/// Unescaped attributes keyed by local name.
fn attributes(e: &BytesStart<'_>) -> Result<Attrs, ChangeLogError> {
    let mut attrs = Attrs::new();
    for a in e.attributes() {
        let a = a?;
        let key = String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned();
        let value = a
            .unescape_value()
            .map_err(|err| malformed(format!("attribute {key}: {err}")))?;
        attrs.insert(key, value.into_owned());
    }
    Ok(attrs)
}

fn required<'a>(attrs: &'a Attrs, key: &str, element: &str) -> Result<&'a str, ChangeLogError> {
    attrs
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| malformed(format!("<{element}> is missing '{key}'")))
}

fn flag(attrs: &Attrs, key: &str, element: &str) -> Result<bool, ChangeLogError> {
    match attrs.get(key).map(String::as_str) {
        None => Ok(false),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(malformed(format!(
            "<{element}> has non-boolean {key}=\"{other}\""
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    ComponentChanges,
    Accepted,
    Discarded,
}

#[derive(Default)]
struct Cursor {
    component: Option<(ItemId, String)>,
    change_set: Option<ChangeSetEntry>,
}

fn open_report(attrs: &Attrs) -> Result<ChangeReport, ChangeLogError> {
    if let Some(version) = attrs.get("version") {
        if version.parse::<u32>().ok() != Some(FORMAT_VERSION) {
            return Err(malformed(format!("unsupported change log version {version}")));
        }
    }
    let mut report = ChangeReport::empty(
        ItemId::from(required(attrs, "workspaceItemId", "changelog")?),
        flag(attrs, "personalBuild", "changelog")?,
    );
    report.baseline_set_item_id = attrs.get("baselineSetItemId").map(|s| ItemId::from(s.as_str()));
    report.baseline_set_name = attrs.get("baselineSetName").cloned();
    Ok(report)
}

fn component_change(attrs: &Attrs) -> Result<ComponentChangeEntry, ChangeLogError> {
    let action = match required(attrs, "action", "component")? {
        "add" => ComponentAction::Add,
        "drop" => ComponentAction::Drop,
        other => return Err(malformed(format!("unknown component action '{other}'"))),
    };
    Ok(ComponentChangeEntry {
        item_id: ItemId::from(required(attrs, "itemId", "component")?),
        name: attrs.get("name").cloned().unwrap_or_default(),
        action,
    })
}

fn open_change_set(attrs: &Attrs, cursor: &Cursor) -> Result<ChangeSetEntry, ChangeLogError> {
    let (component_id, component_name) = cursor
        .component
        .clone()
        .ok_or_else(|| malformed("<changeSet> outside <component>"))?;
    let date = required(attrs, "date", "changeSet")?;
    let timestamp = DateTime::parse_from_rfc3339(date)
        .map_err(|err| malformed(format!("bad changeSet date '{date}': {err}")))?
        .with_timezone(&Utc);
    let change_count = match attrs.get("changeCount") {
        Some(n) => n
            .parse::<usize>()
            .map_err(|_| malformed(format!("bad changeCount '{n}'")))?,
        None => 0,
    };
    Ok(ChangeSetEntry {
        change_set_id: ItemId::from(required(attrs, "itemId", "changeSet")?),
        component_id,
        component_name,
        comment: attrs.get("comment").cloned(),
        timestamp,
        affected_versionables: Vec::new(),
        work_item: None,
        additional_work_items: Vec::new(),
        is_too_many_changes: flag(attrs, "tooManyChanges", "changeSet")?,
        change_count,
    })
}

fn change_desc(attrs: &Attrs) -> Result<ChangeDesc, ChangeLogError> {
    let kind = required(attrs, "kind", "change")?
        .parse()
        .map_err(ChangeLogError::Malformed)?;
    Ok(ChangeDesc {
        path: required(attrs, "path", "change")?.to_string(),
        item_id: ItemId::from(required(attrs, "itemId", "change")?),
        state_id: attrs.get("stateId").cloned(),
        kind,
    })
}

/// Parse a change-log document.
pub fn read_change_log(xml: &str) -> Result<ChangeReport, ChangeLogError> {
    let mut reader = Reader::from_str(xml.trim_start_matches('\u{feff}'));
    reader.config_mut().trim_text(true);

    let mut report: Option<ChangeReport> = None;
    let mut section = Section::Outside;
    let mut cursor = Cursor::default();

    loop {
        let (e, empty) = match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"changeSet" => {
                        let cs = cursor
                            .change_set
                            .take()
                            .ok_or_else(|| malformed("unbalanced </changeSet>"))?;
                        push_change_set(report.as_mut(), section, cs)?;
                    }
                    b"component" => cursor.component = None,
                    b"componentChanges" | b"accepted" | b"discarded" => {
                        section = Section::Outside
                    }
                    _ => {}
                }
                continue;
            }
            _ => continue,
        };

        let attrs = attributes(&e)?;
        match (e.local_name().as_ref(), section) {
            (b"changelog", _) => report = Some(open_report(&attrs)?),
            (b"componentChanges", _) if !empty => section = Section::ComponentChanges,
            (b"accepted", _) if !empty => section = Section::Accepted,
            (b"discarded", _) if !empty => section = Section::Discarded,
            (b"component", Section::ComponentChanges) => {
                let entry = component_change(&attrs)?;
                report
                    .as_mut()
                    .ok_or_else(|| malformed("<component> before <changelog>"))?
                    .component_changes
                    .push(entry);
            }
            (b"component", Section::Accepted | Section::Discarded) => {
                let item_id = ItemId::from(required(&attrs, "itemId", "component")?);
                sets_mut(report.as_mut(), section)?
                    .entry(item_id.clone())
                    .or_default();
                if !empty {
                    let name = attrs.get("name").cloned().unwrap_or_default();
                    cursor.component = Some((item_id, name));
                }
            }
            (b"changeSet", Section::Accepted | Section::Discarded) => {
                let cs = open_change_set(&attrs, &cursor)?;
                if empty {
                    push_change_set(report.as_mut(), section, cs)?;
                } else {
                    cursor.change_set = Some(cs);
                }
            }
            (b"change", _) => {
                let desc = change_desc(&attrs)?;
                cursor
                    .change_set
                    .as_mut()
                    .ok_or_else(|| malformed("<change> outside <changeSet>"))?
                    .affected_versionables
                    .push(desc);
            }
            (b"workItem", _) => {
                let item = WorkItemDesc {
                    number: required(&attrs, "number", "workItem")?.to_string(),
                    summary: attrs.get("summary").cloned().unwrap_or_default(),
                };
                let primary = flag(&attrs, "primary", "workItem")?;
                let cs = cursor
                    .change_set
                    .as_mut()
                    .ok_or_else(|| malformed("<workItem> outside <changeSet>"))?;
                if primary && cs.work_item.is_none() {
                    cs.work_item = Some(item);
                } else {
                    cs.additional_work_items.push(item);
                }
            }
            _ => {}
        }
    }

    if cursor.change_set.is_some() {
        return Err(malformed("unterminated <changeSet>"));
    }
    report.ok_or_else(|| malformed("missing <changelog> root element"))
}

fn sets_mut(
    report: Option<&mut ChangeReport>,
    section: Section,
) -> Result<&mut BTreeMap<ItemId, Vec<ChangeSetEntry>>, ChangeLogError> {
    let report = report.ok_or_else(|| malformed("change sets before <changelog>"))?;
    match section {
        Section::Accepted => Ok(&mut report.change_sets_accepted),
        Section::Discarded => Ok(&mut report.change_sets_discarded),
        _ => Err(malformed("change set outside <accepted> or <discarded>")),
    }
}

fn push_change_set(
    report: Option<&mut ChangeReport>,
    section: Section,
    mut cs: ChangeSetEntry,
) -> Result<(), ChangeLogError> {
    if !cs.is_too_many_changes && cs.change_count < cs.affected_versionables.len() {
        cs.change_count = cs.affected_versionables.len();
    }
    sets_mut(report, section)?
        .entry(cs.component_id.clone())
        .or_default()
        .push(cs);
    Ok(())
}

/// Read a change-log document from disk.
pub async fn read_change_log_file(path: &Path) -> Result<ChangeReport, ChangeLogError> {
    let xml = tokio::fs::read_to_string(path).await?;
    read_change_log(&xml)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_minimal_document() {
        let report = read_change_log(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<changelog version="1" workspaceItemId="_ws" personalBuild="false">
  <componentChanges>
    <component itemId="_c9" name="lib &amp; tools" action="drop"/>
  </componentChanges>
  <accepted>
    <component itemId="_c1" name="component1">
      <changeSet itemId="_cs1" comment="line1&#10;line2" date="2024-03-01T12:00:00Z" tooManyChanges="false" changeCount="1">
        <change kind="No changes" path="&lt;unknown&gt;" itemId="_v1"/>
      </changeSet>
    </component>
  </accepted>
  <discarded/>
</changelog>"#,
        )
        .unwrap();
        assert_eq!(report.workspace_item_id.as_str(), "_ws");
        assert_eq!(report.component_changes[0].name, "lib & tools");
        assert_eq!(report.component_changes[0].action, ComponentAction::Drop);
        let cs = &report.change_sets_accepted[&ItemId::from("_c1")][0];
        assert_eq!(cs.comment.as_deref(), Some("line1\nline2"));
        assert_eq!(cs.component_name, "component1");
        assert_eq!(cs.affected_versionables[0].path, "<unknown>");
        assert_eq!(cs.affected_versionables[0].state_id, None);
        assert_eq!(report.discarded_count(), 0);
    }

    #[test]
    fn rejects_change_outside_change_set() {
        let err = read_change_log(
            r#"<changelog workspaceItemId="_ws"><accepted><component itemId="_c1" name="c"><change kind="Added" path="a" itemId="_v"/></component></accepted></changelog>"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("outside <changeSet>"));
    }

    #[test]
    fn rejects_missing_root() {
        assert!(read_change_log("").is_err());
        assert!(read_change_log(r#"<changelog version="2" workspaceItemId="_ws"/>"#).is_err());
    }
}
