//! Change Report Builder: raw accept outcome to [`ChangeReport`].

use std::collections::BTreeMap;
use tracing::debug;

use buildfetch_scm::{AcceptOutcome, ItemId, RawChangeSet, RawVersionableChange};

use super::model::{ChangeDesc, ChangeReport, ChangeSetEntry, ComponentChangeEntry, ModificationKind};

/// Change sets touching more versionables than this are truncated.
pub const TOO_MANY_CHANGES_THRESHOLD: usize = 256;

/// Path recorded when the server could not resolve one.
pub const UNKNOWN_PATH: &str = "<unknown>";

/// A versionable after folding all of its changes in one change set.
struct Folded {
    item_id: ItemId,
    before_path: Option<String>,
    after_path: Option<String>,
    before_state: Option<String>,
    after_state: Option<String>,
}

/// Fold repeated entries for one versionable: the first before side and
/// the last after side survive.
fn fold_changes(changes: &[RawVersionableChange]) -> Vec<Folded> {
    let mut folded: Vec<Folded> = Vec::new();
    for change in changes {
        match folded.iter_mut().find(|f| f.item_id == change.item_id) {
            Some(existing) => {
                existing.after_path = change.after_path.clone();
                existing.after_state = change.after_state.clone();
            }
            None => folded.push(Folded {
                item_id: change.item_id.clone(),
                before_path: change.before_path.clone(),
                after_path: change.after_path.clone(),
                before_state: change.before_state.clone(),
                after_state: change.after_state.clone(),
            }),
        }
    }
    folded
}

fn describe(folded: Folded) -> Option<ChangeDesc> {
    let path = folded
        .after_path
        .clone()
        .or_else(|| folded.before_path.clone())
        .unwrap_or_else(|| UNKNOWN_PATH.to_string());

    let (kind, state_id) = match (&folded.before_state, &folded.after_state) {
        // Added then deleted: nothing left to report.
        (None, None) => return None,
        (Some(before), Some(after)) if before == after => (ModificationKind::NoChanges, None),
        (None, Some(after)) => (ModificationKind::Added, Some(after.clone())),
        (Some(before), None) => (ModificationKind::Deleted, Some(before.clone())),
        (Some(_), Some(after)) => {
            let moved = matches!(
                (&folded.before_path, &folded.after_path),
                (Some(b), Some(a)) if b != a
            );
            let kind = if moved {
                ModificationKind::ModifiedAndMoved
            } else {
                ModificationKind::Modified
            };
            (kind, Some(after.clone()))
        }
    };

    Some(ChangeDesc {
        path,
        item_id: folded.item_id,
        state_id,
        kind,
    })
}

/// Convert one raw change set, truncating oversized ones.
pub fn change_set_entry(raw: &RawChangeSet) -> ChangeSetEntry {
    let affected: Vec<ChangeDesc> = fold_changes(&raw.changes)
        .into_iter()
        .filter_map(describe)
        .collect();
    let change_count = affected.len();
    let is_too_many_changes = change_count > TOO_MANY_CHANGES_THRESHOLD;

    let mut work_items = raw.work_items.iter().cloned();
    let work_item = work_items.next();

    ChangeSetEntry {
        change_set_id: raw.item_id.clone(),
        component_id: raw.component.item_id.clone(),
        component_name: raw.component.name.clone(),
        comment: raw.comment.clone(),
        timestamp: raw.timestamp,
        affected_versionables: if is_too_many_changes {
            Vec::new()
        } else {
            affected
        },
        work_item,
        additional_work_items: work_items.collect(),
        is_too_many_changes,
        change_count,
    }
}

fn group_by_component(change_sets: &[RawChangeSet]) -> BTreeMap<ItemId, Vec<ChangeSetEntry>> {
    let mut grouped: BTreeMap<ItemId, Vec<ChangeSetEntry>> = BTreeMap::new();
    for raw in change_sets {
        grouped
            .entry(raw.component.item_id.clone())
            .or_default()
            .push(change_set_entry(raw));
    }
    grouped
}

/// Build the report for one run.
///
/// A personal build reports no change sets, no component changes and no
/// baseline: it loads a private state, not a delta from the previous build.
pub fn build_report(
    workspace_item_id: &ItemId,
    outcome: &AcceptOutcome,
    personal_build: bool,
) -> ChangeReport {
    let mut report = ChangeReport::empty(workspace_item_id.clone(), personal_build);
    if personal_build {
        return report;
    }
    if let Some(baseline) = &outcome.baseline {
        report.baseline_set_item_id = Some(baseline.item_id.clone());
        report.baseline_set_name = Some(baseline.name.clone());
    }

    report.component_changes = outcome
        .component_changes
        .iter()
        .map(|cc| ComponentChangeEntry {
            item_id: cc.component.item_id.clone(),
            name: cc.component.name.clone(),
            action: cc.action,
        })
        .collect();
    report.change_sets_accepted = group_by_component(&outcome.accepted);
    report.change_sets_discarded = group_by_component(&outcome.discarded);

    debug!(
        accepted = report.accepted_count(),
        discarded = report.discarded_count(),
        component_changes = report.component_change_count(),
        "Built change report"
    );
    report
}
