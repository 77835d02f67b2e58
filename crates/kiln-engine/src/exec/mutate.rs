//! UPDATE and DELETE.
//!
//! Both run a positions kernel over every page, then rewrite and recompile
//! only the pages that had matches. The scan finishes, and every page is
//! unloaded, before the first rewrite. The rewritten pages are committed
//! together: if one fails to compile, none changes.

use tracing::info;

use kiln_sql::parser::{DeleteStatement, UpdateStatement};
use kiln_sql::{Validator, Value};
use kiln_storage::{PageEdit, PageStore};

use super::Executor;
use crate::error::EngineResult;
use crate::result::QueryResult;

impl Executor<'_> {
    pub(super) fn update(&mut self, update: &UpdateStatement) -> EngineResult<QueryResult> {
        let schema = self.schema(&update.table.table)?;
        let validator = Validator::new(&schema);
        let assignments = validator.validate_assignments(&update.assignments, &update.table)?;
        let spec = validator.validate_filter(&update.table, update.where_clause.as_ref())?;

        let store = self.page_store(&schema);
        let matches = self.locate(&store, &spec)?;

        let edits: Vec<(usize, Vec<PageEdit>)> = matches
            .into_iter()
            .map(|(page, hits)| {
                let page_edits = hits
                    .into_iter()
                    .map(|(pos, row)| {
                        let mut values = row.into_values();
                        for (index, value) in &assignments {
                            if let Some(slot) = values.get_mut(*index) {
                                *slot = value.clone();
                            }
                        }
                        PageEdit::Replace(pos, values)
                    })
                    .collect();
                (page, page_edits)
            })
            .collect();
        let (affected, pages) = apply(&store, &edits)?;

        if affected > 0 {
            if let Some((key_index, _)) = schema.primary_key() {
                let assigned = assignments.iter().find(|(index, _)| *index == key_index);
                if let Some((_, Value::Int(key))) = assigned {
                    self.catalog.observe_key(&schema.name, i64::from(*key))?;
                }
            }
            self.catalog.mark_indexes_stale(&schema.name)?;
            self.catalog.save()?;
        }

        info!(table = %schema.name, rows = affected, pages = ?pages, "Updated rows");
        Ok(QueryResult::affected(affected))
    }

    pub(super) fn delete(&mut self, delete: &DeleteStatement) -> EngineResult<QueryResult> {
        let schema = self.schema(&delete.table.table)?;
        let spec =
            Validator::new(&schema).validate_filter(&delete.table, delete.where_clause.as_ref())?;

        let store = self.page_store(&schema);
        let matches = self.locate(&store, &spec)?;

        let edits: Vec<(usize, Vec<PageEdit>)> = matches
            .into_iter()
            .map(|(page, hits)| {
                let page_edits = hits
                    .into_iter()
                    .map(|(pos, _)| PageEdit::Remove(pos))
                    .collect();
                (page, page_edits)
            })
            .collect();
        let (affected, pages) = apply(&store, &edits)?;

        if affected > 0 {
            self.catalog.mark_indexes_stale(&schema.name)?;
            self.catalog.save()?;
        }

        info!(table = %schema.name, rows = affected, pages = ?pages, "Deleted rows");
        Ok(QueryResult::affected(affected))
    }
}

/// Rewrites every edited page in one commit. Returns the number of edited
/// records and the rewritten pages.
fn apply(
    store: &PageStore<'_>,
    edits: &[(usize, Vec<PageEdit>)],
) -> EngineResult<(usize, Vec<usize>)> {
    if edits.is_empty() {
        return Ok((0, Vec::new()));
    }
    store.rewrite_pages(edits)?;
    let affected = edits.iter().map(|(_, page_edits)| page_edits.len()).sum();
    Ok((affected, edits.iter().map(|(page, _)| *page).collect()))
}
