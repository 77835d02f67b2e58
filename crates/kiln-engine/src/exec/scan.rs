//! SELECT and the shared kernel scan loop.

use tracing::debug;

use kiln_common::COUNT_COLUMN;
use kiln_sql::parser::SelectStatement;
use kiln_sql::{KernelGenerator, KernelSpec, Projection, Row, Validator, Value};
use kiln_storage::{ArtifactId, BuildPipeline, KernelModule, OutputBuffer, PageModule, PageStore};

use super::Executor;
use crate::error::EngineResult;
use crate::result::{QueryResult, ResultSchema, RowFormat};

/// Generates, builds and loads the kernel for `spec`, then calls `visit`
/// for each page in order until it returns false. Pages whose module is
/// missing are recompiled first.
///
/// Each page is unloaded right after its visit and the kernel is unloaded
/// before returning, on success and on error.
fn run_kernel<F>(
    store: &PageStore<'_>,
    pipeline: &BuildPipeline,
    spec: &KernelSpec,
    mut visit: F,
) -> EngineResult<()>
where
    F: FnMut(usize, &PageModule, &KernelModule) -> EngineResult<bool>,
{
    let generated = KernelGenerator::new(store.schema()).generate(spec)?;
    store.ensure_header()?;
    let id = ArtifactId::kernel(&generated.table, &generated.name);
    let path = pipeline.build(&id, &generated.source)?;
    let kernel = KernelModule::open(&path, &generated.name)?;

    let outcome = visit_pages(store, &kernel, &mut visit);
    let unloaded = kernel.unload();
    outcome?;
    unloaded?;
    Ok(())
}

fn visit_pages<F>(store: &PageStore<'_>, kernel: &KernelModule, visit: &mut F) -> EngineResult<()>
where
    F: FnMut(usize, &PageModule, &KernelModule) -> EngineResult<bool>,
{
    for n in store.ensure_compiled()? {
        let Some(page) = store.open_page(n)? else {
            break;
        };
        let more = visit(n, &page, kernel);
        page.unload()?;
        if !more? {
            break;
        }
    }
    Ok(())
}

impl Executor<'_> {
    pub(super) fn select(&mut self, select: &SelectStatement) -> EngineResult<QueryResult> {
        let schema = self.schema(&select.from.table)?;
        let spec = Validator::new(&schema).validate_select(select)?;
        let store = self.page_store(&schema);

        let result_schema = ResultSchema::from_columns(spec.result_columns(&schema));
        let row_format = match spec.projection {
            Projection::All => RowFormat::DirectRecordPointer,
            _ => RowFormat::PointerArrayOfFields,
        };
        let layout = spec.result_layout(&schema);

        if let Projection::Count { .. } = spec.projection {
            let mut out = OutputBuffer::new(layout, 1);
            let mut total = 0usize;
            run_kernel(&store, self.pipeline, &spec, |_, page, kernel| {
                total += kernel.invoke(page, &mut out, 0, 1);
                Ok(true)
            })?;
            debug!(table = %schema.name, column = COUNT_COLUMN, total, "Counted");
            let count = i32::try_from(total).unwrap_or(i32::MAX);
            return Ok(QueryResult::ok(
                result_schema,
                vec![Row::new(vec![Value::Int(count)])],
                row_format,
            ));
        }

        let capacity = match spec.limit {
            Some(limit) => usize::try_from(limit)
                .unwrap_or(usize::MAX)
                .min(self.config.max_result_rows),
            None => self.config.max_result_rows,
        };
        if capacity == 0 {
            return Ok(QueryResult::ok(result_schema, Vec::new(), row_format));
        }

        let mut out = OutputBuffer::new(layout, capacity);
        let mut filled = 0usize;
        run_kernel(&store, self.pipeline, &spec, |n, page, kernel| {
            let room = capacity - filled;
            let matched = kernel.invoke(page, &mut out, filled, room);
            filled += matched.min(room);
            debug!(table = %schema.name, page = n, matched, "Scanned page");
            Ok(filled < capacity)
        })?;

        let rows = (0..filled)
            .filter_map(|i| out.record(i))
            .map(|record| record.to_row())
            .collect();
        Ok(QueryResult::ok(result_schema, rows, row_format))
    }

    /// Matching records per page, as `(page, [(position, row)])`. Pages
    /// without matches are omitted. Every module is unloaded on return.
    pub(super) fn locate(
        &self,
        store: &PageStore<'_>,
        spec: &KernelSpec,
    ) -> EngineResult<Vec<(usize, Vec<(usize, Row)>)>> {
        let layout = spec.result_layout(store.schema());
        let mut found = Vec::new();

        run_kernel(store, self.pipeline, spec, |n, page, kernel| {
            let count = page.count();
            let mut out = OutputBuffer::new(layout.clone(), count);
            let matched = kernel.invoke(page, &mut out, 0, count).min(count);

            let hits: Vec<(usize, Row)> = (0..matched)
                .filter_map(|i| out.record(i)?.int(0))
                .filter_map(|pos| usize::try_from(pos).ok())
                .filter_map(|pos| Some((pos, page.read(pos)?.to_row())))
                .collect();
            if !hits.is_empty() {
                found.push((n, hits));
            }
            Ok(true)
        })?;
        Ok(found)
    }
}
