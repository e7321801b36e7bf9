//! Chooses between a primary-id scan, one secondary index, or a full scan,
//! and assembles the iterator pipeline for it.

use std::sync::Arc;

use crate::context::QueryContext;
use crate::encoding::{self, Value};
use crate::errors::DbError;
use crate::index::Index;
use crate::iterator::{
    FetchIterator, IndexIterator, LimitIterator, ProjectIterator, ScanIterator, SortIterator,
    UniqueIterator, ValueIterator,
};
use crate::query::telemetry::{self, PlanKind};
use crate::query::{Bounds, Query, SortField};

/// Field name of the primary key.
pub const ID_FIELD: &str = "id";

/// Added to the weight of the index a query names as its hint.
const HINT_BONUS: f64 = 10_000.0;

struct Candidate<'i> {
    index: &'i Index,
    bounds: Bounds,
    weight: f64,
    reverse: bool,
    exact_sort: bool,
}

/// Builds the pipeline for `query` over `indexes`, wrapped for paging and
/// projection when the query asks for them, and logs the decision.
///
/// # Errors
/// Returns a storage or stats error raised while reading index statistics.
pub fn plan<'a>(
    ctx: &QueryContext<'a>,
    query: &Query,
    indexes: &[Index],
) -> Result<Box<dyn ValueIterator + 'a>, DbError> {
    let (mut iter, kind) = choose(ctx, query, indexes)?;
    if query.limit.is_some() || query.skip > 0 {
        iter = Box::new(LimitIterator::new(iter, query.skip, query.limit));
    }
    if let Some(projection) = &query.projection {
        iter = Box::new(ProjectIterator::new(iter, Arc::clone(projection)));
    }
    telemetry::log_plan(ctx.data_ns.name(), kind, &iter.to_string(), &query.filter.to_string());
    Ok(iter)
}

fn choose<'a>(
    ctx: &QueryContext<'a>,
    query: &Query,
    indexes: &[Index],
) -> Result<(Box<dyn ValueIterator + 'a>, PlanKind), DbError> {
    let sort_fields = query.sort_fields();
    if let Some(iter) = id_scan(ctx, query, sort_fields) {
        return Ok((iter, PlanKind::IdScan));
    }
    let Some(best) = candidates(ctx, query, indexes, sort_fields)?.into_iter().next() else {
        let scan = ScanIterator::new(ctx.clone(), Arc::clone(&query.filter), Bounds::new(), false);
        let iter = with_sort(ctx, query, Box::new(scan), !sort_fields.is_empty());
        return Ok((iter, PlanKind::FullScan));
    };
    let index = best.index;
    let entries =
        IndexIterator::new(ctx.txn, index.namespace(), index.name(), best.bounds, best.reverse);
    let ids = UniqueIterator::new(Box::new(entries));
    let fetch = FetchIterator::new(ctx.clone(), Box::new(ids), Arc::clone(&query.filter));
    let needs_sort = !sort_fields.is_empty() && !best.exact_sort;
    Ok((with_sort(ctx, query, Box::new(fetch), needs_sort), PlanKind::Index))
}

fn with_sort<'a>(
    ctx: &QueryContext<'a>,
    query: &Query,
    iter: Box<dyn ValueIterator + 'a>,
    needed: bool,
) -> Box<dyn ValueIterator + 'a> {
    match (&query.sort, needed) {
        (Some(sort), true) => Box::new(SortIterator::new(ctx.clone(), iter, Arc::clone(sort))),
        _ => iter,
    }
}

/// Scans the primary rows directly when the filter bounds the id or the
/// sort starts with it, unless the hint names a secondary index.
fn id_scan<'a>(
    ctx: &QueryContext<'a>,
    query: &Query,
    sort_fields: &[SortField],
) -> Option<Box<dyn ValueIterator + 'a>> {
    if query.hint.as_deref().is_some_and(|h| h != ID_FIELD) {
        return None;
    }
    let bounds = query.filter.index_bounds_for(ID_FIELD, false);
    let sort_by_id = sort_fields.first().is_some_and(|f| f.field == ID_FIELD);
    if bounds.is_none() && !sort_by_id {
        return None;
    }
    let reverse = sort_by_id && sort_fields[0].reverse();
    let scan = ScanIterator::new(
        ctx.clone(),
        Arc::clone(&query.filter),
        bounds.unwrap_or_default(),
        reverse,
    );
    let needs_sort = if sort_by_id { sort_fields.len() > 1 } else { !sort_fields.is_empty() };
    Some(with_sort(ctx, query, Box::new(scan), needs_sort))
}

fn candidates<'i>(
    ctx: &QueryContext<'_>,
    query: &Query,
    indexes: &'i [Index],
    sort_fields: &[SortField],
) -> Result<Vec<Candidate<'i>>, DbError> {
    let null = encoding::encode(&Value::Null);
    let hint = query.hint.as_deref();
    let mut out: Vec<Candidate<'i>> = Vec::new();
    let mut multikey = Vec::with_capacity(indexes.len());
    for index in indexes {
        let stats = index.stats(ctx.txn)?;
        multikey.push(stats.multikey);
        let Some(bounds) = query.filter.index_bounds_for(&index.fields()[0], stats.multikey) else {
            continue;
        };
        // a sparse index only holds documents whose field is present
        if index.is_sparse() && (bounds.is_empty() || bounds.contains(&null)) {
            continue;
        }
        out.push(Candidate {
            index,
            bounds,
            weight: weight(index, stats.selectivity(), hint),
            reverse: false,
            exact_sort: false,
        });
    }

    if !sort_fields.is_empty() {
        for (index, &multikey) in indexes.iter().zip(&multikey) {
            // entries of array fields are ordered by element, not by the whole value
            if multikey {
                continue;
            }
            let matched = sort_prefix_len(sort_fields, index.fields());
            if matched == 0 {
                continue;
            }
            let reverse = sort_fields[0].reverse();
            let exact_sort = matched == sort_fields.len();
            if let Some(c) = out.iter_mut().find(|c| std::ptr::eq(c.index, index)) {
                c.reverse = reverse;
                c.exact_sort = exact_sort;
                continue;
            }
            if index.is_sparse() {
                continue;
            }
            let stats = index.stats(ctx.txn)?;
            out.push(Candidate {
                index,
                bounds: Bounds::new(),
                weight: weight(index, stats.selectivity(), hint),
                reverse,
                exact_sort,
            });
        }
    }

    // stable: equal weights keep declaration order
    out.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    Ok(out)
}

fn weight(index: &Index, selectivity: f64, hint: Option<&str>) -> f64 {
    if hint == Some(index.name()) { selectivity + HINT_BONUS } else { selectivity }
}

/// Number of leading sort fields that the index fields repeat in order,
/// all sharing the first field's direction.
fn sort_prefix_len(sort_fields: &[SortField], index_fields: &[String]) -> usize {
    let Some(first) = sort_fields.first() else {
        return 0;
    };
    sort_fields
        .iter()
        .zip(index_fields)
        .take_while(|(s, f)| s.field == **f && s.reverse() == first.reverse())
        .count()
}
