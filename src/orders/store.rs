use std::collections::HashSet;

use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::Bool;
use serde::Deserialize;

use crate::models::{CorrectionOrder, NewCorrectionOrder};
use crate::schema::correction_orders;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    New,
    Corrected,
    Problematic,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(skip: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            skip: skip.unwrap_or(0).max(0),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

type OrderPredicate = Box<dyn BoxableExpression<correction_orders::table, Pg, SqlType = Bool>>;

fn predicate(filter: StatusFilter) -> Option<OrderPredicate> {
    use crate::schema::correction_orders::dsl::*;

    match filter {
        StatusFilter::All => None,
        StatusFilter::New => Some(Box::new(
            is_corrected
                .eq(false)
                .and(is_rejected.eq(false))
                .and(is_reported.eq(false)),
        )),
        StatusFilter::Corrected => Some(Box::new(is_corrected.eq(true))),
        StatusFilter::Problematic => Some(Box::new(is_rejected.eq(true).or(is_reported.eq(true)))),
    }
}

pub fn find(conn: &mut PgConnection, order_id: i64) -> QueryResult<Option<CorrectionOrder>> {
    correction_orders::table
        .find(order_id)
        .first::<CorrectionOrder>(conn)
        .optional()
}

pub fn insert(conn: &mut PgConnection, order: &NewCorrectionOrder) -> QueryResult<CorrectionOrder> {
    diesel::insert_into(correction_orders::table)
        .values(order)
        .get_result(conn)
}

/// Writes every mutable column of `order` and returns the stored row.
pub fn save(conn: &mut PgConnection, order: &CorrectionOrder) -> QueryResult<CorrectionOrder> {
    diesel::update(correction_orders::table.find(order.id))
        .set(&order.changeset())
        .get_result(conn)
}

pub fn delete(conn: &mut PgConnection, order_id: i64) -> QueryResult<usize> {
    diesel::delete(correction_orders::table.find(order_id)).execute(conn)
}

pub fn list(
    conn: &mut PgConnection,
    filter: StatusFilter,
    sort: SortOrder,
    page: Page,
) -> QueryResult<(Vec<CorrectionOrder>, i64)> {
    let total: i64 = match predicate(filter) {
        Some(condition) => correction_orders::table
            .filter(condition)
            .count()
            .get_result(conn)?,
        None => correction_orders::table.count().get_result(conn)?,
    };

    let mut query = correction_orders::table.into_boxed();
    if let Some(condition) = predicate(filter) {
        query = query.filter(condition);
    }
    query = match sort {
        SortOrder::Newest => query.order((
            correction_orders::created_at.desc(),
            correction_orders::id.desc(),
        )),
        SortOrder::Oldest => query.order((
            correction_orders::created_at.asc(),
            correction_orders::id.asc(),
        )),
    };

    let items = query
        .offset(page.skip)
        .limit(page.limit)
        .load::<CorrectionOrder>(conn)?;

    Ok((items, total))
}

/// Every upload reference held by any order.
pub fn referenced_files(conn: &mut PgConnection) -> QueryResult<HashSet<String>> {
    let rows: Vec<(Vec<String>, Vec<String>)> = correction_orders::table
        .select((
            correction_orders::photo_urls,
            correction_orders::reply_photo_urls,
        ))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .flat_map(|(photos, replies)| photos.into_iter().chain(replies))
        .collect())
}
