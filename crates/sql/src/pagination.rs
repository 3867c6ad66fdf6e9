use sqlx::{Database, Encode, QueryBuilder, Type};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Offset and limit of one page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

/// Turn a 1-based page number and a page size into an offset and limit.
///
/// Pages below 1 are treated as the first page. A non-positive page size
/// falls back to [`DEFAULT_PAGE_SIZE`], an oversized one is clamped to
/// [`MAX_PAGE_SIZE`].
pub fn paginate(page: i64, page_size: i64) -> Page {
    let page = page.max(1);
    let limit = if page_size < 1 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size.min(MAX_PAGE_SIZE)
    };

    Page {
        offset: (page - 1).saturating_mul(limit),
        limit,
    }
}

impl Page {
    /// Append ` LIMIT <limit> OFFSET <offset>` with both values bound.
    pub fn push_to<'args, DB>(&self, qb: &mut QueryBuilder<'args, DB>)
    where
        DB: Database,
        i64: Encode<'args, DB> + Type<DB>,
    {
        qb.push(" LIMIT ")
            .push_bind(self.limit)
            .push(" OFFSET ")
            .push_bind(self.offset);
    }
}
