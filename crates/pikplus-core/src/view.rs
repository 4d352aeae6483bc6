use std::collections::BTreeSet;

use tracing::debug;

use crate::filter::{
  ContentPolicy,
  UrlMatch,
  filter_by_content_policy,
  filter_by_ownership,
  tag_local_ownership
};
use crate::pagination::{
  ItemRange,
  PageItem,
  PaginationState,
  PaginationVariant
};
use crate::record::TaskRecord;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct ViewOptions {
  pub show_mine_only: bool,
  pub content_filter: bool,
  pub url_match:      UrlMatch,
  pub max_visible:    u32,
  pub variant: Option<PaginationVariant>
}

impl Default for ViewOptions {
  fn default() -> Self {
    Self {
      show_mine_only: false,
      content_filter: false,
      url_match:      UrlMatch::Exact,
      max_visible:
        crate::pagination::DEFAULT_MAX_VISIBLE,
      variant:        None
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskView {
  pub rows:       Vec<TaskRecord>,
  pub pagination: PaginationState,
  pub range:      ItemRange,
  pub pages:      Vec<PageItem>,
  pub variant:    PaginationVariant
}

/// Tags ownership, applies the "mine
/// only" and content filters, then
/// cuts the page out of what is left.
/// `pagination.total_items` is replaced
/// by the filtered count.
pub fn reconcile<P>(
  tasks: &[TaskRecord],
  local_urls: &BTreeSet<String>,
  policy: &P,
  options: ViewOptions,
  mut pagination: PaginationState
) -> TaskView
where
  P: ContentPolicy + ?Sized
{
  let tagged = tag_local_ownership(
    tasks,
    local_urls,
    options.url_match
  );
  let owned = filter_by_ownership(
    tagged,
    options.show_mine_only
  );
  let visible = filter_by_content_policy(
    owned,
    options.content_filter,
    policy
  );

  let current = pagination.current_page;
  pagination.set_total_items(
    u32::try_from(visible.len())
      .unwrap_or(u32::MAX)
  );
  if current != pagination.current_page
  {
    debug!(
      requested = current,
      clamped = pagination.current_page,
      "page fell outside filtered list"
    );
  }

  let rows =
    pagination.slice(&visible).to_vec();

  debug!(
    fetched = tasks.len(),
    visible = visible.len(),
    rows = rows.len(),
    page = pagination.current_page,
    "reconciled task view"
  );

  TaskView {
    range: pagination.item_range(),
    pages: pagination
      .page_numbers(options.max_visible),
    variant: pagination
      .variant(options.variant),
    rows,
    pagination
  }
}
