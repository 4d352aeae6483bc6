use anyhow::anyhow;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  trace
};

pub const DEFAULT_MAX_VISIBLE: u32 = 7;
pub const DEFAULT_PAGE_SIZES: [u32; 4] =
  [10, 25, 50, 100];

const COMPACT_MAX_PAGES: u32 = 5;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub enum PageItem {
  Page(u32),
  Ellipsis
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PaginationVariant {
  Compact,
  Full
}

impl std::str::FromStr
  for PaginationVariant
{
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "compact" | "simple" => {
        Ok(Self::Compact)
      }
      | "full" => Ok(Self::Full),
      | other => Err(anyhow!(
        "unknown pagination variant: \
         {other}"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct ItemRange {
  pub start: u32,
  pub end:   u32,
  pub total: u32
}

impl ItemRange {
  /// Empty lists yield `start > end`;
  /// callers hide the range text then.
  pub fn is_displayable(&self) -> bool {
    self.total > 0
      && self.start <= self.end
  }
}

pub fn generate_page_numbers(
  current: u32,
  total: u32,
  max_visible: u32
) -> Vec<PageItem> {
  // Two pages are both edges; there is
  // nothing left to collapse.
  if total <= max_visible || total <= 2 {
    return (1..=total)
      .map(PageItem::Page)
      .collect();
  }

  let current = current.clamp(1, total);
  let radius =
    max_visible.saturating_sub(4) / 2;
  let last_inner = total - 1;

  let mut lo = current
    .saturating_sub(radius)
    .max(2);
  let mut hi = current
    .saturating_add(radius)
    .min(last_inner);

  // An edge page as `current` would
  // leave the window empty.
  if lo > hi {
    let pivot =
      current.clamp(2, last_inner);
    lo = pivot;
    hi = pivot;
  }

  trace!(
    current,
    total,
    radius,
    lo,
    hi,
    "computed page window"
  );

  let mut items = Vec::with_capacity(
    (hi - lo + 5) as usize
  );
  items.push(PageItem::Page(1));
  if lo > 2 {
    items.push(PageItem::Ellipsis);
  }
  items.extend(
    (lo..=hi).map(PageItem::Page)
  );
  if hi < last_inner {
    items.push(PageItem::Ellipsis);
  }
  items.push(PageItem::Page(total));
  items
}

pub fn calculate_item_range(
  page: u32,
  page_size: u32,
  total_items: u32
) -> ItemRange {
  let page = page.max(1);
  let start = (page - 1)
    .saturating_mul(page_size)
    .saturating_add(1);
  let end = page
    .saturating_mul(page_size)
    .min(total_items);

  ItemRange {
    start,
    end,
    total: total_items
  }
}

pub fn is_valid_page(
  page: u32,
  total_pages: u32
) -> bool {
  page >= 1 && page <= total_pages
}

pub fn total_pages(
  total_items: u32,
  page_size: u32
) -> u32 {
  if page_size == 0 {
    return 0;
  }
  total_items.div_ceil(page_size)
}

pub fn select_pagination_variant(
  total_pages: u32,
  preference: Option<PaginationVariant>
) -> PaginationVariant {
  if let Some(variant) = preference {
    return variant;
  }

  if total_pages <= COMPACT_MAX_PAGES {
    PaginationVariant::Compact
  } else {
    PaginationVariant::Full
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct PageSizeChoices(Vec<u32>);

impl Default for PageSizeChoices {
  fn default() -> Self {
    Self(DEFAULT_PAGE_SIZES.to_vec())
  }
}

impl PageSizeChoices {
  pub fn new(
    sizes: impl IntoIterator<Item = u32>
  ) -> anyhow::Result<Self> {
    let mut sizes: Vec<u32> = sizes
      .into_iter()
      .filter(|size| *size > 0)
      .collect();
    sizes.sort_unstable();
    sizes.dedup();

    if sizes.is_empty() {
      return Err(anyhow!(
        "page size choices cannot be \
         empty"
      ));
    }

    Ok(Self(sizes))
  }

  pub fn contains(
    &self,
    size: u32
  ) -> bool {
    self.0.contains(&size)
  }

  pub fn as_slice(&self) -> &[u32] {
    &self.0
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct PaginationState {
  pub current_page: u32,
  pub total_pages:  u32,
  pub page_size:    u32,
  pub total_items:  u32,
  #[serde(default)]
  choices:          PageSizeChoices
}

impl PaginationState {
  pub fn new(
    page_size: u32,
    total_items: u32
  ) -> Self {
    let page_size = page_size.max(1);
    Self {
      current_page: 1,
      total_pages: total_pages(
        total_items,
        page_size
      ),
      page_size,
      total_items,
      choices: PageSizeChoices::default()
    }
  }

  pub fn with_choices(
    mut self,
    choices: PageSizeChoices
  ) -> Self {
    self.choices = choices;
    self
  }

  pub fn choices(
    &self
  ) -> &PageSizeChoices {
    &self.choices
  }

  /// Always restarts from page 1.
  pub fn set_page_size(
    &mut self,
    size: u32
  ) -> anyhow::Result<()> {
    if !self.choices.contains(size) {
      return Err(anyhow!(
        "page size {size} is not one of \
         {:?}",
        self.choices.as_slice()
      ));
    }

    debug!(
      from = self.page_size,
      to = size,
      "changing page size"
    );
    self.page_size = size;
    self.current_page = 1;
    self.recompute();
    Ok(())
  }

  pub fn set_total_items(
    &mut self,
    total_items: u32
  ) {
    self.total_items = total_items;
    self.recompute();
  }

  pub fn go_to(
    &mut self,
    page: u32
  ) -> bool {
    if !is_valid_page(
      page,
      self.total_pages
    ) {
      return false;
    }
    self.current_page = page;
    true
  }

  pub fn has_next(&self) -> bool {
    self.current_page < self.total_pages
  }

  pub fn has_prev(&self) -> bool {
    self.current_page > 1
  }

  pub fn next(&mut self) -> bool {
    self.has_next()
      && self.go_to(self.current_page + 1)
  }

  pub fn prev(&mut self) -> bool {
    self.has_prev()
      && self.go_to(self.current_page - 1)
  }

  pub fn item_range(&self) -> ItemRange {
    calculate_item_range(
      self.current_page,
      self.page_size,
      self.total_items
    )
  }

  pub fn page_numbers(
    &self,
    max_visible: u32
  ) -> Vec<PageItem> {
    generate_page_numbers(
      self.current_page,
      self.total_pages,
      max_visible
    )
  }

  pub fn variant(
    &self,
    preference: Option<PaginationVariant>
  ) -> PaginationVariant {
    select_pagination_variant(
      self.total_pages,
      preference
    )
  }

  /// Visible window of a list held
  /// entirely on the client.
  pub fn slice<'a, T>(
    &self,
    items: &'a [T]
  ) -> &'a [T] {
    let range = self.item_range();
    if !range.is_displayable() {
      return &[];
    }
    let start = (range.start as usize)
      .saturating_sub(1)
      .min(items.len());
    let end =
      (range.end as usize).min(items.len());
    &items[start..end.max(start)]
  }

  fn recompute(&mut self) {
    self.total_pages = total_pages(
      self.total_items,
      self.page_size
    );
    self.current_page = self
      .current_page
      .clamp(1, self.total_pages.max(1));
  }
}

pub fn format_page_items(
  items: &[PageItem],
  current: u32
) -> String {
  items
    .iter()
    .map(|item| match item {
      | PageItem::Page(page)
        if *page == current =>
      {
        format!("[{page}]")
      }
      | PageItem::Page(page) => {
        page.to_string()
      }
      | PageItem::Ellipsis => {
        "…".to_string()
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}
