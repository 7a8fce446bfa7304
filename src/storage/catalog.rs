// Data-item catalog.
//
// Twenty integer-valued items `x1` .. `x20`. An odd-indexed item lives on
// the single site `1 + (i mod 10)`; an even-indexed item is replicated on
// all ten sites. Every copy starts at value `10 * i`, committed at time 0.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::common::{SiteId, Timestamp, ITEM_COUNT, SITE_COUNT};
use crate::storage::site::Site;

static ITEM_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^x(\d+)$").expect("valid pattern"));

/// Parses an item name of the form `x<N>` with `1 <= N <= 20`.
pub fn parse_item_index(name: &str) -> Option<u32> {
    let caps = ITEM_NAME.captures(name)?;
    let index: u32 = caps[1].parse().ok()?;
    (1..=ITEM_COUNT).contains(&index).then_some(index)
}

/// A named data item and its placement. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItem {
    pub name: String,
    pub index: u32,
    /// Hosting sites in probe order.
    pub sites: Vec<SiteId>,
}

impl DataItem {
    pub fn new(index: u32) -> Self {
        let sites = if index % 2 == 1 {
            vec![1 + index as usize % SITE_COUNT]
        } else {
            (1..=SITE_COUNT).collect()
        };
        Self {
            name: format!("x{index}"),
            index,
            sites,
        }
    }

    pub fn initial_value(&self) -> i64 {
        i64::from(self.index) * 10
    }

    pub fn is_replicated(&self) -> bool {
        self.sites.len() > 1
    }
}

/// The fixed set of data items, indexed by item number.
pub struct Catalog {
    items: Vec<DataItem>,
}

impl Catalog {
    /// Builds the catalog and installs every item's initial value as a
    /// committed version at each hosting site.
    pub fn bootstrap(sites: &mut [Site], now: Timestamp) -> Self {
        let mut items = Vec::with_capacity(ITEM_COUNT as usize);
        for index in 1..=ITEM_COUNT {
            let item = DataItem::new(index);
            for &sid in &item.sites {
                sites[sid - 1].install(&item.name, now, item.initial_value());
            }
            items.push(item);
        }
        Self { items }
    }

    /// Looks an item up by its `x<N>` name.
    pub fn get(&self, name: &str) -> Option<&DataItem> {
        let index = parse_item_index(name)?;
        self.items.get(index as usize - 1)
    }

    /// All items in index order.
    pub fn items(&self) -> impl Iterator<Item = &DataItem> {
        self.items.iter()
    }
}
