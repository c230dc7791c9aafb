//! Checkpoint-bounded scan over paginated address histories.
//! Explorers serve page 1 as the most recent page, newest entry first.

use std::future::Future;

use crate::error::AppResult;

/// One page as served by a history API, newest entry first
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub total_pages: u32,
    pub entries: Vec<T>,
}

/// Collect every entry above `checkpoint`, returned in ascending height order
///
/// Walks backward from page 1 and stops at the first entry whose height is
/// not greater than the checkpoint, so already processed history is never
/// fetched twice.
pub async fn scan_newest_first<T, H, F, Fut>(checkpoint: u64, height_of: H, mut fetch: F) -> AppResult<Vec<T>>
where
    H: Fn(&T) -> u64,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AppResult<Page<T>>>,
{
    let mut collected = Vec::new();
    let mut page_number = 1u32;

    loop {
        let page = fetch(page_number).await?;
        let last_page = page.entries.is_empty() || page_number >= page.total_pages;

        for entry in page.entries {
            if height_of(&entry) <= checkpoint {
                return Ok(ascending(collected, &height_of));
            }
            collected.push(entry);
        }

        if last_page {
            return Ok(ascending(collected, &height_of));
        }
        page_number += 1;
    }
}

fn ascending<T, H: Fn(&T) -> u64>(mut newest_first: Vec<T>, height_of: &H) -> Vec<T> {
    newest_first.reverse();
    // stable: entries sharing a height keep chain order
    newest_first.sort_by_key(|entry| height_of(entry));
    newest_first
}
