use std::sync::Arc;

use adrule_common::types::{Entity, Rule};
use adrule_storage::{EntityFilter, EntityStore};

use crate::error::Result;

/// Resolves the non-deleted entities a rule targets, one page at a time.
#[derive(Clone)]
pub struct EntityFetcher {
    store: Arc<dyn EntityStore>,
    page_size: usize,
}

impl EntityFetcher {
    pub fn new(store: Arc<dyn EntityStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Pages of entities in stable id order. Iteration stops after the first
    /// short page or the first error.
    pub fn pages(&self, rule: &Rule) -> EntityPages<'_> {
        EntityPages {
            store: self.store.as_ref(),
            filter: EntityFilter::for_rule(rule),
            page_size: self.page_size,
            offset: 0,
            done: false,
        }
    }

    /// Collects every page. Prefer [`EntityFetcher::pages`] for large accounts.
    pub fn list_entities(&self, rule: &Rule) -> Result<Vec<Entity>> {
        let mut all = Vec::new();
        for page in self.pages(rule) {
            all.extend(page?);
        }
        Ok(all)
    }
}

pub struct EntityPages<'a> {
    store: &'a dyn EntityStore,
    filter: EntityFilter,
    page_size: usize,
    offset: usize,
    done: bool,
}

impl Iterator for EntityPages<'_> {
    type Item = Result<Vec<Entity>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self
            .store
            .list_active_entities(&self.filter, self.page_size, self.offset)
        {
            Ok(page) => {
                if page.len() < self.page_size {
                    self.done = true;
                }
                if page.is_empty() {
                    return None;
                }
                self.offset += page.len();
                Some(Ok(page))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}
