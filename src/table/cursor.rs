use crate::error::Result;
use crate::model::{Feature, Fid};
use crate::table::AttributeTable;

/// Forward-only cursor over every feature of a table.
///
/// Restartable with [`start`]; each [`feature`] call checks out a fresh
/// owned snapshot of the current position.
///
/// [`start`]: FeatureCursor::start
/// [`feature`]: FeatureCursor::feature
pub struct FeatureCursor<'a> {
    table: &'a mut AttributeTable,
    pos: Fid,
}

impl<'a> FeatureCursor<'a> {
    pub(crate) fn new(table: &'a mut AttributeTable) -> Self {
        Self { table, pos: 0 }
    }

    /// Resets the cursor to the first feature.
    pub fn start(&mut self) {
        self.pos = 0;
    }

    pub fn has_more(&self) -> bool {
        self.pos < self.table.size()
    }

    pub fn advance(&mut self) {
        self.pos += 1;
    }

    /// The fid the cursor is positioned on.
    pub fn fid(&self) -> Fid {
        self.pos
    }

    /// Checks out the feature at the current position.
    pub fn feature(&mut self) -> Result<Feature> {
        self.table.checkout(self.pos)
    }
}

impl Iterator for FeatureCursor<'_> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_more() {
            return None;
        }
        let item = self.feature();
        self.advance();
        Some(item)
    }
}
