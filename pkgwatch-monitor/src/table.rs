//! Incremental table state.
//!
//! [`DiffTable`] holds rows keyed by identity (builders, builds, masters) and
//! classifies each polled row as new, unchanged or changed so that only real
//! changes are redrawn and highlighted. [`StatusTable`] and [`AppendCursors`]
//! handle the per-category package lists, which only ever grow and are
//! appended to from the last committed index.

use pkgwatch_common::PortCategory;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// A row with a stable identity inside its table
pub trait KeyedRow: Clone + PartialEq {
    fn row_id(&self) -> &str;
}

/// Visual treatment of a row in the next rendered page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Highlight {
    #[default]
    None,
    /// Existing row whose data changed this poll
    Flash,
    /// Row added this poll
    FadeIn,
}

impl Highlight {
    pub fn css_class(&self) -> &'static str {
        match self {
            Highlight::None => "",
            Highlight::Flash => "changed",
            Highlight::FadeIn => "new",
        }
    }
}

/// Classification of one queued row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowChange {
    New,
    Unchanged,
    Changed,
}

#[derive(Debug, Clone)]
struct Entry<R> {
    row: R,
    highlight: Highlight,
}

/// Keyed row store.
///
/// Provides the four operations the page processors rely on: append rows,
/// look a row up by identity, replace a row's data and clear everything.
#[derive(Debug, Clone)]
pub struct DiffTable<R> {
    entries: Vec<Entry<R>>,
    index: HashMap<String, usize>,
    visible: bool,
}

impl<R: KeyedRow> Default for DiffTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: KeyedRow> DiffTable<R> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            visible: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the table has been revealed by a first load
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn row(&self, id: &str) -> Option<&R> {
        self.index.get(id).map(|&i| &self.entries[i].row)
    }

    pub fn highlight(&self, id: &str) -> Option<Highlight> {
        self.index.get(id).map(|&i| self.entries[i].highlight)
    }

    /// Replace a row's data in place and flag it for a flash.
    pub fn replace(&mut self, row: R) -> bool {
        match self.index.get(row.row_id()) {
            Some(&i) => {
                self.entries[i] = Entry {
                    row,
                    highlight: Highlight::Flash,
                };
                true
            }
            None => false,
        }
    }

    pub fn add_rows(&mut self, rows: Vec<R>, highlight: Highlight) {
        for row in rows {
            self.index.insert(row.row_id().to_string(), self.entries.len());
            self.entries.push(Entry { row, highlight });
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Rows in insertion order with their highlight
    pub fn iter(&self) -> impl Iterator<Item = (&R, Highlight)> {
        self.entries.iter().map(|e| (&e.row, e.highlight))
    }

    /// Start a poll's worth of updates.
    ///
    /// Highlights from the previous poll are dropped.
    pub fn batch(&mut self) -> RowBatch<'_, R> {
        for entry in &mut self.entries {
            entry.highlight = Highlight::None;
        }
        let first_load = self.entries.is_empty();
        RowBatch {
            table: self,
            new_rows: Vec::new(),
            first_load,
            changed: 0,
            unchanged: 0,
        }
    }
}

/// Outcome of a committed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub added: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub first_load: bool,
}

/// Rows queued against a [`DiffTable`] during one poll
pub struct RowBatch<'t, R: KeyedRow> {
    table: &'t mut DiffTable<R>,
    new_rows: Vec<R>,
    first_load: bool,
    changed: usize,
    unchanged: usize,
}

impl<R: KeyedRow> RowBatch<'_, R> {
    /// Classify a row and queue or apply it.
    ///
    /// On first load nothing can exist yet, so rows are queued without
    /// lookups.
    pub fn queue(&mut self, row: R) -> RowChange {
        if !self.first_load {
            if let Some(existing) = self.table.row(row.row_id()) {
                if *existing == row {
                    self.unchanged += 1;
                    return RowChange::Unchanged;
                }
                self.table.replace(row);
                self.changed += 1;
                return RowChange::Changed;
            }
        }
        self.new_rows.push(row);
        RowChange::New
    }

    /// Insert queued new rows in one go.
    pub fn commit(self) -> BatchSummary {
        let added = self.new_rows.len();
        if added > 0 {
            if self.first_load {
                self.table.add_rows(self.new_rows, Highlight::None);
                self.table.visible = true;
            } else {
                self.table.add_rows(self.new_rows, Highlight::FadeIn);
            }
        }
        BatchSummary {
            added,
            changed: self.changed,
            unchanged: self.unchanged,
            first_load: self.first_load,
        }
    }
}

/// Next unseen index of each append-only package list
#[derive(Debug, Clone, Default)]
pub struct AppendCursors {
    next: BTreeMap<PortCategory, usize>,
}

impl AppendCursors {
    /// `None` until the category has had rows
    pub fn position(&self, category: PortCategory) -> Option<usize> {
        self.next.get(&category).copied()
    }

    /// Indices of a `len`-long list not yet committed, moving the cursor past
    /// them. The cursor never moves backwards.
    pub fn advance(&mut self, category: PortCategory, len: usize) -> Range<usize> {
        let start = self.position(category).unwrap_or(0);
        let end = len.max(start);
        self.next.insert(category, end);
        start..end
    }
}

/// Formatted rows of one package category
#[derive(Debug, Clone, Default)]
pub struct StatusTable {
    rows: Vec<Vec<String>>,
    fresh_from: usize,
    visible: bool,
}

impl StatusTable {
    /// Forget which rows were added by the previous poll.
    pub fn settle(&mut self) {
        self.fresh_from = self.rows.len();
    }

    /// Add rows after the committed ones.
    ///
    /// The first fill reveals the table; later additions are highlighted.
    pub fn append(&mut self, rows: Vec<Vec<String>>) {
        self.rows.extend(rows);
        if !self.visible {
            self.visible = true;
            self.fresh_from = self.rows.len();
        }
    }

    /// Clear and refill; an empty table is hidden.
    pub fn replace_all(&mut self, rows: Vec<Vec<String>>) {
        self.rows = rows;
        self.fresh_from = self.rows.len();
        self.visible = !self.rows.is_empty();
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[String], Highlight)> {
        self.rows.iter().enumerate().map(|(i, row)| {
            let highlight = if i >= self.fresh_from {
                Highlight::FadeIn
            } else {
                Highlight::None
            };
            (row.as_slice(), highlight)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: String,
        value: u32,
    }

    impl KeyedRow for Row {
        fn row_id(&self) -> &str {
            &self.id
        }
    }

    fn row(id: &str, value: u32) -> Row {
        Row {
            id: id.to_string(),
            value,
        }
    }

    fn load(table: &mut DiffTable<Row>, rows: &[Row]) -> BatchSummary {
        let mut batch = table.batch();
        for r in rows {
            batch.queue(r.clone());
        }
        batch.commit()
    }

    #[test]
    fn test_first_load_adds_everything_without_highlight() {
        let mut table = DiffTable::new();
        assert!(!table.is_visible());
        let summary = load(&mut table, &[row("01", 1), row("02", 2)]);
        assert!(summary.first_load);
        assert_eq!(summary.added, 2);
        assert!(table.is_visible());
        assert_eq!(table.highlight("01"), Some(Highlight::None));
    }

    #[test]
    fn test_same_snapshot_twice_changes_nothing() {
        let rows = [row("01", 1), row("02", 2), row("03", 3)];
        let mut table = DiffTable::new();
        load(&mut table, &rows);
        let summary = load(&mut table, &rows);
        assert_eq!(summary.added, 0);
        assert_eq!(summary.changed, 0);
        assert_eq!(summary.unchanged, 3);
        assert!(table.iter().all(|(_, h)| h == Highlight::None));
    }

    #[test]
    fn test_changed_rows_are_replaced_in_place() {
        let mut table = DiffTable::new();
        load(&mut table, &[row("01", 1), row("02", 2)]);

        let mut batch = table.batch();
        assert_eq!(batch.queue(row("01", 1)), RowChange::Unchanged);
        assert_eq!(batch.queue(row("02", 5)), RowChange::Changed);
        assert_eq!(batch.queue(row("03", 3)), RowChange::New);
        let summary = batch.commit();
        assert_eq!((summary.added, summary.changed), (1, 1));

        let order: Vec<_> = table.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(order, vec!["01", "02", "03"]);
        assert_eq!(table.row("02").map(|r| r.value), Some(5));
        assert_eq!(table.highlight("02"), Some(Highlight::Flash));
        assert_eq!(table.highlight("03"), Some(Highlight::FadeIn));

        // Highlights last one poll only.
        load(&mut table, &[row("02", 5)]);
        assert_eq!(table.highlight("02"), Some(Highlight::None));
        assert_eq!(table.highlight("03"), Some(Highlight::None));
    }

    #[test]
    fn test_clear_resets_to_first_load() {
        let mut table = DiffTable::new();
        load(&mut table, &[row("01", 1)]);
        table.clear();
        assert!(table.is_empty());
        assert!(table.row("01").is_none());
        assert!(load(&mut table, &[row("01", 1)]).first_load);
    }

    #[test]
    fn test_cursor_never_moves_backwards() {
        let mut cursors = AppendCursors::default();
        assert_eq!(cursors.position(PortCategory::Built), None);
        assert_eq!(cursors.advance(PortCategory::Built, 3), 0..3);
        assert_eq!(cursors.advance(PortCategory::Built, 3), 3..3);
        assert_eq!(cursors.advance(PortCategory::Built, 5), 3..5);
        assert_eq!(cursors.advance(PortCategory::Built, 2), 5..5);
        assert_eq!(cursors.position(PortCategory::Built), Some(5));
        assert_eq!(cursors.position(PortCategory::Failed), None);
    }

    #[test]
    fn test_status_table_highlights_only_later_appends() {
        let mut table = StatusTable::default();
        table.settle();
        table.append(vec![vec!["1".into()], vec!["2".into()]]);
        assert!(table.is_visible());
        assert!(table.iter().all(|(_, h)| h == Highlight::None));

        table.settle();
        table.append(vec![vec!["3".into()]]);
        let highlights: Vec<_> = table.iter().map(|(_, h)| h).collect();
        assert_eq!(
            highlights,
            vec![Highlight::None, Highlight::None, Highlight::FadeIn]
        );
    }

    #[test]
    fn test_status_table_replace_hides_when_empty() {
        let mut table = StatusTable::default();
        table.replace_all(vec![vec!["1".into()]]);
        assert!(table.is_visible());
        table.replace_all(Vec::new());
        assert!(!table.is_visible());
        assert!(table.is_empty());
    }
}
