/// Row type of the single-row `counters` table.
/// Used by sqlx for typed queries.

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct CounterRow {
    pub wins: i64,
    pub prayers: i64,
    pub hagels: i64,
}

impl From<CounterRow> for crate::types::CounterSnapshot {
    fn from(row: CounterRow) -> Self {
        Self::new(row.wins, row.prayers, row.hagels)
    }
}
