//! Per-column particle bucketing.
//!
//! Every particle belongs to exactly one (x, y) grid column. The index is an
//! adjacency table (`offsets` into a flat `members` array) rebuilt wholesale
//! whenever particle positions change. It is read-only during a transfer.
//!
//! The classic head/next linked-list form (`firstn`, `nextn`, `number`) can
//! be imported with [`ColumnIndex::from_linked_lists`] and exported with
//! [`ColumnIndex::to_linked_lists`].

use crate::constants::EMPTY;
use crate::error::SetupError;

/// Column membership of all particles.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnIndex {
    /// `offsets[c]..offsets[c + 1]` is the slice of `members` for column `c`.
    offsets: Vec<usize>,
    /// Particle indices grouped by column.
    members: Vec<usize>,
}

impl ColumnIndex {
    /// An index over `columns` columns with no particles.
    pub fn empty(columns: usize) -> Self {
        Self {
            offsets: vec![0; columns + 1],
            members: Vec::new(),
        }
    }

    /// Bucket particles by column id. `particle_columns[p]` is the column of
    /// particle `p`; within a column, particles keep ascending index order.
    ///
    /// Panics if a column id is out of range (callers compute ids from
    /// validated grid extents).
    pub fn from_columns(columns: usize, particle_columns: &[usize]) -> Self {
        let mut offsets = vec![0usize; columns + 1];
        for &c in particle_columns {
            assert!(c < columns, "column id {} out of range ({})", c, columns);
            offsets[c + 1] += 1;
        }
        for c in 0..columns {
            offsets[c + 1] += offsets[c];
        }

        let mut cursor = offsets.clone();
        let mut members = vec![0usize; particle_columns.len()];
        for (p, &c) in particle_columns.iter().enumerate() {
            members[cursor[c]] = p;
            cursor[c] += 1;
        }

        Self { offsets, members }
    }

    /// Import head/next linked lists.
    ///
    /// Walking `number[c]` hops from `firstn[c]` through `nextn` must visit
    /// every particle of column `c`, and every particle must be visited
    /// exactly once over all columns. Traversal order is preserved.
    pub fn from_linked_lists(
        firstn: &[i32],
        nextn: &[i32],
        number: &[usize],
    ) -> Result<Self, SetupError> {
        SetupError::check_len("number", firstn.len(), number.len())?;
        let particle_count = nextn.len();
        let mut seen = vec![false; particle_count];
        let mut offsets = Vec::with_capacity(firstn.len() + 1);
        let mut members = Vec::with_capacity(particle_count);
        offsets.push(0);

        for (col, (&head, &count)) in firstn.iter().zip(number).enumerate() {
            let mut l = head;
            for hop in 0..count {
                if l < 0 || l as usize >= particle_count {
                    return Err(SetupError::ColumnIndex(format!(
                        "column {} ends after {} of {} particles",
                        col, hop, count
                    )));
                }
                let p = l as usize;
                if seen[p] {
                    return Err(SetupError::ColumnIndex(format!(
                        "particle {} reached twice (column {})",
                        p, col
                    )));
                }
                seen[p] = true;
                members.push(p);
                l = nextn[p];
            }
            if count == 0 && head != EMPTY {
                return Err(SetupError::ColumnIndex(format!(
                    "column {} is empty but has head {}",
                    col, head
                )));
            }
            offsets.push(members.len());
        }

        if let Some(p) = seen.iter().position(|&s| !s) {
            return Err(SetupError::ColumnIndex(format!(
                "particle {} is not in any column",
                p
            )));
        }

        Ok(Self { offsets, members })
    }

    /// Export as `(firstn, nextn, number)` linked lists with [`EMPTY`] as
    /// the sentinel.
    pub fn to_linked_lists(&self) -> (Vec<i32>, Vec<i32>, Vec<usize>) {
        let mut firstn = vec![EMPTY; self.columns()];
        let mut nextn = vec![EMPTY; self.members.len()];
        let mut number = vec![0usize; self.columns()];

        for col in 0..self.columns() {
            let list = self.particles(col);
            number[col] = list.len();
            if let Some(&head) = list.first() {
                firstn[col] = head as i32;
            }
            for pair in list.windows(2) {
                nextn[pair[0]] = pair[1] as i32;
            }
        }

        (firstn, nextn, number)
    }

    /// Number of columns.
    pub fn columns(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Number of indexed particles.
    pub fn particle_count(&self) -> usize {
        self.members.len()
    }

    /// Population of column `col`.
    #[inline]
    pub fn number(&self, col: usize) -> usize {
        self.offsets[col + 1] - self.offsets[col]
    }

    /// First particle of column `col`, if any.
    #[inline]
    pub fn first(&self, col: usize) -> Option<usize> {
        self.particles(col).first().copied()
    }

    /// Particles of column `col`, in traversal order.
    #[inline]
    pub fn particles(&self, col: usize) -> &[usize] {
        &self.members[self.offsets[col]..self.offsets[col + 1]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_columns_groups_particles() {
        let index = ColumnIndex::from_columns(4, &[2, 0, 2, 3, 2]);
        assert_eq!(index.columns(), 4);
        assert_eq!(index.particle_count(), 5);
        assert_eq!(index.particles(0), &[1]);
        assert!(index.particles(1).is_empty());
        assert_eq!(index.particles(2), &[0, 2, 4]);
        assert_eq!(index.number(2), 3);
        assert_eq!(index.first(3), Some(3));
        assert_eq!(index.first(1), None);
    }

    #[test]
    fn test_linked_list_export_and_import() {
        let index = ColumnIndex::from_columns(3, &[1, 1, 0, 1]);
        let (firstn, nextn, number) = index.to_linked_lists();

        assert_eq!(firstn, vec![2, 0, EMPTY]);
        assert_eq!(number, vec![1, 3, 0]);
        assert_eq!(nextn[0], 1);
        assert_eq!(nextn[1], 3);
        assert_eq!(nextn[3], EMPTY);

        let back = ColumnIndex::from_linked_lists(&firstn, &nextn, &number).unwrap();
        assert_eq!(back, index);
    }

    #[test]
    fn test_import_preserves_traversal_order() {
        // Column 0 is 2 -> 0 -> 1 (head insertion order)
        let firstn = [2, EMPTY];
        let nextn = [1, EMPTY, 0];
        let number = [3, 0];
        let index = ColumnIndex::from_linked_lists(&firstn, &nextn, &number).unwrap();
        assert_eq!(index.particles(0), &[2, 0, 1]);
    }

    #[test]
    fn test_import_rejects_short_list() {
        let firstn = [0];
        let nextn = [EMPTY, EMPTY];
        let number = [2];
        let err = ColumnIndex::from_linked_lists(&firstn, &nextn, &number).unwrap_err();
        assert!(matches!(err, SetupError::ColumnIndex(_)));
    }

    #[test]
    fn test_import_rejects_duplicate_membership() {
        let firstn = [0, 0];
        let nextn = [EMPTY];
        let number = [1, 1];
        assert!(ColumnIndex::from_linked_lists(&firstn, &nextn, &number).is_err());
    }

    #[test]
    fn test_import_rejects_orphan_particle() {
        let firstn = [0];
        let nextn = [EMPTY, EMPTY];
        let number = [1];
        assert!(ColumnIndex::from_linked_lists(&firstn, &nextn, &number).is_err());
    }

    #[test]
    fn test_empty_index() {
        let index = ColumnIndex::empty(5);
        assert_eq!(index.columns(), 5);
        assert_eq!(index.particle_count(), 0);
        assert!((0..5).all(|c| index.number(c) == 0));
    }
}
