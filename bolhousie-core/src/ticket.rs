//! Ticket generator: a 3x5 grid of distinct catalog items.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::catalog::{Catalog, Item};

pub const TICKET_ROWS: usize = 3;
pub const TICKET_COLS: usize = 5;
pub const TICKET_SIZE: usize = TICKET_ROWS * TICKET_COLS;

/// Player-local ticket. Always exactly `TICKET_ROWS` rows of `TICKET_COLS` distinct items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    rows: Vec<Vec<Item>>,
}

impl Ticket {
    /// Build a ticket from explicit rows, checking shape and distinctness.
    pub fn from_rows(rows: Vec<Vec<Item>>) -> Result<Self, TicketError> {
        if rows.len() != TICKET_ROWS || rows.iter().any(|r| r.len() != TICKET_COLS) {
            return Err(TicketError::Shape);
        }
        let mut seen = HashSet::with_capacity(TICKET_SIZE);
        for item in rows.iter().flatten() {
            if !seen.insert(item.id.clone()) {
                return Err(TicketError::DuplicateItem(item.id.clone()));
            }
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[Vec<Item>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[Item]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &Item> {
        self.rows.iter().flatten()
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.cells().any(|i| i.id == item_id)
    }
}

/// Shuffle the catalog and lay the first `TICKET_SIZE` items out row by row.
pub fn generate_ticket<R: Rng + ?Sized>(
    catalog: &Catalog,
    rng: &mut R,
) -> Result<Ticket, TicketError> {
    if catalog.len() < TICKET_SIZE {
        return Err(TicketError::CatalogTooSmall(catalog.len()));
    }
    let mut items = catalog.items().to_vec();
    items.shuffle(rng);
    items.truncate(TICKET_SIZE);
    let rows = items
        .chunks(TICKET_COLS)
        .map(<[Item]>::to_vec)
        .collect();
    Ticket::from_rows(rows)
}

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("catalog has {0} items, a ticket needs {}", TICKET_SIZE)]
    CatalogTooSmall(usize),
    #[error("ticket must be {} rows of {}", TICKET_ROWS, TICKET_COLS)]
    Shape,
    #[error("item {0:?} appears twice on the ticket")]
    DuplicateItem(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sample_catalog;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_ticket_is_3x5_distinct_from_catalog() {
        let catalog = sample_catalog(40);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let ticket = generate_ticket(&catalog, &mut rng).unwrap();
            assert_eq!(ticket.rows().len(), TICKET_ROWS);
            assert!(ticket.rows().iter().all(|r| r.len() == TICKET_COLS));
            let ids: HashSet<&str> = ticket.cells().map(|i| i.id.as_str()).collect();
            assert_eq!(ids.len(), TICKET_SIZE);
            assert!(ticket.cells().all(|i| catalog.get(&i.id) == Some(i)));
        }
    }

    #[test]
    fn exact_size_catalog_uses_every_item() {
        let catalog = sample_catalog(TICKET_SIZE);
        let mut rng = StdRng::seed_from_u64(1);
        let ticket = generate_ticket(&catalog, &mut rng).unwrap();
        assert!(catalog.items().iter().all(|i| ticket.contains(&i.id)));
    }

    #[test]
    fn small_catalog_is_an_error() {
        let catalog = sample_catalog(TICKET_SIZE - 1);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            generate_ticket(&catalog, &mut rng),
            Err(TicketError::CatalogTooSmall(14))
        ));
    }

    #[test]
    fn from_rows_checks_shape_and_duplicates() {
        let catalog = sample_catalog(TICKET_SIZE);
        let items = catalog.items().to_vec();
        assert!(matches!(
            Ticket::from_rows(vec![items[..5].to_vec()]),
            Err(TicketError::Shape)
        ));
        let mut dup: Vec<Vec<Item>> = items.chunks(TICKET_COLS).map(<[Item]>::to_vec).collect();
        dup[2][4] = dup[0][0].clone();
        assert!(matches!(
            Ticket::from_rows(dup),
            Err(TicketError::DuplicateItem(_))
        ));
    }
}
