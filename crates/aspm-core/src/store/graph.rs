//! Provenance graph: product nodes and link edges.
//!
//! Both operations are find-or-create and safe to repeat. Products follow
//! merge-only-if-empty: a stored non-empty attribute is never replaced,
//! whatever later submissions say.

use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use tracing::{debug, info};

use super::{StoreError, get_u64, now_ns};
use crate::model::{Link, Product, ProductCandidate, ProductField, ProductionMethod};

pub(crate) const PRODUCT_COLUMNS: &str =
    "id, name, kind, project, author, worker, created_at_ns";

pub(crate) const LINK_COLUMNS: &str = "id, product_id, origin_id, method, created_at_ns";

pub(crate) fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    let kind: String = row.get(2)?;
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: kind.parse().ok(),
        project: row.get(3)?,
        author: row.get(4)?,
        worker: row.get(5)?,
        created_at_ns: get_u64(row, 6)?,
    })
}

pub(crate) fn link_from_row(row: &Row<'_>) -> rusqlite::Result<Link> {
    Ok(Link {
        id: get_u64(row, 0)?,
        product_id: row.get(1)?,
        origin_id: row.get(2)?,
        method: row.get(3)?,
        created_at_ns: get_u64(row, 4)?,
    })
}

/// Result of [`upsert_product`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductUpsert {
    /// The product as stored after the call.
    pub product: Product,
    /// Whether this call created the row.
    pub created: bool,
    /// Fields this call populated.
    pub filled: Vec<ProductField>,
    /// Fields where the candidate disagreed with a stored value (dropped).
    pub conflicts: Vec<ProductField>,
}

/// Result of [`upsert_link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkUpsert {
    pub link: Link,
    pub created: bool,
}

/// Looks up a product by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_product(conn: &Connection, id: &str) -> Result<Option<Product>, StoreError> {
    let product = conn
        .query_row(
            &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
            params![id],
            product_from_row,
        )
        .optional()?;
    Ok(product)
}

/// Finds or creates a product, filling only attributes that are still empty.
///
/// # Errors
///
/// Returns [`StoreError::EmptyKey`] for an empty id, or a database error.
pub fn upsert_product(
    tx: &Transaction<'_>,
    candidate: &ProductCandidate,
) -> Result<ProductUpsert, StoreError> {
    if candidate.id.is_empty() {
        return Err(StoreError::EmptyKey { entity: "product" });
    }

    let created_at_ns = now_ns();
    let inserted = tx.execute(
        "INSERT INTO products (id, name, kind, project, author, worker, created_at_ns)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (id) DO NOTHING",
        params![
            candidate.id,
            candidate.name,
            candidate.kind.map_or("", |k| k.as_str()),
            candidate.project,
            candidate.author,
            candidate.worker,
            created_at_ns as i64,
        ],
    )?;

    if inserted == 1 {
        let product = candidate.clone().into_product(created_at_ns);
        let filled = ProductField::ALL
            .into_iter()
            .filter(|&field| field_is_set(&product, field))
            .collect();
        info!(product_id = %product.id, "Created product");
        return Ok(ProductUpsert {
            product,
            created: true,
            filled,
            conflicts: Vec::new(),
        });
    }

    let mut product = find_product(tx, &candidate.id)?.ok_or_else(|| StoreError::NotFound {
        entity: "product",
        key: candidate.id.clone(),
    })?;

    let conflicts = product.conflicts(candidate);
    if !conflicts.is_empty() {
        debug!(
            product_id = %product.id,
            fields = ?conflicts,
            "Dropped conflicting values for populated product fields"
        );
    }

    let filled = product.merge(candidate);
    if !filled.is_empty() {
        tx.execute(
            "UPDATE products
             SET name = ?2, kind = ?3, project = ?4, author = ?5, worker = ?6
             WHERE id = ?1",
            params![
                product.id,
                product.name,
                product.kind.map_or("", |k| k.as_str()),
                product.project,
                product.author,
                product.worker,
            ],
        )?;
        debug!(product_id = %product.id, fields = ?filled, "Filled empty product fields");
    }

    Ok(ProductUpsert {
        product,
        created: false,
        filled,
        conflicts,
    })
}

fn field_is_set(product: &Product, field: ProductField) -> bool {
    match field {
        ProductField::Name => !product.name.is_empty(),
        ProductField::Kind => product.kind.is_some(),
        ProductField::Project => !product.project.is_empty(),
        ProductField::Author => !product.author.is_empty(),
        ProductField::Worker => !product.worker.is_empty(),
    }
}

/// Finds or creates the `(product, origin, method)` edge.
///
/// Both endpoints must already exist, possibly created earlier in the same
/// transaction.
///
/// # Errors
///
/// Returns a database error, including a foreign-key violation when an
/// endpoint is missing.
pub fn upsert_link(
    tx: &Transaction<'_>,
    product_id: &str,
    origin_id: &str,
    method: ProductionMethod,
) -> Result<LinkUpsert, StoreError> {
    let inserted = tx.execute(
        "INSERT INTO links (product_id, origin_id, method, created_at_ns)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (product_id, origin_id, method) DO NOTHING",
        params![product_id, origin_id, method, now_ns() as i64],
    )?;

    let link = tx
        .query_row(
            &format!(
                "SELECT {LINK_COLUMNS} FROM links
                 WHERE product_id = ?1 AND origin_id = ?2 AND method = ?3"
            ),
            params![product_id, origin_id, method],
            link_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            entity: "link",
            key: format!("{product_id} <- {origin_id} ({method})"),
        })?;

    let created = inserted == 1;
    if created {
        info!(
            product_id = %product_id,
            origin_id = %origin_id,
            method = %method,
            "Created link"
        );
    }

    Ok(LinkUpsert { link, created })
}

/// Links whose product is `product_id` (its origins).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn origins_of(conn: &Connection, product_id: &str) -> Result<Vec<Link>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LINK_COLUMNS} FROM links WHERE product_id = ?1 ORDER BY id ASC"
    ))?;
    let links = stmt
        .query_map(params![product_id], link_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(links)
}

/// Deletes a product together with its links, engagements and their
/// vulnerabilities.
///
/// Returns `false` if no such product existed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_product(tx: &Transaction<'_>, id: &str) -> Result<bool, StoreError> {
    let deleted = tx.execute("DELETE FROM products WHERE id = ?1", params![id])?;
    if deleted > 0 {
        info!(product_id = %id, "Deleted product");
    }
    Ok(deleted > 0)
}
