//! Database layer: repositories over SQLx/PostgreSQL.
//!
//! - [`handlers`]: Repository implementations, one per table
//! - [`models`]: Row structs and insert/update requests
//! - [`errors`]: [`errors::DbError`], which classifies constraint violations
//!
//! Handlers take a connection from the pool for reads and open a transaction
//! for anything that writes more than one row:
//!
//! ```ignore
//! let mut tx = state.db.begin().await?;
//! let shift = Shifts::new(&mut tx).claim_place(shift_id, user.id).await?;
//! let assignment = Assignments::new(&mut tx).book(&request).await?;
//! tx.commit().await?;
//! ```
//!
//! Migrations live in `migrations/` and are embedded via [`crate::MIGRATOR`].

pub mod errors;
pub mod handlers;
pub mod models;
