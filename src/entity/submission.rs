//! Submission entity model for Sea-ORM database interaction.
//!
//! Maps one ledger row to the `submissions` table.

use sea_orm::entity::prelude::*;

/// Sea-ORM entity model representing one appended submission.
///
/// # Database Schema
///
/// | Column           | Type               | Ledger column    |
/// |------------------|--------------------|------------------|
/// | id               | INTEGER (PK, auto) |                  |
/// | submitted_at     | TIMESTAMPTZ        | SubmittedAt      |
/// | submitter_handle | TEXT               | SubmitterHandle  |
/// | email            | TEXT               | Email            |
/// | name             | TEXT               | Name             |
/// | position         | TEXT               | Position         |
/// | item_id          | INTEGER            | ItemId           |
/// | item_name        | TEXT               | ItemName         |
///
/// The surrogate `id` only orders rows; there is no update or delete path.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "submissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub submitted_at: DateTimeWithTimeZone,

    #[sea_orm(column_type = "Text")]
    pub submitter_handle: String,

    #[sea_orm(column_type = "Text")]
    pub email: String,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub position: String,

    pub item_id: i64,

    #[sea_orm(column_type = "Text")]
    pub item_name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
