use anyhow::Context;
use futures::Stream;
use sqlx::types::Json;

use super::repo_types::{Meal, MealRow};
use crate::db::{Db, Table};

const MEAL_COLUMNS: &str = "id, timestamp, input_kind, photo_uri, description, \
     raw_extracted_ingredients, raw_extracted_triggers, \
     confirmed_ingredients, confirmed_triggers, notes";

/// Insert a meal, replacing any row with the same id. An unset id (0) gets a
/// fresh one. Returns the row id.
pub async fn insert_meal(db: &Db, meal: &Meal) -> anyhow::Result<i64> {
    let id = (meal.id != 0).then_some(meal.id);
    let done = sqlx::query(
        r#"
        INSERT OR REPLACE INTO meals (
            id, timestamp, input_kind, photo_uri, description,
            raw_extracted_ingredients, raw_extracted_triggers,
            confirmed_ingredients, confirmed_triggers, notes
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(meal.timestamp)
    .bind(meal.input_kind.as_str())
    .bind(meal.photo_uri.as_deref())
    .bind(meal.description.as_deref())
    .bind(Json(&meal.raw_extracted_ingredients))
    .bind(Json(&meal.raw_extracted_triggers))
    .bind(Json(&meal.confirmed_ingredients))
    .bind(Json(&meal.confirmed_triggers))
    .bind(meal.notes.as_deref())
    .execute(&db.pool)
    .await
    .context("insert meal")?;

    db.notify(Table::Meals);
    // REPLACE deletes the previous row first, which cascades to its feedback.
    if id.is_some() {
        db.notify(Table::UserFeedback);
    }
    Ok(done.last_insert_rowid())
}

/// Update every column of an existing meal. Returns false when no row has
/// that id.
pub async fn update_meal(db: &Db, meal: &Meal) -> anyhow::Result<bool> {
    let done = sqlx::query(
        r#"
        UPDATE meals
           SET timestamp = ?, input_kind = ?, photo_uri = ?, description = ?,
               raw_extracted_ingredients = ?, raw_extracted_triggers = ?,
               confirmed_ingredients = ?, confirmed_triggers = ?, notes = ?
         WHERE id = ?
        "#,
    )
    .bind(meal.timestamp)
    .bind(meal.input_kind.as_str())
    .bind(meal.photo_uri.as_deref())
    .bind(meal.description.as_deref())
    .bind(Json(&meal.raw_extracted_ingredients))
    .bind(Json(&meal.raw_extracted_triggers))
    .bind(Json(&meal.confirmed_ingredients))
    .bind(Json(&meal.confirmed_triggers))
    .bind(meal.notes.as_deref())
    .bind(meal.id)
    .execute(&db.pool)
    .await
    .context("update meal")?;

    let updated = done.rows_affected() > 0;
    if updated {
        db.notify(Table::Meals);
    }
    Ok(updated)
}

/// Delete a meal; its feedback goes with it through the foreign key.
pub async fn delete_meal(db: &Db, meal_id: i64) -> anyhow::Result<bool> {
    let done = sqlx::query("DELETE FROM meals WHERE id = ?")
        .bind(meal_id)
        .execute(&db.pool)
        .await
        .context("delete meal")?;

    let deleted = done.rows_affected() > 0;
    if deleted {
        db.notify(Table::Meals);
        db.notify(Table::UserFeedback);
    }
    Ok(deleted)
}

pub async fn get_meal(db: &Db, meal_id: i64) -> anyhow::Result<Option<Meal>> {
    let row = sqlx::query_as::<_, MealRow>(&format!(
        "SELECT {MEAL_COLUMNS} FROM meals WHERE id = ?"
    ))
    .bind(meal_id)
    .fetch_optional(&db.pool)
    .await
    .context("get meal")?;

    row.map(Meal::try_from).transpose()
}

/// All meals, newest first.
pub async fn list_meals(db: &Db) -> anyhow::Result<Vec<Meal>> {
    let rows = sqlx::query_as::<_, MealRow>(&format!(
        "SELECT {MEAL_COLUMNS} FROM meals ORDER BY timestamp DESC, id DESC"
    ))
    .fetch_all(&db.pool)
    .await
    .context("list meals")?;

    rows.into_iter().map(Meal::try_from).collect()
}

/// Continuously updating view of [`list_meals`].
pub fn observe_meals(db: &Db) -> impl Stream<Item = anyhow::Result<Vec<Meal>>> + Send + 'static {
    let handle = db.clone();
    db.snapshots(Table::Meals, move || {
        let db = handle.clone();
        async move { list_meals(&db).await }
    })
}

/// Continuously updating view of a single meal; yields `None` while the row
/// does not exist.
pub fn observe_meal(
    db: &Db,
    meal_id: i64,
) -> impl Stream<Item = anyhow::Result<Option<Meal>>> + Send + 'static {
    let handle = db.clone();
    db.snapshots(Table::Meals, move || {
        let db = handle.clone();
        async move { get_meal(&db, meal_id).await }
    })
}
