use anyhow::Context;
use futures::Stream;

use super::repo_types::UserFeedback;
use crate::db::{Db, Table};

/// Insert feedback, replacing any row with the same id. `id == 0` gets a
/// fresh one. The meal id is not checked here; the foreign key decides.
pub async fn insert_feedback(db: &Db, feedback: &UserFeedback) -> anyhow::Result<i64> {
    let id = (feedback.id != 0).then_some(feedback.id);
    let done = sqlx::query(
        r#"
        INSERT OR REPLACE INTO user_feedback (
            id, meal_id, feedback_timestamp, feeling, custom_feeling, notes
        )
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(feedback.meal_id)
    .bind(feedback.feedback_timestamp)
    .bind(&feedback.feeling)
    .bind(feedback.custom_feeling.as_deref())
    .bind(feedback.notes.as_deref())
    .execute(&db.pool)
    .await
    .context("insert feedback")?;

    db.notify(Table::UserFeedback);
    Ok(done.last_insert_rowid())
}

/// Feedback for one meal, newest first.
pub async fn list_feedback_for_meal(db: &Db, meal_id: i64) -> anyhow::Result<Vec<UserFeedback>> {
    let rows = sqlx::query_as::<_, UserFeedback>(
        r#"
        SELECT id, meal_id, feedback_timestamp, feeling, custom_feeling, notes
          FROM user_feedback
         WHERE meal_id = ?
         ORDER BY feedback_timestamp DESC, id DESC
        "#,
    )
    .bind(meal_id)
    .fetch_all(&db.pool)
    .await
    .context("list feedback for meal")?;

    Ok(rows)
}

pub async fn list_all_feedback(db: &Db) -> anyhow::Result<Vec<UserFeedback>> {
    let rows = sqlx::query_as::<_, UserFeedback>(
        r#"
        SELECT id, meal_id, feedback_timestamp, feeling, custom_feeling, notes
          FROM user_feedback
         ORDER BY feedback_timestamp DESC, id DESC
        "#,
    )
    .fetch_all(&db.pool)
    .await
    .context("list feedback")?;

    Ok(rows)
}

/// Continuously updating view of [`list_feedback_for_meal`].
pub fn observe_feedback_for_meal(
    db: &Db,
    meal_id: i64,
) -> impl Stream<Item = anyhow::Result<Vec<UserFeedback>>> + Send + 'static {
    let handle = db.clone();
    db.snapshots(Table::UserFeedback, move || {
        let db = handle.clone();
        async move { list_feedback_for_meal(&db, meal_id).await }
    })
}

#[cfg(test)]
pub(crate) mod repo_tests {
    use futures::StreamExt;

    use super::*;
    use crate::meals::repo::{delete_meal, insert_meal, repo_tests::sample_meal};

    pub(crate) fn sample_feedback(meal_id: i64, at: i64, feeling: &str) -> UserFeedback {
        UserFeedback {
            id: 0,
            meal_id,
            feedback_timestamp: at,
            feeling: feeling.to_string(),
            custom_feeling: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn feedback_for_meal_is_newest_first() {
        let db = Db::in_memory().await.expect("db");
        let meal = insert_meal(&db, &sample_meal(1_000, "rice")).await.expect("meal");
        let other = insert_meal(&db, &sample_meal(2_000, "soup")).await.expect("meal");

        insert_feedback(&db, &sample_feedback(meal, 10, "Good")).await.expect("fb");
        insert_feedback(&db, &sample_feedback(meal, 30, "Bloated")).await.expect("fb");
        insert_feedback(&db, &sample_feedback(other, 20, "Great")).await.expect("fb");

        let feelings: Vec<_> = list_feedback_for_meal(&db, meal)
            .await
            .expect("list")
            .into_iter()
            .map(|f| f.feeling)
            .collect();
        assert_eq!(feelings, vec!["Bloated", "Good"]);
        assert_eq!(list_all_feedback(&db).await.expect("all").len(), 3);
    }

    #[tokio::test]
    async fn deleting_a_meal_cascades_to_its_feedback() {
        let db = Db::in_memory().await.expect("db");
        let meal = insert_meal(&db, &sample_meal(1_000, "rice")).await.expect("meal");
        let keep = insert_meal(&db, &sample_meal(2_000, "soup")).await.expect("meal");
        insert_feedback(&db, &sample_feedback(meal, 10, "Tired")).await.expect("fb");
        insert_feedback(&db, &sample_feedback(meal, 20, "Okay")).await.expect("fb");
        insert_feedback(&db, &sample_feedback(keep, 30, "Great")).await.expect("fb");

        assert!(delete_meal(&db, meal).await.expect("delete"));

        assert!(list_feedback_for_meal(&db, meal).await.expect("list").is_empty());
        assert_eq!(list_feedback_for_meal(&db, keep).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn dangling_meal_id_is_rejected_by_the_foreign_key() {
        let db = Db::in_memory().await.expect("db");
        let err = insert_feedback(&db, &sample_feedback(404, 10, "Okay")).await;
        assert!(err.is_err());
        assert!(list_all_feedback(&db).await.expect("all").is_empty());
    }

    #[tokio::test]
    async fn observe_feedback_sees_new_rows() {
        let db = Db::in_memory().await.expect("db");
        let meal = insert_meal(&db, &sample_meal(1_000, "rice")).await.expect("meal");
        let mut stream = Box::pin(observe_feedback_for_meal(&db, meal));

        assert!(stream.next().await.expect("item").expect("query").is_empty());

        insert_feedback(&db, &sample_feedback(meal, 10, "Good")).await.expect("fb");
        let after = stream.next().await.expect("item").expect("query");
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].feeling, "Good");
    }
}
