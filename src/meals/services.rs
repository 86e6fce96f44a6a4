use tracing::info;

use super::{repo, repo_types::Meal};
use crate::{db::Db, reminders::ReminderScheduling};

/// Inserts the meal and queues its feedback reminder. The two steps are not
/// atomic: a stored meal stays stored whatever happens to the reminder.
pub async fn save_meal(
    db: &Db,
    reminders: &dyn ReminderScheduling,
    mut meal: Meal,
) -> anyhow::Result<Meal> {
    meal.id = repo::insert_meal(db, &meal).await?;
    reminders.schedule_feedback_reminder(meal.id);
    info!(meal_id = meal.id, kind = %meal.input_kind, "meal saved");
    Ok(meal)
}

#[cfg(test)]
pub(crate) mod services_tests {
    use std::sync::Mutex;

    use super::*;
    use crate::meals::repo::repo_tests::sample_meal;

    #[derive(Default)]
    pub(crate) struct RecordingReminders(pub Mutex<Vec<i64>>);

    impl ReminderScheduling for RecordingReminders {
        fn schedule_feedback_reminder(&self, meal_id: i64) {
            self.0.lock().unwrap().push(meal_id);
        }
    }

    #[tokio::test]
    async fn save_assigns_an_id_and_schedules_by_it() {
        let db = Db::in_memory().await.unwrap();
        let reminders = RecordingReminders::default();

        let first = save_meal(&db, &reminders, sample_meal(1_000, "soup")).await.unwrap();
        let second = save_meal(&db, &reminders, sample_meal(2_000, "bread")).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(*reminders.0.lock().unwrap(), vec![first.id, second.id]);
        assert_eq!(repo::get_meal(&db, first.id).await.unwrap(), Some(first));
    }
}
