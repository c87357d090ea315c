use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{blank_as_cleared, blank_as_none, text_enum};

text_enum! {
    TaskStatus: "status" {
        NotStarted => "Not Started",
        InProgress => "In Progress",
        Completed => "Completed",
    }
}

text_enum! {
    TaskPriority: "priority" {
        Low => "Low",
        Medium => "Medium",
        High => "High",
    }
}

/// Task row joined with the display names of both parties.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct TaskView {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    #[sqlx(try_from = "String")]
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub area: Option<String>,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub assigned_by: Option<Uuid>,
    pub assigned_to_name: Option<String>,
    pub assigned_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskView {
    /// Whether `user_id` is a party to the task, as assignee or assigner.
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.assigned_to == Some(user_id) || self.assigned_by == Some(user_id)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub assigned_to: Option<Uuid>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub priority: Option<TaskPriority>,
    pub area: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "blank_as_cleared",
        skip_serializing_if = "Option::is_none"
    )]
    pub assigned_to: Option<Option<Uuid>>,
    #[serde(
        default,
        deserialize_with = "blank_as_cleared",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(
        default,
        deserialize_with = "blank_as_cleared",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub priority: Option<TaskPriority>,
    pub area: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(assigned_to: Option<Uuid>, assigned_by: Option<Uuid>) -> TaskView {
        TaskView {
            id: Uuid::new_v4(),
            title: "Door-to-door survey".into(),
            description: None,
            status: TaskStatus::NotStarted,
            priority: TaskPriority::Medium,
            due_date: None,
            start_date: None,
            area: None,
            notes: None,
            assigned_to,
            assigned_by,
            assigned_to_name: None,
            assigned_by_name: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn involvement_covers_both_parties() {
        let worker = Uuid::new_v4();
        let boss = Uuid::new_v4();
        let t = task(Some(worker), Some(boss));
        assert!(t.involves(worker));
        assert!(t.involves(boss));
        assert!(!t.involves(Uuid::new_v4()));
        assert!(!task(None, None).involves(worker));
    }

    #[test]
    fn status_labels_contain_spaces() {
        assert_eq!("In Progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert!("in_progress".parse::<TaskStatus>().is_err());
        let req: UpdateTaskRequest = serde_json::from_str(r#"{"priority":"High"}"#).unwrap();
        assert_eq!(req.priority, Some(TaskPriority::High));
    }

    #[test]
    fn blank_form_values_are_absent() {
        let req: CreateTaskRequest = serde_json::from_str(
            r#"{"title":"Booth visit","assigned_to":"","due_date":"2025-02-01","start_date":"","priority":""}"#,
        )
        .unwrap();
        assert_eq!(req.assigned_to, None);
        assert_eq!(req.due_date, NaiveDate::from_ymd_opt(2025, 2, 1));
        assert_eq!(req.start_date, None);
        assert_eq!(req.priority, None);

        let err = serde_json::from_str::<UpdateTaskRequest>(r#"{"status":"Done"}"#).unwrap_err();
        assert!(err.to_string().contains("Invalid status value: Done"));
    }

    #[test]
    fn update_tells_missing_from_cleared() {
        let assignee = Uuid::new_v4();
        let req: UpdateTaskRequest = serde_json::from_str(&format!(
            r#"{{"assigned_to":"{assignee}","due_date":null,"start_date":""}}"#
        ))
        .unwrap();
        assert_eq!(req.assigned_to, Some(Some(assignee)));
        assert_eq!(req.due_date, Some(None));
        assert_eq!(req.start_date, Some(None));

        let untouched: UpdateTaskRequest = serde_json::from_str(r#"{"title":"Booth visit"}"#).unwrap();
        assert_eq!(untouched.assigned_to, None);
        assert_eq!(untouched.due_date, None);
        assert_eq!(untouched.start_date, None);
    }

    #[test]
    fn audited_update_lists_only_sent_fields() {
        let req: UpdateTaskRequest =
            serde_json::from_str(r#"{"assigned_to":null,"notes":"moved"}"#).unwrap();
        let audited = serde_json::to_value(&req).unwrap();

        assert!(audited["assigned_to"].is_null());
        assert!(audited.as_object().unwrap().contains_key("assigned_to"));
        assert!(!audited.as_object().unwrap().contains_key("due_date"));
        assert_eq!(audited["notes"], "moved");
    }
}
